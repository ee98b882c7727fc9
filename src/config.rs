//! Command line configuration
//!
//! Parsed with clap. Logging is configured separately through `RUST_LOG`.

use std::path::PathBuf;

use clap::Parser;

use crate::persistence::{PersistPolicy, DEFAULT_PERSIST_EVERY};

/// Skill-sharing talk server
#[derive(Debug, Clone, Parser)]
#[command(name = "skillshare_server", version, about)]
pub struct Config {
    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value_t = 8000)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// JSON file the talks are loaded from and saved to
    #[arg(short = 'f', long = "file", default_value = "talks.json")]
    pub talks_file: PathBuf,

    /// Save to disk after the first mutation and then every N mutations
    #[arg(long, default_value_t = DEFAULT_PERSIST_EVERY)]
    pub persist_every: u64,
}

impl Config {
    /// `host:port` string suitable for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Write cadence for the persistence sidecar
    pub fn persist_policy(&self) -> PersistPolicy {
        PersistPolicy::new(self.persist_every)
    }
}
