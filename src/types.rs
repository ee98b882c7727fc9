//! Basic type definitions for the talk server
//!
//! Provides newtype wrappers for type safety:
//! - `Version`: monotonic change counter, exposed as an ETag
//! - `WaiterId`: UUID-based identifier for a parked long-poll request
//!
//! Also parses the two request headers that drive long polling.

use std::time::Duration;

use uuid::Uuid;

/// Store version (newtype pattern)
///
/// Bumped once per successful mutation. Clients only ever compare it
/// for equality, so it is rendered as an opaque quoted ETag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub u64);

impl Version {
    /// The version following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Render as an HTTP entity tag (`"7"`)
    pub fn to_etag(self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Parse an `If-None-Match` value
    ///
    /// Accepts the quoted form this server emits as well as a bare number.
    /// Anything else yields `None`, which callers treat as "no token".
    pub fn from_etag(value: &str) -> Option<Self> {
        let value = value.trim();
        let value = value.strip_prefix("W/").unwrap_or(value);
        let inner = match (value.find('"'), value.rfind('"')) {
            (Some(start), Some(end)) if end > start => &value[start + 1..end],
            (None, None) => value,
            _ => return None,
        };
        inner.parse().ok().map(Self)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique waiter identifier (newtype pattern)
///
/// Wraps a UUID v4 so parked requests can be told apart in logs
/// and removed from the registry individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(pub Uuid);

impl WaiterId {
    /// Create a new random waiter ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WaiterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WaiterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Extract the wait duration from a `Prefer` header value
///
/// Looks for a `wait=N` preference (N in whole seconds). The token must
/// start at a word boundary, so `nowait=5` is not a match.
pub fn parse_wait(prefer: &str) -> Option<Duration> {
    let mut rest = prefer;
    while let Some(pos) = rest.find("wait=") {
        let at_boundary = rest[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
        let after = &rest[pos + "wait=".len()..];
        if at_boundary {
            let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(secs) = digits.parse::<u64>() {
                return Some(Duration::from_secs(secs));
            }
        }
        rest = after;
    }
    None
}
