//! Talk store
//!
//! An owned title → talk mapping. The store validates and applies
//! mutations and reports whether anything actually changed; version
//! bookkeeping is left to the server actor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::talk::{Comment, Talk};

/// Result of a successful `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No talk had this title before
    Created,
    /// An existing talk was overwritten and its comments dropped
    Replaced,
}

/// All talks, keyed by title
///
/// Invariant: every key equals the `title` of its talk. Iteration order
/// is ascending by title. Serializes as a plain JSON object, which is
/// also the on-disk format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TalkStore {
    talks: BTreeMap<String, Talk>,
}

impl TalkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a title → talk mapping
    ///
    /// A talk whose `title` disagrees with its key is re-titled to the key.
    pub fn from_map(talks: BTreeMap<String, Talk>) -> Self {
        let talks = talks
            .into_iter()
            .map(|(key, mut talk)| {
                if talk.title != key {
                    talk.title = key.clone();
                }
                (key, talk)
            })
            .collect();
        Self { talks }
    }

    /// Look up a talk by title
    pub fn get(&self, title: &str) -> Result<&Talk, AppError> {
        self.talks
            .get(title)
            .ok_or_else(|| AppError::TalkNotFound(title.to_string()))
    }

    /// Create a talk, or replace an existing one
    ///
    /// Replacing overwrites presenter and summary and clears comments.
    /// Fails without touching the store if any field is empty.
    pub fn put(
        &mut self,
        title: &str,
        presenter: String,
        summary: String,
    ) -> Result<PutOutcome, AppError> {
        if title.is_empty() {
            return Err(AppError::EmptyTitle);
        }
        if presenter.is_empty() || summary.is_empty() {
            return Err(AppError::BadTalkData);
        }

        match self.talks.get_mut(title) {
            Some(talk) => {
                talk.replace(presenter, summary);
                Ok(PutOutcome::Replaced)
            }
            None => {
                self.talks
                    .insert(title.to_string(), Talk::new(title, presenter, summary));
                Ok(PutOutcome::Created)
            }
        }
    }

    /// Remove a talk
    ///
    /// Returns the removed talk, or `None` if there was nothing to remove.
    pub fn delete(&mut self, title: &str) -> Option<Talk> {
        self.talks.remove(title)
    }

    /// Append a comment to an existing talk
    pub fn add_comment(
        &mut self,
        title: &str,
        author: String,
        message: String,
    ) -> Result<&Talk, AppError> {
        if author.is_empty() || message.is_empty() {
            return Err(AppError::BadCommentData);
        }

        let talk = self
            .talks
            .get_mut(title)
            .ok_or_else(|| AppError::TalkNotFound(title.to_string()))?;
        talk.add_comment(Comment::new(author, message));
        Ok(&*talk)
    }

    /// Snapshot of every talk, ordered by title
    pub fn list(&self) -> Vec<Talk> {
        self.talks.values().cloned().collect()
    }

    /// Number of talks
    pub fn len(&self) -> usize {
        self.talks.len()
    }

    /// Check if there are no talks
    pub fn is_empty(&self) -> bool {
        self.talks.is_empty()
    }
}
