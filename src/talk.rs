//! Talk and comment records
//!
//! A talk is keyed by its title and carries an append-only list of comments.

use serde::{Deserialize, Serialize};

/// A comment left on a talk
///
/// Immutable once appended; comments are only ever removed together
/// with their talk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Who wrote the comment
    pub author: String,
    /// Comment text
    pub message: String,
}

impl Comment {
    /// Create a new comment
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
        }
    }
}

/// A proposed talk
///
/// The title doubles as the store key and as the last URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talk {
    /// Unique, case-sensitive title
    pub title: String,
    /// Person giving the talk
    pub presenter: String,
    /// Short description
    pub summary: String,
    /// Comments in the order they were posted
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Talk {
    /// Create a new talk with no comments
    pub fn new(
        title: impl Into<String>,
        presenter: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            presenter: presenter.into(),
            summary: summary.into(),
            comments: Vec::new(),
        }
    }

    /// Append a comment at the end of the list
    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.push(comment);
    }

    /// Replace presenter and summary, dropping every comment
    pub fn replace(&mut self, presenter: String, summary: String) {
        self.presenter = presenter;
        self.summary = summary;
        self.comments.clear();
    }

    /// Number of comments on this talk
    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }
}
