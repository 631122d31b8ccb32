//! Bookkeeping shared by every document
//!
//! Tracks creation, update, and soft deletion timestamps.

use bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    /// Whether this document has been soft-deleted
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Metadata for a record first created at `created_at`
    pub fn created(created_at: chrono::DateTime<chrono::Utc>) -> Self {
        let created_at = DateTime::from_chrono(created_at);
        Self {
            is_deleted: false,
            deleted_at: None,
            updated_at: Some(created_at),
            created_at: Some(created_at),
        }
    }

    /// Creation time, falling back to `now` for legacy documents without one
    pub fn created_at_or(&self, now: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        self.created_at.map(|d| d.to_chrono()).unwrap_or(now)
    }
}
