//! Token document schema
//!
//! Keyed by the SHA-256 hash of the plaintext. A TTL index on `expiry` lets
//! the server reap expired tokens on its own; the periodic purge covers the
//! window before the TTL monitor runs.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::{Scope, TokenRecord};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::GatehouseError;

/// Collection name for tokens
pub const TOKEN_COLLECTION: &str = "tokens";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TokenDoc {
    /// Hex SHA-256 of the plaintext
    #[serde(rename = "_id")]
    pub hash: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,

    pub scope: Scope,

    pub expiry: DateTime,
}

impl From<&TokenRecord> for TokenDoc {
    fn from(record: &TokenRecord) -> Self {
        Self {
            hash: record.hash.clone(),
            metadata: Metadata::default(),
            user_id: record.user_id.to_string(),
            scope: record.scope,
            expiry: DateTime::from_chrono(record.expiry),
        }
    }
}

impl TryFrom<TokenDoc> for TokenRecord {
    type Error = GatehouseError;

    fn try_from(doc: TokenDoc) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&doc.user_id)
            .map_err(|e| GatehouseError::Storage(format!("Malformed token owner: {}", e)))?;
        Ok(TokenRecord {
            hash: doc.hash,
            user_id,
            scope: doc.scope,
            expiry: doc.expiry.to_chrono(),
        })
    }
}

impl IntoIndexes for TokenDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Server-side expiry
            (
                doc! { "expiry": 1 },
                Some(
                    IndexOptions::builder()
                        .expire_after(Duration::from_secs(0))
                        .name("expiry_ttl".to_string())
                        .build(),
                ),
            ),
            // Revocation by owner and scope
            (
                doc! { "user_id": 1, "scope": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_scope_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TokenDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_scope_stored_lowercase() {
        let record = TokenRecord {
            hash: "ab".repeat(32),
            user_id: Uuid::new_v4(),
            scope: Scope::Activation,
            expiry: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        };
        let doc = bson::to_document(&TokenDoc::from(&record)).unwrap();
        assert_eq!(doc.get_str("scope").unwrap(), "activation");
        assert_eq!(doc.get_str("_id").unwrap(), record.hash);

        let back = TokenRecord::try_from(bson::from_document::<TokenDoc>(doc).unwrap()).unwrap();
        assert_eq!(back, record);
    }
}
