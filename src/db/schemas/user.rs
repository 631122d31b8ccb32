//! User document schema
//!
//! Permission grants live on the account document as a set of codes.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{PasswordHash, User};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::GatehouseError;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// Account UUID in hyphenated form
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// Unique across accounts
    pub email: String,

    /// Argon2 PHC string
    pub password_hash: String,

    #[serde(default)]
    pub activated: bool,

    /// Granted permission codes
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Optimistic concurrency version
    #[serde(default = "initial_version")]
    pub version: i64,
}

fn initial_version() -> i64 {
    1
}

impl From<&User> for UserDoc {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            metadata: Metadata::created(user.created_at),
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password.as_phc().to_string(),
            activated: user.activated,
            permissions: Vec::new(),
            version: user.version,
        }
    }
}

impl TryFrom<UserDoc> for User {
    type Error = GatehouseError;

    fn try_from(doc: UserDoc) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&doc.id)
            .map_err(|e| GatehouseError::Storage(format!("Malformed user id {}: {}", doc.id, e)))?;
        Ok(User {
            id,
            created_at: doc.metadata.created_at_or(chrono::Utc::now()),
            name: doc.name,
            email: doc.email,
            password: PasswordHash::from_phc(doc.password_hash),
            activated: doc.activated,
            version: doc.version,
        })
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "email": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("email_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_user_doc_conversion_keeps_identity() {
        let user = User::new(
            "Faith Smith".into(),
            "faith@example.com".into(),
            PasswordHash::from_phc("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into()),
            Utc::now(),
        );
        let doc = UserDoc::from(&user);
        assert_eq!(doc.id, user.id.to_string());
        assert!(doc.permissions.is_empty());

        let back = User::try_from(doc).unwrap();
        assert_eq!(back.id, user.id);
        assert_eq!(back.email, user.email);
        assert_eq!(back.password.as_phc(), user.password.as_phc());
        assert_eq!(back.version, 1);
        assert!(!back.activated);
    }

    #[test]
    fn test_malformed_id_is_storage_error() {
        let doc = UserDoc {
            id: "not-a-uuid".into(),
            ..Default::default()
        };
        assert!(matches!(User::try_from(doc), Err(GatehouseError::Storage(_))));
    }
}
