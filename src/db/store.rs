//! MongoDB-backed store
//!
//! Conditional updates are a single `update_one` whose filter carries the
//! expected version, so the server performs the compare and the write
//! atomically. A zero match count is then disambiguated with a follow-up read.

use async_trait::async_trait;
use bson::{doc, DateTime, Document};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use super::mongo::{is_duplicate_key, MongoClient, MongoCollection};
use super::schemas::{
    MovieDoc, TokenDoc, UserDoc, MOVIE_COLLECTION, TOKEN_COLLECTION, USER_COLLECTION,
};
use crate::auth::{Permissions, Scope, TokenRecord, User};
use crate::catalog::Movie;
use crate::store::{CredentialStore, ResourceStore};
use crate::types::{GatehouseError, Result};
use crate::versioning::VersionedStore;

/// Conflict when the record still exists, otherwise it was deleted underneath us
fn missed_update<T>(exists: Option<T>) -> GatehouseError {
    match exists {
        Some(_) => GatehouseError::EditConflict,
        None => GatehouseError::NotFound,
    }
}

/// Matches the record only at the version the writer observed
fn versioned_filter(id: Uuid, expected_version: i64) -> Document {
    doc! { "_id": id.to_string(), "version": expected_version }
}

fn user_update(user: &User) -> Document {
    doc! {
        "$set": {
            "name": user.name.clone(),
            "email": user.email.clone(),
            "password_hash": user.password.as_phc(),
            "activated": user.activated,
            "metadata.updated_at": DateTime::now(),
        },
        "$inc": { "version": 1_i64 },
    }
}

fn movie_update(movie: &Movie) -> Document {
    doc! {
        "$set": {
            "title": movie.title.clone(),
            "year": movie.year,
            "runtime": movie.runtime.0,
            "genres": movie.genres.clone(),
            "metadata.updated_at": DateTime::now(),
        },
        "$inc": { "version": 1_i64 },
    }
}

fn storage(context: &str, err: mongodb::error::Error) -> GatehouseError {
    GatehouseError::Storage(format!("{}: {}", context, err))
}

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    users: MongoCollection<UserDoc>,
    tokens: MongoCollection<TokenDoc>,
    movies: MongoCollection<MovieDoc>,
}

impl MongoStore {
    /// Connect and make sure every collection has its indexes
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = MongoClient::new(uri, db_name).await?;
        let users = client.collection::<UserDoc>(USER_COLLECTION).await?;
        let tokens = client.collection::<TokenDoc>(TOKEN_COLLECTION).await?;
        let movies = client.collection::<MovieDoc>(MOVIE_COLLECTION).await?;

        info!(db = client.db_name(), "MongoDB store ready");
        Ok(Self {
            client,
            users,
            tokens,
            movies,
        })
    }

    pub fn db_name(&self) -> &str {
        self.client.db_name()
    }

    async fn find_user_doc(&self, id: Uuid) -> Result<UserDoc> {
        self.users
            .find_one(doc! { "_id": id.to_string() })
            .await?
            .ok_or(GatehouseError::NotFound)
    }
}

#[async_trait]
impl CredentialStore for MongoStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        self.users
            .insert_one(UserDoc::from(user))
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    GatehouseError::DuplicateEmail
                } else {
                    storage("Insert user failed", e)
                }
            })
    }

    async fn find_user_by_email(&self, email: &str) -> Result<User> {
        self.users
            .find_one(doc! { "email": email })
            .await?
            .ok_or(GatehouseError::NotFound)?
            .try_into()
    }

    async fn find_user_by_token(
        &self,
        scope: Scope,
        hash: &str,
        now: chrono::DateTime<Utc>,
    ) -> Result<User> {
        let token = self
            .tokens
            .find_one(doc! {
                "_id": hash,
                "scope": scope.as_str(),
                "expiry": { "$gt": DateTime::from_chrono(now) },
            })
            .await?
            .ok_or(GatehouseError::NotFound)?;

        let record = TokenRecord::try_from(token)?;
        self.find_user_doc(record.user_id).await?.try_into()
    }

    async fn insert_token(&self, token: &TokenRecord) -> Result<()> {
        self.tokens
            .insert_one(TokenDoc::from(token))
            .await
            .map_err(|e| storage("Insert token failed", e))
    }

    async fn delete_tokens_for_user(&self, scope: Scope, user_id: Uuid) -> Result<u64> {
        let result = self
            .tokens
            .delete_many(doc! { "user_id": user_id.to_string(), "scope": scope.as_str() })
            .await?;
        Ok(result.deleted_count)
    }

    async fn delete_expired_tokens(&self, now: chrono::DateTime<Utc>) -> Result<u64> {
        let result = self
            .tokens
            .delete_many(doc! { "expiry": { "$lte": DateTime::from_chrono(now) } })
            .await?;
        debug!(removed = result.deleted_count, "Purged expired tokens");
        Ok(result.deleted_count)
    }

    async fn permissions_for_user(&self, user_id: Uuid) -> Result<Permissions> {
        match self.find_user_doc(user_id).await {
            Ok(doc) => Ok(doc.permissions.into_iter().collect()),
            Err(GatehouseError::NotFound) => Ok(Permissions::new()),
            Err(e) => Err(e),
        }
    }

    async fn grant_permissions(&self, user_id: Uuid, codes: &[&str]) -> Result<()> {
        let result = self
            .users
            .update_one(
                doc! { "_id": user_id.to_string() },
                doc! { "$addToSet": { "permissions": { "$each": codes.to_vec() } } },
            )
            .await
            .map_err(|e| storage("Grant permissions failed", e))?;

        if result.matched_count == 0 {
            return Err(GatehouseError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl VersionedStore<User> for MongoStore {
    async fn get(&self, id: Uuid) -> Result<User> {
        self.find_user_doc(id).await?.try_into()
    }

    async fn conditional_update(&self, user: &User, expected_version: i64) -> Result<i64> {
        let result = self
            .users
            .update_one(
                versioned_filter(user.id, expected_version),
                user_update(user),
            )
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    GatehouseError::DuplicateEmail
                } else {
                    storage("Update user failed", e)
                }
            })?;

        if result.matched_count == 0 {
            let exists = self.users.find_one(doc! { "_id": user.id.to_string() }).await?;
            return Err(missed_update(exists));
        }
        Ok(expected_version + 1)
    }
}

#[async_trait]
impl ResourceStore for MongoStore {
    async fn insert_movie(&self, movie: &Movie) -> Result<()> {
        self.movies
            .insert_one(MovieDoc::from(movie))
            .await
            .map_err(|e| storage("Insert movie failed", e))
    }

    async fn delete_movie(&self, id: Uuid) -> Result<()> {
        let result = self.movies.soft_delete(doc! { "_id": id.to_string() }).await?;
        if result.matched_count == 0 {
            return Err(GatehouseError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl VersionedStore<Movie> for MongoStore {
    async fn get(&self, id: Uuid) -> Result<Movie> {
        self.movies
            .find_one(doc! { "_id": id.to_string() })
            .await?
            .ok_or(GatehouseError::NotFound)?
            .try_into()
    }

    async fn conditional_update(&self, movie: &Movie, expected_version: i64) -> Result<i64> {
        let result = self
            .movies
            .update_one(
                versioned_filter(movie.id, expected_version),
                movie_update(movie),
            )
            .await
            .map_err(|e| storage("Update movie failed", e))?;

        if result.matched_count == 0 {
            let exists = self.movies.find_one(doc! { "_id": movie.id.to_string() }).await?;
            return Err(missed_update(exists));
        }
        Ok(expected_version + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PasswordHash;
    use crate::catalog::Runtime;

    #[test]
    fn test_versioned_filter_pins_version() {
        let id = Uuid::new_v4();
        let filter = versioned_filter(id, 3);
        assert_eq!(filter.get_str("_id").unwrap(), id.to_string());
        assert_eq!(filter.get_i64("version").unwrap(), 3);
    }

    #[test]
    fn test_updates_increment_version() {
        let mut user = User::new(
            "Dana Smith".into(),
            "dana@example.com".into(),
            PasswordHash::from_phc("$argon2id$stub".into()),
            Utc::now(),
        );
        user.activated = true;
        let update = user_update(&user);
        assert_eq!(update.get_document("$inc").unwrap().get_i64("version").unwrap(), 1);
        let set = update.get_document("$set").unwrap();
        assert!(set.get_bool("activated").unwrap());
        assert!(!set.contains_key("version"));

        let movie = Movie::new(
            "Moana".into(),
            2016,
            Runtime(107),
            vec!["animation".into()],
            Utc::now(),
        );
        let update = movie_update(&movie);
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_i32("runtime").unwrap(), 107);
        assert_eq!(set.get_array("genres").unwrap().len(), 1);
        assert_eq!(update.get_document("$inc").unwrap().get_i64("version").unwrap(), 1);
    }

    #[test]
    fn test_missed_update_classification() {
        assert_eq!(missed_update(Some(())), GatehouseError::EditConflict);
        assert_eq!(missed_update::<()>(None), GatehouseError::NotFound);
    }
}
