//! MongoDB persistence
//!
//! [`MongoStore`] implements the storage traits from [`crate::store`] on top
//! of typed collections with schema-defined indexes.

mod mongo;
pub mod schemas;
mod store;

pub use mongo::{is_duplicate_key, live, IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use store::MongoStore;
