//! Database schemas for Gatehouse
//!
//! MongoDB document structures for users, tokens, and movies.

mod metadata;
mod movie;
mod token;
mod user;

pub use metadata::Metadata;
pub use movie::{MovieDoc, MOVIE_COLLECTION};
pub use token::{TokenDoc, TOKEN_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
