//! Movie document schema

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{Movie, Runtime};
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::GatehouseError;

/// Collection name for movies
pub const MOVIE_COLLECTION: &str = "movies";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MovieDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub title: String,

    #[serde(default)]
    pub year: i32,

    /// Minutes
    #[serde(default)]
    pub runtime: i32,

    #[serde(default)]
    pub genres: Vec<String>,

    #[serde(default = "initial_version")]
    pub version: i64,
}

fn initial_version() -> i64 {
    1
}

impl From<&Movie> for MovieDoc {
    fn from(movie: &Movie) -> Self {
        Self {
            id: movie.id.to_string(),
            metadata: Metadata::created(movie.created_at),
            title: movie.title.clone(),
            year: movie.year,
            runtime: movie.runtime.0,
            genres: movie.genres.clone(),
            version: movie.version,
        }
    }
}

impl TryFrom<MovieDoc> for Movie {
    type Error = GatehouseError;

    fn try_from(doc: MovieDoc) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&doc.id)
            .map_err(|e| GatehouseError::Storage(format!("Malformed movie id {}: {}", doc.id, e)))?;
        Ok(Movie {
            id,
            created_at: doc.metadata.created_at_or(chrono::Utc::now()),
            title: doc.title,
            year: doc.year,
            runtime: Runtime(doc.runtime),
            genres: doc.genres,
            version: doc.version,
        })
    }
}

impl IntoIndexes for MovieDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "title": 1 },
            Some(
                IndexOptions::builder()
                    .name("title_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for MovieDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
