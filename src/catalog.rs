//! Movie catalog records
//!
//! `Movie` is the versioned resource guarded by [`crate::versioning`].

use chrono::{DateTime, Datelike, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::types::Result;
use crate::validation::{unique, Validator};
use crate::versioning::Versioned;

/// Earliest year a film can have been released
const FIRST_FILM_YEAR: i32 = 1888;

/// Running time in minutes. On the wire it is the string `"<n> mins"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Runtime(pub i32);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid runtime format")]
pub struct InvalidRuntimeFormat;

impl std::str::FromStr for Runtime {
    type Err = InvalidRuntimeFormat;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some("mins"), None) => n
                .parse::<i32>()
                .map(Runtime)
                .map_err(|_| InvalidRuntimeFormat),
            _ => Err(InvalidRuntimeFormat),
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movie {
    pub id: Uuid,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub year: i32,
    #[serde(skip_serializing_if = "is_zero_runtime")]
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i64,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

fn is_zero_runtime(r: &Runtime) -> bool {
    r.0 == 0
}

impl Movie {
    pub fn new(
        title: String,
        year: i32,
        runtime: Runtime,
        genres: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            title,
            year,
            runtime,
            genres,
            version: 1,
        }
    }

    /// Overwrite the fields present in `patch`
    pub fn apply_patch(&mut self, patch: MoviePatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(year) = patch.year {
            self.year = year;
        }
        if let Some(runtime) = patch.runtime {
            self.runtime = runtime;
        }
        if let Some(genres) = patch.genres {
            self.genres = genres;
        }
    }
}

impl Versioned for Movie {
    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }
}

/// Body of a create request
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovieInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Body of a partial update; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MoviePatch {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

pub fn validate_movie(v: &mut Validator, movie: &Movie, now: DateTime<Utc>) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(movie.title.len() <= 500, "title", "must not be more than 500 bytes long");

    v.check(movie.year != 0, "year", "must be provided");
    v.check(movie.year >= FIRST_FILM_YEAR, "year", "must be greater than 1888");
    v.check(movie.year <= now.year(), "year", "must not be in the future");

    v.check(movie.runtime.0 != 0, "runtime", "must be provided");
    v.check(movie.runtime.0 > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(movie.genres.len() <= 5, "genres", "must not contain more than 5 genres");
    v.check(unique(&movie.genres), "genres", "must not contain duplicate values");
}

/// Validate `movie`, failing with the collected field errors
pub fn check_movie(movie: &Movie, now: DateTime<Utc>) -> Result<()> {
    let mut v = Validator::new();
    validate_movie(&mut v, movie, now);
    v.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GatehouseError;

    fn casablanca() -> Movie {
        Movie::new(
            "Casablanca".into(),
            1942,
            Runtime(102),
            vec!["drama".into(), "romance".into()],
            Utc::now(),
        )
    }

    #[test]
    fn test_runtime_wire_format() {
        assert_eq!(
            serde_json::to_string(&Runtime(102)).unwrap(),
            r#""102 mins""#
        );
        let parsed: Runtime = serde_json::from_str(r#""95 mins""#).unwrap();
        assert_eq!(parsed, Runtime(95));

        assert!(serde_json::from_str::<Runtime>("95").is_err());
        assert!(serde_json::from_str::<Runtime>(r#""95 minutes""#).is_err());
        assert!(serde_json::from_str::<Runtime>(r#""95 mins extra""#).is_err());
        assert_eq!("abc mins".parse::<Runtime>(), Err(InvalidRuntimeFormat));
    }

    #[test]
    fn test_valid_movie_passes() {
        assert!(check_movie(&casablanca(), Utc::now()).is_ok());
    }

    #[test]
    fn test_invalid_movie_reports_fields() {
        let mut movie = casablanca();
        movie.title.clear();
        movie.year = 1700;
        movie.genres = vec!["drama".into(), "drama".into()];

        match check_movie(&movie, Utc::now()) {
            Err(GatehouseError::Validation(errors)) => {
                assert_eq!(errors["title"], "must be provided");
                assert_eq!(errors["year"], "must be greater than 1888");
                assert_eq!(errors["genres"], "must not contain duplicate values");
                assert!(!errors.contains_key("runtime"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let mut movie = casablanca();
        movie.apply_patch(MoviePatch {
            runtime: Some(Runtime(103)),
            ..Default::default()
        });
        assert_eq!(movie.runtime, Runtime(103));
        assert_eq!(movie.title, "Casablanca");
        assert_eq!(movie.year, 1942);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(casablanca()).unwrap();
        assert_eq!(json["runtime"], "102 mins");
        assert_eq!(json["version"], 1);
        assert!(json.get("created_at").is_none());
    }
}
