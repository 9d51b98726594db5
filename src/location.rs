use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Prefix that routes a path string to the object store.
pub const OBJECT_SCHEME: &str = "s3://";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("path must not be empty")]
    Empty,
    #[error("'{0}' is missing a bucket name")]
    MissingBucket(String),
    #[error("'{0}' is missing an object key")]
    MissingKey(String),
}

/// Where a file lives, parsed once from the caller's path string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Object { bucket: String, key: String },
}

impl Location {
    /// Parse `s3://bucket/key...` into an object reference; anything else is a
    /// local path taken verbatim. The key may be empty here; operations that
    /// need one call [`Location::require_key`].
    pub fn parse(raw: &str) -> Result<Self, LocationError> {
        if raw.is_empty() {
            return Err(LocationError::Empty);
        }

        let Some(rest) = raw.strip_prefix(OBJECT_SCHEME) else {
            return Ok(Location::Local(PathBuf::from(raw)));
        };

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(LocationError::MissingBucket(raw.to_string()));
        }

        Ok(Location::Object {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Fails for object locations with an empty key.
    pub fn require_key(&self) -> Result<(), LocationError> {
        match self {
            Location::Object { key, .. } if key.is_empty() => {
                Err(LocationError::MissingKey(self.to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Object { bucket, key } => write!(f, "{OBJECT_SCHEME}{bucket}/{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_location() {
        let loc = Location::parse("s3://bucket-a/path/to/key.txt").unwrap();
        assert_eq!(
            loc,
            Location::Object {
                bucket: "bucket-a".to_string(),
                key: "path/to/key.txt".to_string(),
            }
        );
        assert_eq!(loc.to_string(), "s3://bucket-a/path/to/key.txt");
    }

    #[test]
    fn parses_local_path() {
        let loc = Location::parse("/tmp/file.txt").unwrap();
        assert_eq!(loc, Location::Local(PathBuf::from("/tmp/file.txt")));
    }

    #[test]
    fn empty_bucket_is_rejected() {
        assert_eq!(
            Location::parse("s3://"),
            Err(LocationError::MissingBucket("s3://".to_string()))
        );
        assert!(matches!(
            Location::parse("s3:///key"),
            Err(LocationError::MissingBucket(_))
        ));
    }

    #[test]
    fn bucket_without_key_parses_but_fails_key_check() {
        for raw in ["s3://bucket", "s3://bucket/"] {
            let loc = Location::parse(raw).unwrap();
            assert!(matches!(loc, Location::Object { .. }));
            assert!(matches!(loc.require_key(), Err(LocationError::MissingKey(_))));
        }
    }

    #[test]
    fn empty_string_is_rejected() {
        assert_eq!(Location::parse(""), Err(LocationError::Empty));
    }

    #[test]
    fn other_schemes_are_local_paths() {
        let loc = Location::parse("gs://bucket/key").unwrap();
        assert_eq!(loc, Location::Local(PathBuf::from("gs://bucket/key")));
    }
}
