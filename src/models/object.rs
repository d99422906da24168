//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Describes a single stored object.
///
/// Built fresh by every save, verified read, and listing. It is never updated
/// in place and has no identity beyond `bucket`, `key` and `path`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Bucket (top-level directory) holding the object.
    pub bucket: String,

    /// Object key, used verbatim as the file name inside the bucket.
    pub key: String,

    /// Exact number of bytes written or read.
    pub size: u64,

    /// Lowercase hex digest of the content. Empty for listings, which never hash.
    pub checksum: String,

    /// Time the save started, or the file modification time when read back.
    pub created_at: DateTime<Utc>,

    /// Resolved on-disk location.
    pub path: PathBuf,
}
