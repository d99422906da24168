//! Routes each subcommand to its handler.
//!
//! ## Commands
//! - `put    <bucket> <file> [--key K] [--json]` — upload a local file
//! - `get    <bucket> <key> <out-dir> --checksum H` — verified download
//! - `list   <bucket> [--json]` — list objects (no checksums)
//! - `delete <bucket> <key>` — remove an object
//! - `exists <bucket> <key>` — print `true` / `false`

use crate::{
    config::Command,
    errors::AppError,
    handlers::object_handlers::{
        delete_object, get_object, list_objects, object_exists, put_object,
    },
    services::storage_service::ObjectStorage,
};
use std::io::Write;

/// Run one command against `storage`, writing its report to `out`.
pub async fn dispatch<S, W>(storage: &S, command: Command, out: &mut W) -> Result<(), AppError>
where
    S: ObjectStorage,
    W: Write,
{
    match command {
        Command::Put {
            bucket,
            file,
            key,
            json,
        } => {
            put_object(storage, out, &bucket, &file, key.as_deref(), json).await?;
        }
        Command::Get {
            bucket,
            key,
            out_dir,
            checksum,
        } => {
            get_object(storage, out, &bucket, &key, &out_dir, &checksum).await?;
        }
        Command::List { bucket, json } => {
            list_objects(storage, out, &bucket, json).await?;
        }
        Command::Delete { bucket, key } => delete_object(storage, out, &bucket, &key).await?,
        Command::Exists { bucket, key } => {
            object_exists(storage, out, &bucket, &key).await?;
        }
    }
    Ok(())
}
