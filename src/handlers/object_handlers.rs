//! Command handlers for object and bucket operations.
//! Each handler streams object bodies between local files and the store and
//! writes its human-readable (or JSON) report to the given output.

use crate::{
    errors::{AppError, EXIT_FAILURE, EXIT_NOT_FOUND},
    models::object::ObjectInfo,
    services::storage_service::ObjectStorage,
};
use std::{
    io::{self, Write},
    path::Path,
};
use tokio::{fs, io::AsyncWriteExt};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `put <bucket> <file>`: upload a local file. The key defaults to the file's base name.
pub async fn put_object<S, W>(
    storage: &S,
    out: &mut W,
    bucket: &str,
    file: &Path,
    key: Option<&str>,
    json: bool,
) -> Result<ObjectInfo, AppError>
where
    S: ObjectStorage,
    W: Write,
{
    let key = match key {
        Some(key) => key.to_string(),
        None => file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                AppError::internal(format!("cannot derive object key from {}", file.display()))
            })?,
    };

    let input = fs::File::open(file).await.map_err(|err| {
        let code = if err.kind() == io::ErrorKind::NotFound {
            EXIT_NOT_FOUND
        } else {
            EXIT_FAILURE
        };
        AppError::new(code, format!("Failed to open file {}: {}", file.display(), err))
    })?;

    let info = storage.save(bucket, &key, input).await?;
    tracing::info!(bucket, key = %info.key, size = info.size, "object stored");

    if json {
        writeln!(out, "{}", to_json(&info)?)?;
    } else {
        writeln!(out, "Successfully added {} to bucket {}", info.key, info.bucket)?;
        writeln!(out, "checksum: {}", info.checksum)?;
    }
    Ok(info)
}

/// `get <bucket> <key> <out-dir> --checksum <hex>`: verify, then copy into `out_dir/key`.
///
/// Nothing is created in `out_dir` unless verification succeeds.
pub async fn get_object<S, W>(
    storage: &S,
    out: &mut W,
    bucket: &str,
    key: &str,
    out_dir: &Path,
    checksum: &str,
) -> Result<ObjectInfo, AppError>
where
    S: ObjectStorage,
    W: Write,
{
    let (mut reader, info) = storage.get(bucket, key, checksum).await?;

    fs::create_dir_all(out_dir).await?;
    let path = out_dir.join(&info.key);
    let mut out_file = fs::File::create(&path).await?;
    tokio::io::copy(&mut reader, &mut out_file).await?;
    out_file.flush().await?;

    writeln!(out, "Successfully saved {} to {}", info.key, path.display())?;
    Ok(info)
}

/// `list <bucket>`: table of objects, or a JSON array.
pub async fn list_objects<S, W>(
    storage: &S,
    out: &mut W,
    bucket: &str,
    json: bool,
) -> Result<Vec<ObjectInfo>, AppError>
where
    S: ObjectStorage,
    W: Write,
{
    let objects = storage.list_objects(bucket).await?;

    if json {
        writeln!(out, "{}", to_json(&objects)?)?;
        return Ok(objects);
    }

    if objects.is_empty() {
        writeln!(out, "No objects found")?;
        return Ok(objects);
    }

    writeln!(out, "{:<25} {:<10} {}", "CREATED", "SIZE", "NAME")?;
    writeln!(out, "{}", "-".repeat(59))?;
    for obj in &objects {
        writeln!(
            out,
            "{:<25} {:<10} {}",
            obj.created_at.format(TIMESTAMP_FORMAT).to_string(),
            format_size(obj.size),
            obj.key
        )?;
    }
    Ok(objects)
}

/// `delete <bucket> <key>`
pub async fn delete_object<S, W>(
    storage: &S,
    out: &mut W,
    bucket: &str,
    key: &str,
) -> Result<(), AppError>
where
    S: ObjectStorage,
    W: Write,
{
    storage.delete(bucket, key).await?;
    writeln!(out, "Deleted {} from bucket {}", key, bucket)?;
    Ok(())
}

/// `exists <bucket> <key>`: prints `true` or `false`.
pub async fn object_exists<S, W>(
    storage: &S,
    out: &mut W,
    bucket: &str,
    key: &str,
) -> Result<bool, AppError>
where
    S: ObjectStorage,
    W: Write,
{
    let exists = storage.exists(bucket, key).await?;
    writeln!(out, "{}", exists)?;
    Ok(exists)
}

/// Human-readable size in powers of 1024 (`512 B`, `1.5 KB`, `3.0 MB`).
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let unit = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, unit)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| AppError::internal(format!("serializing output: {}", err)))
}
