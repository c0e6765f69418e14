use serde::Serialize;

use tally_core::{SignPolicy, SourceFile};

use crate::db::{DbPool, StorageError};

/// Listing entry for a stored statement, without its bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredFile {
    pub name: String,
    pub size_bytes: i64,
    pub sign_policy: Option<SignPolicy>,
    pub uploaded_at: String,
}

/// Reduces an uploaded file name to a safe stem plus `.csv`.
///
/// Directory parts and the extension are dropped, anything outside
/// `[A-Za-z0-9_-]` becomes `_`, and an empty stem becomes `uploaded`.
pub fn sanitize_file_name(original: &str) -> String {
    format!("{}.csv", safe_stem(original))
}

fn safe_stem(original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(dot) => &base[..dot],
    };
    let safe: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if safe.is_empty() {
        "uploaded".to_string()
    } else {
        safe
    }
}

fn parse_policy(value: Option<String>) -> Result<Option<SignPolicy>, StorageError> {
    value
        .map(|v| {
            v.parse().map_err(|_| StorageError::Corrupt {
                table: "source_files",
                value: v,
            })
        })
        .transpose()
}

/// Stores a statement under a unique sanitised name and returns that name.
/// Collisions get `_1`, `_2`, … appended to the stem.
pub async fn insert_source_file(
    pool: &DbPool,
    original_name: &str,
    content: &[u8],
    sign_policy: Option<SignPolicy>,
) -> Result<String, StorageError> {
    let stem = safe_stem(original_name);
    let mut tx = pool.begin().await?;

    let mut name = format!("{stem}.csv");
    let mut counter = 1;
    loop {
        let taken = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM source_files WHERE name = ?")
            .bind(&name)
            .fetch_one(&mut *tx)
            .await?;
        if taken == 0 {
            break;
        }
        name = format!("{stem}_{counter}.csv");
        counter += 1;
    }

    sqlx::query("INSERT INTO source_files (name, content, sign_policy) VALUES (?, ?, ?)")
        .bind(&name)
        .bind(content)
        .bind(sign_policy.map(|p| p.as_str()))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(name)
}

/// Every stored statement with its bytes, in upload order.
pub async fn get_source_files(pool: &DbPool) -> Result<Vec<SourceFile>, StorageError> {
    let rows = sqlx::query_as::<_, (String, Vec<u8>, Option<String>)>(
        "SELECT name, content, sign_policy FROM source_files ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(name, content, policy)| {
            Ok(SourceFile {
                name,
                content,
                sign_policy: parse_policy(policy)?,
            })
        })
        .collect()
}

/// Stored statements sorted by name.
pub async fn list_source_files(pool: &DbPool) -> Result<Vec<StoredFile>, StorageError> {
    let rows = sqlx::query_as::<_, (String, i64, Option<String>, String)>(
        "SELECT name, length(content), sign_policy, uploaded_at FROM source_files ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(name, size_bytes, policy, uploaded_at)| {
            Ok(StoredFile {
                name,
                size_bytes,
                sign_policy: parse_policy(policy)?,
                uploaded_at,
            })
        })
        .collect()
}

pub async fn delete_source_file(pool: &DbPool, name: &str) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM source_files WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
