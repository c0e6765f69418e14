use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use thiserror::Error;

use tally_core::{Category, MerchantRules, OneOffOverrides, RuleBook, TransactionId};

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Stored value in {table} is not valid: '{value}'")]
    Corrupt { table: &'static str, value: String },
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA cache_size = -32000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS merchant_rules (
            merchant TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS one_off_overrides (
            txn_id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            content BLOB NOT NULL,
            sign_policy TEXT,
            uploaded_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

fn parse_category(table: &'static str, value: String) -> Result<Category, StorageError> {
    value
        .parse()
        .map_err(|_| StorageError::Corrupt { table, value })
}

// ── merchant rules ──

pub async fn get_merchant_rules(pool: &DbPool) -> Result<MerchantRules, StorageError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT merchant, category FROM merchant_rules ORDER BY merchant",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(merchant, category)| Ok((merchant, parse_category("merchant_rules", category)?)))
        .collect()
}

pub async fn save_merchant_rule(
    pool: &DbPool,
    merchant: &str,
    category: Category,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO merchant_rules (merchant, category) VALUES (?, ?)
         ON CONFLICT(merchant) DO UPDATE SET category = excluded.category, updated_at = datetime('now')",
    )
    .bind(merchant)
    .bind(category.label())
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns whether a rule existed.
pub async fn delete_merchant_rule(pool: &DbPool, merchant: &str) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM merchant_rules WHERE merchant = ?")
        .bind(merchant)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// ── one-off overrides ──

pub async fn get_one_off_overrides(pool: &DbPool) -> Result<OneOffOverrides, StorageError> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT txn_id, category FROM one_off_overrides ORDER BY txn_id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(id, category)| {
            Ok((TransactionId::from(id), parse_category("one_off_overrides", category)?))
        })
        .collect()
}

pub async fn save_one_off_override(
    pool: &DbPool,
    id: &TransactionId,
    category: Category,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO one_off_overrides (txn_id, category) VALUES (?, ?)
         ON CONFLICT(txn_id) DO UPDATE SET category = excluded.category, updated_at = datetime('now')",
    )
    .bind(id.as_str())
    .bind(category.label())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_one_off_override(pool: &DbPool, id: &TransactionId) -> Result<bool, StorageError> {
    let result = sqlx::query("DELETE FROM one_off_overrides WHERE txn_id = ?")
        .bind(id.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_rule_book(pool: &DbPool) -> Result<RuleBook, StorageError> {
    Ok(RuleBook {
        one_off: get_one_off_overrides(pool).await?,
        merchants: get_merchant_rules(pool).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> (tempfile::TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("test.db")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn create_db_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = create_db(&path).await.unwrap();
        save_merchant_rule(&pool, "ALDI", Category::Groceries).await.unwrap();
        pool.close().await;

        let pool = create_db(&path).await.unwrap();
        let rules = get_merchant_rules(&pool).await.unwrap();
        assert_eq!(rules.get("ALDI"), Some(Category::Groceries));
    }

    // ── merchant rules ──

    #[tokio::test]
    async fn merchant_rule_upsert_replaces() {
        let (_dir, pool) = test_db().await;
        save_merchant_rule(&pool, "NETFLIX.COM", Category::Entertainment).await.unwrap();
        save_merchant_rule(&pool, "NETFLIX.COM", Category::Subscriptions).await.unwrap();

        let rules = get_merchant_rules(&pool).await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.get("NETFLIX.COM"), Some(Category::Subscriptions));
    }

    #[tokio::test]
    async fn merchant_rule_delete_reports_presence() {
        let (_dir, pool) = test_db().await;
        save_merchant_rule(&pool, "ALDI", Category::Groceries).await.unwrap();
        assert!(delete_merchant_rule(&pool, "ALDI").await.unwrap());
        assert!(!delete_merchant_rule(&pool, "ALDI").await.unwrap());
        assert!(get_merchant_rules(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn exclude_round_trips() {
        let (_dir, pool) = test_db().await;
        save_merchant_rule(&pool, "ZELLE", Category::Exclude).await.unwrap();
        let rules = get_merchant_rules(&pool).await.unwrap();
        assert_eq!(rules.get("ZELLE"), Some(Category::Exclude));
    }

    #[tokio::test]
    async fn corrupt_category_is_an_error() {
        let (_dir, pool) = test_db().await;
        sqlx::query("INSERT INTO merchant_rules (merchant, category) VALUES ('X', 'Yachts')")
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            get_merchant_rules(&pool).await,
            Err(StorageError::Corrupt { table: "merchant_rules", .. })
        ));
    }

    // ── one-off overrides ──

    #[tokio::test]
    async fn overrides_round_trip() {
        let (_dir, pool) = test_db().await;
        let id = TransactionId::from("0123456789abcdef");
        save_one_off_override(&pool, &id, Category::Travel).await.unwrap();
        save_one_off_override(&pool, &id, Category::Health).await.unwrap();

        let book = get_rule_book(&pool).await.unwrap();
        assert_eq!(book.one_off.get(&id), Some(Category::Health));
        assert!(book.merchants.is_empty());

        assert!(delete_one_off_override(&pool, &id).await.unwrap());
        assert!(get_one_off_overrides(&pool).await.unwrap().is_empty());
    }
}
