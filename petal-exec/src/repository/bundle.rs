//! Bundle Repository
//!
//! Content-addressed storage of submitted application bundles.

use sqlx::SqlitePool;

/// Store a bundle unless one with the same hash already exists
///
/// Returns `true` when the bundle was newly stored.
pub async fn insert_if_absent(
    pool: &SqlitePool,
    hash: &str,
    content: &[u8],
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO bundles (hash, content, size, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(hash)
    .bind(content)
    .bind(content.len() as i64)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Fetch the content of a bundle by hash
pub async fn find_content(pool: &SqlitePool, hash: &str) -> Result<Option<Vec<u8>>, sqlx::Error> {
    let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT content FROM bundles WHERE hash = ?")
        .bind(hash)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.0))
}
