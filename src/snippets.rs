use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};

/// A stored snippet. Timestamps are Unix seconds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Snippet {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Parse a snippet id taken from the URL.
///
/// Only canonical positive decimal integers are accepted (`^[1-9][0-9]*$`
/// within `i64`); signs, decimals, leading zeros and empty input all fail.
pub fn parse_snippet_id(raw: &str) -> Option<i64> {
    let mut bytes = raw.bytes();
    match bytes.next() {
        Some(b'1'..=b'9') => {}
        _ => return None,
    }
    if !bytes.all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<i64>().ok()
}

/// Insert a snippet expiring `expires_in_days` from now and return its id.
pub async fn insert_snippet(
    pool: &SqlitePool,
    title: &str,
    content: &str,
    expires_in_days: i64,
) -> Result<i64, sqlx::Error> {
    let created_at = OffsetDateTime::now_utc();
    let expires_at = created_at
        .checked_add(Duration::days(expires_in_days))
        .unwrap_or(created_at);

    let result = sqlx::query(
        r#"
        INSERT INTO snippets (title, content, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(title)
    .bind(content)
    .bind(created_at.unix_timestamp())
    .bind(expires_at.unix_timestamp())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Fetch an unexpired snippet by id.
pub async fn get_snippet(pool: &SqlitePool, id: i64) -> Result<Option<Snippet>, sqlx::Error> {
    let now = OffsetDateTime::now_utc().unix_timestamp();

    sqlx::query_as::<_, Snippet>(
        r#"
        SELECT id, title, content, created_at, expires_at
        FROM snippets
        WHERE id = ? AND expires_at > ?
        "#,
    )
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// The most recently created unexpired snippets, newest first.
pub async fn latest_snippets(pool: &SqlitePool, limit: i64) -> Result<Vec<Snippet>, sqlx::Error> {
    let now = OffsetDateTime::now_utc().unix_timestamp();

    sqlx::query_as::<_, Snippet>(
        r#"
        SELECT id, title, content, created_at, expires_at
        FROM snippets
        WHERE expires_at > ?
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Remove up to `limit` expired snippets. Returns the number deleted.
pub async fn delete_expired_snippets(
    pool: &SqlitePool,
    now: i64,
    limit: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM snippets
        WHERE id IN (
            SELECT id FROM snippets WHERE expires_at <= ? LIMIT ?
        )
        "#,
    )
    .bind(now)
    .bind(limit)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::parse_snippet_id;

    #[test]
    fn accepts_positive_integers() {
        assert_eq!(parse_snippet_id("1"), Some(1));
        assert_eq!(parse_snippet_id("42"), Some(42));
        assert_eq!(
            parse_snippet_id("9223372036854775807"),
            Some(i64::MAX)
        );
    }

    #[test]
    fn rejects_everything_else() {
        for raw in [
            "", "0", "-1", "+1", "1.23", "foo", "01", " 1", "1 ", "1e3",
            "9223372036854775808", "١",
        ] {
            assert_eq!(parse_snippet_id(raw), None, "{raw:?} should be rejected");
        }
    }
}
