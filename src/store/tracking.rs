//! Tracking table: which articles are monitored and at what tier.

use crate::error::{Error, Result};
use crate::models::Tier;
use sqlx::SqliteConnection;
use std::collections::BTreeSet;

/// Current tier of `url`, or `None` when it is not tracked.
pub async fn get(conn: &mut SqliteConnection, url: &str) -> Result<Option<Tier>> {
    let tier: Option<i64> = sqlx::query_scalar("SELECT tier FROM tracking WHERE url = ?")
        .bind(url)
        .fetch_optional(&mut *conn)
        .await?;
    tier.map(Tier::try_from).transpose()
}

/// Start tracking `url`. Fails with [`Error::AlreadyTracked`] if it is present.
pub async fn insert(conn: &mut SqliteConnection, url: &str, tier: Tier) -> Result<()> {
    let result = sqlx::query("INSERT INTO tracking (url, tier) VALUES (?, ?)")
        .bind(url)
        .bind(i64::from(tier))
        .execute(&mut *conn)
        .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(Error::AlreadyTracked(url.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn set_tier(conn: &mut SqliteConnection, url: &str, tier: Tier) -> Result<()> {
    let updated = sqlx::query("UPDATE tracking SET tier = ? WHERE url = ?")
        .bind(i64::from(tier))
        .bind(url)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if updated == 0 {
        return Err(Error::NotTracked(url.to_string()));
    }
    Ok(())
}

pub async fn list_by_tier(conn: &mut SqliteConnection, tier: Tier) -> Result<BTreeSet<String>> {
    let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM tracking WHERE tier = ?")
        .bind(i64::from(tier))
        .fetch_all(&mut *conn)
        .await?;
    Ok(urls.into_iter().collect())
}

pub async fn list_all(conn: &mut SqliteConnection) -> Result<BTreeSet<String>> {
    let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM tracking")
        .fetch_all(&mut *conn)
        .await?;
    Ok(urls.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();

        assert_eq!(get(&mut conn, "https://a").await.unwrap(), None);
        insert(&mut conn, "https://a", Tier::FRESH).await.unwrap();
        assert_eq!(get(&mut conn, "https://a").await.unwrap(), Some(Tier::FRESH));
    }

    #[tokio::test]
    async fn test_insert_twice_fails() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();

        insert(&mut conn, "https://a", Tier::FRESH).await.unwrap();
        let err = insert(&mut conn, "https://a", Tier::FRESH).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyTracked(url) if url == "https://a"));
    }

    #[tokio::test]
    async fn test_set_tier_unknown_url() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();

        let err = set_tier(&mut conn, "https://nope", Tier::FROZEN).await.unwrap_err();
        assert!(matches!(err, Error::NotTracked(_)));
    }

    #[tokio::test]
    async fn test_list_by_tier() {
        let store = Store::open_in_memory().await.unwrap();
        let mut conn = store.acquire().await.unwrap();
        let tier2 = Tier::new(2).unwrap();

        insert(&mut conn, "https://a", Tier::FRESH).await.unwrap();
        insert(&mut conn, "https://b", Tier::FRESH).await.unwrap();
        insert(&mut conn, "https://c", Tier::FRESH).await.unwrap();
        set_tier(&mut conn, "https://b", tier2).await.unwrap();

        let fresh = list_by_tier(&mut conn, Tier::FRESH).await.unwrap();
        assert_eq!(fresh.into_iter().collect::<Vec<_>>(), vec!["https://a", "https://c"]);
        let second = list_by_tier(&mut conn, tier2).await.unwrap();
        assert!(second.contains("https://b"));
        assert_eq!(list_all(&mut conn).await.unwrap().len(), 3);
    }
}
