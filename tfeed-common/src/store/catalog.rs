//! SQLite-backed collaborator indexes
//!
//! Subscriptions, genres, the genre catalog and the song/album/artist
//! records live in the same database as the ledger. Content CRUD belongs to
//! other services; the `put_*`/`delete_*` methods here keep the indexes
//! consistent for seeding and tests.

use super::{CatalogIndex, CatalogPage, ContentLookup, GenreDirectory, SubscriptionIndex};
use crate::db::models::{Album, Artist, CatalogItem, EntryType, Genre, Song, Subscription};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

fn json_list(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| Error::Internal(format!("Corrupt id list '{}': {}", raw, e)))
}

fn to_json_list(ids: &[String]) -> String {
    serde_json::Value::from(ids.to_vec()).to_string()
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn put_genre(&self, genre: &Genre) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO genres (id, name) VALUES (?, ?)")
            .bind(&genre.id)
            .bind(&genre.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn put_subscription(&self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO subscriptions (user_id, target_id, target_type) VALUES (?, ?, ?)",
        )
        .bind(&subscription.user_id)
        .bind(&subscription.target_id)
        .bind(&subscription.target_type)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_subscription(&self, user_id: &str, target_id: &str) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM subscriptions WHERE user_id = ? AND target_id = ?")
            .bind(user_id)
            .bind(target_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// Store a song and list it under each of its genres
    pub async fn put_song(&self, song: &Song) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO songs
                (id, title, artist_ids, genre_ids, album_id, s3_key_cover, s3_key_audio, creation_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&song.id)
        .bind(&song.title)
        .bind(to_json_list(&song.artist_ids))
        .bind(to_json_list(&song.genre_ids))
        .bind(&song.album_id)
        .bind(&song.s3_key_cover)
        .bind(&song.s3_key_audio)
        .bind(&song.creation_date)
        .execute(&mut *tx)
        .await?;

        for genre_id in &song.genre_ids {
            insert_catalog_row(&mut tx, genre_id, EntryType::Song, &song.id, Some(song.title.as_str()), None)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Store an album and list it under each of its genres
    pub async fn put_album(&self, album: &Album) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT OR REPLACE INTO albums (id, title, release_date, artist_ids, genre_ids) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&album.id)
        .bind(&album.title)
        .bind(&album.release_date)
        .bind(to_json_list(&album.artist_ids))
        .bind(to_json_list(&album.genre_ids))
        .execute(&mut *tx)
        .await?;

        for genre_id in &album.genre_ids {
            insert_catalog_row(&mut tx, genre_id, EntryType::Album, &album.id, Some(album.title.as_str()), None)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Store an artist and list it under each of its genres
    pub async fn put_artist(&self, artist: &Artist) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR REPLACE INTO artists (id, name, biography, genre_ids) VALUES (?, ?, ?, ?)")
            .bind(&artist.id)
            .bind(&artist.name)
            .bind(&artist.biography)
            .bind(to_json_list(&artist.genre_ids))
            .execute(&mut *tx)
            .await?;

        for genre_id in &artist.genre_ids {
            insert_catalog_row(&mut tx, genre_id, EntryType::Artist, &artist.id, None, Some(artist.name.as_str()))
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Remove a song record; catalog rows for it are removed too
    pub async fn delete_song(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM genre_catalog WHERE entity_key = ?")
            .bind(CatalogItem::entity_key_for(EntryType::Song, id))
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted > 0)
    }
}

/// Catalog rows are keyed by genre *name*; ids without a known genre are skipped
async fn insert_catalog_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    genre_id: &str,
    entity_type: EntryType,
    entity_id: &str,
    title: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let genre_name: Option<String> = sqlx::query_scalar("SELECT name FROM genres WHERE id = ?")
        .bind(genre_id)
        .fetch_optional(&mut **tx)
        .await?;
    let Some(genre_name) = genre_name else {
        return Ok(());
    };

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO genre_catalog
            (genre_name, entity_key, entity_type, entity_id, title, name)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&genre_name)
    .bind(CatalogItem::entity_key_for(entity_type, entity_id))
    .bind(entity_type.as_str())
    .bind(entity_id)
    .bind(title)
    .bind(name)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl SubscriptionIndex for SqliteCatalog {
    async fn subscribers(&self, target_id: &str) -> Result<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            "SELECT user_id, target_id, target_type FROM subscriptions WHERE target_id = ? ORDER BY user_id",
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }
}

#[async_trait]
impl CatalogIndex for SqliteCatalog {
    async fn entities_by_genre(
        &self,
        genre_name: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<CatalogPage> {
        // Fetch one extra row to learn whether another page exists
        let rows = sqlx::query(
            r#"
            SELECT genre_name, entity_key, entity_type, entity_id, title, name
            FROM genre_catalog
            WHERE genre_name = ? AND entity_key > ?
            ORDER BY entity_key
            LIMIT ?
            "#,
        )
        .bind(genre_name)
        .bind(after.unwrap_or(""))
        .bind(limit as i64 + 1)
        .fetch_all(&self.pool)
        .await?;

        let mut items = rows
            .iter()
            .map(|row| -> Result<CatalogItem> {
                Ok(CatalogItem {
                    genre_name: row.get("genre_name"),
                    entity_key: row.get("entity_key"),
                    entity_type: row.get::<String, _>("entity_type").parse()?,
                    entity_id: row.get("entity_id"),
                    title: row.get("title"),
                    name: row.get("name"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let next = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|item| item.entity_key.clone())
        } else {
            None
        };

        Ok(CatalogPage { items, next })
    }
}

#[async_trait]
impl GenreDirectory for SqliteCatalog {
    async fn genre_name(&self, genre_id: &str) -> Result<Option<String>> {
        let name = sqlx::query_scalar("SELECT name FROM genres WHERE id = ?")
            .bind(genre_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }
}

#[async_trait]
impl ContentLookup for SqliteCatalog {
    async fn song(&self, id: &str) -> Result<Option<Song>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, artist_ids, genre_ids, album_id, s3_key_cover, s3_key_audio, creation_date
            FROM songs WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Song> {
            Ok(Song {
                id: row.get("id"),
                title: row.get("title"),
                artist_ids: json_list(&row.get::<String, _>("artist_ids"))?,
                genre_ids: json_list(&row.get::<String, _>("genre_ids"))?,
                album_id: row.get("album_id"),
                s3_key_cover: row.get("s3_key_cover"),
                s3_key_audio: row.get("s3_key_audio"),
                creation_date: row.get("creation_date"),
            })
        })
        .transpose()
    }

    async fn album(&self, id: &str) -> Result<Option<Album>> {
        let row = sqlx::query(
            "SELECT id, title, release_date, artist_ids, genre_ids FROM albums WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Album> {
            Ok(Album {
                id: row.get("id"),
                title: row.get("title"),
                release_date: row.get("release_date"),
                artist_ids: json_list(&row.get::<String, _>("artist_ids"))?,
                genre_ids: json_list(&row.get::<String, _>("genre_ids"))?,
            })
        })
        .transpose()
    }

    async fn artist(&self, id: &str) -> Result<Option<Artist>> {
        let row = sqlx::query("SELECT id, name, biography, genre_ids FROM artists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Artist> {
            Ok(Artist {
                id: row.get("id"),
                name: row.get("name"),
                biography: row.get("biography"),
                genre_ids: json_list(&row.get::<String, _>("genre_ids"))?,
            })
        })
        .transpose()
    }
}
