use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, VahtiError};
use crate::item::{TrackedItem, MAX_ITEMS_PER_OWNER};
use crate::taxonomy::Language;

/// Safely convert a millisecond Unix timestamp to DateTime<Utc>, falling back
/// to current time if invalid. Milliseconds because listing publish times
/// arrive with that precision and the watermark comparison is strict.
fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
}

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Database connection wrapper
pub struct Database {
    conn: Connection,
}

type ItemRow = (
    String,
    i64,
    String,
    String,
    String,
    String,
    i64,
    Option<i64>,
);

fn item_from_row(row: ItemRow) -> TrackedItem {
    let (id, owner_id, name, categories, locations, link, created_at, last_seen_at) = row;
    TrackedItem {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::new_v4()),
        owner_id,
        name,
        categories: serde_json::from_str(&categories).unwrap_or_default(),
        locations: serde_json::from_str(&locations).unwrap_or_default(),
        link,
        created_at: millis_to_datetime(created_at),
        last_seen_at: last_seen_at.map(millis_to_datetime),
    }
}

const ITEM_COLUMNS: &str =
    "id, owner_id, name, categories, locations, link, created_at, last_seen_at";

impl Database {
    /// Open or create the database
    pub fn open() -> Result<Self> {
        let db_path = Config::db_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(&db_path)?;
        embedded::migrations::runner().run(&mut conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (used by tests)
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        embedded::migrations::runner().run(&mut conn)?;
        Ok(Self { conn })
    }

    // ========== Tracked item operations ==========

    /// Insert a new tracked item. The conversation gate checks the per-owner
    /// cap before the flow starts; the store rejects over-cap inserts anyway.
    pub fn insert_item(&self, item: &TrackedItem) -> Result<()> {
        let count = self.count_items(item.owner_id)?;
        if count >= MAX_ITEMS_PER_OWNER {
            return Err(VahtiError::ItemLimitReached(
                item.owner_id,
                MAX_ITEMS_PER_OWNER,
            ));
        }

        self.conn.execute(
            "INSERT INTO tracked_items (id, owner_id, name, categories, locations, link, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                item.id.to_string(),
                item.owner_id,
                item.name,
                serde_json::to_string(&item.categories)?,
                serde_json::to_string(&item.locations)?,
                item.link,
                item.created_at.timestamp_millis(),
                item.last_seen_at.map(|t| t.timestamp_millis()),
            ],
        )?;
        Ok(())
    }

    /// Number of items an owner currently tracks
    pub fn count_items(&self, owner_id: i64) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tracked_items WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// All items for one owner, oldest first
    pub fn list_items_by_owner(&self, owner_id: i64) -> Result<Vec<TrackedItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM tracked_items WHERE owner_id = ?1 ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, Option<i64>>(7)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(item_from_row(row?));
        }
        Ok(result)
    }

    /// All tracked items across all owners (poll cycle input)
    pub fn list_items(&self) -> Result<Vec<TrackedItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM tracked_items ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, Option<i64>>(7)?,
            ))
        })?;

        let mut result = Vec::new();
        for row in rows {
            result.push(item_from_row(row?));
        }
        Ok(result)
    }

    /// Get one item by its id string
    pub fn get_item(&self, id: &str) -> Result<Option<TrackedItem>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM tracked_items WHERE id = ?1"),
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, Option<i64>>(7)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(item_from_row))
    }

    /// Delete one item; false if no such item existed
    pub fn delete_item(&self, id: &Uuid) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM tracked_items WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(n > 0)
    }

    /// Drop every item of one owner (recipient blocked the bot)
    pub fn delete_items_by_owner(&self, owner_id: i64) -> Result<usize> {
        let n = self.conn.execute(
            "DELETE FROM tracked_items WHERE owner_id = ?1",
            params![owner_id],
        )?;
        Ok(n)
    }

    /// Advance the poll watermark. Monotonic: an older timestamp than the one
    /// already stored is a no-op.
    pub fn update_watermark(&self, id: &Uuid, seen_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE tracked_items SET last_seen_at = ?2
             WHERE id = ?1 AND (last_seen_at IS NULL OR last_seen_at < ?2)",
            params![id.to_string(), seen_at.timestamp_millis()],
        )?;
        Ok(())
    }

    /// Raw connection handle for scripting storage failures in tests
    #[cfg(test)]
    pub(crate) fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    // ========== User preference operations ==========

    /// Preferred language of an owner, if they ever picked one
    pub fn get_language(&self, owner_id: i64) -> Result<Option<Language>> {
        let key = self
            .conn
            .query_row(
                "SELECT language FROM user_preferences WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(key.and_then(|k| Language::from_key(&k)))
    }

    pub fn set_language(&self, owner_id: i64, language: Language) -> Result<()> {
        self.conn.execute(
            "INSERT INTO user_preferences (owner_id, language) VALUES (?1, ?2)
             ON CONFLICT(owner_id) DO UPDATE SET language = ?2",
            params![owner_id, language.key()],
        )?;
        Ok(())
    }

    /// Forget the language choice ("change language" re-enters the picker)
    pub fn delete_language(&self, owner_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM user_preferences WHERE owner_id = ?1",
            params![owner_id],
        )?;
        Ok(())
    }
}
