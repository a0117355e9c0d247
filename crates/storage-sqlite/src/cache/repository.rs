use std::sync::Arc;

use chrono::Utc;
use diesel::prelude::*;
use log::debug;
use macrodash_core::cache::CacheStore;
use macrodash_core::errors::Result;
use serde_json::Value;

use super::model::CacheEntryDB;
use crate::db::{self, get_connection, DbPool};
use crate::errors::{IntoCore, StorageError};
use crate::schema::cache_entries::dsl::*;

/// [`CacheStore`] persisted in the `cache_entries` table.
pub struct SqliteCacheStore {
    pool: Arc<DbPool>,
}

impl SqliteCacheStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        SqliteCacheStore { pool }
    }

    /// Prepares the database file, builds a pool and applies migrations.
    pub fn open(db_path: &str) -> Result<Self> {
        db::init(db_path)?;
        let pool = db::create_pool(db_path)?;
        db::run_migrations(&pool)?;
        debug!("Opened cache database at {}", db_path);
        Ok(Self::new(pool))
    }

    pub fn len(&self) -> Result<usize> {
        let mut conn = get_connection(&self.pool)?;
        let count: i64 = cache_entries.count().get_result(&mut conn).into_core()?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Escapes LIKE wildcards so the prefix matches literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl CacheStore for SqliteCacheStore {
    fn read(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = get_connection(&self.pool)?;
        let raw: Option<String> = cache_entries
            .filter(cache_key.eq(key))
            .select(value_json)
            .first::<String>(&mut conn)
            .optional()
            .into_core()?;

        match raw {
            Some(raw) => Ok(Some(
                serde_json::from_str(&raw).map_err(StorageError::from)?,
            )),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &Value) -> Result<()> {
        let entry = CacheEntryDB {
            cache_key: key.to_string(),
            value_json: serde_json::to_string(value).map_err(StorageError::from)?,
            updated_at: Utc::now().timestamp_millis(),
        };
        let mut conn = get_connection(&self.pool)?;
        diesel::replace_into(cache_entries)
            .values(&entry)
            .execute(&mut conn)
            .into_core()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        diesel::delete(cache_entries.filter(cache_key.eq(key)))
            .execute(&mut conn)
            .into_core()?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        let keys: Vec<String> = cache_entries
            .select(cache_key)
            .filter(cache_key.like(like_prefix(prefix)).escape('\\'))
            .order(cache_key.asc())
            .load::<String>(&mut conn)
            .into_core()?;

        // SQLite LIKE ignores ASCII case
        Ok(keys.into_iter().filter(|k| k.starts_with(prefix)).collect())
    }
}
