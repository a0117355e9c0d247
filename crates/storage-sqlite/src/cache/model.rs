//! Database model for persisted cache entries.

use diesel::prelude::*;

/// One serialized cache value.
#[derive(Queryable, Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::cache_entries)]
pub struct CacheEntryDB {
    pub cache_key: String,
    pub value_json: String,
    /// Unix milliseconds of the last write
    pub updated_at: i64,
}
