use std::{ops::DerefMut, path::Path};

use anyhow::{Context, Result};
use jiff::civil::DateTime;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use serde::Serialize;

pub mod registry;
pub mod store;

/// A row of the gym table, as far as reconciliation cares.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GymIdentity {
    pub gym_id: i64,
    pub name: String,
}

/// The fields of a gym's single crowd record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occupancy {
    pub occupancy_count: u32,
    pub percentage_full: Option<f64>,
    pub updated_at: Option<DateTime>,
}

#[derive(Clone)]
pub struct Database {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
        let pool = r2d2::Pool::new(manager)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Self::from_pool(pool)
    }

    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        // every in-memory connection is a separate database
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .build(manager)
            .context("failed to open in-memory database")?;
        Self::from_pool(pool)
    }

    fn from_pool(pool: r2d2::Pool<SqliteConnectionManager>) -> Result<Self> {
        let db = Self { pool };
        db.create_tables()?;
        Ok(db)
    }

    pub fn get_conn(&self) -> Result<impl DerefMut<Target = Connection>> {
        self.pool.get().context("failed to get conn from pool")
    }
}
