use anyhow::{Context, Result};
use jiff::civil::DateTime;
use rusqlite::OptionalExtension;
use serde::Serialize;
use tracing::debug;

use super::{Database, GymIdentity, Occupancy};

/// Read side of the gym table.
pub trait GymRegistry {
    fn find_gym_by_name(&self, name: &str) -> Result<Option<GymIdentity>>;
    fn gyms(&self) -> Result<Vec<GymIdentity>>;
}

pub trait OccupancyStore {
    /// Creates or overwrites the one crowd record belonging to `gym`.
    fn upsert_occupancy(&self, gym: &GymIdentity, occupancy: &Occupancy) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GymStatus {
    pub gym: GymIdentity,
    pub occupancy: Option<Occupancy>,
}

impl Database {
    pub(super) fn create_tables(&self) -> Result<()> {
        self.get_conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS gym (
                    gym_id INTEGER NOT NULL PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    location TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    created_at TEXT NOT NULL
                ) STRICT;

                CREATE TABLE IF NOT EXISTS crowd_data (
                    crowd_id INTEGER NOT NULL PRIMARY KEY,
                    gym_id INTEGER NOT NULL UNIQUE,
                    occupancy INTEGER NOT NULL,
                    percentage_full REAL,
                    last_updated TEXT,

                    FOREIGN KEY (gym_id) REFERENCES gym(gym_id) ON DELETE CASCADE
                ) STRICT;
                ",
            )
            .context("failed to create tables")
    }

    /// Every gym with its current crowd record, if it has one.
    pub fn crowd_data(&self) -> Result<Vec<GymStatus>> {
        let conn = self.get_conn()?;
        let statuses = conn
            .prepare(
                "SELECT g.gym_id, g.name, c.crowd_id, c.occupancy, c.percentage_full, c.last_updated
                FROM gym g
                LEFT JOIN crowd_data c ON c.gym_id = g.gym_id
                ORDER BY g.gym_id",
            )
            .context("failed to prepare crowd data SQL statement")?
            .query_and_then((), |row| {
                let gym = GymIdentity {
                    gym_id: row.get("gym_id")?,
                    name: row.get("name")?,
                };
                let crowd_id: Option<i64> = row.get("crowd_id")?;
                let occupancy = match crowd_id {
                    Some(_) => {
                        let last_updated: Option<String> = row.get("last_updated")?;
                        Some(Occupancy {
                            occupancy_count: row.get("occupancy")?,
                            percentage_full: row.get("percentage_full")?,
                            updated_at: last_updated
                                .map(|s| s.parse::<DateTime>())
                                .transpose()?,
                        })
                    }
                    None => None,
                };
                Ok(GymStatus { gym, occupancy })
            })
            .context("failed to execute query")?
            .collect::<Result<Vec<_>>>()?;

        Ok(statuses)
    }
}

impl GymRegistry for Database {
    fn find_gym_by_name(&self, name: &str) -> Result<Option<GymIdentity>> {
        let conn = self.get_conn()?;
        conn.query_row(
            "SELECT gym_id, name FROM gym WHERE name = ?1",
            (name,),
            |row| {
                Ok(GymIdentity {
                    gym_id: row.get("gym_id")?,
                    name: row.get("name")?,
                })
            },
        )
        .optional()
        .with_context(|| format!("failed to look up gym {name:?}"))
    }

    fn gyms(&self) -> Result<Vec<GymIdentity>> {
        let conn = self.get_conn()?;
        let gyms = conn
            .prepare("SELECT gym_id, name FROM gym ORDER BY gym_id")?
            .query_and_then((), |row| {
                Ok(GymIdentity {
                    gym_id: row.get("gym_id")?,
                    name: row.get("name")?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(gyms)
    }
}

impl OccupancyStore for Database {
    fn upsert_occupancy(&self, gym: &GymIdentity, occupancy: &Occupancy) -> Result<()> {
        let conn = self.get_conn()?;
        // one statement, so overlapping runs can't both insert
        conn.execute(
            "INSERT INTO crowd_data (gym_id, occupancy, percentage_full, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (gym_id) DO UPDATE SET
                occupancy = excluded.occupancy,
                percentage_full = excluded.percentage_full,
                last_updated = excluded.last_updated",
            (
                gym.gym_id,
                occupancy.occupancy_count,
                occupancy.percentage_full,
                occupancy.updated_at.map(|t| t.to_string()),
            ),
        )
        .with_context(|| format!("failed to upsert crowd data for {}", gym.name))?;
        debug!(gym = %gym.name, "upserted crowd data");
        Ok(())
    }
}
