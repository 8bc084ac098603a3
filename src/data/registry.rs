use anyhow::{Context, Result};
use jiff::Timestamp;
use rusqlite::OptionalExtension;
use serde::Serialize;
use tracing::{debug, info};

use super::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GymSeed {
    pub name: &'static str,
    pub location: &'static str,
    pub kind: &'static str,
}

/// Facilities reported on the Connect2Concepts page, named exactly as the page names them.
pub const DEFAULT_GYMS: &[GymSeed] = &[
    GymSeed {
        name: "Helen Newman Fitness Center",
        location: "163 Cradit Farm Dr, Ithaca, NY 14850",
        kind: "Fitness",
    },
    GymSeed {
        name: "Noyes Fitness Center",
        location: "306 West Ave, Ithaca, NY 14850",
        kind: "Fitness",
    },
    GymSeed {
        name: "Teagle Down Fitness Center",
        location: "512 Campus Rd, Ithaca, NY 14853",
        kind: "Fitness",
    },
    GymSeed {
        name: "Teagle Up Fitness Center",
        location: "512 Campus Rd, Ithaca, NY 14853",
        kind: "Fitness",
    },
    GymSeed {
        name: "Toni Morrison Fitness Center",
        location: "18 Sisson Pl, Ithaca, NY 14850",
        kind: "Fitness",
    },
    GymSeed {
        name: "HNH Court 1 Basketball",
        location: "163 Cradit Farm Dr, Ithaca, NY 14850",
        kind: "Fitness",
    },
    GymSeed {
        name: "HNH Court 2 Volleyball/Badminton",
        location: "163 Cradit Farm Dr, Ithaca, NY 14850",
        kind: "Fitness",
    },
    GymSeed {
        name: "Noyes Court Basketball",
        location: "306 West Ave, Ithaca, NY 14850",
        kind: "Fitness",
    },
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub inserted: usize,
    pub updated: usize,
}

impl Database {
    /// Inserts missing gyms and refreshes location/kind of existing ones, matched by name.
    /// Existing crowd data is left alone.
    pub fn seed_gyms(&self, gyms: &[GymSeed]) -> Result<SeedReport> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .context("failed to open seed transaction")?;
        let now = Timestamp::now().to_string();
        let mut report = SeedReport::default();

        for gym in gyms {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT gym_id FROM gym WHERE name = ?1",
                    (gym.name,),
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(gym_id) => {
                    tx.execute(
                        "UPDATE gym SET location = ?1, kind = ?2 WHERE gym_id = ?3",
                        (gym.location, gym.kind, gym_id),
                    )
                    .with_context(|| format!("failed to update gym {}", gym.name))?;
                    report.updated += 1;
                }
                None => {
                    tx.execute(
                        "INSERT INTO gym (name, location, kind, created_at) VALUES (?1, ?2, ?3, ?4)",
                        (gym.name, gym.location, gym.kind, &now),
                    )
                    .with_context(|| format!("failed to insert gym {}", gym.name))?;
                    debug!(name = gym.name, "inserted gym");
                    report.inserted += 1;
                }
            }
        }

        tx.commit().context("failed to commit seed transaction")?;
        info!(
            inserted = report.inserted,
            updated = report.updated,
            "seeded gym registry"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::GymRegistry;

    #[test]
    fn seeding_twice_updates_instead_of_duplicating() {
        let db = Database::open_in_memory().unwrap();

        let first = db.seed_gyms(DEFAULT_GYMS).unwrap();
        assert_eq!(
            first,
            SeedReport {
                inserted: 8,
                updated: 0
            }
        );

        let second = db.seed_gyms(DEFAULT_GYMS).unwrap();
        assert_eq!(
            second,
            SeedReport {
                inserted: 0,
                updated: 8
            }
        );
        assert_eq!(db.gyms().unwrap().len(), 8);
    }

    #[test]
    fn reseeding_refreshes_location() {
        let db = Database::open_in_memory().unwrap();
        let mut gym = DEFAULT_GYMS[0];
        db.seed_gyms(&[gym]).unwrap();

        gym.location = "Somewhere else";
        db.seed_gyms(&[gym]).unwrap();

        let location: String = db
            .get_conn()
            .unwrap()
            .query_row("SELECT location FROM gym WHERE name = ?1", (gym.name,), |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(location, "Somewhere else");
    }
}
