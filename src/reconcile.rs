use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::{data::store::OccupancyStore, scraper::ExtractedOccupancy};

pub mod resolve;

use resolve::GymResolver;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    Updated {
        name: String,
        gym_id: i64,
        /// An earlier entry in the same run already wrote this gym.
        superseded: bool,
    },
    Unmatched {
        name: String,
    },
    /// `gym_id` is `None` when the registry lookup itself failed.
    UpdateFailed {
        name: String,
        gym_id: Option<i64>,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub matched: usize,
    pub unmatched: usize,
    pub updated: usize,
    pub update_errors: usize,
    pub outcomes: Vec<EntryOutcome>,
}

impl ReconcileReport {
    fn record(&mut self, outcome: EntryOutcome) {
        match &outcome {
            EntryOutcome::Updated { .. } => {
                self.matched += 1;
                self.updated += 1;
            }
            EntryOutcome::Unmatched { .. } => self.unmatched += 1,
            EntryOutcome::UpdateFailed { gym_id, .. } => {
                if gym_id.is_some() {
                    self.matched += 1;
                }
                self.update_errors += 1;
            }
        }
        self.outcomes.push(outcome);
    }

    pub fn log(&self) {
        for outcome in &self.outcomes {
            match outcome {
                EntryOutcome::Updated {
                    name,
                    superseded: false,
                    ..
                } => debug!(%name, "updated crowd data"),
                EntryOutcome::Updated {
                    name,
                    superseded: true,
                    ..
                } => warn!(%name, "gym listed more than once, later entry wins"),
                EntryOutcome::Unmatched { name } => {
                    warn!(%name, "no matching gym found, skipping entry")
                }
                EntryOutcome::UpdateFailed { name, error, .. } => {
                    error!(%name, %error, "failed to update crowd data")
                }
            }
        }
    }
}

/// Writes every entry whose name resolves to a gym. Entries are applied in order and
/// independently: a failed lookup or write only affects its own entry, and when a gym appears
/// twice the later entry is the one left in the store.
pub fn reconcile<R, S>(entries: &[ExtractedOccupancy], resolver: &R, store: &S) -> ReconcileReport
where
    R: GymResolver + ?Sized,
    S: OccupancyStore + ?Sized,
{
    let mut report = ReconcileReport::default();
    let mut written = HashSet::new();

    for entry in entries {
        let name = entry.name.clone();
        let gym = match resolver.resolve(&entry.name) {
            Ok(Some(gym)) => gym,
            Ok(None) => {
                report.record(EntryOutcome::Unmatched { name });
                continue;
            }
            Err(e) => {
                report.record(EntryOutcome::UpdateFailed {
                    name,
                    gym_id: None,
                    error: format!("{e:#}"),
                });
                continue;
            }
        };

        let outcome = match store.upsert_occupancy(&gym, &entry.occupancy()) {
            Ok(()) => EntryOutcome::Updated {
                name,
                gym_id: gym.gym_id,
                superseded: !written.insert(gym.gym_id),
            },
            Err(e) => EntryOutcome::UpdateFailed {
                name,
                gym_id: Some(gym.gym_id),
                error: format!("{e:#}"),
            },
        };
        report.record(outcome);
    }

    report
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::HashMap};

    use anyhow::{bail, Result};
    use jiff::civil::date;

    use super::*;
    use crate::data::{
        registry::DEFAULT_GYMS,
        store::GymRegistry,
        Database, GymIdentity, Occupancy,
    };
    use resolve::ExactResolver;

    fn entry(name: &str, count: u32) -> ExtractedOccupancy {
        ExtractedOccupancy {
            name: name.to_string(),
            occupancy_count: count,
            percentage_full: Some(f64::from(count)),
            updated_at: Some(date(2024, 10, 17).at(20, 53, 0, 0)),
        }
    }

    /// Records writes in memory, failing for the gyms named in `broken`.
    #[derive(Default)]
    struct Recording {
        broken: Vec<&'static str>,
        writes: RefCell<HashMap<i64, Occupancy>>,
        attempts: RefCell<usize>,
    }

    impl OccupancyStore for Recording {
        fn upsert_occupancy(&self, gym: &GymIdentity, occupancy: &Occupancy) -> Result<()> {
            *self.attempts.borrow_mut() += 1;
            if self.broken.iter().any(|broken| *broken == gym.name) {
                bail!("disk I/O error");
            }
            self.writes
                .borrow_mut()
                .insert(gym.gym_id, occupancy.clone());
            Ok(())
        }
    }

    struct Unreachable;

    impl GymResolver for Unreachable {
        fn resolve(&self, _name: &str) -> Result<Option<GymIdentity>> {
            bail!("database is locked")
        }
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.seed_gyms(DEFAULT_GYMS).unwrap();
        db
    }

    #[test]
    fn reconciling_twice_is_idempotent() {
        let db = seeded();
        let entries = vec![
            entry("Helen Newman Fitness Center", 31),
            entry("Noyes Fitness Center", 12),
        ];

        let resolver = ExactResolver::new(&db);
        let first = reconcile(&entries, &resolver, &db);
        let second = reconcile(&entries, &resolver, &db);

        assert_eq!(first, second);
        assert_eq!(first.matched, 2);
        assert_eq!(first.updated, 2);

        let with_data: Vec<_> = db
            .crowd_data()
            .unwrap()
            .into_iter()
            .filter_map(|s| s.occupancy.map(|o| (s.gym.name, o.occupancy_count)))
            .collect();
        assert_eq!(
            with_data,
            vec![
                ("Helen Newman Fitness Center".to_string(), 31),
                ("Noyes Fitness Center".to_string(), 12),
            ]
        );
        let rows: i64 = db
            .get_conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM crowd_data", (), |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 2);
    }

    #[test]
    fn unmatched_names_write_nothing() {
        let db = seeded();
        let store = Recording::default();
        let entries = vec![
            entry("Appel Climbing Wall", 4),
            entry("Teagle Up Fitness Center", 9),
        ];

        let report = reconcile(&entries, &ExactResolver::new(&db), &store);

        assert_eq!(report.unmatched, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(*store.attempts.borrow(), 1);
        assert_eq!(
            report.outcomes[0],
            EntryOutcome::Unmatched {
                name: "Appel Climbing Wall".to_string()
            }
        );
    }

    #[test]
    fn failed_write_does_not_block_the_rest() {
        let db = seeded();
        let store = Recording {
            broken: vec!["Noyes Fitness Center"],
            ..Default::default()
        };
        let entries = vec![
            entry("Noyes Fitness Center", 1),
            entry("Toni Morrison Fitness Center", 2),
        ];

        let report = reconcile(&entries, &ExactResolver::new(&db), &store);

        assert_eq!(report.matched, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(report.update_errors, 1);
        assert!(matches!(
            &report.outcomes[0],
            EntryOutcome::UpdateFailed { gym_id: Some(_), error, .. } if error.contains("disk I/O")
        ));
        let toni = db
            .find_gym_by_name("Toni Morrison Fitness Center")
            .unwrap()
            .unwrap();
        assert_eq!(store.writes.borrow()[&toni.gym_id].occupancy_count, 2);
    }

    #[test]
    fn failed_lookup_counts_as_update_error() {
        let store = Recording::default();
        let report = reconcile(&[entry("Noyes Fitness Center", 1)], &Unreachable, &store);

        assert_eq!(report.matched, 0);
        assert_eq!(report.update_errors, 1);
        assert_eq!(*store.attempts.borrow(), 0);
    }

    #[test]
    fn later_duplicate_wins() {
        let db = seeded();
        let entries = vec![
            entry("Noyes Court Basketball", 3),
            entry("Noyes Court Basketball", 8),
        ];

        let report = reconcile(&entries, &ExactResolver::new(&db), &db);

        assert_eq!(report.updated, 2);
        assert!(matches!(
            report.outcomes[1],
            EntryOutcome::Updated { superseded: true, .. }
        ));
        let court = db
            .crowd_data()
            .unwrap()
            .into_iter()
            .find(|s| s.gym.name == "Noyes Court Basketball")
            .unwrap();
        assert_eq!(court.occupancy.unwrap().occupancy_count, 8);
    }
}
