use jiff::civil::DateTime;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    data::{store::OccupancyStore, Occupancy},
    reconcile::{reconcile, resolve::GymResolver, ReconcileReport},
};

pub mod extract;
pub mod fetch;

use extract::SkippedFragment;
use fetch::{FetchError, Fetcher};

/// One facility as read off the occupancy page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedOccupancy {
    pub name: String,
    pub occupancy_count: u32,
    pub percentage_full: Option<f64>,
    pub updated_at: Option<DateTime>,
}

impl ExtractedOccupancy {
    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            occupancy_count: self.occupancy_count,
            percentage_full: self.percentage_full,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub status: u16,
    pub fragments: usize,
    pub extracted: usize,
    pub skipped: Vec<SkippedFragment>,
    pub reconcile: ReconcileReport,
}

impl RunReport {
    pub fn log(&self) {
        for skipped in &self.skipped {
            warn!(index = skipped.index, error = %skipped.error, "skipped facility");
        }
        self.reconcile.log();
        info!(
            fragments = self.fragments,
            extracted = self.extracted,
            skipped = self.skipped.len(),
            matched = self.reconcile.matched,
            unmatched = self.reconcile.unmatched,
            updated = self.reconcile.updated,
            update_errors = self.reconcile.update_errors,
            "scrape finished"
        );
    }
}

/// Fetches the occupancy page, extracts every facility and reconciles them into `store`.
///
/// Only a failed fetch is an error; bad widgets, unknown names and failed writes are counted
/// in the report.
#[instrument(level = "info", skip_all)]
pub async fn scrape<R, S>(fetcher: &Fetcher, resolver: &R, store: &S) -> Result<RunReport, FetchError>
where
    R: GymResolver + ?Sized,
    S: OccupancyStore + ?Sized,
{
    let page = fetcher.fetch().await?;
    let extraction = extract::extract(&page.body);
    let reconcile = reconcile(&extraction.entries, resolver, store);

    Ok(RunReport {
        status: page.status.as_u16(),
        fragments: extraction.fragments,
        extracted: extraction.entries.len(),
        skipped: extraction.skipped,
        reconcile,
    })
}
