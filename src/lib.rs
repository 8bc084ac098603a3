pub mod common;
pub mod data;
pub mod reconcile;
pub mod scraper;

#[cfg(test)]
mod testing;
