use std::collections::{hash_map::Entry, HashMap};

use anyhow::Result;
use clap::ValueEnum;
use tracing::warn;

use crate::data::{store::GymRegistry, GymIdentity};

/// Maps a scraped facility name onto a registered gym.
pub trait GymResolver {
    fn resolve(&self, name: &str) -> Result<Option<GymIdentity>>;
}

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Byte-for-byte name equality
    #[default]
    Exact,
    /// Ignore case and differences in whitespace
    Normalized,
}

pub struct ExactResolver<'a, R: ?Sized> {
    registry: &'a R,
}

impl<'a, R: GymRegistry + ?Sized> ExactResolver<'a, R> {
    pub fn new(registry: &'a R) -> Self {
        Self { registry }
    }
}

impl<R: GymRegistry + ?Sized> GymResolver for ExactResolver<'_, R> {
    fn resolve(&self, name: &str) -> Result<Option<GymIdentity>> {
        self.registry.find_gym_by_name(name)
    }
}

/// Snapshot of the registry keyed by [`normalize`]d name.
pub struct NormalizedResolver {
    gyms: HashMap<String, GymIdentity>,
}

impl NormalizedResolver {
    pub fn load<R: GymRegistry + ?Sized>(registry: &R) -> Result<Self> {
        let mut all = registry.gyms()?;
        all.sort_by_key(|gym| gym.gym_id);

        let mut gyms = HashMap::new();
        for gym in all {
            match gyms.entry(normalize(&gym.name)) {
                Entry::Occupied(kept) => {
                    let kept: &GymIdentity = kept.get();
                    warn!(kept = %kept.name, ignored = %gym.name, "gym names collide once normalized");
                }
                Entry::Vacant(slot) => {
                    slot.insert(gym);
                }
            }
        }

        Ok(Self { gyms })
    }
}

impl GymResolver for NormalizedResolver {
    fn resolve(&self, name: &str) -> Result<Option<GymIdentity>> {
        Ok(self.gyms.get(&normalize(name)).cloned())
    }
}

pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn resolver<'a, R: GymRegistry + ?Sized>(
    strategy: MatchStrategy,
    registry: &'a R,
) -> Result<Box<dyn GymResolver + 'a>> {
    Ok(match strategy {
        MatchStrategy::Exact => Box::new(ExactResolver::new(registry)),
        MatchStrategy::Normalized => Box::new(NormalizedResolver::load(registry)?),
    })
}
