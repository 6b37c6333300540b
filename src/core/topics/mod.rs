mod catalog;

use std::collections::HashSet;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::warn;

use crate::core::domain::{Category, Difficulty, Topic};

/// Topics used within this many days are skipped by the selector.
pub const RECENT_TOPIC_WINDOW_DAYS: i64 = 30;

/// Percent weights for each difficulty tier.
const DIFFICULTY_WEIGHTS: [(Difficulty, u32); 3] = [
    (Difficulty::Beginner, 25),
    (Difficulty::Intermediate, 50),
    (Difficulty::Advanced, 25),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub title: String,
    pub category: Category,
}

fn normalize(topic: &str) -> String {
    topic.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct TopicCatalog {
    entries: Vec<CatalogEntry>,
}

impl TopicCatalog {
    pub fn builtin() -> Self {
        Self::from_entries(catalog::BUILTIN.iter().flat_map(|(category, titles)| {
            titles.iter().map(move |title| (*category, title.to_string()))
        }))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Category, String)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(category, title)| CatalogEntry { title, category })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Category of a free-form topic: exact title match first, then substring
    /// containment in either direction. Case-insensitive.
    pub fn infer_category(&self, topic: &str) -> Option<Category> {
        let needle = normalize(topic);
        if needle.is_empty() {
            return None;
        }
        if let Some(entry) = self.entries.iter().find(|e| normalize(&e.title) == needle) {
            return Some(entry.category);
        }
        self.entries
            .iter()
            .find(|e| {
                let known = normalize(&e.title);
                known.contains(&needle) || needle.contains(&known)
            })
            .map(|e| e.category)
    }
}

/// Weighted random pick over the catalog.
pub struct TopicSelector {
    catalog: TopicCatalog,
    rng: Mutex<StdRng>,
}

impl TopicSelector {
    pub fn new(catalog: TopicCatalog) -> Self {
        Self {
            catalog,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic selector for a given seed.
    pub fn with_seed(catalog: TopicCatalog, seed: u64) -> Self {
        Self {
            catalog,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    /// Picks a topic not in `recent`. When every entry is recent the whole
    /// catalog is eligible again. `None` only for an empty catalog.
    pub fn select(&self, recent: &[String]) -> Option<Topic> {
        let recent: HashSet<String> = recent.iter().map(|t| normalize(t)).collect();
        let fresh: Vec<&CatalogEntry> = self
            .catalog
            .entries
            .iter()
            .filter(|e| !recent.contains(&normalize(&e.title)))
            .collect();

        let pool = if fresh.is_empty() {
            if !self.catalog.is_empty() {
                warn!(
                    "All {} catalog topics were used in the last {} days, allowing repeats",
                    self.catalog.len(),
                    RECENT_TOPIC_WINDOW_DAYS
                );
            }
            self.catalog.entries.iter().collect()
        } else {
            fresh
        };

        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = pool.choose(&mut *rng)?;
        let difficulty = pick_difficulty(&mut *rng);

        Some(Topic {
            title: entry.title.clone(),
            category: entry.category,
            difficulty,
        })
    }
}

fn pick_difficulty(rng: &mut impl Rng) -> Difficulty {
    let total: u32 = DIFFICULTY_WEIGHTS.iter().map(|(_, w)| w).sum();
    let mut roll = rng.gen_range(0..total);
    for (difficulty, weight) in DIFFICULTY_WEIGHTS {
        if roll < weight {
            return difficulty;
        }
        roll -= weight;
    }
    Difficulty::Intermediate
}
