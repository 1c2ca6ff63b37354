//! Client-side predicates over the working list.

use std::fmt;
use std::sync::Arc;

use crate::catalog_item::CatalogItem;

/// Vote count a movie must exceed to count as popular.
pub const POPULAR_VOTE_THRESHOLD: u64 = 2000;

/// A pure predicate over catalog items. Applying it never mutates its input.
#[derive(Clone)]
pub struct FilterPredicate {
    name: String,
    test: Arc<dyn Fn(&CatalogItem) -> bool + Send + Sync>,
}

impl FilterPredicate {
    pub fn new(name: impl Into<String>, test: impl Fn(&CatalogItem) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            test: Arc::new(test),
        }
    }

    /// Items with strictly more than `threshold` votes.
    pub fn min_votes(threshold: u64) -> Self {
        Self::new(format!("vote_count > {threshold}"), move |item| {
            item.vote_count > threshold
        })
    }

    pub fn popular() -> Self {
        Self::min_votes(POPULAR_VOTE_THRESHOLD)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, item: &CatalogItem) -> bool {
        (self.test)(item)
    }

    /// Returns the matching items, order preserved.
    pub fn apply(&self, items: &[CatalogItem]) -> Vec<CatalogItem> {
        items.iter().filter(|item| self.matches(item)).cloned().collect()
    }
}

impl fmt::Debug for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterPredicate").field("name", &self.name).finish()
    }
}
