//! Whole-series snapshots.
//!
//! Each series lives behind an [`ArcSwap`]: readers load an immutable
//! `Arc<Series>` without locking, writers publish a complete successor series
//! with a single atomic store. A reader therefore sees either the state before
//! an append or the state after it, never a partially appended run.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::model::{Series, SeriesKey};

#[derive(Debug)]
pub struct SeriesCell {
    current: ArcSwap<Series>,
}

impl SeriesCell {
    pub fn new(series: Series) -> Self {
        Self {
            current: ArcSwap::new(Arc::new(series)),
        }
    }

    pub fn empty(key: SeriesKey) -> Self {
        Self::new(Series::empty(key))
    }

    /// Acquire the current snapshot. Later swaps do not affect it.
    pub fn load(&self) -> Arc<Series> {
        self.current.load_full()
    }

    pub fn swap(&self, next: Series) {
        self.current.store(Arc::new(next));
    }
}
