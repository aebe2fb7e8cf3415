//! Shared anchor sets keyed by input size.
//!
//! Anchor generation is a pure function of the layout and the input size, so
//! each size is generated once and handed out as an `Arc<[Anchor]>`. The map
//! sits behind an `RwLock`: lookups take the read lock, and a miss generates
//! outside any lock before inserting. Two threads racing on the same new size
//! may both generate; the first insert wins and both observe identical data.

use super::{Anchor, AnchorConfig, AnchorGenerator};
use crate::trace::trace_debug;
use crate::util::FaceBoxesResult;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe memo of generated anchor sets.
#[derive(Debug)]
pub struct AnchorCache {
    generator: AnchorGenerator,
    sets: RwLock<HashMap<(usize, usize), Arc<[Anchor]>>>,
}

impl Default for AnchorCache {
    fn default() -> Self {
        Self::new(AnchorGenerator::default())
    }
}

impl AnchorCache {
    /// Creates an empty cache backed by `generator`.
    pub fn new(generator: AnchorGenerator) -> Self {
        Self {
            generator,
            sets: RwLock::new(HashMap::new()),
        }
    }

    /// Layout used for every set in this cache.
    pub fn config(&self) -> &AnchorConfig {
        self.generator.config()
    }

    /// Returns the anchors for `height x width`, generating them on first use.
    pub fn get_or_generate(&self, height: usize, width: usize) -> FaceBoxesResult<Arc<[Anchor]>> {
        let key = (height, width);
        {
            let sets = self.sets.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(set) = sets.get(&key) {
                return Ok(Arc::clone(set));
            }
        }

        let generated: Arc<[Anchor]> = self.generator.generate(height, width)?.into();
        trace_debug!("anchor_cache_miss", height = height, width = width);

        let mut sets = self.sets.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(sets.entry(key).or_insert(generated)))
    }

    /// Number of cached input sizes.
    pub fn len(&self) -> usize {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true when nothing has been generated yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
