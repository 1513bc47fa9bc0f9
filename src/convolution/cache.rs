use std::sync::Arc;

use dashmap::DashMap;

use super::{ConvolutionError, ConvolutionMethod};

const CACHE_SIZE: usize = 10000;

/// Memo of `aif ⊗ exp(-λt)` keyed by the bit pattern of `λ`
///
/// A cache is only valid for one `(time, aif, method)` triple; the owning
/// model clears it whenever any of them changes. Entries are shared between
/// bootstrap workers, hence the concurrent map.
#[derive(Debug)]
pub(crate) struct ConvolutionCache {
    entries: DashMap<u64, Arc<[f64]>>,
    capacity: usize,
}

impl Default for ConvolutionCache {
    fn default() -> Self {
        Self::with_capacity(CACHE_SIZE)
    }
}

impl Clone for ConvolutionCache {
    /// Clones start empty
    fn clone(&self) -> Self {
        Self::with_capacity(self.capacity)
    }
}

impl ConvolutionCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` curves before it is flushed
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity.min(CACHE_SIZE)),
            capacity: capacity.max(1),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&self) {
        self.entries.clear();
    }

    pub(crate) fn get(&self, lambda: f64) -> Option<Arc<[f64]>> {
        self.entries
            .get(&lambda.to_bits())
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn insert(&self, lambda: f64, curve: Arc<[f64]>) {
        if self.entries.len() >= self.capacity {
            self.entries.clear();
        }
        self.entries.insert(lambda.to_bits(), curve);
    }
}

/// Borrowed view of an input function on its time axis, with cached convolutions
///
/// Compartment models build their forward curves through
/// [`Convolver::exponential`] so repeated decay rates are computed once.
#[derive(Debug, Clone, Copy)]
pub struct Convolver<'a> {
    time: &'a [f64],
    aif: &'a [f64],
    method: ConvolutionMethod,
    cache: Option<&'a ConvolutionCache>,
}

impl<'a> Convolver<'a> {
    /// Convolver without memoization
    pub fn new(time: &'a [f64], aif: &'a [f64], method: ConvolutionMethod) -> Self {
        Self {
            time,
            aif,
            method,
            cache: None,
        }
    }

    /// Memoize results in `cache`, which must belong to this `(time, aif, method)`
    pub(crate) fn with_cache(mut self, cache: &'a ConvolutionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// `aif ⊗ exp(-λt)` on the time axis
    pub fn exponential(&self, lambda: f64) -> Result<Arc<[f64]>, ConvolutionError> {
        if let Some(hit) = self.cache.and_then(|cache| cache.get(lambda)) {
            return Ok(hit);
        }
        let curve: Arc<[f64]> = self.method.convolve(self.aif, self.time, lambda)?.into();
        if let Some(cache) = self.cache {
            cache.insert(lambda, Arc::clone(&curve));
        }
        Ok(curve)
    }
}
