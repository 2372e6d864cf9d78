use log::info;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Append-only set of character names handed out during this process.
///
/// Shared by every workflow on an engine. Reads of the recent window are best effort:
/// two concurrent workflows may both be told to avoid the same names and still pick
/// the same new one.
#[derive(Debug, Default)]
pub struct NamePool {
    inner: RwLock<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    // insertion order, for the recent window
    order: Vec<String>,
    seen: HashSet<String>,
}

impl PoolInner {
    fn insert(&mut self, name: &str) -> bool {
        let key = normalize(name);
        if key.is_empty() || !self.seen.insert(key) {
            return false;
        }
        self.order.push(name.trim().to_string());
        true
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

impl NamePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.seen.contains(&normalize(name))
    }

    /// Returns true when the name was not yet in the pool.
    pub fn add(&self, name: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(name)
    }

    /// Adds every name, returning how many were new.
    pub fn merge<I, S>(&self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        names
            .into_iter()
            .filter(|n| inner.insert(n.as_ref()))
            .count()
    }

    /// The last `k` names added, oldest first.
    pub fn sample_recent(&self, k: usize) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let start = inner.order.len().saturating_sub(k);
        inner.order[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every name, starting a fresh deduplication scope.
    pub fn reset(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.order.clear();
        inner.seen.clear();
        info!("Name tracking reset, all names available again");
    }
}
