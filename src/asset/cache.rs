use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

/// Path-keyed cache of shared CPU assets so a file is decoded once.
pub struct AssetCache<T> {
    items: HashMap<PathBuf, Arc<T>>,
}

impl<T> AssetCache<T> {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, item: T) -> Arc<T> {
        let item = Arc::new(item);
        self.items.insert(path.into(), item.clone());
        item
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<T>> {
        self.items.get(path.as_ref()).cloned()
    }

    /// Returns the cached asset or loads and caches it. A failed load
    /// caches nothing.
    pub fn get_or_load(
        &mut self,
        path: impl AsRef<Path>,
        load: impl FnOnce(&Path) -> Result<T>,
    ) -> Result<Arc<T>> {
        let path = path.as_ref();
        if let Some(item) = self.items.get(path) {
            return Ok(item.clone());
        }
        let item = Arc::new(load(path)?);
        self.items.insert(path.to_path_buf(), item.clone());
        Ok(item)
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<Arc<T>> {
        self.items.remove(path.as_ref())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Default for AssetCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;

    #[test]
    fn get_missing_returns_none() {
        let cache: AssetCache<u32> = AssetCache::new();
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn get_or_load_loads_once() {
        let mut cache = AssetCache::new();
        let mut loads = 0;
        for _ in 0..3 {
            let value = cache
                .get_or_load("a", |_| {
                    loads += 1;
                    Ok(7u32)
                })
                .expect("load succeeds");
            assert_eq!(*value, 7);
        }
        assert_eq!(loads, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failed_load_is_not_cached() {
        let mut cache: AssetCache<u32> = AssetCache::new();
        let result = cache.get_or_load("bad", |_| {
            Err(RenderError::InvalidData {
                what: "test",
                reason: "broken".into(),
            })
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
