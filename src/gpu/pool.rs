use std::collections::HashMap;

use crate::asset::ResourceId;
use crate::time::Stamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<H> {
    pub handle: H,
    pub modified: Stamp,
}

/// Maps CPU resource ids to backend objects and the stamp of the data they
/// hold.
#[derive(Debug)]
pub struct Pool<H> {
    entries: HashMap<ResourceId, Entry<H>>,
}

impl<H: Copy> Pool<H> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, id: ResourceId) -> Option<Entry<H>> {
        self.entries.get(&id).copied()
    }

    pub fn handle(&self, id: ResourceId) -> Option<H> {
        self.entries.get(&id).map(|entry| entry.handle)
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// True when an entry exists and holds data at least as new as `modified`.
    pub fn is_current(&self, id: ResourceId, modified: Stamp) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|entry| entry.modified >= modified)
    }

    pub fn insert(&mut self, id: ResourceId, handle: H, modified: Stamp) -> Option<Entry<H>> {
        self.entries.insert(id, Entry { handle, modified })
    }

    pub fn remove(&mut self, id: ResourceId) -> Option<Entry<H>> {
        self.entries.remove(&id)
    }

    /// Empties the pool, handing every entry to the caller for release.
    pub fn drain(&mut self) -> impl Iterator<Item = (ResourceId, Entry<H>)> + '_ {
        self.entries.drain()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<H: Copy> Default for Pool<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_entries_compare_stamps() {
        let mut pool = Pool::new();
        let id = ResourceId::next();
        let uploaded = Stamp::now();
        pool.insert(id, 7u32, uploaded);

        assert!(pool.is_current(id, uploaded));
        assert!(!pool.is_current(id, Stamp::now()));
        assert!(!pool.is_current(ResourceId::next(), Stamp::NEVER));
    }

    #[test]
    fn drain_empties_pool() {
        let mut pool = Pool::new();
        pool.insert(ResourceId::next(), 1u32, Stamp::now());
        pool.insert(ResourceId::next(), 2u32, Stamp::now());

        let mut handles: Vec<_> = pool.drain().map(|(_, entry)| entry.handle).collect();
        handles.sort();
        assert_eq!(handles, vec![1, 2]);
        assert!(pool.is_empty());
    }
}
