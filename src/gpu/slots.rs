use std::collections::HashMap;

/// Backend-side storage keyed by raw ids that are never reused.
pub(crate) struct Slots<T> {
    next: u32,
    items: HashMap<u32, T>,
}

impl<T> Slots<T> {
    pub(crate) fn new() -> Self {
        Self {
            next: 0,
            items: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, item: T) -> u32 {
        let id = self.next;
        self.next += 1;
        self.items.insert(id, item);
        id
    }

    pub(crate) fn get(&self, id: u32) -> Option<&T> {
        self.items.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: u32) -> Option<T> {
        self.items.remove(&id)
    }

    pub(crate) fn contains(&self, id: u32) -> bool {
        self.items.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut slots = Slots::new();
        let a = slots.insert("a");
        assert_eq!(slots.remove(a), Some("a"));
        let b = slots.insert("b");
        assert_ne!(a, b);
        assert!(slots.get(a).is_none());
        assert_eq!(slots.get(b), Some(&"b"));
        assert_eq!(slots.len(), 1);
    }
}
