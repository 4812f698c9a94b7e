//! Entity storage for tracks, effects, envelopes and lanes.
//!
//! External string ids are resolved to a [`Handle`] once, on the control
//! plane; the audio path only ever indexes by handle. Slots are versioned by
//! `slotmap`, so a handle whose slot has been reused by a newer entity no
//! longer resolves.

use std::collections::HashMap;

use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// Stable reference to an engine entity.
    pub struct Handle;
}

/// Versioned slot storage keyed by [`Handle`].
pub type Arena<T> = SlotMap<Handle, T>;

/// Side table keyed by handles from another arena.
pub type SecondaryMap<T> = slotmap::SecondaryMap<Handle, T>;

/// An arena whose entries are also addressable by their external id.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    arena: Arena<T>,
    ids: HashMap<String, Handle>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Registry {
            arena: Arena::with_key(),
            ids: HashMap::new(),
        }
    }

    /// Insert under `id`. An existing entry with the same id is replaced and
    /// returned; its old handle stops resolving.
    pub fn insert(&mut self, id: &str, value: T) -> (Handle, Option<T>) {
        let previous = self.remove(id);
        let handle = self.arena.insert(value);
        self.ids.insert(id.to_string(), handle);
        (handle, previous)
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let handle = self.ids.remove(id)?;
        self.arena.remove(handle)
    }

    pub fn handle_of(&self, id: &str) -> Option<Handle> {
        self.ids.get(id).copied()
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.arena.get(handle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.arena.get_mut(handle)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&T> {
        self.handle_of(id).and_then(|h| self.arena.get(h))
    }

    pub fn get_mut_by_id(&mut self, id: &str) -> Option<&mut T> {
        let handle = self.handle_of(id)?;
        self.arena.get_mut(handle)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.arena.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle, &mut T)> {
        self.arena.iter_mut()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.ids.clear();
    }
}
