use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Index plus generation; a slot reused after removal bumps its generation so
/// stale ids stop resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: u32,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for GenerationalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Conversion between a typed handle and the raw arena id.
pub trait ArenaKey: Copy {
    fn from_id(id: GenerationalId) -> Self;
    fn id(self) -> GenerationalId;
}

impl ArenaKey for GenerationalId {
    fn from_id(id: GenerationalId) -> Self {
        id
    }

    fn id(self) -> GenerationalId {
        self
    }
}

macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        pub struct $name(pub $crate::utils::allocator::GenerationalId);

        impl $crate::utils::allocator::ArenaKey for $name {
            fn from_id(id: $crate::utils::allocator::GenerationalId) -> Self {
                Self(id)
            }

            fn id(self) -> $crate::utils::allocator::GenerationalId {
                self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

pub(crate) use arena_handle;

arena_handle!(
    /// Handle to a body registered with a world.
    BodyHandle
);
arena_handle!(
    /// Handle to a collision geometry registered with a world.
    GeomHandle
);
arena_handle!(
    /// Handle to a joint owned by a world.
    JointHandle
);

/// Generational arena that hands out stable ids while preventing use-after-free.
pub struct Arena<K: ArenaKey, T> {
    items: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: VecDeque<u32>,
    _key: std::marker::PhantomData<K>,
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ArenaKey, T> Arena<K, T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            generations: Vec::new(),
            free_list: VecDeque::new(),
            _key: std::marker::PhantomData,
        }
    }

    pub fn insert(&mut self, item: T) -> K {
        if let Some(index) = self.free_list.pop_front() {
            let slot = index as usize;
            self.items[slot] = Some(item);
            return K::from_id(GenerationalId::new(index, self.generations[slot]));
        }

        let index = self.items.len() as u32;
        self.items.push(Some(item));
        self.generations.push(0);
        K::from_id(GenerationalId::new(index, 0))
    }

    pub fn get(&self, key: K) -> Option<&T> {
        let id = key.id();
        if self.is_valid(id) {
            self.items.get(id.index as usize).and_then(|slot| slot.as_ref())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let id = key.id();
        if self.is_valid(id) {
            self.items
                .get_mut(id.index as usize)
                .and_then(|slot| slot.as_mut())
        } else {
            None
        }
    }

    pub fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: K) -> Option<T> {
        let id = key.id();
        if !self.is_valid(id) {
            return None;
        }
        let slot = id.index as usize;
        let item = self.items.get_mut(slot).and_then(|slot| slot.take())?;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free_list.push_back(id.index);
        Some(item)
    }

    pub fn clear(&mut self) {
        for (slot, item) in self.items.iter_mut().enumerate() {
            if item.take().is_some() {
                self.generations[slot] = self.generations[slot].wrapping_add(1);
                self.free_list.push_back(slot as u32);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.items.iter().enumerate().filter_map(move |(index, slot)| {
            slot.as_ref().map(|item| {
                (
                    K::from_id(GenerationalId::new(index as u32, self.generations[index])),
                    item,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> + '_ {
        let generations = &self.generations;
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(move |(index, slot)| {
                slot.as_mut().map(|item| {
                    (
                        K::from_id(GenerationalId::new(index as u32, generations[index])),
                        item,
                    )
                })
            })
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_valid(&self, id: GenerationalId) -> bool {
        self.generations
            .get(id.index as usize)
            .map(|generation| *generation == id.generation)
            .unwrap_or(false)
    }
}
