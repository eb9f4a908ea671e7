//! Generational arena.
//!
//! Adapters, controllers and owners refer to each other by [`Key`] instead of
//! by pointer. A key whose slot has been freed (or reused) no longer resolves,
//! which is what makes back-references weak: holding a key never keeps an
//! entry alive.

/// Index plus generation. Stale keys resolve to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    index: u32,
    generation: u32,
}

impl Key {
    /// Slot index, for diagnostics.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with generation-checked keys.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> Key {
        self.insert_with(|_| (value, ())).0
    }

    /// Insert a value that needs to know its own key (for entries that are
    /// referenced by the entries they create). `make` may hand back extra
    /// output alongside the value.
    pub fn insert_with<R>(&mut self, make: impl FnOnce(Key) -> (T, R)) -> (Key, R) {
        let key = match self.free.pop() {
            Some(index) => Key {
                index,
                generation: self.slots[index as usize].generation,
            },
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                Key {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        let (value, extra) = make(key);
        self.slots[key.index as usize].value = Some(value);
        self.len += 1;
        (key, extra)
    }

    pub fn get(&self, key: Key) -> Option<&T> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// Free a slot. Its generation is bumped so outstanding keys go stale.
    pub fn remove(&mut self, key: Key) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Keys of all live entries, in slot order.
    pub fn keys(&self) -> Vec<Key> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.value.is_some())
            .map(|(index, slot)| Key {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    Key {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Remove every entry for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(Key, &T) -> bool) -> usize {
        let doomed: Vec<Key> = self
            .iter()
            .filter(|(key, value)| !keep(*key, value))
            .map(|(key, _)| key)
            .collect();
        for key in &doomed {
            self.remove(*key);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        for key in self.keys() {
            self.remove(key);
        }
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
