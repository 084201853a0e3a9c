//! Media object registry
//!
//! Index/generation arena of weak references to the live media objects that
//! need the shared audio session. The registry does bookkeeping only; it
//! never starts or stops audio itself.

use crate::error::{Error, Result};
use avs_common::{ActivityState, MediaHandle};
use std::sync::{Arc, Weak};
use tracing::debug;

/// A playing or recording entity owned by its caller
///
/// The coordinator calls these from whatever thread delivered the triggering
/// signal, never while holding its own locks. Implementations must treat
/// `pause` and `resume` as idempotent.
pub trait MediaObject: Send + Sync {
    /// Stop producing or capturing audio
    fn pause(&self);

    /// Continue after a coordinator-initiated pause
    fn resume(&self);

    /// Rebuild audio resources after the OS audio subsystem restarted
    fn reinitialize(&self);

    /// Whether playback may continue while the app is backgrounded
    fn supports_background_playback(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStatus {
    pub state: ActivityState,
    /// Object currently accounts for one arbiter promotion
    pub holds_promotion: bool,
}

struct Entry {
    object: Weak<dyn MediaObject>,
    status: EntryStatus,
}

struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Arena of registered media objects
#[derive(Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

fn identity(object: &Arc<dyn MediaObject>) -> *const () {
    Arc::as_ptr(object) as *const ()
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered objects, including ones not yet pruned
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add a weak reference to `object`
    pub fn register(&mut self, object: &Arc<dyn MediaObject>) -> Result<MediaHandle> {
        if let Some(existing) = self.find(object) {
            return Err(Error::AlreadyRegistered(existing));
        }

        let entry = Entry {
            object: Arc::downgrade(object),
            status: EntryStatus {
                state: ActivityState::Idle,
                holds_promotion: false,
            },
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize].entry = Some(entry);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.len += 1;

        let handle = MediaHandle {
            index,
            generation: self.slots[index as usize].generation,
        };
        debug!("Registered {}", handle);
        Ok(handle)
    }

    /// Remove `handle`; absent handles are ignored
    pub fn unregister(&mut self, handle: MediaHandle) -> Option<EntryStatus> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        debug!("Unregistered {}", handle);
        Some(entry.status)
    }

    fn find(&self, object: &Arc<dyn MediaObject>) -> Option<MediaHandle> {
        let wanted = identity(object);
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            let entry = slot.entry.as_ref()?;
            (entry.object.as_ptr() as *const () == wanted && entry.object.strong_count() > 0).then(
                || MediaHandle {
                    index: index as u32,
                    generation: slot.generation,
                },
            )
        })
    }

    fn entry(&self, handle: MediaHandle) -> Option<&Entry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, handle: MediaHandle) -> Option<&mut Entry> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn contains(&self, handle: MediaHandle) -> bool {
        self.entry(handle).is_some()
    }

    /// Strong reference to a live object
    pub fn get(&self, handle: MediaHandle) -> Option<Arc<dyn MediaObject>> {
        self.entry(handle).and_then(|entry| entry.object.upgrade())
    }

    pub fn status(&self, handle: MediaHandle) -> Option<EntryStatus> {
        self.entry(handle).map(|entry| entry.status)
    }

    /// Replace the status of `handle`, returning the previous one
    pub fn set_status(&mut self, handle: MediaHandle, status: EntryStatus) -> Result<EntryStatus> {
        let entry = self.entry_mut(handle).ok_or(Error::UnknownObject(handle))?;
        Ok(std::mem::replace(&mut entry.status, status))
    }

    /// Invoke `f` once for every live object whose state is `Active`
    pub fn for_each_active<F>(&self, mut f: F)
    where
        F: FnMut(MediaHandle, &Arc<dyn MediaObject>),
    {
        self.for_each_live(|handle, object, status| {
            if status.state.is_active() {
                f(handle, object);
            }
        });
    }

    /// Invoke `f` once for every live object
    pub fn for_each_live<F>(&self, mut f: F)
    where
        F: FnMut(MediaHandle, &Arc<dyn MediaObject>, EntryStatus),
    {
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(entry) = slot.entry.as_ref() else {
                continue;
            };
            if let Some(object) = entry.object.upgrade() {
                let handle = MediaHandle {
                    index: index as u32,
                    generation: slot.generation,
                };
                f(handle, &object, entry.status);
            }
        }
    }

    /// Drop entries whose objects were destroyed
    ///
    /// Returns how many of them still held a promotion.
    pub fn prune(&mut self) -> usize {
        let dead: Vec<MediaHandle> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let entry = slot.entry.as_ref()?;
                (entry.object.strong_count() == 0).then_some(MediaHandle {
                    index: index as u32,
                    generation: slot.generation,
                })
            })
            .collect();

        dead.into_iter()
            .filter_map(|handle| self.unregister(handle))
            .filter(|status| status.holds_promotion)
            .count()
    }

    /// Remove every entry, returning the live objects that were active
    pub fn clear(&mut self) -> Vec<(MediaHandle, Arc<dyn MediaObject>)> {
        let mut active = Vec::new();
        self.for_each_active(|handle, object| active.push((handle, Arc::clone(object))));
        for slot in &mut self.slots {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        self.free = (0..self.slots.len() as u32).rev().collect();
        self.len = 0;
        active
    }
}
