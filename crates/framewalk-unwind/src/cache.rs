//! Per-stop cache of frame descriptors.
//!
//! Each frame is identified by its PC and stack pointer. A slot moves
//! through `Uncomputed -> Computing -> Ready`; the `Computing` state lets a
//! re-entrant request for the same frame get the partial descriptor back
//! instead of recursing. Everything is dropped when the target resumes.
//!
//! Slots live in an arena and are addressed by [`FrameHandle`]s, which
//! carry the cache generation so a handle from before an invalidation can
//! never publish into the new cache.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::FrameDescriptor;

/// Identifies one frame during a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameKey {
    /// Frame PC, with the mode bit.
    pub pc: u64,
    /// Stack pointer of the frame.
    pub sp: u64,
}

impl FrameKey {
    /// Create a key.
    pub fn new(pc: u64, sp: u64) -> Self {
        Self { pc, sp }
    }
}

/// Ticket for a computation started with [`FrameCache::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHandle {
    index: usize,
    generation: u64,
}

/// Cache lookup result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    Uncomputed,
    /// Being computed; the descriptor is what was known when it started.
    Computing(Arc<FrameDescriptor>),
    Ready(Arc<FrameDescriptor>),
}

/// Result of [`FrameCache::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// The caller now owns the computation.
    Started(FrameHandle),
    /// Someone up the call stack is computing this frame.
    InProgress(Arc<FrameDescriptor>),
    /// Already computed.
    Ready(Arc<FrameDescriptor>),
}

#[derive(Debug)]
struct Slot {
    key: FrameKey,
    state: CacheState,
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub invalidations: u64,
}

/// Arena of frame descriptors for the current stop.
#[derive(Debug, Default)]
pub struct FrameCache {
    slots: Vec<Slot>,
    index: HashMap<FrameKey, usize>,
    generation: u64,
    stats: CacheStats,
}

impl FrameCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state of `key`.
    pub fn lookup(&self, key: FrameKey) -> CacheState {
        self.index
            .get(&key)
            .map_or(CacheState::Uncomputed, |&i| self.slots[i].state.clone())
    }

    /// The ready descriptor for `key`, if any.
    pub fn get(&self, key: FrameKey) -> Option<Arc<FrameDescriptor>> {
        match self.lookup(key) {
            CacheState::Ready(d) => Some(d),
            _ => None,
        }
    }

    /// Starts computing `key`, or reports why that is not needed.
    ///
    /// `partial` is handed to re-entrant requests while the computation
    /// runs.
    pub fn begin(&mut self, key: FrameKey, partial: FrameDescriptor) -> Begin {
        let index = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.slots.push(Slot {
                    key,
                    state: CacheState::Uncomputed,
                });
                self.index.insert(key, self.slots.len() - 1);
                self.slots.len() - 1
            }
        };

        let slot = &mut self.slots[index];
        match &slot.state {
            CacheState::Ready(d) => {
                self.stats.hits += 1;
                Begin::Ready(Arc::clone(d))
            }
            CacheState::Computing(d) => Begin::InProgress(Arc::clone(d)),
            CacheState::Uncomputed => {
                self.stats.misses += 1;
                slot.state = CacheState::Computing(Arc::new(partial));
                Begin::Started(FrameHandle {
                    index,
                    generation: self.generation,
                })
            }
        }
    }

    /// Stores the finished descriptor. Returns `None` if the handle is stale
    /// or the slot is not being computed.
    pub fn publish(&mut self, handle: FrameHandle, descriptor: FrameDescriptor) -> Option<Arc<FrameDescriptor>> {
        let slot = self.live_slot(handle)?;
        if !matches!(slot.state, CacheState::Computing(_)) {
            return None;
        }
        let descriptor = Arc::new(descriptor);
        slot.state = CacheState::Ready(Arc::clone(&descriptor));
        self.stats.stores += 1;
        Some(descriptor)
    }

    /// Gives up a computation, e.g. after an interrupt. The frame can be
    /// computed again later.
    pub fn abandon(&mut self, handle: FrameHandle) {
        if let Some(slot) = self.live_slot(handle) {
            if matches!(slot.state, CacheState::Computing(_)) {
                debug!(pc = format_args!("{:#x}", slot.key.pc), "frame computation abandoned");
                slot.state = CacheState::Uncomputed;
            }
        }
    }

    fn live_slot(&mut self, handle: FrameHandle) -> Option<&mut Slot> {
        if handle.generation != self.generation {
            return None;
        }
        self.slots.get_mut(handle.index)
    }

    /// Drops every entry. Called when the target resumes.
    pub fn invalidate(&mut self) {
        debug!(entries = self.slots.len(), generation = self.generation, "frame cache invalidated");
        self.slots.clear();
        self.index.clear();
        self.generation += 1;
        self.stats.invalidations += 1;
    }

    /// Number of frames known to the cache.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the cache holds no frames.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of invalidations so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Hit and miss counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> FrameKey {
        FrameKey::new(0x400010, 0x7fff_0000)
    }

    fn ready_descriptor() -> FrameDescriptor {
        let mut d = FrameDescriptor::new(0x400000);
        d.set_base(0x7fff_0020);
        d
    }

    #[test]
    fn test_state_machine() {
        let mut cache = FrameCache::new();
        assert_eq!(cache.lookup(key()), CacheState::Uncomputed);

        let Begin::Started(handle) = cache.begin(key(), FrameDescriptor::new(0x400000)) else {
            panic!("expected a new computation");
        };
        assert!(matches!(cache.lookup(key()), CacheState::Computing(_)));

        let published = cache.publish(handle, ready_descriptor()).unwrap();
        assert_eq!(published.base_address(), 0x7fff_0020);
        assert_eq!(cache.get(key()).unwrap().base_address(), 0x7fff_0020);
    }

    #[test]
    fn test_reentrant_begin_returns_partial() {
        let mut cache = FrameCache::new();
        let mut partial = FrameDescriptor::new(0x400000);
        partial.record_save(31, 0x7fff_001c);
        assert!(matches!(cache.begin(key(), partial), Begin::Started(_)));

        match cache.begin(key(), FrameDescriptor::new(0x400000)) {
            Begin::InProgress(d) => assert_eq!(d.saved_count(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ready_is_hit() {
        let mut cache = FrameCache::new();
        let Begin::Started(handle) = cache.begin(key(), FrameDescriptor::new(0x400000)) else {
            panic!("expected a new computation");
        };
        cache.publish(handle, ready_descriptor());
        assert!(matches!(cache.begin(key(), FrameDescriptor::new(0)), Begin::Ready(_)));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_abandon() {
        let mut cache = FrameCache::new();
        let Begin::Started(handle) = cache.begin(key(), FrameDescriptor::new(0x400000)) else {
            panic!("expected a new computation");
        };
        cache.abandon(handle);
        assert_eq!(cache.lookup(key()), CacheState::Uncomputed);
        assert!(cache.publish(handle, ready_descriptor()).is_none());
        assert!(matches!(cache.begin(key(), FrameDescriptor::new(0)), Begin::Started(_)));
    }

    #[test]
    fn test_stale_handle_after_invalidate() {
        let mut cache = FrameCache::new();
        let Begin::Started(handle) = cache.begin(key(), FrameDescriptor::new(0x400000)) else {
            panic!("expected a new computation");
        };
        cache.invalidate();
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), 1);

        assert!(matches!(cache.begin(key(), FrameDescriptor::new(0)), Begin::Started(_)));
        assert!(cache.publish(handle, ready_descriptor()).is_none());
        assert!(matches!(cache.lookup(key()), CacheState::Computing(_)));
    }

    #[test]
    fn test_distinct_keys() {
        let mut cache = FrameCache::new();
        cache.begin(FrameKey::new(0x400010, 0x100), FrameDescriptor::new(0));
        cache.begin(FrameKey::new(0x400010, 0x200), FrameDescriptor::new(0));
        assert_eq!(cache.len(), 2);
    }
}
