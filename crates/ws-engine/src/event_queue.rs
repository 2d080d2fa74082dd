//! Timeline of scheduled triggers.

use core::ops::Range;
use slotmap::SlotMap;

use crate::clock::{ClockHandle, NoteTrigger};

/// Triggers sorted by clock time.
///
/// During playback, triggers are consumed via a cursor that advances forward
/// without removing elements, so the realtime drain path is allocation-free
/// and a seek backwards replays them. Cancelling removes the payload;
/// the timeline entry becomes stale and is skipped until the next compaction.
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    entries: Vec<(f64, ClockHandle)>,
    payloads: SlotMap<ClockHandle, NoteTrigger>,
    /// Next entry index to process (advances during playback).
    cursor: usize,
}

impl EventQueue {
    /// Create a new empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trigger, keeping time order. Equal times keep insertion order.
    pub fn push(&mut self, at: f64, trigger: NoteTrigger) -> ClockHandle {
        let handle = self.payloads.insert(trigger);
        let pos = self.entries.partition_point(|&(t, _)| t <= at);
        self.entries.insert(pos, (at, handle));
        if pos < self.cursor {
            self.cursor += 1;
        }
        handle
    }

    /// Insert many triggers with one sort. The cursor is re-derived from `now`.
    pub fn push_many(&mut self, events: &[(f64, NoteTrigger)], now: f64) -> Vec<ClockHandle> {
        self.entries.reserve(events.len());
        let handles: Vec<ClockHandle> = events
            .iter()
            .map(|&(at, trigger)| {
                let handle = self.payloads.insert(trigger);
                self.entries.push((at, handle));
                handle
            })
            .collect();
        self.entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.seek(now);
        handles
    }

    /// Remove a trigger's payload. Returns false if it was not live.
    pub fn cancel(&mut self, handle: ClockHandle) -> bool {
        self.payloads.remove(handle).is_some()
    }

    /// Drop stale entries once they outnumber live ones.
    pub fn compact_if_stale(&mut self) {
        if self.entries.len() > 2 * self.payloads.len() {
            self.compact();
        }
    }

    fn compact(&mut self) {
        let payloads = &self.payloads;
        let cursor = self.cursor;
        let mut kept_before_cursor = 0;
        let mut index = 0;
        self.entries.retain(|&(_, handle)| {
            let keep = payloads.contains_key(handle);
            if keep && index < cursor {
                kept_before_cursor += 1;
            }
            index += 1;
            keep
        });
        self.cursor = kept_before_cursor;
    }

    /// Place the cursor at the first entry at or after `time`.
    pub fn seek(&mut self, time: f64) {
        self.cursor = self.entries.partition_point(|&(t, _)| t < time);
    }

    /// Return the index range of entries at or before `time` (cursor-based, zero allocation).
    ///
    /// Advances the internal cursor past all consumed entries. Use [`get`](Self::get)
    /// on each index; cancelled entries yield `None`.
    pub fn drain_until(&mut self, time: f64) -> Range<usize> {
        let start = self.cursor;
        while self.cursor < self.entries.len() && self.entries[self.cursor].0 <= time {
            self.cursor += 1;
        }
        start..self.cursor
    }

    /// Get a live trigger by entry index (for use with `drain_until` ranges).
    pub fn get(&self, index: usize) -> Option<&NoteTrigger> {
        let &(_, handle) = self.entries.get(index)?;
        self.payloads.get(handle)
    }

    /// Whether a handle still refers to a live trigger.
    pub fn contains(&self, handle: ClockHandle) -> bool {
        self.payloads.contains_key(handle)
    }

    /// Clear all triggers and reset the cursor.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.payloads.clear();
        self.cursor = 0;
    }

    /// Number of live triggers.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Returns true if no trigger is live.
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}
