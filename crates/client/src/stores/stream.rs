//! Merged, deduplicated, timestamp-ordered stream of keyed items.
//!
//! A stream folds two sources into one view: a REST snapshot and live pushes.
//! Until the first snapshot arrives, live items are held in a buffer and
//! replayed in arrival order once it does. Read state only ever moves from
//! unread to read.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

use chrono::{DateTime, Utc};

/// An item that can live in a [`MergedStream`].
pub trait StreamItem: Clone {
    type Key: Clone + Eq + Hash + Debug;

    fn key(&self) -> Self::Key;
    fn timestamp(&self) -> DateTime<Utc>;
    fn sender_id(&self) -> &str;
    fn receiver_id(&self) -> &str;
    fn is_read(&self) -> bool;
    fn mark_read(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// No snapshot yet; live items are buffered.
    Uninitialized,
    /// A snapshot has been applied; live items merge immediately.
    Hydrated,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    /// Arrival sequence; breaks timestamp ties.
    seq: u64,
    item: T,
}

#[derive(Debug, Clone)]
pub struct MergedStream<T: StreamItem> {
    /// Sorted by `(timestamp, seq)`.
    entries: Vec<Entry<T>>,
    /// Sort position of every entry, by key.
    index: HashMap<T::Key, (DateTime<Utc>, u64)>,
    buffered: Vec<T>,
    /// Keys that arrived live and have not yet shown up in a snapshot.
    live_only: HashSet<T::Key>,
    /// Read marks for keys not seen yet. Cleared by a full snapshot.
    pending_reads: HashSet<T::Key>,
    /// Per sender: everything sent at or before this instant is read.
    read_marks: HashMap<String, DateTime<Utc>>,
    hydration: Hydration,
    next_seq: u64,
    error: Option<String>,
}

impl<T: StreamItem> Default for MergedStream<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            buffered: Vec::new(),
            live_only: HashSet::new(),
            pending_reads: HashSet::new(),
            read_marks: HashMap::new(),
            hydration: Hydration::Uninitialized,
            next_seq: 0,
            error: None,
        }
    }
}

impl<T: StreamItem> MergedStream<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hydration(&self) -> Hydration {
        self.hydration
    }

    pub fn is_hydrated(&self) -> bool {
        self.hydration == Hydration::Hydrated
    }

    /// Error from the most recent failed snapshot fetch.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.item)
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.position(key).map(|pos| &self.entries[pos].item)
    }

    /// Unread items addressed to `self_id`. Always computed from the entries.
    pub fn unread_count(&self, self_id: &str) -> usize {
        self.iter()
            .filter(|item| !item.is_read() && item.receiver_id() == self_id)
            .count()
    }

    /// Newest timestamp of anything from `sender_id`, buffered items included.
    pub fn latest_from(&self, sender_id: &str) -> Option<DateTime<Utc>> {
        self.iter()
            .chain(self.buffered.iter())
            .filter(|item| item.sender_id() == sender_id)
            .map(StreamItem::timestamp)
            .max()
    }

    /// Apply one live item. Buffered until the stream is hydrated.
    pub fn push_live(&mut self, item: T) {
        match self.hydration {
            Hydration::Uninitialized => self.buffered.push(item),
            Hydration::Hydrated => {
                self.live_only.insert(item.key());
                self.merge(item);
            }
        }
    }

    /// Replace the in-scope part of the stream with `snapshot`.
    ///
    /// In-scope entries that arrived live and are absent from the snapshot are
    /// kept; read marks already known locally survive. The first snapshot
    /// hydrates the stream and replays the buffer.
    pub fn apply_snapshot(&mut self, snapshot: Vec<T>, in_scope: impl Fn(&T) -> bool) {
        let snapshot_keys: HashSet<T::Key> = snapshot.iter().map(StreamItem::key).collect();
        let known_read: HashSet<T::Key> = self
            .iter()
            .filter(|item| item.is_read() && in_scope(item))
            .map(StreamItem::key)
            .collect();

        let live_only = &self.live_only;
        let index = &mut self.index;
        self.entries.retain(|e| {
            if !in_scope(&e.item) {
                return true;
            }
            let key = e.item.key();
            let keep = live_only.contains(&key) && !snapshot_keys.contains(&key);
            if !keep {
                index.remove(&key);
            }
            keep
        });
        self.live_only.retain(|k| !snapshot_keys.contains(k));

        for mut item in snapshot {
            if known_read.contains(&item.key()) {
                item.mark_read();
            }
            self.merge(item);
        }

        if self.hydration == Hydration::Uninitialized {
            self.hydration = Hydration::Hydrated;
            for item in std::mem::take(&mut self.buffered) {
                self.live_only.insert(item.key());
                self.merge(item);
            }
        }
        self.error = None;
    }

    /// Replace the whole stream with `snapshot`. Read marks for keys that
    /// are still missing afterwards are dropped.
    pub fn replace_all(&mut self, snapshot: Vec<T>) {
        self.apply_snapshot(snapshot, |_| true);
        if !self.pending_reads.is_empty() {
            tracing::debug!(dropped = self.pending_reads.len(), "discarding unmatched read marks");
            self.pending_reads.clear();
        }
    }

    /// Record a failed snapshot fetch. Existing state is left untouched.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    /// Mark one item read. If it has not arrived yet, the mark is held and
    /// applied when it does. Returns true if a visible entry changed.
    pub fn mark_read(&mut self, key: &T::Key) -> bool {
        if let Some(pos) = self.position(key) {
            let item = &mut self.entries[pos].item;
            let changed = !item.is_read();
            item.mark_read();
            return changed;
        }
        let mut buffered_hit = false;
        for item in self.buffered.iter_mut().filter(|item| item.key() == *key) {
            item.mark_read();
            buffered_hit = true;
        }
        if !buffered_hit {
            self.pending_reads.insert(key.clone());
        }
        false
    }

    /// Mark everything from `sender_id` up to `upto` read, including items
    /// that only arrive later. Returns the number of visible entries changed.
    pub fn read_through(&mut self, sender_id: &str, upto: DateTime<Utc>) -> usize {
        let mark = self
            .read_marks
            .entry(sender_id.to_string())
            .or_insert(upto);
        *mark = (*mark).max(upto);
        let mark = *mark;

        let covered = |item: &T| item.sender_id() == sender_id && item.timestamp() <= mark;
        let mut changed = 0;
        for entry in self.entries.iter_mut() {
            if !entry.item.is_read() && covered(&entry.item) {
                entry.item.mark_read();
                changed += 1;
            }
        }
        for item in self.buffered.iter_mut().filter(|item| covered(item)) {
            item.mark_read();
        }
        changed
    }

    pub fn has_pending_read(&self, key: &T::Key) -> bool {
        self.pending_reads.contains(key)
    }

    fn position(&self, key: &T::Key) -> Option<usize> {
        let &(ts, seq) = self.index.get(key)?;
        let at = self
            .entries
            .partition_point(|e| (e.item.timestamp(), e.seq) < (ts, seq));
        (at < self.entries.len()).then_some(at)
    }

    fn read_mark_covers(&self, item: &T) -> bool {
        self.read_marks
            .get(item.sender_id())
            .is_some_and(|mark| item.timestamp() <= *mark)
    }

    /// Insert or replace by key, keeping order and read monotonicity.
    fn merge(&mut self, mut item: T) {
        let key = item.key();
        if self.pending_reads.remove(&key) || self.read_mark_covers(&item) {
            item.mark_read();
        }
        let seq = match self.position(&key) {
            Some(pos) => {
                let previous = self.entries.remove(pos);
                if previous.item.is_read() {
                    item.mark_read();
                }
                previous.seq
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                seq
            }
        };
        let ts = item.timestamp();
        let at = self
            .entries
            .partition_point(|e| (e.item.timestamp(), e.seq) < (ts, seq));
        self.entries.insert(at, Entry { seq, item });
        self.index.insert(key, (ts, seq));
    }
}
