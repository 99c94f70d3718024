//! Record store with TTL-based expiration.

use rustc_hash::FxHashMap;
use std::sync::RwLock;
use std::time::Instant;

use crate::dns::{Question, Record};

/// Question-keyed store of the most recent record seen for each question.
///
/// Expiry is checked lazily: a lookup that finds a stale record removes it
/// and reports a miss. [`RecordStore::purge_expired`] sweeps the rest.
/// Unbounded unless built with [`RecordStore::with_capacity`].
pub struct RecordStore {
    entries: RwLock<FxHashMap<Question, Record>>,
    capacity: Option<usize>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            capacity: None,
        }
    }

    /// A store holding at most `capacity` questions.
    ///
    /// Storing a new question into a full store first drops expired
    /// entries, then the entry closest to expiry.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            capacity: Some(capacity.max(1)),
        }
    }

    /// Look up the record for `question` as of `now`.
    pub fn lookup(&self, question: &Question, now: Instant) -> Option<Record> {
        {
            let Ok(entries) = self.entries.read() else {
                return None;
            };
            match entries.get(question) {
                Some(record) if !record.is_expired(now) => return Some(record.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let Ok(mut entries) = self.entries.write() else {
            return None;
        };
        // Another handler may have refreshed the entry between the locks.
        if let Some(record) = entries.get(question) {
            if !record.is_expired(now) {
                return Some(record.clone());
            }
            entries.remove(question);
        }
        None
    }

    /// Store `record` for `question`, replacing whatever was there.
    pub fn store(&self, question: Question, record: Record) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };

        if let Some(capacity) = self.capacity {
            if entries.len() >= capacity && !entries.contains_key(&question) {
                let now = Instant::now();
                entries.retain(|_, record| !record.is_expired(now));
                if entries.len() >= capacity {
                    evict_soonest(&mut entries);
                }
            }
        }

        entries.insert(question, record);
    }

    /// Drop every entry expired as of `now`, returning how many went.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|_, record| !record.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn evict_soonest(entries: &mut FxHashMap<Question, Record>) {
    let soonest = entries
        .iter()
        .min_by_key(|(_, record)| {
            let expires_at = record.expires_at();
            (expires_at.is_none(), expires_at)
        })
        .map(|(question, _)| question.clone());
    if let Some(question) = soonest {
        entries.remove(&question);
    }
}
