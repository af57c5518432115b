use crate::clock::{Clock, SystemClock};
use crate::metadata::{
    CacheError, DETAIL_METADATA_FILE, DetailMetadata, DetailStamp, LIST_METADATA_FILE,
    ListMetadata, read_json, remove_if_present, write_json,
};
use chatterm_core::{ConversationFilter, ConversationId};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: Option<T>,
    stored_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
struct ListEntry<T> {
    entry: CacheEntry<T>,
    filter: ConversationFilter,
}

/// Time-bounded cache for the conversation list (one slot, keyed by filter)
/// and per-conversation message lists.
///
/// Only timestamps and keys survive a restart. Entries restored from disk
/// carry no value, so they read as misses however fresh they look.
pub struct TtlCache<L, D> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    list: Option<ListEntry<L>>,
    details: HashMap<ConversationId, CacheEntry<D>>,
    metadata_dir: Option<PathBuf>,
}

impl<L, D> TtlCache<L, D> {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            list: None,
            details: HashMap::new(),
            metadata_dir: None,
        }
    }

    pub fn with_metadata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.metadata_dir = Some(dir.into());
        self
    }

    /// Cache persisting metadata under `dir`, pre-loaded with whatever a
    /// previous run left there. Unreadable metadata is logged and ignored.
    pub fn open(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        let mut cache = Self::new(ttl).with_metadata_dir(dir);
        if let Err(err) = cache.restore_metadata() {
            warn!(error = %err, "ignoring unreadable cache metadata");
        }
        cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn metadata_dir(&self) -> Option<&Path> {
        self.metadata_dir.as_deref()
    }

    fn is_fresh(&self, stored_at: OffsetDateTime) -> bool {
        let age = self.clock.now() - stored_at;
        let ttl = time::Duration::try_from(self.ttl).unwrap_or(time::Duration::MAX);
        age < ttl
    }

    fn valid_value<'a, T>(&self, entry: &'a CacheEntry<T>) -> Option<&'a T> {
        if self.is_fresh(entry.stored_at) {
            entry.value.as_ref()
        } else {
            None
        }
    }

    pub fn get_list(&self, filter: ConversationFilter) -> Option<&L> {
        let slot = self.list.as_ref()?;
        if slot.filter != filter {
            return None;
        }
        self.valid_value(&slot.entry)
    }

    pub fn store_list(&mut self, value: L, filter: ConversationFilter) {
        self.list = Some(ListEntry {
            entry: CacheEntry {
                value: Some(value),
                stored_at: self.clock.now(),
            },
            filter,
        });
    }

    pub fn get_detail(&self, key: ConversationId) -> Option<&D> {
        self.details
            .get(&key)
            .and_then(|entry| self.valid_value(entry))
    }

    pub fn store_detail(&mut self, key: ConversationId, value: D) {
        let stored_at = self.clock.now();
        self.details.insert(
            key,
            CacheEntry {
                value: Some(value),
                stored_at,
            },
        );
    }

    pub fn invalidate_list(&mut self) {
        self.list = None;
    }

    /// Drops one detail entry, or every detail entry when `key` is `None`.
    pub fn invalidate_detail(&mut self, key: Option<ConversationId>) {
        match key {
            Some(key) => {
                self.details.remove(&key);
            }
            None => self.details.clear(),
        }
    }

    /// Removes entries whose TTL has run out. Returns how many were removed.
    pub fn evict_expired(&mut self) -> usize {
        let now = self.clock.now();
        let ttl = time::Duration::try_from(self.ttl).unwrap_or(time::Duration::MAX);
        let before = self.details.len();
        self.details.retain(|_, entry| now - entry.stored_at < ttl);
        let mut evicted = before - self.details.len();
        if self
            .list
            .as_ref()
            .is_some_and(|slot| now - slot.entry.stored_at >= ttl)
        {
            self.list = None;
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, "evicted expired cache entries");
        }
        evicted
    }

    pub fn list_timestamp(&self) -> Option<(OffsetDateTime, ConversationFilter)> {
        self.list
            .as_ref()
            .map(|slot| (slot.entry.stored_at, slot.filter))
    }

    pub fn detail_timestamp(&self, key: ConversationId) -> Option<OffsetDateTime> {
        self.details.get(&key).map(|entry| entry.stored_at)
    }

    /// Detail entries currently holding a value, fresh or not.
    pub fn cached_detail_count(&self) -> usize {
        self.details
            .values()
            .filter(|entry| entry.value.is_some())
            .count()
    }

    pub fn persist_metadata(&self) -> Result<(), CacheError> {
        let Some(dir) = self.metadata_dir.as_deref() else {
            return Ok(());
        };

        let list_path = dir.join(LIST_METADATA_FILE);
        match &self.list {
            Some(slot) => write_json(
                &list_path,
                &ListMetadata {
                    timestamp: slot.entry.stored_at,
                    filter: slot.filter,
                },
            )?,
            None => remove_if_present(&list_path)?,
        }

        let details: DetailMetadata = self
            .details
            .iter()
            .map(|(key, entry)| {
                (
                    key.get(),
                    DetailStamp {
                        timestamp: entry.stored_at,
                    },
                )
            })
            .collect();
        write_json(&dir.join(DETAIL_METADATA_FILE), &details)?;
        debug!(dir = %dir.display(), details = details.len(), "cache metadata persisted");
        Ok(())
    }

    /// Loads persisted timestamps. Entries already holding a value are kept.
    /// Returns how many entries were restored.
    pub fn restore_metadata(&mut self) -> Result<usize, CacheError> {
        let Some(dir) = self.metadata_dir.clone() else {
            return Ok(0);
        };
        let mut restored = 0;

        if let Some(list) = read_json::<ListMetadata>(&dir.join(LIST_METADATA_FILE))? {
            if self.list.is_none() {
                self.list = Some(ListEntry {
                    entry: CacheEntry {
                        value: None,
                        stored_at: list.timestamp,
                    },
                    filter: list.filter,
                });
                restored += 1;
            }
        }

        if let Some(details) = read_json::<DetailMetadata>(&dir.join(DETAIL_METADATA_FILE))? {
            for (key, stamp) in details {
                if let Entry::Vacant(vacant) = self.details.entry(ConversationId::new(key)) {
                    vacant.insert(CacheEntry {
                        value: None,
                        stored_at: stamp.timestamp,
                    });
                    restored += 1;
                }
            }
        }

        debug!(restored, "cache metadata restored");
        Ok(restored)
    }
}
