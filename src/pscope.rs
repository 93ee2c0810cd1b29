//! Persistent string-keyed hash map backing each [`Scope`].
//!
//! This is a conventional resizable hash table: a key lives in bucket
//! `hash(key) % bucket_count`. The bucket array itself is a
//! [`PersistentVector`], which makes every version of the map a cheap
//! snapshot. The trie is never routed by hash bits.
//!
//! [`Scope`]: crate::scope::Scope

use crate::pvector::{IndexOutOfBounds, PersistentVector};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

const UPPER_LOAD_FACTOR: f64 = 8.0;
const LOWER_LOAD_FACTOR: f64 = 2.0;
const INITIAL_LOAD_FACTOR: f64 = (UPPER_LOAD_FACTOR + LOWER_LOAD_FACTOR) / 2.0;

/// Stable 32-bit hash used to place keys in buckets.
pub trait ScopeHash {
    fn scope_hash(&self) -> u32;
}

impl ScopeHash for str {
    fn scope_hash(&self) -> u32 {
        crc32fast::hash(self.as_bytes())
    }
}

impl ScopeHash for String {
    fn scope_hash(&self) -> u32 {
        self.as_str().scope_hash()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeItem<V> {
    pub key: String,
    pub value: V,
}

/// Collision chain; `None` for a bucket that never held an item.
type Bucket<V> = Option<Arc<[ScopeItem<V>]>>;

fn position(key: &str, bucket_count: usize) -> usize {
    (u64::from(key.scope_hash()) % bucket_count as u64) as usize
}

/// Scratch table used while building or rehashing a map.
struct Buckets<V> {
    buckets: Vec<Vec<ScopeItem<V>>>,
    len: usize,
}

impl<V: Clone> Buckets<V> {
    fn with_capacity_for(item_count: usize) -> Self {
        let size = (item_count as f64 / INITIAL_LOAD_FACTOR) as usize + 1;
        Buckets {
            buckets: vec![Vec::new(); size],
            len: 0,
        }
    }

    fn add_item(&mut self, item: ScopeItem<V>) {
        let ix = position(&item.key, self.buckets.len());
        let bucket = &mut self.buckets[ix];
        if let Some(existing) = bucket.iter_mut().find(|existing| existing.key == item.key) {
            *existing = item;
            return;
        }

        bucket.push(item);
        self.len += 1;
    }

    fn add_items_from(&mut self, map: &ScopeMap<V>) {
        for (key, value) in map.iter() {
            self.add_item(ScopeItem {
                key: key.to_owned(),
                value: value.clone(),
            });
        }
    }

    fn into_map(self) -> ScopeMap<V> {
        let buckets = self.buckets.into_iter().map(|bucket| {
            if bucket.is_empty() {
                None
            } else {
                Some(Arc::from(bucket))
            }
        });

        ScopeMap {
            buckets: PersistentVector::new().append(buckets),
            len: self.len,
        }
    }
}

/// Persistent key-value map; every update returns a new map sharing
/// unmodified buckets with the old one.
pub struct ScopeMap<V> {
    buckets: PersistentVector<Bucket<V>>,
    len: usize,
}

impl<V> Clone for ScopeMap<V> {
    fn clone(&self) -> Self {
        ScopeMap {
            buckets: self.buckets.clone(),
            len: self.len,
        }
    }
}

impl<V: Clone> Default for ScopeMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> ScopeMap<V> {
    pub fn new() -> Self {
        Buckets::with_capacity_for(0).into_map()
    }

    /// Value stored under `key`, if any.
    pub fn load(&self, key: &str) -> Option<&V> {
        self.bucket(self.pos(key))
            .as_deref()?
            .iter()
            .find(|item| item.key == key)
            .map(|item| &item.value)
    }

    /// Returns a new map with `key` bound to `value`.
    pub fn store(&self, key: impl Into<String>, value: V) -> Self {
        let key = key.into();

        if self.len as f64 >= self.bucket_count() as f64 * UPPER_LOAD_FACTOR {
            let mut buckets = Buckets::with_capacity_for(self.len + 1);
            buckets.add_items_from(self);
            buckets.add_item(ScopeItem { key, value });
            let grown = buckets.into_map();
            debug!(
                len = grown.len,
                from = self.bucket_count(),
                to = grown.bucket_count(),
                "scope map grown"
            );
            return grown;
        }

        let pos = self.pos(&key);
        let (bucket, len) = match self.bucket(pos).as_deref() {
            Some(items) => match items.iter().position(|item| item.key == key) {
                Some(ix) => {
                    let mut copy = items.to_vec();
                    copy[ix] = ScopeItem { key, value };
                    (copy, self.len)
                }
                None => {
                    let mut copy = Vec::with_capacity(items.len() + 1);
                    copy.extend_from_slice(items);
                    copy.push(ScopeItem { key, value });
                    (copy, self.len + 1)
                }
            },
            None => (vec![ScopeItem { key, value }], self.len + 1),
        };

        ScopeMap {
            buckets: self.replace_bucket(pos, Some(Arc::from(bucket))),
            len,
        }
    }

    /// Returns a new map without `key`. When `key` is absent the result
    /// shares every node with `self`.
    pub fn delete(&self, key: &str) -> Self {
        let pos = self.pos(key);
        let Some(items) = self.bucket(pos).as_deref() else {
            return self.clone();
        };

        let remaining: Vec<ScopeItem<V>> =
            items.iter().filter(|item| item.key != key).cloned().collect();
        let removed = items.len() - remaining.len();
        if removed == 0 {
            return self.clone();
        }

        let bucket = if remaining.is_empty() {
            None
        } else {
            Some(Arc::from(remaining))
        };

        let shrunk = ScopeMap {
            buckets: self.replace_bucket(pos, bucket),
            len: self.len - removed,
        };

        if shrunk.bucket_count() > 1
            && (shrunk.len as f64) < shrunk.bucket_count() as f64 * LOWER_LOAD_FACTOR
        {
            let mut buckets = Buckets::with_capacity_for(shrunk.len);
            buckets.add_items_from(&shrunk);
            let rebuilt = buckets.into_map();
            debug!(
                len = rebuilt.len,
                from = shrunk.bucket_count(),
                to = rebuilt.bucket_count(),
                "scope map shrunk"
            );
            return rebuilt;
        }

        shrunk
    }
}

impl<V> ScopeMap<V> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets in the backing vector.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn pos(&self, key: &str) -> usize {
        position(key, self.bucket_count())
    }

    fn bucket(&self, pos: usize) -> &Bucket<V> {
        match self.buckets.get(pos) {
            Ok(bucket) => bucket,
            Err(err) => corrupted(err),
        }
    }

    fn replace_bucket(&self, pos: usize, bucket: Bucket<V>) -> PersistentVector<Bucket<V>> {
        match self.buckets.set(pos, bucket) {
            Ok(buckets) => buckets,
            Err(err) => corrupted(err),
        }
    }

    /// Entries in bucket order. The order is unrelated to key order and
    /// changes whenever the map is rehashed.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.buckets
            .iter()
            .filter_map(|bucket| bucket.as_deref())
            .flatten()
            .map(|item| (item.key.as_str(), &item.value))
    }

    /// Visits every entry until `f` returns `false`.
    pub fn range<F>(&self, mut f: F)
    where
        F: FnMut(&str, &V) -> bool,
    {
        for (key, value) in self.iter() {
            if !f(key, value) {
                return;
            }
        }
    }
}

impl<V: Clone> ScopeMap<V> {
    /// Copies every entry into a native hash map.
    pub fn to_hash_map(&self) -> FxHashMap<String, V> {
        self.iter()
            .map(|(key, value)| (key.to_owned(), value.clone()))
            .collect()
    }
}

// Positions are always reduced modulo the bucket count, so this only fires
// when the map itself is broken.
fn corrupted(err: IndexOutOfBounds) -> ! {
    error!(%err, "scope map bucket position outside backing vector");
    panic!("scope map invariant violated: {err}");
}

impl<V: Clone> FromIterator<(String, V)> for ScopeMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let items: Vec<(String, V)> = iter.into_iter().collect();
        let mut buckets = Buckets::with_capacity_for(items.len());
        for (key, value) in items {
            buckets.add_item(ScopeItem { key, value });
        }
        buckets.into_map()
    }
}

impl<V: fmt::Debug> fmt::Debug for ScopeMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
