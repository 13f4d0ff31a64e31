//! Two-level LFRU eviction index.
//!
//! A circular doubly-linked list of frequency buckets, anchored by a
//! sentinel with frequency 0, holds strictly ascending visit counts. Each
//! bucket owns a vertical recency list of key nodes: `mru` points at the
//! most recently attached node, `lru` at the least. Both levels live in
//! slot arenas, so every "pointer" is a stable [`Handle`] and all
//! structural edits stay O(1).
//!
//! ```text
//!   head(0) ◄──► bucket(1) ◄──► bucket(3) ◄──► bucket(7) ◄──► head(0)
//!                   │              │
//!                  mru            mru = lru
//!                   ▼              ▼
//!                 [ k4 ]         [ k9 ]
//!                   ▼
//!                 [ k1 ]
//!                   ▼
//!                  lru
//! ```
//!
//! Eviction drains the lowest bucket from its `lru` end; promotion moves a
//! node to the `mru` end of the next-higher bucket, splicing that bucket in
//! when the right neighbour is not exactly `frequency + 1`. Buckets are
//! unlinked and freed the moment they become empty.

use crate::ds::arena::{Arena, Handle};

/// Handle to a key's node inside the eviction index.
pub type KeyHandle<K> = Handle<KeyNode<K>>;

type BucketHandle<K> = Handle<FreqNode<K>>;

/// Intrusive element tying a key to its recency position within one bucket.
#[derive(Debug)]
pub struct KeyNode<K> {
    key: K,
    parent: BucketHandle<K>,
    /// Towards the bucket's `mru` end.
    up: Option<KeyHandle<K>>,
    /// Towards the bucket's `lru` end.
    down: Option<KeyHandle<K>>,
}

#[derive(Debug)]
struct FreqNode<K> {
    frequency: u64,
    prev: BucketHandle<K>,
    next: BucketHandle<K>,
    mru: Option<KeyHandle<K>>,
    lru: Option<KeyHandle<K>>,
    local_len: usize,
}

/// Frequency list plus per-bucket recency lists.
///
/// Holds no value payload; the cache's key index keeps the stored bytes and
/// a non-owning [`KeyHandle`] into this structure.
#[derive(Debug)]
pub struct FreqList<K> {
    keys: Arena<KeyNode<K>>,
    buckets: Arena<FreqNode<K>>,
    head: BucketHandle<K>,
}

impl<K> FreqList<K> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty index with reserved slots for `capacity` keys.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buckets = Arena::new();
        let head = Self::sentinel(&mut buckets);
        Self {
            keys: Arena::with_capacity(capacity),
            buckets,
            head,
        }
    }

    fn sentinel(buckets: &mut Arena<FreqNode<K>>) -> BucketHandle<K> {
        buckets.insert_with(|handle| FreqNode {
            frequency: 0,
            prev: handle,
            next: handle,
            mru: None,
            lru: None,
            local_len: 0,
        })
    }

    /// Returns the number of keys in the index.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns `true` if `handle` still refers to a live key node.
    pub fn contains(&self, handle: KeyHandle<K>) -> bool {
        self.keys.contains(handle)
    }

    /// Returns the visit count of the key behind `handle`.
    pub fn frequency(&self, handle: KeyHandle<K>) -> u64 {
        self.bucket(self.node(handle).parent).frequency
    }

    /// Inserts a new key at frequency 1 and returns its handle.
    ///
    /// The frequency-1 bucket is created right after the sentinel when the
    /// current first bucket holds a higher count.
    pub fn insert(&mut self, key: K) -> KeyHandle<K> {
        let first = self.bucket(self.head).next;
        let target = if first != self.head && self.bucket(first).frequency == 1 {
            first
        } else {
            self.splice_bucket(1, self.head, first)
        };
        let node = self.keys.insert(KeyNode {
            key,
            parent: target,
            up: None,
            down: None,
        });
        self.attach(target, node);
        node
    }

    /// Moves a key from its bucket at frequency `f` to the `mru` end of the
    /// bucket at `f + 1`, splicing that bucket in when the right neighbour
    /// is not exactly `f + 1`. Returns the new frequency.
    ///
    /// Once the counter saturates at `u64::MAX` only the recency position
    /// is refreshed.
    pub fn promote(&mut self, handle: KeyHandle<K>) -> u64 {
        let current = self.node(handle).parent;
        let frequency = self.bucket(current).frequency;

        if frequency == u64::MAX {
            self.detach(current, handle);
            self.attach(current, handle);
            return frequency;
        }

        let next = self.bucket(current).next;
        let target = if next != self.head && self.bucket(next).frequency == frequency + 1 {
            next
        } else {
            self.splice_bucket(frequency + 1, current, next)
        };

        self.detach(current, handle);
        if self.bucket(current).local_len == 0 {
            self.unlink_bucket(current);
        }
        self.attach(target, handle);

        frequency + 1
    }

    /// Unlinks the key behind `handle` and returns it, collapsing its
    /// bucket if that bucket becomes empty.
    pub fn remove(&mut self, handle: KeyHandle<K>) -> K {
        let parent = self.node(handle).parent;
        self.detach(parent, handle);
        if self.bucket(parent).local_len == 0 {
            self.unlink_bucket(parent);
        }
        self.keys.remove(handle).expect("key node missing").key
    }

    /// Removes and returns the eviction victim together with its frequency:
    /// the least-recent key of the lowest-frequency bucket, or that
    /// bucket's sole member when it is a singleton.
    pub fn pop_victim(&mut self) -> Option<(K, u64)> {
        let victim = self.victim()?;
        let frequency = self.frequency(victim);
        Some((self.remove(victim), frequency))
    }

    /// Returns the key the next eviction would remove, without removing it.
    pub fn peek_victim(&self) -> Option<&K> {
        self.victim().map(|handle| &self.node(handle).key)
    }

    fn victim(&self) -> Option<KeyHandle<K>> {
        let lfu = self.bucket(self.head).next;
        if lfu == self.head {
            return None;
        }
        let bucket = self.bucket(lfu);
        if bucket.local_len > 1 {
            bucket.lru
        } else {
            bucket.mru
        }
    }

    /// Drops every key and bucket and installs a fresh sentinel.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.buckets.clear();
        self.head = Self::sentinel(&mut self.buckets);
    }

    fn node(&self, handle: KeyHandle<K>) -> &KeyNode<K> {
        self.keys.get(handle).expect("key node missing")
    }

    fn node_mut(&mut self, handle: KeyHandle<K>) -> &mut KeyNode<K> {
        self.keys.get_mut(handle).expect("key node missing")
    }

    fn bucket(&self, handle: BucketHandle<K>) -> &FreqNode<K> {
        self.buckets.get(handle).expect("bucket missing")
    }

    fn bucket_mut(&mut self, handle: BucketHandle<K>) -> &mut FreqNode<K> {
        self.buckets.get_mut(handle).expect("bucket missing")
    }

    /// Attaches `node` at the `mru` end of `bucket`.
    fn attach(&mut self, bucket: BucketHandle<K>, node: KeyHandle<K>) {
        let old_mru = self.bucket(bucket).mru;
        {
            let n = self.node_mut(node);
            n.parent = bucket;
            n.up = None;
            n.down = old_mru;
        }
        match old_mru {
            Some(mru) => self.node_mut(mru).up = Some(node),
            None => self.bucket_mut(bucket).lru = Some(node),
        }
        let b = self.bucket_mut(bucket);
        b.mru = Some(node);
        b.local_len += 1;
    }

    /// Detaches `node` from `bucket`'s recency list, leaving the bucket
    /// possibly empty. Collapsing an emptied bucket is the caller's job,
    /// so a detach-reattach on the same bucket never frees it.
    fn detach(&mut self, bucket: BucketHandle<K>, node: KeyHandle<K>) {
        let (up, down) = {
            let n = self.node(node);
            (n.up, n.down)
        };
        match up {
            Some(up) => self.node_mut(up).down = down,
            None => self.bucket_mut(bucket).mru = down,
        }
        match down {
            Some(down) => self.node_mut(down).up = up,
            None => self.bucket_mut(bucket).lru = up,
        }
        self.bucket_mut(bucket).local_len -= 1;
        let n = self.node_mut(node);
        n.up = None;
        n.down = None;
    }

    fn splice_bucket(
        &mut self,
        frequency: u64,
        prev: BucketHandle<K>,
        next: BucketHandle<K>,
    ) -> BucketHandle<K> {
        let handle = self.buckets.insert(FreqNode {
            frequency,
            prev,
            next,
            mru: None,
            lru: None,
            local_len: 0,
        });
        self.bucket_mut(prev).next = handle;
        self.bucket_mut(next).prev = handle;
        handle
    }

    fn unlink_bucket(&mut self, bucket: BucketHandle<K>) {
        let (prev, next) = {
            let b = self.bucket(bucket);
            (b.prev, b.next)
        };
        self.bucket_mut(prev).next = next;
        self.bucket_mut(next).prev = prev;
        self.buckets.remove(bucket);
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        self.keys.debug_validate_invariants();
        self.buckets.debug_validate_invariants();

        let head = self.bucket(self.head);
        assert_eq!(head.frequency, 0);
        assert_eq!(head.local_len, 0);
        assert!(head.mru.is_none() && head.lru.is_none());

        let mut total = 0usize;
        let mut bucket_count = 0usize;
        let mut last_frequency = 0u64;
        let mut cursor = head.next;
        while cursor != self.head {
            let bucket = self.bucket(cursor);
            assert!(
                bucket.frequency > last_frequency,
                "bucket frequencies must be strictly ascending"
            );
            assert!(bucket.local_len >= 1, "empty bucket left in the list");
            assert_eq!(self.bucket(bucket.prev).next, cursor);
            assert_eq!(self.bucket(bucket.next).prev, cursor);
            if bucket.local_len == 1 {
                assert_eq!(bucket.mru, bucket.lru);
            }

            // Walk down from mru; the lru must be reached in exactly
            // local_len steps with consistent back-links.
            let mut above = None;
            let mut current = bucket.mru;
            let mut count = 0usize;
            while let Some(handle) = current {
                let node = self.node(handle);
                assert_eq!(node.parent, cursor);
                assert_eq!(node.up, above);
                above = Some(handle);
                current = node.down;
                count += 1;
            }
            assert_eq!(bucket.lru, above);
            assert_eq!(count, bucket.local_len);

            total += bucket.local_len;
            last_frequency = bucket.frequency;
            bucket_count += 1;
            cursor = bucket.next;
        }
        assert_eq!(total, self.keys.len());
        assert_eq!(bucket_count + 1, self.buckets.len());
    }
}

impl<K> Default for FreqList<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn freq_list_basic_flow() {
        let mut list = FreqList::new();
        let a = list.insert("a");
        let b = list.insert("b");
        assert_eq!(list.len(), 2);
        assert_eq!(list.frequency(a), 1);
        assert_eq!(list.frequency(b), 1);

        assert_eq!(list.promote(a), 2);
        assert_eq!(list.frequency(a), 2);
        list.debug_validate_invariants();

        assert_eq!(list.pop_victim(), Some(("b", 1)));
        assert_eq!(list.len(), 1);
        list.debug_validate_invariants();
    }

    #[test]
    fn victim_is_lru_of_lowest_bucket() {
        let mut list = FreqList::new();
        list.insert("a");
        list.insert("b");
        list.insert("c");

        // All three share the frequency-1 bucket; "a" is its lru.
        assert_eq!(list.peek_victim(), Some(&"a"));
        assert_eq!(list.pop_victim(), Some(("a", 1)));
        assert_eq!(list.pop_victim(), Some(("b", 1)));
        assert_eq!(list.pop_victim(), Some(("c", 1)));
        assert_eq!(list.pop_victim(), None);
        assert!(list.is_empty());
    }

    #[test]
    fn singleton_bucket_evicts_its_only_member() {
        let mut list = FreqList::new();
        let a = list.insert("a");
        list.insert("b");
        list.promote(a);

        // Bucket 1 holds only "b"; mru and lru coincide.
        assert_eq!(list.pop_victim(), Some(("b", 1)));
        assert_eq!(list.pop_victim(), Some(("a", 2)));
    }

    #[test]
    fn promote_splices_and_collapses_buckets() {
        let mut list = FreqList::new();
        let a = list.insert("a");
        let b = list.insert("b");

        // "a" leaves bucket 1 for a new bucket 2.
        list.promote(a);
        list.debug_validate_invariants();
        assert_eq!(list.frequency(a), 2);
        assert_eq!(list.frequency(b), 1);

        // "b" follows; bucket 1 empties and is destroyed, bucket 2 reused.
        list.promote(b);
        list.debug_validate_invariants();
        assert_eq!(list.frequency(b), 2);

        // "a" moves on to a fresh bucket 3 spliced after bucket 2.
        list.promote(a);
        list.debug_validate_invariants();
        assert_eq!(list.frequency(a), 3);
        assert_eq!(list.peek_victim(), Some(&"b"));
    }

    #[test]
    fn promotion_skips_non_adjacent_frequencies() {
        let mut list = FreqList::new();
        let a = list.insert("a");
        let b = list.insert("b");
        for _ in 0..4 {
            list.promote(a);
        }
        assert_eq!(list.frequency(a), 5);

        // Bucket 2 does not exist; promoting "b" must splice it between
        // bucket 1's slot and bucket 5, not land "b" in bucket 5.
        assert_eq!(list.promote(b), 2);
        list.debug_validate_invariants();
        assert_eq!(list.peek_victim(), Some(&"b"));
    }

    #[test]
    fn remove_collapses_empty_bucket() {
        let mut list = FreqList::new();
        let a = list.insert("a");
        let b = list.insert("b");
        list.promote(b);

        assert_eq!(list.remove(b), "b");
        list.debug_validate_invariants();
        assert_eq!(list.len(), 1);
        assert!(!list.contains(b));
        assert!(list.contains(a));

        assert_eq!(list.remove(a), "a");
        assert!(list.is_empty());
        list.debug_validate_invariants();
    }

    #[test]
    fn detach_middle_of_recency_list() {
        let mut list = FreqList::new();
        list.insert("a");
        let b = list.insert("b");
        list.insert("c");

        // "b" sits between mru "c" and lru "a".
        assert_eq!(list.remove(b), "b");
        list.debug_validate_invariants();
        assert_eq!(list.pop_victim(), Some(("a", 1)));
        assert_eq!(list.pop_victim(), Some(("c", 1)));
    }

    #[test]
    fn clear_resets_to_fresh_sentinel() {
        let mut list = FreqList::new();
        let a = list.insert("a");
        list.insert("b");
        list.promote(a);

        list.clear();
        assert!(list.is_empty());
        assert_eq!(list.pop_victim(), None);
        list.debug_validate_invariants();

        // Usable again after the teardown.
        list.insert("c");
        assert_eq!(list.len(), 1);
        list.debug_validate_invariants();
    }

    proptest! {
        // Properties: size consistency, strictly ascending non-empty
        // buckets, recency-list integrity, and victim choice all hold under
        // arbitrary operation sequences.
        #[test]
        fn random_ops_preserve_invariants(
            ops in prop::collection::vec((0u8..4, 0u8..16), 1..300)
        ) {
            let mut list = FreqList::new();
            let mut handles: HashMap<u8, KeyHandle<u8>> = HashMap::new();

            for (op, key) in ops {
                match op {
                    0 => {
                        if !handles.contains_key(&key) {
                            handles.insert(key, list.insert(key));
                        }
                    }
                    1 => {
                        if let Some(&handle) = handles.get(&key) {
                            list.promote(handle);
                        }
                    }
                    2 => {
                        if let Some(handle) = handles.remove(&key) {
                            list.remove(handle);
                        }
                    }
                    _ => {
                        if let Some((evicted, _)) = list.pop_victim() {
                            handles.remove(&evicted);
                        }
                    }
                }
                list.debug_validate_invariants();
                prop_assert_eq!(list.len(), handles.len());
            }
        }

        #[test]
        fn promote_always_increments_by_one(touches in prop::collection::vec(0u8..8, 1..100)) {
            let mut list = FreqList::new();
            let mut handles = HashMap::new();
            let mut counts: HashMap<u8, u64> = HashMap::new();

            for key in touches {
                let handle = *handles.entry(key).or_insert_with(|| list.insert(key));
                let expected = counts.entry(key).or_insert(1);
                let promoted = list.promote(handle);
                *expected += 1;
                prop_assert_eq!(promoted, *expected);
                prop_assert_eq!(list.frequency(handle), *expected);
            }
            list.debug_validate_invariants();
        }
    }
}
