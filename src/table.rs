//! Table: bucket array of singly linked chains over a generational entry arena.

use crate::entry::{Entry, EntryKey};
use crate::enumerator::SessionKey;
use crate::error::{Error, Result};
use crate::param::Param;
use core::hash::BuildHasher;
use hashbrown::hash_map::DefaultHashBuilder;
use slotmap::SlotMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// log2 of the bucket count of a table created with growth order 0.
pub const MIN_ORDER: u8 = 3;

/// Average chain length above which the bucket array grows.
pub const MAX_LOAD: usize = 2;

/// Cap on the growth order used for the automatic growth step.
pub const MAX_STEP_ORDER: u8 = 3;

/// Process-unique table identity carried by enumerator tags.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct TableId(u64);

impl TableId {
    fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A chained hash table keyed by byte strings, holding one `V` record per key.
///
/// Entries are found or created through an [`Enumerator`](crate::Enumerator)
/// opened with [`Table::start`]; plain reads go through [`Table::lookup`].
/// The record size (`item_size`) is `size_of::<V>()` and fresh records are
/// `V::default()`.
pub struct Table<V, S = DefaultHashBuilder> {
    pub(crate) id: TableId,
    hasher: S,
    pub(crate) buckets: Vec<Option<EntryKey>>,
    // Live and pending entries; pending ones are unlinked but not yet freed.
    pub(crate) entries: SlotMap<EntryKey, Entry<V>>,
    pub(crate) live: usize,
    pub(crate) sessions: SlotMap<SessionKey, ()>,
    pub(crate) pending: Vec<EntryKey>,
    pub(crate) param: Param<V>,
    pub(crate) grow_pending: bool,
}

fn initial_buckets(orders: u8) -> usize {
    1usize << (MIN_ORDER + orders)
}

impl<V> Table<V> {
    /// Empty table with default configuration.
    pub fn new() -> Self {
        Self::with_param(Param::default())
    }

    /// Empty table with the given configuration.
    pub fn with_param(param: Param<V>) -> Self {
        Self::with_hasher(param, DefaultHashBuilder::default())
    }

    /// Empty table; allocation failure is reported instead of aborting.
    pub fn create(param: Param<V>) -> Result<Self> {
        Self::create_with_hasher(param, DefaultHashBuilder::default())
    }
}

impl<V> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> Table<V, S> {
    fn assemble(param: Param<V>, hasher: S, buckets: Vec<Option<EntryKey>>) -> Self {
        let table = Self {
            id: TableId::fresh(),
            hasher,
            buckets,
            entries: SlotMap::with_key(),
            live: 0,
            sessions: SlotMap::with_key(),
            pending: Vec::new(),
            param,
            grow_pending: false,
        };
        log::trace!(
            "Created table {:?} with {} buckets",
            table.id,
            table.buckets.len()
        );
        table
    }

    /// Empty table digesting keys with `hasher`.
    pub fn with_hasher(param: Param<V>, hasher: S) -> Self {
        let n = initial_buckets(param.get_orders());
        Self::assemble(param, hasher, vec![None; n])
    }

    /// Fallible form of [`Table::with_hasher`].
    pub fn create_with_hasher(param: Param<V>, hasher: S) -> Result<Self> {
        let n = initial_buckets(param.get_orders());
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(n)?;
        buckets.resize(n, None);
        Ok(Self::assemble(param, hasher, buckets))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Current length of the bucket array.
    pub fn n_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Number of enumerators currently open on this table.
    pub fn open_enumerators(&self) -> usize {
        self.sessions.len()
    }

    /// Number of entries unlinked but awaiting reclamation.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Size in bytes of the per-entry record.
    pub fn item_size(&self) -> usize {
        core::mem::size_of::<V>()
    }

    /// Configuration the table was created with.
    pub fn param(&self) -> &Param<V> {
        &self.param
    }

    #[inline]
    pub(crate) fn bucket_of(&self, hash: u64) -> usize {
        // The bucket count is always a power of two.
        (hash as usize) & (self.buckets.len() - 1)
    }

    /// Destroys the table, finalizing every pending entry (in unlink order)
    /// and then every live entry.
    ///
    /// Refused while enumerators are open; the table is handed back intact.
    pub fn destroy(self) -> core::result::Result<(), Self> {
        if !self.sessions.is_empty() {
            log::warn!(
                "Refusing to destroy table {:?}: {} enumerators still open",
                self.id,
                self.sessions.len()
            );
            return Err(self);
        }
        drop(self);
        Ok(())
    }

    /// Rebuilds the bucket array with `max(1, n_buckets)` rounded up to a
    /// power of two chains.
    ///
    /// Does nothing while any enumerator is open.
    pub fn rehash(&mut self, n_buckets: usize) -> Result<()> {
        if !self.sessions.is_empty() {
            log::trace!(
                "Ignoring rehash of table {:?}: {} enumerators open",
                self.id,
                self.sessions.len()
            );
            return Ok(());
        }
        let n = n_buckets
            .max(1)
            .checked_next_power_of_two()
            .ok_or(Error::OutOfMemory)?;
        self.relink(n)?;
        self.grow_pending = false;
        Ok(())
    }

    /// Moves every live entry into a fresh array of `n` chains using the
    /// cached digests. On allocation failure the table is unchanged.
    fn relink(&mut self, n: usize) -> Result<()> {
        debug_assert!(n.is_power_of_two());
        debug_assert!(self.pending.is_empty());

        let mut fresh: Vec<Option<EntryKey>> = Vec::new();
        fresh.try_reserve_exact(n)?;
        fresh.resize(n, None);

        let mask = n - 1;
        let old = core::mem::replace(&mut self.buckets, fresh);
        for head in old {
            let mut link = head;
            while let Some(k) = link {
                let Some(entry) = self.entries.get_mut(k) else {
                    break;
                };
                link = entry.next;
                let idx = (entry.hash as usize) & mask;
                entry.next = self.buckets[idx];
                self.buckets[idx] = Some(k);
            }
        }

        log::trace!(
            "Rehashed {} entries of table {:?} into {n} buckets",
            self.live,
            self.id
        );
        Ok(())
    }

    pub(crate) fn overloaded(&self) -> bool {
        self.live > self.buckets.len().saturating_mul(MAX_LOAD)
    }

    /// Runs growth recorded by insertions; only called with no enumerator open.
    pub(crate) fn grow_if_needed(&mut self) {
        if !self.grow_pending {
            return;
        }
        if !self.overloaded() {
            self.grow_pending = false;
            return;
        }

        let factor = 1usize << (1 + self.param.get_orders().min(MAX_STEP_ORDER));
        let mut n = self.buckets.len();
        while self.live > n.saturating_mul(MAX_LOAD) {
            match n.checked_mul(factor) {
                Some(next) => n = next,
                None => break,
            }
        }
        if n == self.buckets.len() {
            return;
        }

        match self.relink(n) {
            Ok(()) => self.grow_pending = false,
            Err(e) => log::error!(
                "Growing table {:?} to {n} buckets failed, retrying later: {e}",
                self.id
            ),
        }
    }

    /// Read-only iterator over live entries as `(key, ext, record)`.
    ///
    /// This does not open an enumerator session.
    pub fn iter(&self) -> Iter<'_, V, S> {
        Iter {
            table: self,
            bucket: 0,
            link: None,
        }
    }
}

impl<V, S> Table<V, S>
where
    S: BuildHasher,
{
    /// Digest of `key` used to pick its bucket.
    pub fn hash_key(&self, key: &[u8]) -> u64 {
        self.hasher.hash_one(key)
    }

    pub(crate) fn find(&self, hash: u64, key: &[u8]) -> Option<EntryKey> {
        let mut link = self.buckets[self.bucket_of(hash)];
        while let Some(k) = link {
            let entry = self.entries.get(k)?;
            if entry.matches(hash, key) {
                return Some(k);
            }
            link = entry.next;
        }
        None
    }

    /// Record stored under `key`, if any.
    pub fn lookup(&self, key: &[u8]) -> Option<&V> {
        let k = self.find(self.hash_key(key), key)?;
        self.entries.get(k).map(|e| &e.data)
    }

    /// Mutable record stored under `key`, if any.
    pub fn lookup_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        let k = self.find(self.hash_key(key), key)?;
        self.entries.get_mut(k).map(|e| &mut e.data)
    }

    /// Whether `key` has a live entry.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.find(self.hash_key(key), key).is_some()
    }

    /// Extension bytes stored with `key`, if present.
    pub fn lookup_ext(&self, key: &[u8]) -> Option<&[u8]> {
        let k = self.find(self.hash_key(key), key)?;
        self.entries.get(k).map(Entry::ext)
    }
}

impl<V, S> Drop for Table<V, S> {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            log::warn!(
                "Dropping table {:?} with {} enumerators still open",
                self.id,
                self.sessions.len()
            );
        }
        self.release_all();
    }
}

impl<V, S> std::fmt::Debug for Table<V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("len", &self.live)
            .field("n_buckets", &self.buckets.len())
            .field("open_enumerators", &self.sessions.len())
            .field("pending", &self.pending.len())
            .field("param", &self.param)
            .finish()
    }
}

/// Iterator over live entries of a [`Table`].
pub struct Iter<'a, V, S> {
    table: &'a Table<V, S>,
    bucket: usize,
    link: Option<EntryKey>,
}

impl<'a, V, S> Iterator for Iter<'a, V, S> {
    type Item = (&'a [u8], &'a [u8], &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(k) = self.link {
                let entry = self.table.entries.get(k)?;
                self.link = entry.next;
                return Some((entry.key(), entry.ext(), &entry.data));
            }
            self.link = *self.table.buckets.get(self.bucket)?;
            self.bucket += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use test_log::test;

    fn insert<V: Default, S: BuildHasher>(t: &mut Table<V, S>, key: &[u8]) {
        let mut e = t.enumerator();
        t.seek(&mut e, key, b"").unwrap();
        t.end(&mut e).unwrap();
    }

    /// Forces every key into one chain.
    #[derive(Clone, Default)]
    struct ConstBuildHasher;
    struct ConstHasher;
    impl BuildHasher for ConstBuildHasher {
        type Hasher = ConstHasher;
        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }
    impl core::hash::Hasher for ConstHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            0
        }
    }

    #[test]
    fn new_table_is_empty_with_initial_buckets() {
        let t: Table<u32> = Table::new();
        assert_eq!(t.len(), 0);
        assert!(t.is_empty());
        assert_eq!(t.n_buckets(), 1 << MIN_ORDER);
        assert_eq!(t.open_enumerators(), 0);
        assert_eq!(t.pending(), 0);
        assert_eq!(t.item_size(), 4);
    }

    #[test]
    fn orders_scale_initial_buckets() {
        let t: Table<u8> = Table::create(Param::new().orders(2)).unwrap();
        assert_eq!(t.n_buckets(), 1 << (MIN_ORDER + 2));
        assert_eq!(t.param().get_orders(), 2);
    }

    #[test]
    fn lookup_hits_and_misses() {
        let mut t: Table<u32> = Table::new();
        insert(&mut t, b"abc");
        *t.lookup_mut(b"abc").unwrap() = 5;
        assert_eq!(t.lookup(b"abc"), Some(&5));
        assert!(t.contains_key(b"abc"));
        assert_eq!(t.lookup(b"ab"), None);
        assert_eq!(t.lookup(b"abcd"), None);
        assert!(!t.contains_key(b"xyz"));
    }

    #[test]
    fn collisions_resolve_by_key_bytes() {
        let mut t: Table<u32, ConstBuildHasher> =
            Table::with_hasher(Param::new(), ConstBuildHasher);
        for (i, k) in [&b"a"[..], b"b", b"c"].iter().enumerate() {
            let mut e = t.enumerator();
            t.seek(&mut e, k, b"").unwrap();
            *e.data_mut(&mut t).unwrap() = i as u32;
            t.end(&mut e).unwrap();
        }
        assert_eq!(t.lookup(b"a"), Some(&0));
        assert_eq!(t.lookup(b"b"), Some(&1));
        assert_eq!(t.lookup(b"c"), Some(&2));
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn growth_runs_after_last_enumerator_closes() {
        let mut t: Table<u32> = Table::new();
        let initial = t.n_buckets();
        let mut e = t.enumerator();
        for i in 0..100u32 {
            t.seek(&mut e, &i.to_be_bytes(), b"").unwrap();
        }
        // Still open: the bucket array must not move under the cursor.
        assert_eq!(t.n_buckets(), initial);
        assert!(t.grow_pending);
        t.end(&mut e).unwrap();

        assert!(t.n_buckets() > initial);
        assert!(t.len() <= t.n_buckets() * MAX_LOAD);
        assert!(!t.grow_pending);
        for i in 0..100u32 {
            assert!(t.contains_key(&i.to_be_bytes()));
        }
    }

    #[test]
    fn rehash_is_ignored_while_enumerating() {
        let mut t: Table<u32> = Table::new();
        let mut e = t.enumerator();
        t.rehash(1024).unwrap();
        assert_eq!(t.n_buckets(), 1 << MIN_ORDER);
        t.end(&mut e).unwrap();

        t.rehash(1000).unwrap();
        assert_eq!(t.n_buckets(), 1024);
    }

    #[test]
    fn rehash_preserves_entries_and_can_shrink() {
        let mut t: Table<u32> = Table::new();
        for i in 0..50u32 {
            insert(&mut t, format!("key{i}").as_bytes());
        }
        t.rehash(0).unwrap();
        assert_eq!(t.n_buckets(), 1);
        assert_eq!(t.len(), 50);
        for i in 0..50u32 {
            assert!(t.contains_key(format!("key{i}").as_bytes()));
        }
        t.rehash(3).unwrap();
        assert_eq!(t.n_buckets(), 4);
        assert_eq!(t.iter().count(), 50);
    }

    #[test]
    fn rehash_overflow_is_reported() {
        let mut t: Table<u8> = Table::new();
        assert_eq!(t.rehash(usize::MAX), Err(Error::OutOfMemory));
        assert_eq!(t.n_buckets(), 1 << MIN_ORDER);
    }

    #[test]
    fn iter_yields_each_live_entry_once() {
        let mut t: Table<u32> = Table::new();
        let mut e = t.enumerator();
        t.seek(&mut e, b"a", b"1").unwrap();
        t.seek(&mut e, b"b", b"2").unwrap();
        t.seek(&mut e, b"c", b"3").unwrap();
        t.end(&mut e).unwrap();

        let seen: BTreeSet<(Vec<u8>, Vec<u8>)> =
            t.iter().map(|(k, x, _)| (k.to_vec(), x.to_vec())).collect();
        let expected: BTreeSet<(Vec<u8>, Vec<u8>)> = [("a", "1"), ("b", "2"), ("c", "3")]
            .iter()
            .map(|(k, x)| (k.as_bytes().to_vec(), x.as_bytes().to_vec()))
            .collect();
        assert_eq!(seen, expected);
        assert_eq!(t.lookup_ext(b"b"), Some(&b"2"[..]));
    }

    #[test]
    fn destroy_refused_while_enumerating() {
        let mut t: Table<u32> = Table::new();
        let mut e = t.enumerator();
        let mut t = match t.destroy() {
            Err(t) => t,
            Ok(()) => panic!("destroy must be refused with an open enumerator"),
        };
        t.end(&mut e).unwrap();
        assert!(t.destroy().is_ok());
    }

    #[test]
    fn hash_key_is_stable_per_table() {
        let t: Table<u8> = Table::new();
        assert_eq!(t.hash_key(b"same"), t.hash_key(b"same"));
    }

    #[test]
    fn table_ids_are_unique() {
        let a: Table<u8> = Table::new();
        let b: Table<u8> = Table::new();
        assert_ne!(a.id, b.id);
    }
}
