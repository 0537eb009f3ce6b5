//! Enumerator: a client-owned cursor for walking, finding-or-inserting and
//! deleting entries of one table.
//!
//! An `Enumerator` borrows nothing from its table, so several may be open on
//! the same table at once (nested loops); every operation is handed the
//! table explicitly and checks that the cursor was started on it.

use crate::entry::{Entry, EntryKey};
use crate::error::{Error, Result};
use crate::table::{Table, TableId};
use core::hash::BuildHasher;

slotmap::new_key_type! {
    /// One open enumerator session of a table.
    pub(crate) struct SessionKey;
}

/// Return code of [`Table::seek`] when the key was already present.
pub const OLD_ENTRY: i32 = 0;
/// Return code of [`Table::seek`] when the key was inserted.
pub const NEW_ENTRY: i32 = 1;
/// Return code for a failed [`Table::seek`].
pub const FATAL: i32 = -1;

/// Outcome of a successful [`Table::seek`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Seek {
    /// The key was already present; the cursor now points at it.
    Existing,
    /// A fresh entry was created; the cursor now points at it.
    Inserted,
}

impl Seek {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Existing => OLD_ENTRY,
            Self::Inserted => NEW_ENTRY,
        }
    }

    #[must_use]
    pub fn is_new(self) -> bool {
        self == Self::Inserted
    }
}

/// Folds a seek result into the three-way `0` / `1` / `-1` code.
pub fn seek_code(res: &Result<Seek>) -> i32 {
    match res {
        Ok(s) => s.code(),
        Err(e) => e.code(),
    }
}

/// Proof that a cursor was produced by `start` on a particular table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Tag {
    table: TableId,
    session: SessionKey,
}

/// Cursor over one table's entries. It borrows nothing; every call is
/// handed the table and checks that the cursor was started on it.
#[derive(Debug, Default)]
pub struct Enumerator {
    tag: Option<Tag>,
    bucket: usize,
    current: Option<EntryKey>,
}

impl Enumerator {
    /// A closed enumerator; open it with [`Table::start`].
    pub const fn new() -> Self {
        Self {
            tag: None,
            bucket: 0,
            current: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.tag.is_some()
    }

    /// Whether the cursor currently points at an entry.
    ///
    /// The entry may already have been deleted through another enumerator;
    /// see [`Enumerator::is_live`].
    pub fn is_positioned(&self) -> bool {
        self.tag.is_some() && self.current.is_some()
    }

    /// Whether the current entry is still linked into `table`.
    ///
    /// `false` when the cursor is parked on an entry another enumerator
    /// deleted. Such an entry stays readable until the last enumerator is
    /// ended, but `delete` on it only advances the cursor.
    pub fn is_live<V, S>(&self, table: &Table<V, S>) -> bool {
        self.entry(table).is_some_and(|e| e.linked)
    }

    fn entry<'t, V, S>(&self, table: &'t Table<V, S>) -> Option<&'t Entry<V>> {
        let tag = self.tag?;
        if !table.owns(tag) {
            return None;
        }
        table.entries.get(self.current?)
    }

    /// Key bytes of the current entry.
    pub fn key<'t, V, S>(&self, table: &'t Table<V, S>) -> Option<&'t [u8]> {
        self.entry(table).map(Entry::key)
    }

    pub fn keysize<V, S>(&self, table: &Table<V, S>) -> Option<usize> {
        self.key(table).map(<[u8]>::len)
    }

    /// Extension bytes stored after the current entry's key.
    pub fn ext<'t, V, S>(&self, table: &'t Table<V, S>) -> Option<&'t [u8]> {
        self.entry(table).map(Entry::ext)
    }

    pub fn extsize<V, S>(&self, table: &Table<V, S>) -> Option<usize> {
        self.ext(table).map(<[u8]>::len)
    }

    /// Record of the current entry.
    pub fn data<'t, V, S>(&self, table: &'t Table<V, S>) -> Option<&'t V> {
        self.entry(table).map(|e| &e.data)
    }

    /// Mutable record of the current entry, for in-place updates.
    pub fn data_mut<'t, V, S>(&self, table: &'t mut Table<V, S>) -> Option<&'t mut V> {
        let tag = self.tag?;
        if !table.owns(tag) {
            return None;
        }
        table.entries.get_mut(self.current?).map(|e| &mut e.data)
    }
}

impl Drop for Enumerator {
    fn drop(&mut self) {
        if self.tag.is_some() && !std::thread::panicking() {
            log::warn!(
                "Enumerator dropped while open; its table keeps deleted entries until destroyed"
            );
        }
    }
}

impl<V, S> Table<V, S> {
    fn owns(&self, tag: Tag) -> bool {
        tag.table == self.id && self.sessions.contains_key(tag.session)
    }

    fn validate(&self, e: &Enumerator) -> Result<Tag> {
        match e.tag {
            Some(tag) if self.owns(tag) => Ok(tag),
            _ => Err(Error::ForeignEnumerator),
        }
    }

    /// Moves the cursor to the first linked entry reachable from `link`,
    /// continuing with later buckets. Unlinked entries are skipped through
    /// their retained `next` links.
    fn settle(&self, e: &mut Enumerator, mut link: Option<EntryKey>) -> bool {
        loop {
            while let Some(k) = link {
                match self.entries.get(k) {
                    Some(entry) if entry.linked => {
                        e.current = Some(k);
                        return true;
                    }
                    Some(entry) => link = entry.next,
                    None => break,
                }
            }
            e.bucket += 1;
            match self.buckets.get(e.bucket) {
                Some(&head) => link = head,
                None => {
                    e.bucket = self.buckets.len();
                    e.current = None;
                    return false;
                }
            }
        }
    }

    fn open(&mut self, e: &mut Enumerator) {
        let session = self.sessions.insert(());
        e.tag = Some(Tag {
            table: self.id,
            session,
        });
        e.bucket = 0;
        e.current = None;
        let head = self.buckets.first().copied().flatten();
        self.settle(e, head);
        log::trace!(
            "Opened enumerator on table {:?} ({} open)",
            self.id,
            self.sessions.len()
        );
    }

    /// Opens `e` on this table, positioned at the first entry (or exhausted
    /// when the table is empty). Returns `e` for chaining.
    pub fn start<'e>(&mut self, e: &'e mut Enumerator) -> Result<&'e mut Enumerator> {
        if e.tag.is_some() {
            return Err(Error::EnumeratorOpen);
        }
        self.open(e);
        Ok(e)
    }

    /// Starts and returns a fresh enumerator.
    pub fn enumerator(&mut self) -> Enumerator {
        let mut e = Enumerator::new();
        self.open(&mut e);
        e
    }

    /// Advances to the next entry. Returns `false` once exhausted.
    pub fn next(&mut self, e: &mut Enumerator) -> Result<bool> {
        self.validate(e)?;
        let link = e
            .current
            .and_then(|k| self.entries.get(k))
            .and_then(|entry| entry.next);
        Ok(self.settle(e, link))
    }

    /// Unlinks the current entry and advances to the next one.
    ///
    /// The entry disappears from lookups and from [`Table::len`] at once.
    /// It is finalized and freed immediately when `e` is the only open
    /// enumerator, otherwise once the last enumerator is ended.
    pub fn delete(&mut self, e: &mut Enumerator) -> Result<()> {
        self.validate(e)?;
        let k = e.current.ok_or(Error::NotPositioned)?;
        let (hash, successor, linked) = match self.entries.get(k) {
            Some(entry) => (entry.hash, entry.next, entry.linked),
            None => return Err(Error::NotPositioned),
        };

        if linked {
            self.unlink(self.bucket_of(hash), k);
        } else {
            log::trace!("Entry already deleted through another enumerator");
        }
        self.settle(e, successor);
        if linked {
            self.retire(k);
        }
        Ok(())
    }

    /// Removes `k` from its chain. Its own `next` link is kept so cursors
    /// still parked on it can move on.
    fn unlink(&mut self, bucket: usize, k: EntryKey) {
        let successor = self.entries.get(k).and_then(|entry| entry.next);
        let mut prev = None;
        let mut link = self.buckets[bucket];
        while let Some(cur) = link {
            if cur == k {
                break;
            }
            prev = Some(cur);
            link = self.entries.get(cur).and_then(|entry| entry.next);
        }
        if link != Some(k) {
            debug_assert!(false, "linked entry missing from its chain");
            return;
        }

        match prev {
            None => self.buckets[bucket] = successor,
            Some(p) => {
                if let Some(pe) = self.entries.get_mut(p) {
                    pe.next = successor;
                }
            }
        }
        if let Some(entry) = self.entries.get_mut(k) {
            entry.linked = false;
        }
        self.live -= 1;
    }

    /// Closes `e`. When it was the last open enumerator, deferred entries are
    /// reclaimed and any pending growth runs.
    pub fn end(&mut self, e: &mut Enumerator) -> Result<()> {
        let tag = self.validate(e)?;
        self.sessions.remove(tag.session);
        e.tag = None;
        e.current = None;
        e.bucket = 0;
        log::trace!(
            "Closed enumerator on table {:?} ({} open)",
            self.id,
            self.sessions.len()
        );
        if self.sessions.is_empty() {
            self.reclaim();
            self.grow_if_needed();
        }
        Ok(())
    }
}

impl<V, S> Table<V, S>
where
    V: Default,
    S: BuildHasher,
{
    /// Finds `key`, or inserts it with `ext` copied after it and a default
    /// record. The cursor is left on the entry either way.
    ///
    /// `ext` is ignored when the key already exists. On allocation failure
    /// nothing is linked and the cursor is unchanged.
    pub fn seek(&mut self, e: &mut Enumerator, key: &[u8], ext: &[u8]) -> Result<Seek> {
        self.validate(e)?;
        let hash = self.hash_key(key);
        let bucket = self.bucket_of(hash);

        let mut tail = None;
        let mut link = self.buckets[bucket];
        while let Some(k) = link {
            let Some(entry) = self.entries.get(k) else {
                break;
            };
            if entry.matches(hash, key) {
                e.bucket = bucket;
                e.current = Some(k);
                return Ok(Seek::Existing);
            }
            tail = Some(k);
            link = entry.next;
        }

        let entry = Entry::new(hash, key, ext)?;
        let k = self.entries.insert(entry);
        match tail.and_then(|t| self.entries.get_mut(t)) {
            Some(last) => last.next = Some(k),
            None => self.buckets[bucket] = Some(k),
        }
        self.live += 1;
        if self.overloaded() {
            self.grow_pending = true;
        }

        e.bucket = bucket;
        e.current = Some(k);
        Ok(Seek::Inserted)
    }
}
