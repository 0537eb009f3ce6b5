//! Entry encoding: a typed record plus one owned buffer holding the key
//! immediately followed by its extension bytes.

use crate::error::Result;

slotmap::new_key_type! {
    /// Generational reference to an entry in a table's arena.
    pub(crate) struct EntryKey;
}

#[derive(Debug)]
pub(crate) struct Entry<V> {
    pub(crate) next: Option<EntryKey>,
    pub(crate) hash: u64,
    keysize: usize,
    bytes: Box<[u8]>,
    pub(crate) data: V,
    /// Cleared once the entry is unlinked from its bucket chain.
    pub(crate) linked: bool,
}

impl<V: Default> Entry<V> {
    /// Copies `key` and `ext` into a single buffer. Allocation failure is
    /// reported instead of aborting so that `seek` can surface it.
    pub(crate) fn new(hash: u64, key: &[u8], ext: &[u8]) -> Result<Self> {
        let total = key
            .len()
            .checked_add(ext.len())
            .ok_or(crate::Error::OutOfMemory)?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(total)?;
        buf.extend_from_slice(key);
        buf.extend_from_slice(ext);
        Ok(Self {
            next: None,
            hash,
            keysize: key.len(),
            bytes: buf.into_boxed_slice(),
            data: V::default(),
            linked: true,
        })
    }
}

impl<V> Entry<V> {
    #[inline]
    pub(crate) fn key(&self) -> &[u8] {
        &self.bytes[..self.keysize]
    }

    #[inline]
    pub(crate) fn ext(&self) -> &[u8] {
        &self.bytes[self.keysize..]
    }

    /// Exact match on `(keysize, key bytes)`; the cached hash is checked first.
    #[inline]
    pub(crate) fn matches(&self, hash: u64, key: &[u8]) -> bool {
        self.hash == hash && self.keysize == key.len() && self.key() == key
    }
}

/// View of an entry handed to the finalize callback right before the
/// entry is released.
pub struct Finalized<'a, V> {
    key: &'a [u8],
    ext: &'a [u8],
    data: &'a mut V,
}

impl<'a, V> Finalized<'a, V> {
    pub(crate) fn new(entry: &'a mut Entry<V>) -> Self {
        let Entry {
            keysize,
            bytes,
            data,
            ..
        } = entry;
        let (key, ext) = bytes.split_at(*keysize);
        Self { key, ext, data }
    }

    /// Key bytes of the entry.
    pub fn key(&self) -> &[u8] {
        self.key
    }

    /// Extension bytes stored after the key.
    pub fn ext(&self) -> &[u8] {
        self.ext
    }

    /// The entry's record.
    pub fn data(&self) -> &V {
        self.data
    }

    /// The entry's record, for moving out owned resources.
    pub fn data_mut(&mut self) -> &mut V {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn key_and_ext_share_one_buffer() {
        let e: Entry<u32> = Entry::new(7, b"abc", b"\0").unwrap();
        assert_eq!(e.key(), b"abc");
        assert_eq!(e.ext(), b"\0");
        assert_eq!(e.bytes.len(), 4);
        assert_eq!(e.data, 0);
        assert!(e.linked);
        assert!(e.next.is_none());
    }

    #[test]
    fn matches_requires_same_hash_size_and_bytes() {
        let e: Entry<()> = Entry::new(1, b"ab", b"cd").unwrap();
        assert!(e.matches(1, b"ab"));
        assert!(!e.matches(2, b"ab"));
        // Extension bytes never take part in the comparison.
        assert!(!e.matches(1, b"abcd"));
        assert!(!e.matches(1, b"a"));
        assert!(!e.matches(1, b"ax"));
    }

    #[test]
    fn empty_key_is_a_valid_key() {
        let e: Entry<u8> = Entry::new(0, b"", b"xyz").unwrap();
        assert_eq!(e.key(), b"");
        assert_eq!(e.ext(), b"xyz");
        assert!(e.matches(0, b""));
    }

    #[test]
    fn finalized_view_exposes_key_ext_and_data() {
        let mut e: Entry<String> = Entry::new(3, b"k", b"e").unwrap();
        e.data.push_str("payload");
        let mut f = Finalized::new(&mut e);
        assert_eq!(f.key(), b"k");
        assert_eq!(f.ext(), b"e");
        assert_eq!(f.data(), "payload");
        let taken = std::mem::take(f.data_mut());
        assert_eq!(taken, "payload");
        assert!(e.data.is_empty());
    }
}
