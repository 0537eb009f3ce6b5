//! ScopeStack: a bounded stack of tables modelling nested lexical scopes.

use crate::error::{Error, Result};
use crate::param::Param;
use crate::table::Table;
use core::hash::BuildHasher;
use hashbrown::hash_map::DefaultHashBuilder;

/// A bounded stack of tables sharing one record type.
///
/// `push` opens a new innermost scope with an empty table and `pop`
/// destroys it. Tables below the top are never touched by either.
pub struct ScopeStack<V, S = DefaultHashBuilder> {
    tables: Vec<Table<V, S>>,
    capacity: usize,
    // Builds each pushed table's configuration; `None` uses `Param::default`.
    make_param: Option<Box<dyn Fn() -> Param<V>>>,
}

impl<V, S> ScopeStack<V, S>
where
    S: BuildHasher + Default,
{
    /// Empty stack able to hold up to `capacity` tables.
    pub fn new(capacity: usize) -> Self {
        Self {
            tables: Vec::new(),
            capacity,
            make_param: None,
        }
    }

    /// Like [`ScopeStack::new`], building each pushed table's configuration
    /// with `make_param`.
    pub fn with_param_fn<F>(capacity: usize, make_param: F) -> Self
    where
        F: Fn() -> Param<V> + 'static,
    {
        Self {
            tables: Vec::new(),
            capacity,
            make_param: Some(Box::new(make_param)),
        }
    }

    /// Opens a new innermost scope and returns its index.
    pub fn push(&mut self) -> Result<usize> {
        if self.tables.len() >= self.capacity {
            return Err(Error::StackFull(self.capacity));
        }
        let param = self.make_param.as_ref().map_or_else(Param::default, |f| f());
        let table = Table::create_with_hasher(param, S::default())?;
        self.tables.push(table);
        log::trace!("Pushed scope {}", self.tables.len() - 1);
        Ok(self.tables.len() - 1)
    }
}

impl<V, S> ScopeStack<V, S> {
    /// Destroys the innermost scope.
    ///
    /// Refused, leaving the stack unchanged, while the top table has open
    /// enumerators.
    pub fn pop(&mut self) -> Result<()> {
        let top = self.tables.last().ok_or(Error::StackEmpty)?;
        let open = top.open_enumerators();
        if open > 0 {
            return Err(Error::EnumeratorsOpen(open));
        }
        if let Some(table) = self.tables.pop() {
            drop(table);
            log::trace!("Popped scope {}", self.tables.len());
        }
        Ok(())
    }

    /// Number of scopes currently on the stack.
    pub fn depth(&self) -> usize {
        self.tables.len()
    }

    /// Maximum depth.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Innermost scope's table.
    pub fn top(&self) -> Option<&Table<V, S>> {
        self.tables.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Table<V, S>> {
        self.tables.last_mut()
    }

    /// Table at depth `index`, 0 being the outermost scope.
    pub fn get(&self, index: usize) -> Option<&Table<V, S>> {
        self.tables.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Table<V, S>> {
        self.tables.get_mut(index)
    }
}

impl<V, S> ScopeStack<V, S>
where
    S: BuildHasher,
{
    /// Looks `key` up from the innermost scope outwards, returning the
    /// depth it was found at along with its record.
    pub fn resolve(&self, key: &[u8]) -> Option<(usize, &V)> {
        self.tables
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, table)| table.lookup(key).map(|v| (depth, v)))
    }
}

impl<V, S> std::fmt::Debug for ScopeStack<V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeStack")
            .field("depth", &self.tables.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Finalized;
    use std::cell::Cell;
    use std::rc::Rc;
    use test_log::test;

    fn declare(stack: &mut ScopeStack<u32>, name: &str, value: u32) {
        let table = stack.top_mut().unwrap();
        let mut e = table.enumerator();
        table.seek(&mut e, name.as_bytes(), b"\0").unwrap();
        *e.data_mut(table).unwrap() = value;
        table.end(&mut e).unwrap();
    }

    #[test]
    fn push_and_pop_respect_bounds() {
        let mut s: ScopeStack<u32> = ScopeStack::new(3);
        assert_eq!(s.push().unwrap(), 0);
        assert_eq!(s.push().unwrap(), 1);
        assert_eq!(s.push().unwrap(), 2);
        assert_eq!(s.push(), Err(Error::StackFull(3)));
        assert_eq!(s.depth(), 3);

        assert!(s.pop().is_ok());
        assert!(s.pop().is_ok());
        assert!(s.pop().is_ok());
        assert_eq!(s.pop(), Err(Error::StackEmpty));
        assert!(s.is_empty());
    }

    #[test]
    fn inner_scope_shadows_outer() {
        let mut s: ScopeStack<u32> = ScopeStack::new(4);
        s.push().unwrap();
        declare(&mut s, "x", 1);
        declare(&mut s, "y", 2);
        s.push().unwrap();
        declare(&mut s, "x", 10);

        assert_eq!(s.resolve(b"x"), Some((1, &10)));
        assert_eq!(s.resolve(b"y"), Some((0, &2)));
        assert_eq!(s.resolve(b"z"), None);

        s.pop().unwrap();
        assert_eq!(s.resolve(b"x"), Some((0, &1)));
        assert_eq!(s.get(0).unwrap().len(), 2);
        assert!(s.get(1).is_none());
    }

    #[test]
    fn pop_refused_with_open_enumerator() {
        let mut s: ScopeStack<u32> = ScopeStack::new(2);
        s.push().unwrap();
        let table = s.top_mut().unwrap();
        let mut e = table.enumerator();
        assert_eq!(s.pop(), Err(Error::EnumeratorsOpen(1)));
        assert_eq!(s.depth(), 1);
        s.top_mut().unwrap().end(&mut e).unwrap();
        assert!(s.pop().is_ok());
    }

    #[test]
    fn huge_bound_allocates_lazily() {
        let mut s: ScopeStack<u32> = ScopeStack::new(usize::MAX);
        assert_eq!(s.capacity(), usize::MAX);
        assert_eq!(s.push().unwrap(), 0);
        declare(&mut s, "x", 7);
        assert_eq!(s.resolve(b"x"), Some((0, &7)));
    }

    #[test]
    fn pop_finalizes_scope_entries() {
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let mut s: ScopeStack<u32> = ScopeStack::with_param_fn(2, move || {
            let c = c.clone();
            Param::new().finalize(move |_: Finalized<'_, u32>| c.set(c.get() + 1))
        });
        s.push().unwrap();
        declare(&mut s, "a", 1);
        s.push().unwrap();
        declare(&mut s, "b", 2);
        declare(&mut s, "c", 3);

        s.pop().unwrap();
        assert_eq!(count.get(), 2);
        s.pop().unwrap();
        assert_eq!(count.get(), 3);
    }
}
