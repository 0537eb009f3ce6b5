//! Table configuration: finalize callback and growth-order hint.

use crate::entry::Finalized;

/// Largest accepted growth-order hint.
pub const MAX_ORDERS: u8 = 16;

/// Cleanup hook run exactly once per entry, immediately before the entry
/// is released.
///
/// Implemented for every `FnMut(Finalized<'_, V>)`, so a closure capturing
/// its own context is the usual way to supply one.
pub trait Finalize<V> {
    /// Releases whatever external resources `entry` owns.
    fn finalize(&mut self, entry: Finalized<'_, V>);
}

impl<V, F> Finalize<V> for F
where
    F: FnMut(Finalized<'_, V>),
{
    #[inline]
    fn finalize(&mut self, entry: Finalized<'_, V>) {
        self(entry)
    }
}

/// Saved per-table configuration.
pub struct Param<V> {
    finalize: Option<Box<dyn Finalize<V>>>,
    orders: u8,
}

impl<V> Default for Param<V> {
    fn default() -> Self {
        Self {
            finalize: None,
            orders: 0,
        }
    }
}

impl<V> std::fmt::Debug for Param<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Param")
            .field("finalize", &self.finalize.is_some())
            .field("orders", &self.orders)
            .finish()
    }
}

impl<V> Param<V> {
    /// Default configuration: no finalize callback, growth order 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the finalize callback.
    ///
    /// The closure receives a view of the key, extension bytes and record
    /// of each entry as it is freed, whether by `delete`, by deferred
    /// reclamation or by destroying the table.
    #[must_use]
    pub fn finalize<F>(mut self, f: F) -> Self
    where
        F: FnMut(Finalized<'_, V>) + 'static,
    {
        self.finalize = Some(Box::new(f));
        self
    }

    /// Sets the finalize callback from a [`Finalize`] implementor.
    #[must_use]
    pub fn finalizer<T>(mut self, t: T) -> Self
    where
        T: Finalize<V> + 'static,
    {
        self.finalize = Some(Box::new(t));
        self
    }

    /// Sets the growth-order hint.
    ///
    /// A table starts with `2^(3 + orders)` buckets, and each automatic
    /// growth multiplies the bucket count by `2^(1 + min(orders, 3))`.
    ///
    /// Values above [`MAX_ORDERS`] are clamped.
    ///
    /// Defaults to 0.
    #[must_use]
    pub fn orders(mut self, orders: u8) -> Self {
        self.orders = orders.min(MAX_ORDERS);
        self
    }

    /// Growth-order hint in effect.
    #[must_use]
    pub fn get_orders(&self) -> u8 {
        self.orders
    }

    /// Whether a finalize callback is configured.
    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.finalize.is_some()
    }

    pub(crate) fn run_finalize(&mut self, entry: Finalized<'_, V>) {
        if let Some(f) = self.finalize.as_mut() {
            f.finalize(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use std::cell::RefCell;
    use std::rc::Rc;
    use test_log::test;

    #[test]
    fn defaults() {
        let p: Param<u32> = Param::new();
        assert_eq!(p.get_orders(), 0);
        assert!(!p.has_finalizer());
    }

    #[test]
    fn orders_are_clamped() {
        let p: Param<u32> = Param::new().orders(200);
        assert_eq!(p.get_orders(), MAX_ORDERS);
        let p: Param<u32> = Param::new().orders(2);
        assert_eq!(p.get_orders(), 2);
    }

    #[test]
    fn closure_finalizer_sees_entry() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut p: Param<u32> = Param::new().finalize(move |e: Finalized<'_, u32>| {
            sink.borrow_mut().push((e.key().to_vec(), *e.data()));
        });
        assert!(p.has_finalizer());

        let mut entry: Entry<u32> = Entry::new(0, b"x", b"").unwrap();
        entry.data = 9;
        p.run_finalize(Finalized::new(&mut entry));
        assert_eq!(*seen.borrow(), vec![(b"x".to_vec(), 9)]);
    }

    #[test]
    fn trait_finalizer_keeps_its_own_state() {
        struct Tally(Rc<RefCell<usize>>);
        impl Finalize<u8> for Tally {
            fn finalize(&mut self, _entry: Finalized<'_, u8>) {
                *self.0.borrow_mut() += 1;
            }
        }

        let n = Rc::new(RefCell::new(0));
        let mut p: Param<u8> = Param::new().finalizer(Tally(n.clone()));
        let mut entry: Entry<u8> = Entry::new(0, b"a", b"").unwrap();
        p.run_finalize(Finalized::new(&mut entry));
        p.run_finalize(Finalized::new(&mut entry));
        assert_eq!(*n.borrow(), 2);
    }
}
