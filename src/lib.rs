//! hashtb: a single-threaded, chained hash table keyed by byte strings,
//! with client-owned enumerator cursors that may delete while iterating,
//! deferred reclamation of deleted entries, and a bounded scope stack of
//! such tables for symbol-table style nesting.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a find-or-insert table whose cursors stay valid across deletes
//!   made by any cursor open on the same table, without reference counting
//!   individual entries.
//! - Layers:
//!   - `entry`: one record `V` plus a single owned buffer holding the key
//!     followed by its extension bytes, the cached digest and the chain
//!     link.
//!   - `Table<V, S>`: bucket array of chains over a generational
//!     `SlotMap` arena; lookup, rehash and growth.
//!   - `Enumerator`: cursor value carrying a `(table id, session)` tag;
//!     start/next/seek/delete/end are `Table` methods taking the cursor.
//!   - `reclaim`: per-table pending queue of unlinked entries, drained
//!     when the last enumerator is ended.
//!   - `ScopeStack<V, S>`: bounded stack of tables.
//!
//! Constraints
//! - Single-threaded; no internal locking. Mutating operations take
//!   `&mut Table`, so exclusive access is checked by the borrow checker.
//! - Several enumerators may be open on one table at once. They hold no
//!   borrows, so nested loops work; each call re-validates the cursor tag
//!   and rejects foreign or ended cursors with `Error::ForeignEnumerator`.
//! - The bucket array is never resized while an enumerator is open.
//!   Growth triggered by an insertion waits for the last `end`.
//!
//! Deletion while enumerating
//! - `delete` unlinks the current entry at once (lookups and `len` see the
//!   change immediately) and advances the cursor.
//! - The unlinked entry keeps its own `next` link. Another cursor parked on
//!   it can still read it and move forward; `next` skips unlinked entries.
//! - If the deleting cursor is the only one open the entry is finalized and
//!   freed immediately, otherwise it is queued and freed, in unlink order,
//!   on the last `end`.
//! - Entry keys are generational, so a link to a freed entry never resolves
//!   to a newer entry that reused its slot.
//!
//! Return codes
//! - `seek` returns `Seek::Existing` / `Seek::Inserted`, or an `Error`;
//!   `seek_code` folds these into `0` / `1` / `-1`.
//!
//! Notes and non-goals
//! - No persistence and no cross-thread sharing.
//! - Keys are immutable after insertion; there is no key update.
//! - A null key cannot be expressed (`&[u8]`), so that usage fault does
//!   not exist here.

mod entry;
mod enumerator;
mod error;
mod param;
mod reclaim;
mod scope_stack;
mod table;
mod table_proptest;

// Public surface
pub use entry::Finalized;
pub use enumerator::{seek_code, Enumerator, Seek, FATAL, NEW_ENTRY, OLD_ENTRY};
pub use error::{Error, Result};
pub use param::{Finalize, Param, MAX_ORDERS};
pub use scope_stack::ScopeStack;
pub use table::{Iter, Table, MAX_LOAD, MAX_STEP_ORDER, MIN_ORDER};
