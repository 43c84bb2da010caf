//! # Cells, owners, and transactions
//!
//! `glint-core` holds the pieces of the runtime that know nothing about
//! components:
//!
//! - [`Cell<T>`]: tracked storage. Reads inside [`track`] are recorded,
//!   writes schedule the observers that read it.
//! - [`Derived<T>`]: memoised computation over cells.
//! - [`Owner`]: cleanup scope; disposing an owner disposes its children.
//! - [`TransactionTracker`]: the single "currently rendering" flag, reset by
//!   a drop guard.
//! - [`Document`]: the in-memory DOM the renderer writes into.
//!
//! ```rust
//! use glint_core::*;
//!
//! let count = cell(0);
//! let seen = cell(Vec::<i32>::new());
//!
//! let obs = new_observer(|| log::debug!("count changed"));
//! track(obs, || count.get());
//! count.set(1).unwrap(); // schedules `obs`, does not re-run anything
//! seen.update(|v| v.push(1)).unwrap();
//! assert_eq!(count.peek(), 1);
//! ```

pub mod cell;
pub mod derived;
pub mod dom;
pub mod error;
pub mod owner;
pub mod state;
pub mod transaction;

pub use cell::*;
pub use derived::*;
pub use dom::{Document, Mutation, NodeId, NodeKind};
pub use error::*;
pub use owner::*;
pub use state::*;
pub use transaction::*;
