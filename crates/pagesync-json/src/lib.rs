#![forbid(unsafe_code)]

//! JSON value tree for pagesync.
//!
//! A [`Document`] is an arena of [`Node`]s. Every node is an object, an array
//! or a scalar, and records the handle of the container that owns it. Handles
//! ([`NodeId`]) carry a generation so a handle to a removed node resolves to
//! "absent" rather than to whatever later reuses its slot.
//!
//! # Invariants
//!
//! 1. A node has at most one parent. Attaching a node elsewhere detaches it
//!    from its previous container first.
//! 2. For every node `n` reachable from the root, `doc.get(&doc.path(n))`
//!    resolves to `n`.
//! 3. `update_token_value` between two scalars never changes node identity.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Path through a scalar | Shape mismatch | `None` |
//! | Index out of range | Stale or bad path | `None` |
//! | Stale handle | Node was removed | `None` / `false` |

pub mod document;
pub mod node;
pub mod path;

pub use document::{Document, PathError};
pub use node::{Node, NodeId, NodeKind, Scalar};
pub use path::{InsertTarget, insert_target, normalize_path, segments};
