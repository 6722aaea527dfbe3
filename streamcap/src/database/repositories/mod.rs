//! Repository traits and their SQLx implementations.

mod stats;
mod targets;

pub use stats::{SqlxStatRepository, StatKind, StatRepository};
pub use targets::{SortKey, SqlxTargetRepository, TargetRepository};
