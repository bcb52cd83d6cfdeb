//! SSA verification and merge lowering.
//!
//! - [`verifier`] - single-assignment and dominance checks
//! - [`phi_edges`] - per-edge label/jump binding table
//! - [`move_resolver`] - parallel-move sequentialization with one temporary
//! - [`merge_lowering`] - replaces phis with moves on predecessor edges

pub mod merge_lowering;
pub mod move_resolver;
pub mod phi_edges;
pub mod verifier;

pub use merge_lowering::{lower_function, LoweredEdge, MergeLowering};
pub use move_resolver::{schedule_moves, Move, MoveResolver, MoveSource, ParallelMove, Schedule};
pub use phi_edges::{EdgeId, PhiBinding, PhiEdges};
pub use verifier::{verify, verify_or_panic};
