//! Reorder engine: pure order assignment for sibling sequences.
//!
//! # Responsibility
//! - Turn one mutation intent into the minimal `(identity, new order)` set
//!   that keeps a sibling sequence a permutation of `1..N`.
//! - Reject inconsistent input before anything is written.
//!
//! # Invariants
//! - No I/O; every function is deterministic and leaves its input untouched.

pub mod engine;
pub mod invariant;
pub mod plan;

pub use engine::{
    plan, plan_compact, plan_edit, plan_move, ReorderError, ReorderOp, ReorderResult,
};
pub use invariant::{check_sequence, is_contiguous, InvariantViolation};
pub use plan::{MovePlan, OrderChange, ReorderPlan};
