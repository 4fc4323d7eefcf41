//! Board, column and task domain model.
//!
//! # Responsibility
//! - Define the records that flow between store, dispatcher and views.
//! - Keep field rules next to the types they constrain.
//!
//! # Invariants
//! - Every ordered item is identified by a stable `ItemId`.
//! - Ordering is expressed only through `OrderedItem::order` within one
//!   `CollectionKey`.

pub mod board;
pub mod column;
pub mod item;
pub mod ordered;
pub mod task;
pub mod validation;
