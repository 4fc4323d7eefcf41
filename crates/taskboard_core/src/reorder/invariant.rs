//! Sibling sequence invariant checks.

use crate::model::ordered::{ItemId, SiblingEntry};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Ways a sibling sequence can break the `1..N` permutation invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The same identity appears more than once.
    DuplicateId(ItemId),
    /// Two siblings share one order value.
    DuplicateOrder(u32),
    /// The sequence skips or reorders a rank.
    NonContiguous { expected: u32, found: u32 },
}

impl Display for InvariantViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId(id) => write!(f, "item {id} appears more than once"),
            Self::DuplicateOrder(order) => write!(f, "order {order} is used more than once"),
            Self::NonContiguous { expected, found } => {
                write!(f, "expected order {expected}, found {found}")
            }
        }
    }
}

impl Error for InvariantViolation {}

/// Verifies that `siblings` is sorted and its orders are exactly `1..=N`.
pub fn check_sequence(siblings: &[SiblingEntry]) -> Result<(), InvariantViolation> {
    check_unique_ids(siblings)?;
    for (index, entry) in siblings.iter().enumerate() {
        let expected = index as u32 + 1;
        if entry.order == expected {
            continue;
        }
        if index > 0 && siblings[index - 1].order == entry.order {
            return Err(InvariantViolation::DuplicateOrder(entry.order));
        }
        return Err(InvariantViolation::NonContiguous {
            expected,
            found: entry.order,
        });
    }
    Ok(())
}

/// Returns whether `siblings` satisfies the ordering invariant.
pub fn is_contiguous(siblings: &[SiblingEntry]) -> bool {
    check_sequence(siblings).is_ok()
}

pub(crate) fn check_unique_ids(siblings: &[SiblingEntry]) -> Result<(), InvariantViolation> {
    let mut seen = HashSet::with_capacity(siblings.len());
    for entry in siblings {
        if !seen.insert(entry.id) {
            return Err(InvariantViolation::DuplicateId(entry.id));
        }
    }
    Ok(())
}
