//! Pure order-assignment functions.
//!
//! # Responsibility
//! - Compute the minimal order changes for insert, delete, reposition,
//!   cross-parent move and repair.
//!
//! # Invariants
//! - Inputs are never mutated; the same input always yields the same plan.
//! - Input sequences must satisfy `check_sequence` (except for `plan_compact`,
//!   which exists to repair sequences that do not).
//! - Applying a plan to a valid input yields a valid sequence.

use crate::model::item::{BoardItem, ItemPatch};
use crate::model::ordered::{ItemId, SiblingEntry};
use crate::model::validation::ValidationError;
use crate::reorder::invariant::{check_sequence, check_unique_ids, InvariantViolation};
use crate::reorder::plan::{MovePlan, OrderChange, ReorderPlan};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ReorderResult<T> = Result<T, ReorderError>;

/// Errors detected before any write is planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderError {
    /// Target identity is absent from the sequence.
    NotFound(ItemId),
    /// Input sequence breaks the ordering invariant.
    InvariantViolation(InvariantViolation),
}

impl Display for ReorderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "item not found in sibling sequence: {id}"),
            Self::InvariantViolation(violation) => {
                write!(f, "sibling sequence violates ordering invariant: {violation}")
            }
        }
    }
}

impl Error for ReorderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound(_) => None,
            Self::InvariantViolation(violation) => Some(violation),
        }
    }
}

impl From<InvariantViolation> for ReorderError {
    fn from(value: InvariantViolation) -> Self {
        Self::InvariantViolation(value)
    }
}

/// Single-sequence operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOp {
    /// Add `id`; appended when `rank` is `None`, otherwise placed at `rank`
    /// clamped into `1..=N+1`.
    Insert { id: ItemId, rank: Option<u32> },
    /// Remove `id` and close its slot.
    Delete { id: ItemId },
    /// Move `id` to `rank` (clamped into `1..=N`) within the same sequence.
    Reposition { id: ItemId, rank: u32 },
}

/// Plans `op` against `siblings` (sorted by order).
pub fn plan(siblings: &[SiblingEntry], op: ReorderOp) -> ReorderResult<ReorderPlan> {
    check_sequence(siblings)?;
    match op {
        ReorderOp::Insert { id, rank } => plan_insert(siblings, id, rank),
        ReorderOp::Delete { id } => plan_delete(siblings, id),
        ReorderOp::Reposition { id, rank } => plan_reposition(siblings, id, rank),
    }
}

/// Plans moving `id` from `source` into `destination`.
///
/// Composes a delete from the source with an insert into the destination;
/// `rank = None` appends.
pub fn plan_move(
    source: &[SiblingEntry],
    destination: &[SiblingEntry],
    id: ItemId,
    rank: Option<u32>,
) -> ReorderResult<MovePlan> {
    let source_plan = plan(source, ReorderOp::Delete { id })?;
    let destination_plan = plan(destination, ReorderOp::Insert { id, rank })?;
    Ok(MovePlan {
        item: id,
        source: source_plan,
        destination: destination_plan,
    })
}

/// Renumbers a possibly broken sequence into `1..=N`.
///
/// Siblings are ranked by `(order, id)`, so ties resolve deterministically.
/// A valid sequence yields an empty plan.
pub fn plan_compact(siblings: &[SiblingEntry]) -> ReorderResult<ReorderPlan> {
    check_unique_ids(siblings)?;
    let mut ranked = siblings.to_vec();
    ranked.sort_by_key(|entry| (entry.order, entry.id));
    let changes = ranked
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let target = index as u32 + 1;
            (entry.order != target).then(|| OrderChange::shifted(entry.id, entry.order, target))
        })
        .collect();
    Ok(ReorderPlan::new(changes, None))
}

/// Plans an in-place edit: the returned patch holds only differing fields.
///
/// An empty patch means no write is needed.
pub fn plan_edit(item: &BoardItem, patch: &ItemPatch) -> Result<ItemPatch, ValidationError> {
    patch.changes_against(item)
}

fn plan_insert(
    siblings: &[SiblingEntry],
    id: ItemId,
    rank: Option<u32>,
) -> ReorderResult<ReorderPlan> {
    if siblings.iter().any(|entry| entry.id == id) {
        return Err(InvariantViolation::DuplicateId(id).into());
    }

    let count = siblings.len() as u32;
    let target = rank.unwrap_or(count + 1).clamp(1, count + 1);
    let mut changes = vec![OrderChange::added(id, target)];
    changes.extend(
        siblings
            .iter()
            .filter(|entry| entry.order >= target)
            .map(|entry| OrderChange::shifted(entry.id, entry.order, entry.order + 1)),
    );
    Ok(ReorderPlan::new(changes, None))
}

fn plan_delete(siblings: &[SiblingEntry], id: ItemId) -> ReorderResult<ReorderPlan> {
    let removed = find(siblings, id)?;
    let changes = siblings
        .iter()
        .filter(|entry| entry.order > removed.order)
        .map(|entry| OrderChange::shifted(entry.id, entry.order, entry.order - 1))
        .collect();
    Ok(ReorderPlan::new(changes, Some(removed)))
}

fn plan_reposition(siblings: &[SiblingEntry], id: ItemId, rank: u32) -> ReorderResult<ReorderPlan> {
    let moved = find(siblings, id)?;
    let count = siblings.len() as u32;
    let target = rank.clamp(1, count);
    if target == moved.order {
        return Ok(ReorderPlan::default());
    }

    let mut changes = vec![OrderChange::shifted(id, moved.order, target)];
    if target < moved.order {
        changes.extend(
            siblings
                .iter()
                .filter(|entry| entry.order >= target && entry.order < moved.order)
                .map(|entry| OrderChange::shifted(entry.id, entry.order, entry.order + 1)),
        );
    } else {
        changes.extend(
            siblings
                .iter()
                .filter(|entry| entry.order > moved.order && entry.order <= target)
                .map(|entry| OrderChange::shifted(entry.id, entry.order, entry.order - 1)),
        );
    }
    Ok(ReorderPlan::new(changes, None))
}

fn find(siblings: &[SiblingEntry], id: ItemId) -> ReorderResult<SiblingEntry> {
    siblings
        .iter()
        .copied()
        .find(|entry| entry.id == id)
        .ok_or(ReorderError::NotFound(id))
}

#[cfg(test)]
mod tests {
    use super::{plan, plan_compact, ReorderError, ReorderOp};
    use crate::model::ordered::SiblingEntry;
    use crate::reorder::invariant::InvariantViolation;
    use uuid::Uuid;

    fn sequence(len: u32) -> Vec<SiblingEntry> {
        (1..=len)
            .map(|order| SiblingEntry::new(Uuid::new_v4(), order))
            .collect()
    }

    #[test]
    fn insert_rank_is_clamped_to_append_slot() {
        let siblings = sequence(2);
        let id = Uuid::new_v4();
        let result = plan(&siblings, ReorderOp::Insert { id, rank: Some(40) }).unwrap();
        assert_eq!(result.mapping().len(), 1);
        assert_eq!(result.new_order_of(id), Some(3));
    }

    #[test]
    fn reposition_to_current_rank_is_empty() {
        let siblings = sequence(3);
        let result = plan(
            &siblings,
            ReorderOp::Reposition {
                id: siblings[1].id,
                rank: 2,
            },
        )
        .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn reposition_down_shifts_intermediate_items_up() {
        let siblings = sequence(4);
        let result = plan(
            &siblings,
            ReorderOp::Reposition {
                id: siblings[0].id,
                rank: 3,
            },
        )
        .unwrap();

        let mapping = result.mapping();
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping[&siblings[0].id], 3);
        assert_eq!(mapping[&siblings[1].id], 1);
        assert_eq!(mapping[&siblings[2].id], 2);
        assert!(!mapping.contains_key(&siblings[3].id));
    }

    #[test]
    fn delete_of_unknown_item_is_not_found() {
        let missing = Uuid::new_v4();
        assert_eq!(
            plan(&sequence(2), ReorderOp::Delete { id: missing }),
            Err(ReorderError::NotFound(missing))
        );
    }

    #[test]
    fn insert_of_existing_identity_is_rejected() {
        let siblings = sequence(2);
        let err = plan(
            &siblings,
            ReorderOp::Insert {
                id: siblings[0].id,
                rank: None,
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            ReorderError::InvariantViolation(InvariantViolation::DuplicateId(siblings[0].id))
        );
    }

    #[test]
    fn compact_repairs_gaps_and_ties() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let c = Uuid::from_u128(3);
        let broken = vec![
            SiblingEntry::new(a, 2),
            SiblingEntry::new(b, 2),
            SiblingEntry::new(c, 7),
        ];

        let result = plan_compact(&broken).unwrap();
        let mapping = result.mapping();
        assert_eq!(mapping[&a], 1);
        assert!(!mapping.contains_key(&b));
        assert_eq!(mapping[&c], 3);
    }
}
