use taskboard_core::reorder::{
    check_sequence, is_contiguous, plan, plan_compact, plan_move, InvariantViolation,
    ReorderError, ReorderOp,
};
use taskboard_core::SiblingEntry;
use uuid::Uuid;

fn sequence(len: u32) -> Vec<SiblingEntry> {
    (1..=len)
        .map(|order| SiblingEntry::new(Uuid::from_u128(order as u128), order))
        .collect()
}

#[test]
fn deleting_middle_item_closes_the_gap() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    let siblings = vec![
        SiblingEntry::new(a, 1),
        SiblingEntry::new(b, 2),
        SiblingEntry::new(c, 3),
    ];

    let result = plan(&siblings, ReorderOp::Delete { id: b }).unwrap();

    assert_eq!(result.mapping().into_iter().collect::<Vec<_>>(), vec![(c, 2)]);
    assert_eq!(result.removed(), Some(SiblingEntry::new(b, 2)));
    assert_eq!(
        result.apply(&siblings),
        vec![SiblingEntry::new(a, 1), SiblingEntry::new(c, 2)]
    );
}

#[test]
fn appending_to_single_item_sequence_assigns_next_order() {
    let a = Uuid::new_v4();
    let d = Uuid::new_v4();
    let siblings = vec![SiblingEntry::new(a, 1)];

    let result = plan(&siblings, ReorderOp::Insert { id: d, rank: None }).unwrap();

    assert_eq!(result.mapping().into_iter().collect::<Vec<_>>(), vec![(d, 2)]);
    assert_eq!(result.sibling_changes().count(), 0);
}

#[test]
fn deleting_the_only_item_yields_empty_mapping() {
    let siblings = sequence(1);

    let result = plan(&siblings, ReorderOp::Delete { id: siblings[0].id }).unwrap();

    assert!(result.mapping().is_empty());
    assert!(result.apply(&siblings).is_empty());
}

#[test]
fn insert_at_rank_shifts_later_siblings_down() {
    let siblings = sequence(4);
    let id = Uuid::new_v4();

    let result = plan(&siblings, ReorderOp::Insert { id, rank: Some(2) }).unwrap();

    let mapping = result.mapping();
    assert_eq!(mapping[&id], 2);
    assert!(!mapping.contains_key(&siblings[0].id));
    for entry in &siblings[1..] {
        assert_eq!(mapping[&entry.id], entry.order + 1);
    }
}

#[test]
fn insert_rank_zero_places_item_first() {
    let siblings = sequence(2);
    let id = Uuid::new_v4();

    let result = plan(&siblings, ReorderOp::Insert { id, rank: Some(0) }).unwrap();

    assert_eq!(result.new_order_of(id), Some(1));
    assert_eq!(result.sibling_changes().count(), 2);
}

#[test]
fn reposition_up_shifts_intermediate_items_down() {
    let siblings = sequence(4);

    let result = plan(
        &siblings,
        ReorderOp::Reposition {
            id: siblings[3].id,
            rank: 2,
        },
    )
    .unwrap();

    let mapping = result.mapping();
    assert_eq!(mapping[&siblings[3].id], 2);
    assert_eq!(mapping[&siblings[1].id], 3);
    assert_eq!(mapping[&siblings[2].id], 4);
    assert!(!mapping.contains_key(&siblings[0].id));
}

#[test]
fn cross_parent_move_closes_source_and_opens_destination() {
    let source = sequence(3);
    let destination: Vec<SiblingEntry> = (1..=2)
        .map(|order| SiblingEntry::new(Uuid::new_v4(), order))
        .collect();
    let moved = source[0].id;

    let result = plan_move(&source, &destination, moved, Some(1)).unwrap();

    assert_eq!(result.target_order(), 1);
    let source_after = result.source.apply(&source);
    let destination_after = result.destination.apply(&destination);
    assert!(is_contiguous(&source_after));
    assert!(is_contiguous(&destination_after));
    assert_eq!(source_after.len(), 2);
    assert_eq!(destination_after[0].id, moved);
}

#[test]
fn cross_parent_move_appends_without_rank() {
    let source = sequence(2);
    let destination: Vec<SiblingEntry> = (1..=3)
        .map(|order| SiblingEntry::new(Uuid::new_v4(), order))
        .collect();

    let result = plan_move(&source, &destination, source[1].id, None).unwrap();

    assert_eq!(result.target_order(), 4);
    assert!(result.source.mapping().is_empty());
    assert_eq!(result.destination.sibling_changes().count(), 0);
}

#[test]
fn invalid_inputs_are_rejected_before_planning() {
    let id = Uuid::new_v4();
    let duplicate_id = vec![SiblingEntry::new(id, 1), SiblingEntry::new(id, 2)];
    let duplicate_order = vec![
        SiblingEntry::new(Uuid::new_v4(), 1),
        SiblingEntry::new(Uuid::new_v4(), 1),
    ];
    let gap = vec![
        SiblingEntry::new(Uuid::new_v4(), 1),
        SiblingEntry::new(Uuid::new_v4(), 3),
    ];
    let insert = ReorderOp::Insert {
        id: Uuid::new_v4(),
        rank: None,
    };

    assert_eq!(
        plan(&duplicate_id, insert),
        Err(ReorderError::InvariantViolation(
            InvariantViolation::DuplicateId(id)
        ))
    );
    assert_eq!(
        plan(&duplicate_order, insert),
        Err(ReorderError::InvariantViolation(
            InvariantViolation::DuplicateOrder(1)
        ))
    );
    assert_eq!(
        plan(&gap, insert),
        Err(ReorderError::InvariantViolation(
            InvariantViolation::NonContiguous {
                expected: 2,
                found: 3
            }
        ))
    );
}

#[test]
fn operations_on_absent_identity_are_not_found() {
    let siblings = sequence(3);
    let missing = Uuid::new_v4();

    assert_eq!(
        plan(&siblings, ReorderOp::Reposition { id: missing, rank: 1 }),
        Err(ReorderError::NotFound(missing))
    );
    assert_eq!(
        plan_move(&siblings, &sequence(0), missing, None).unwrap_err(),
        ReorderError::NotFound(missing)
    );
}

#[test]
fn every_operation_keeps_sequences_contiguous() {
    for len in 0..=5u32 {
        let siblings = sequence(len);
        let snapshot = siblings.clone();
        let mut ops = vec![
            ReorderOp::Insert {
                id: Uuid::new_v4(),
                rank: None,
            },
            ReorderOp::Insert {
                id: Uuid::new_v4(),
                rank: Some(1),
            },
        ];
        for entry in &siblings {
            ops.push(ReorderOp::Delete { id: entry.id });
            for rank in 1..=len {
                ops.push(ReorderOp::Reposition { id: entry.id, rank });
            }
        }

        for op in ops {
            let first = plan(&siblings, op).unwrap();
            let second = plan(&siblings, op).unwrap();
            assert_eq!(first, second, "planning is deterministic");
            assert_eq!(check_sequence(&first.apply(&siblings)), Ok(()));
        }
        assert_eq!(siblings, snapshot, "input is never mutated");
    }
}

#[test]
fn compact_of_valid_sequence_is_empty_and_repairs_broken_one() {
    assert!(plan_compact(&sequence(4)).unwrap().is_empty());

    let broken = vec![
        SiblingEntry::new(Uuid::from_u128(10), 3),
        SiblingEntry::new(Uuid::from_u128(11), 5),
        SiblingEntry::new(Uuid::from_u128(12), 5),
    ];
    let repaired = plan_compact(&broken).unwrap().apply(&broken);
    assert!(is_contiguous(&repaired));
    assert_eq!(
        repaired.iter().map(|entry| entry.id).collect::<Vec<_>>(),
        vec![
            Uuid::from_u128(10),
            Uuid::from_u128(11),
            Uuid::from_u128(12)
        ]
    );
}
