//! Property-based tests for snapshot ordering.
//!
//! Uses proptest to verify, for arbitrary task sets:
//! 1. Snapshots are sorted by priority descending.
//! 2. Tasks of equal priority keep their arrival order.
//! 3. Building a snapshot neither drops nor invents tasks.
//! 4. Random bytes never cause a panic when decoding a document body.

use proptest::prelude::*;
use taskflow_proto::document::{Document, decode_fields, encode_fields};
use taskflow_proto::snapshot::Snapshot;
use taskflow_proto::task::{OwnerId, Priority, Task, TaskFields, TaskId};

/// Strategy for generating arbitrary priorities.
fn arb_priority() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Medium),
        Just(Priority::High),
    ]
}

/// Strategy for generating a task list in arrival order.
///
/// Each task's id encodes its arrival index so tie order can be checked.
fn arb_arrival() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec((arb_priority(), any::<bool>(), "[a-z ]{1,24}"), 0..64).prop_map(
        |items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (priority, completed, title))| Task {
                    id: Some(TaskId::new(format!("{i:04}"))),
                    title,
                    completed,
                    priority,
                    owner_id: OwnerId::new("owner"),
                })
                .collect()
        },
    )
}

proptest! {
    #[test]
    fn snapshot_is_sorted_by_priority_descending(tasks in arb_arrival()) {
        let snapshot = Snapshot::from_arrival(tasks);
        for pair in snapshot.windows(2) {
            prop_assert!(pair[0].priority.rank() >= pair[1].priority.rank());
        }
    }

    #[test]
    fn equal_priorities_keep_arrival_order(tasks in arb_arrival()) {
        let snapshot = Snapshot::from_arrival(tasks);
        for pair in snapshot.windows(2) {
            if pair[0].priority == pair[1].priority {
                prop_assert!(pair[0].id < pair[1].id);
            }
        }
    }

    #[test]
    fn snapshot_keeps_every_task(tasks in arb_arrival()) {
        let mut expected: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
        let snapshot = Snapshot::from_arrival(tasks);
        let mut actual: Vec<_> = snapshot.iter().map(|t| t.id.clone()).collect();
        expected.sort();
        actual.sort();
        prop_assert_eq!(expected, actual);
    }

    #[test]
    fn document_body_survives_encoding(
        title in "[^\x00]{1,128}",
        completed in any::<bool>(),
        priority in arb_priority(),
    ) {
        let fields = TaskFields { title, completed, priority, owner_id: OwnerId::new("u") };
        let doc = Document { id: TaskId::new("d"), body: encode_fields(&fields).unwrap() };
        prop_assert_eq!(doc.to_task().unwrap().fields(), fields);
    }

    #[test]
    fn random_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_fields(&bytes);
    }
}
