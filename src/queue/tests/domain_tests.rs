//! Tests for the queue state machine.

use crate::error::{ErrorKind, OrchestrationError};
use crate::queue::domain::{QueueError, QueueItemStatus, QueueState};
use crate::session::domain::SessionId;
use crate::task::domain::TaskId;
use mockable::DefaultClock;
use rstest::{fixture, rstest};

struct Fixture {
    queue: QueueState,
    first: TaskId,
    second: TaskId,
}

#[fixture]
fn two_items() -> Fixture {
    let first = TaskId::new();
    let second = TaskId::new();
    Fixture {
        queue: QueueState::new(SessionId::new(), [first, second, first], &DefaultClock),
        first,
        second,
    }
}

#[rstest]
fn new_queue_drops_duplicates(two_items: Fixture) {
    assert_eq!(two_items.queue.items().len(), 2);
    assert_eq!(two_items.queue.counts().queued, 2);
}

#[rstest]
fn start_claims_in_fifo_order(two_items: Fixture) {
    let Fixture {
        mut queue,
        first,
        second,
    } = two_items;

    let claimed = queue.start(&DefaultClock).map(|item| item.task_id);

    assert_eq!(claimed, Ok(first));
    assert_eq!(queue.top().map(|item| item.task_id), Some(second));
    assert_eq!(
        queue.processing().map(|item| item.status),
        Some(QueueItemStatus::Processing)
    );
}

#[rstest]
fn second_claim_while_processing_is_rejected(two_items: Fixture) {
    let Fixture {
        mut queue, first, ..
    } = two_items;
    queue.start(&DefaultClock).expect("first claim");

    let result = queue.start(&DefaultClock).map(|item| item.task_id);

    assert_eq!(
        result,
        Err(QueueError::AlreadyProcessing {
            session_id: queue.session_id(),
            task_id: first,
        })
    );
    assert_eq!(queue.counts().processing, 1);
}

#[rstest]
fn complete_without_claim_has_no_active_item(two_items: Fixture) {
    let mut queue = two_items.queue;
    let session_id = queue.session_id();

    let error = queue
        .complete(&DefaultClock)
        .map(|item| item.task_id)
        .expect_err("nothing is processing");

    assert_eq!(error, QueueError::NoActiveItem(session_id));
    assert_eq!(OrchestrationError::from(error).kind(), ErrorKind::StateConflict);
}

#[rstest]
fn fail_records_reason_and_does_not_requeue(two_items: Fixture) {
    let Fixture {
        mut queue, second, ..
    } = two_items;
    queue.start(&DefaultClock).expect("claim");

    let failed = queue
        .fail("tests are red", &DefaultClock)
        .map(|item| item.reason.clone())
        .expect("fail");

    assert_eq!(failed.as_deref(), Some("tests are red"));
    assert_eq!(queue.top().map(|item| item.task_id), Some(second));
    assert_eq!(queue.counts().failed, 1);
}

#[rstest]
fn skip_prefers_processing_then_next_queued(two_items: Fixture) {
    let Fixture {
        mut queue,
        first,
        second,
    } = two_items;
    queue.start(&DefaultClock).expect("claim");

    let skipped_processing = queue.skip(&DefaultClock).map(|item| item.task_id);
    let skipped_queued = queue.skip(&DefaultClock).map(|item| item.task_id);
    let exhausted = queue.skip(&DefaultClock).map(|item| item.task_id);

    assert_eq!(skipped_processing, Ok(first));
    assert_eq!(skipped_queued, Ok(second));
    assert_eq!(exhausted, Err(QueueError::EmptyQueue(queue.session_id())));
    assert!(queue.is_drained());
}

#[rstest]
fn push_rejects_open_duplicates_but_requeues_closed_tasks(two_items: Fixture) {
    let Fixture {
        mut queue, first, ..
    } = two_items;

    let duplicate = queue.push(first, &DefaultClock).map(|item| item.task_id);
    assert_eq!(
        duplicate,
        Err(QueueError::DuplicateItem {
            session_id: queue.session_id(),
            task_id: first,
        })
    );

    queue.start(&DefaultClock).expect("claim");
    queue.complete(&DefaultClock).expect("complete");
    let requeued = queue.push(first, &DefaultClock).map(|item| item.status);

    assert_eq!(requeued, Ok(QueueItemStatus::Queued));
    assert_eq!(queue.counts().total, 3);
}
