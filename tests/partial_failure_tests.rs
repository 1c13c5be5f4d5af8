mod common;

use rapport::model::RelationshipStatus::*;
use rapport::store::ProfileStore;
use rapport::GraphError;

use common::{flaky_service, person, stored_pair};

#[test]
fn transient_failure_of_the_second_write_is_retried() {
    let (rapport, store, notes) = flaky_service(2);
    let a = person(&rapport, "0901", "Nguyen", "An");
    let b = person(&rapport, "0902", "Tran", "Binh");

    store.script_puts(&[false, true, false]);
    rapport.friendships.send_request(&a.id, &b.id).unwrap();
    assert_eq!(stored_pair(store.as_ref(), &a.id, &b.id), (FriendRequest, Pending));
    assert_eq!(notes.sent().len(), 1);
}

#[test]
fn persistent_failure_is_rolled_back() {
    let (rapport, store, notes) = flaky_service(2);
    let a = person(&rapport, "0901", "Nguyen", "An");
    let b = person(&rapport, "0902", "Tran", "Binh");

    store.script_puts(&[false, true, true, true]);
    let err = rapport.friendships.send_request(&a.id, &b.id).unwrap_err();
    assert!(matches!(
        err,
        GraphError::PartialFailure {
            compensated: true,
            ..
        }
    ));
    assert!(store.get_edge(&a.id, &b.id).unwrap().is_none());
    assert!(store.get_edge(&b.id, &a.id).unwrap().is_none());
    assert!(notes.sent().is_empty());

    // Safe to retry once the store recovers.
    rapport.friendships.send_request(&a.id, &b.id).unwrap();
    assert_eq!(stored_pair(store.as_ref(), &a.id, &b.id), (FriendRequest, Pending));
}

#[test]
fn failed_first_write_changes_nothing() {
    let (rapport, store, _) = flaky_service(2);
    let a = person(&rapport, "0901", "Nguyen", "An");
    let b = person(&rapport, "0902", "Tran", "Binh");

    store.script_puts(&[true]);
    let err = rapport.friendships.block(&a.id, &b.id).unwrap_err();
    assert!(matches!(err, GraphError::Storage(_)));
    assert_eq!(stored_pair(store.as_ref(), &a.id, &b.id), (Stranger, Stranger));
}

#[test]
fn rolled_back_accept_discards_its_chat() {
    let (rapport, store, _) = flaky_service(1);
    let a = person(&rapport, "0901", "Nguyen", "An");
    let b = person(&rapport, "0902", "Tran", "Binh");
    rapport.friendships.send_request(&a.id, &b.id).unwrap();

    store.script_puts(&[false, true, true]);
    let err = rapport.friendships.accept_request(&b.id, &a.id).unwrap_err();
    assert!(matches!(
        err,
        GraphError::PartialFailure {
            compensated: true,
            ..
        }
    ));
    assert_eq!(stored_pair(store.as_ref(), &a.id, &b.id), (FriendRequest, Pending));
    assert!(store.get_edge(&b.id, &a.id).unwrap().unwrap().chat_id.is_none());
    assert!(rapport.profiles.get(&b.id).unwrap().chats.is_empty());

    let edge = rapport.friendships.accept_request(&b.id, &a.id).unwrap();
    assert_eq!(edge.status, Friend);
    assert_eq!(rapport.profiles.get(&b.id).unwrap().chats.len(), 1);
}

#[test]
fn unrecoverable_accept_is_completed_by_the_next_call() {
    let (rapport, store, _) = flaky_service(1);
    let a = person(&rapport, "0901", "Nguyen", "An");
    let b = person(&rapport, "0902", "Tran", "Binh");
    rapport.friendships.send_request(&a.id, &b.id).unwrap();

    // Second write, its retry and the undo all fail.
    store.script_puts(&[false, true, true, true]);
    let err = rapport.friendships.accept_request(&b.id, &a.id).unwrap_err();
    assert!(matches!(
        err,
        GraphError::PartialFailure {
            compensated: false,
            ..
        }
    ));
    assert_eq!(stored_pair(store.as_ref(), &a.id, &b.id), (FriendRequest, Friend));

    assert_eq!(
        rapport.friendships.pair_status(&a.id, &b.id).unwrap(),
        (Friend, Friend)
    );
    let ab = store.get_edge(&a.id, &b.id).unwrap().unwrap();
    let ba = store.get_edge(&b.id, &a.id).unwrap().unwrap();
    assert!(ab.chat_id.is_some());
    assert_eq!(ab.chat_id, ba.chat_id);
    assert_eq!(ab.revision, ba.revision);
}

#[test]
fn unrecoverable_first_contact_is_completed_by_the_next_call() {
    let (rapport, store, _) = flaky_service(0);
    let a = person(&rapport, "0901", "Nguyen", "An");
    let b = person(&rapport, "0902", "Tran", "Binh");

    store.script_puts(&[false, true]);
    store.fail_deletes(true);
    let err = rapport.friendships.block(&a.id, &b.id).unwrap_err();
    assert!(matches!(
        err,
        GraphError::PartialFailure {
            compensated: false,
            ..
        }
    ));
    store.fail_deletes(false);

    // The next operation on the pair repairs it first, then applies.
    assert!(matches!(
        rapport.friendships.block(&a.id, &b.id),
        Err(GraphError::Conflict(_))
    ));
    assert_eq!(stored_pair(store.as_ref(), &a.id, &b.id), (Block, Blocked));
    assert_eq!(
        store.get_edge(&b.id, &a.id).unwrap().unwrap().display_name,
        "Nguyen An"
    );
}
