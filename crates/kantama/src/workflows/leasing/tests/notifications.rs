use super::common::*;

use crate::workflows::leasing::domain::{NotificationId, NotificationKind};
use crate::workflows::leasing::error::WorkflowError;
use crate::workflows::leasing::service::NotificationQuery;

#[test]
fn inbox_is_newest_first_and_filters_unread() {
    let harness = Harness::new();
    harness.sent_offer();

    let inbox = harness
        .workflow
        .notifications(&harness.customer, &NotificationQuery::default())
        .expect("inbox readable");
    let kinds: Vec<_> = inbox.iter().map(|note| note.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::OfferSent,
            NotificationKind::SubmittedToFinancier,
            NotificationKind::ApplicationSubmitted,
        ]
    );

    harness
        .workflow
        .mark_notification_read(&harness.customer, inbox[0].id)
        .expect("marked read");
    let unread = harness
        .workflow
        .notifications(
            &harness.customer,
            &NotificationQuery {
                unread_only: true,
                limit: None,
            },
        )
        .expect("inbox readable");
    assert_eq!(unread.len(), 2);
    assert!(unread.iter().all(|note| !note.is_read));

    let limited = harness
        .workflow
        .notifications(
            &harness.customer,
            &NotificationQuery {
                unread_only: false,
                limit: Some(1),
            },
        )
        .expect("inbox readable");
    assert_eq!(limited.len(), 1);
    assert!(limited[0].is_read);
    assert!(limited[0].read_at.is_some());
}

#[test]
fn another_users_notification_is_not_found() {
    let harness = Harness::new();
    harness.submitted();
    let customer_note = harness.notifications_for(&harness.customer)[0].id;

    let error = harness
        .workflow
        .mark_notification_read(&harness.admin, customer_note)
        .expect_err("not in the admin inbox");
    assert!(matches!(error, WorkflowError::NotFound { entity: "notification" }));

    let error = harness
        .workflow
        .mark_notification_read(&harness.customer, NotificationId::new())
        .expect_err("unknown id");
    assert!(matches!(error, WorkflowError::NotFound { .. }));
}

#[test]
fn mark_all_clears_the_unread_count() {
    let harness = Harness::new();
    harness.assigned();

    let count = harness
        .workflow
        .unread_notifications(&harness.customer)
        .expect("count readable");
    assert_eq!(count.unread, 2);

    let marked = harness
        .workflow
        .mark_all_notifications_read(&harness.customer)
        .expect("all marked");
    assert_eq!(marked, 2);
    assert_eq!(
        harness
            .workflow
            .unread_notifications(&harness.customer)
            .expect("count readable")
            .unread,
        0
    );
    assert_eq!(
        harness
            .workflow
            .mark_all_notifications_read(&harness.customer)
            .expect("nothing left"),
        0
    );

    // Financier inboxes are untouched.
    assert_eq!(
        harness
            .workflow
            .unread_notifications(&harness.financier)
            .expect("count readable")
            .unread,
        1
    );
}
