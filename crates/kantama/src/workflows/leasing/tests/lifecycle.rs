use super::common::*;
use chrono::{Datelike, Utc};

use crate::workflows::leasing::domain::{
    ApplicationPatch, ApplicationStatus, ApplicationSubmission, NotificationKind,
};
use crate::workflows::leasing::error::WorkflowError;
use crate::workflows::leasing::identity::Role;
use crate::workflows::leasing::repository::{UserFilter, WorkflowStore};
use crate::workflows::leasing::service::ApplicationListQuery;

#[test]
fn customer_submission_is_numbered_and_announced() {
    let harness = Harness::new();

    let application = harness.submitted();

    assert_eq!(application.status, ApplicationStatus::Submitted);
    assert!(application.submitted_at.is_some());
    let prefix = format!("LEA-{}-", Utc::now().year());
    let serial = application
        .reference_number
        .strip_prefix(&prefix)
        .expect("reference carries type prefix and year");
    assert_eq!(serial.len(), 5);
    assert!(serial.chars().all(|c| c.is_ascii_digit()));

    let inbox = harness.notifications_for(&harness.customer);
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::ApplicationSubmitted);
    assert!(inbox[0]
        .action_url
        .as_deref()
        .is_some_and(|url| url.starts_with("http://localhost:5173/")));

    let admin_mail = harness.mailer.sent_to("myynti@kantama.fi");
    assert_eq!(admin_mail.len(), 1);
    assert!(admin_mail[0].subject.contains(&application.reference_number));
}

#[test]
fn only_customers_submit_authenticated_applications() {
    let harness = Harness::new();
    let error = harness
        .workflow
        .submit_application(&harness.financier, leasing_submission(15000.0))
        .expect_err("financiers cannot apply");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[test]
fn invalid_submission_is_rejected_before_anything_is_stored() {
    let harness = Harness::new();
    let error = harness
        .workflow
        .submit_application(&harness.customer, leasing_submission(0.0))
        .expect_err("price must be positive");
    assert!(matches!(error, WorkflowError::Validation(_)));
    assert!(harness
        .workflow
        .list_applications(&harness.admin, &ApplicationListQuery::default())
        .expect("listing works")
        .is_empty());
    assert!(harness.inbox.all().is_empty());
}

#[test]
fn public_submission_provisions_account_once() {
    let harness = Harness::new();
    let mut submission = leasing_submission(22000.0);
    if let ApplicationSubmission::Leasing(leasing) = &mut submission {
        leasing.company.contact_email = "mikko@sahapuu.fi".to_string();
        leasing.company.contact_person = Some("Mikko Laine".to_string());
    }

    let first = harness
        .workflow
        .submit_public_application(submission.clone())
        .expect("public submission succeeds");
    assert!(first.account_created);
    let welcome = harness.mailer.sent_to("mikko@sahapuu.fi");
    assert_eq!(welcome.len(), 1);

    let account = harness
        .store
        .user(first.customer_id)
        .expect("store readable")
        .expect("account provisioned");
    assert_eq!(account.role, Role::Customer);
    assert_eq!(account.first_name.as_deref(), Some("Mikko"));
    assert_eq!(account.last_name.as_deref(), Some("Laine"));

    let second = harness
        .workflow
        .submit_public_application(submission)
        .expect("second submission succeeds");
    assert!(!second.account_created);
    assert_eq!(second.customer_id, first.customer_id);
    assert_ne!(
        second.application.reference_number,
        first.application.reference_number
    );

    let customers = harness
        .store
        .users(&UserFilter {
            role: Some(Role::Customer),
            ..UserFilter::default()
        })
        .expect("store readable");
    assert_eq!(customers.len(), 2);
}

#[test]
fn public_submission_cannot_borrow_staff_email() {
    let harness = Harness::new();
    let mut submission = leasing_submission(9000.0);
    if let ApplicationSubmission::Leasing(leasing) = &mut submission {
        leasing.company.contact_email = "ADMIN@kantama.fi".to_string();
    }
    let error = harness
        .workflow
        .submit_public_application(submission)
        .expect_err("staff address is refused");
    assert!(matches!(error, WorkflowError::Validation(_)));
}

#[test]
fn customer_edits_are_limited_to_early_statuses_and_ignore_status() {
    let harness = Harness::new();
    let application = harness.submitted();

    let updated = harness
        .workflow
        .update_application(
            &harness.customer,
            application.id,
            ApplicationPatch {
                additional_info: Some("Delivery in May".to_string()),
                status: Some(ApplicationStatus::Signed),
                ..ApplicationPatch::default()
            },
        )
        .expect("customer may edit a submitted application");
    assert_eq!(updated.status, ApplicationStatus::Submitted);
    assert_eq!(updated.additional_info.as_deref(), Some("Delivery in May"));

    harness
        .workflow
        .override_status(&harness.admin, application.id, ApplicationStatus::OfferSent)
        .expect("admin override");
    let error = harness
        .workflow
        .update_application(
            &harness.customer,
            application.id,
            ApplicationPatch {
                additional_info: Some("Too late".to_string()),
                ..ApplicationPatch::default()
            },
        )
        .expect_err("no edits once an offer is out");
    assert!(matches!(error, WorkflowError::InvalidState(_)));
}

#[test]
fn financiers_never_edit_applications() {
    let harness = Harness::new();
    let application = harness.assigned();
    let error = harness
        .workflow
        .update_application(
            &harness.financier,
            application.id,
            ApplicationPatch::default(),
        )
        .expect_err("financier edit refused");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[test]
fn admin_override_reaches_statuses_outside_the_table() {
    let harness = Harness::new();
    let application = harness.submitted();

    let closed = harness
        .workflow
        .override_status(&harness.admin, application.id, ApplicationStatus::Closed)
        .expect("admin closes");
    assert_eq!(closed.status, ApplicationStatus::Closed);

    let error = harness
        .workflow
        .override_status(&harness.admin, application.id, ApplicationStatus::Closed)
        .expect_err("same status is not a move");
    assert!(matches!(error, WorkflowError::InvalidState(_)));

    let error = harness
        .workflow
        .override_status(&harness.customer, application.id, ApplicationStatus::Draft)
        .expect_err("customers cannot override");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[test]
fn admin_status_edit_goes_through_override() {
    let harness = Harness::new();
    let application = harness.submitted();
    let updated = harness
        .workflow
        .update_application(
            &harness.admin,
            application.id,
            ApplicationPatch {
                status: Some(ApplicationStatus::Cancelled),
                ..ApplicationPatch::default()
            },
        )
        .expect("admin edit");
    assert_eq!(updated.status, ApplicationStatus::Cancelled);
}

#[test]
fn listings_filter_by_status() {
    let harness = Harness::new();
    let first = harness.submitted();
    harness.assigned();

    let submitted = harness
        .workflow
        .list_applications(
            &harness.admin,
            &ApplicationListQuery {
                status: Some(ApplicationStatus::Submitted),
                ..ApplicationListQuery::default()
            },
        )
        .expect("listing works");
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].id, first.id);

    let all = harness
        .workflow
        .list_applications(&harness.customer, &ApplicationListQuery::default())
        .expect("listing works");
    assert_eq!(all.len(), 2);
}

#[test]
fn mail_outage_does_not_fail_the_operation() {
    let harness = Harness::with_mailer(RecordingMailer::failing());
    let application = harness.submitted();
    assert_eq!(application.status, ApplicationStatus::Submitted);
    assert!(harness.mailer.sent().is_empty());
    assert_eq!(harness.notifications_for(&harness.customer).len(), 1);
}
