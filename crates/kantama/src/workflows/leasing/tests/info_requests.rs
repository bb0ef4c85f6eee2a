use super::common::*;

use crate::workflows::leasing::domain::{
    Application, ApplicationStatus, AssignmentRequest, InfoRequest, InfoRequestDraft,
    InfoRequestStatus, InfoResponseDraft, NotificationKind,
};
use crate::workflows::leasing::error::WorkflowError;
use crate::workflows::leasing::files::Upload;
use crate::workflows::leasing::identity::Actor;

fn ask(harness: &Harness, actor: &Actor, application: &Application) -> Result<InfoRequest, WorkflowError> {
    harness.workflow.request_info(
        actor,
        InfoRequestDraft {
            application_id: application.id,
            message: "Please send the latest financial statements".to_string(),
            requested_items: vec!["Balance sheet".to_string(), "  ".to_string()],
        },
    )
}

fn reply(message: &str) -> InfoResponseDraft {
    InfoResponseDraft {
        message: message.to_string(),
        attachment_ids: Vec::new(),
    }
}

#[test]
fn info_request_moves_application_and_reaches_the_applicant() {
    let harness = Harness::new();
    let application = harness.assigned();

    let request = ask(&harness, &harness.financier, &application).expect("info requested");
    assert_eq!(request.status, InfoRequestStatus::Pending);
    assert_eq!(request.requested_items, vec!["Balance sheet".to_string()]);

    let reloaded = harness
        .workflow
        .application(&harness.customer, application.id)
        .expect("customer reads own application");
    assert_eq!(reloaded.status, ApplicationStatus::InfoRequested);

    assert!(harness
        .notifications_for(&harness.customer)
        .iter()
        .any(|note| note.kind == NotificationKind::InfoRequested));
    assert_eq!(harness.mailer.sent_to(CUSTOMER_EMAIL).len(), 1);
}

#[test]
fn unassigned_financier_cannot_ask() {
    let harness = Harness::new();
    let application = harness.assigned();
    let error = ask(&harness, &harness.other_financier, &application).expect_err("not assigned");
    assert!(matches!(error, WorkflowError::Forbidden(_)));

    let error = ask(&harness, &harness.admin, &application).expect_err("admins do not ask");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[test]
fn customer_reply_marks_request_responded_and_alerts_financier_users() {
    let harness = Harness::new();
    let application = harness.assigned();
    let request = ask(&harness, &harness.financier, &application).expect("info requested");

    let response = harness
        .workflow
        .respond_to_info_request(&harness.customer, request.id, reply("Attached as requested"))
        .expect("customer replies");
    assert_eq!(response.responder_id, harness.customer.user_id());

    let thread = harness
        .workflow
        .info_request(&harness.financier, request.id)
        .expect("financier reads thread");
    assert_eq!(thread.request.status, InfoRequestStatus::Responded);
    assert_eq!(thread.responses.len(), 1);

    let provided = harness.notifications_of_kind(NotificationKind::InfoProvided);
    assert_eq!(provided.len(), 2);
}

#[test]
fn financier_follow_up_changes_no_status() {
    let harness = Harness::new();
    let application = harness.assigned();
    let request = ask(&harness, &harness.financier, &application).expect("info requested");

    harness
        .workflow
        .respond_to_info_request(
            &harness.financier_colleague,
            request.id,
            reply("The 2025 statement is enough"),
        )
        .expect("colleague follows up");

    let thread = harness
        .workflow
        .info_request(&harness.customer, request.id)
        .expect("customer reads thread");
    assert_eq!(thread.request.status, InfoRequestStatus::Pending);
    assert_eq!(thread.responses.len(), 1);
    assert!(harness
        .notifications_of_kind(NotificationKind::InfoProvided)
        .is_empty());
}

#[test]
fn attachments_must_belong_to_the_application() {
    let harness = Harness::new();
    let application = harness.assigned();
    let other = harness.submitted();
    let foreign = harness
        .workflow
        .upload_document(
            &harness.customer,
            other.id,
            Upload {
                filename: "statement.pdf".to_string(),
                content_type: None,
                bytes: b"%PDF".to_vec(),
            },
            None,
        )
        .expect("document uploaded to the other application");
    let request = ask(&harness, &harness.financier, &application).expect("info requested");

    let error = harness
        .workflow
        .respond_to_info_request(
            &harness.customer,
            request.id,
            InfoResponseDraft {
                message: "See attachment".to_string(),
                attachment_ids: vec![foreign.id],
            },
        )
        .expect_err("attachment from another application");
    assert!(matches!(error, WorkflowError::Validation(_)));
}

#[test]
fn financiers_only_see_their_own_requests() {
    let harness = Harness::new();
    let application = harness.assigned();
    harness
        .workflow
        .assign_application(
            &harness.admin,
            AssignmentRequest {
                application_id: application.id,
                financier_id: harness.other_financier_id,
                notes: None,
            },
        )
        .expect("second financier assigned");
    let mine = ask(&harness, &harness.financier, &application).expect("lakeside asks");
    let theirs = ask(&harness, &harness.other_financier, &application).expect("northern asks");

    let visible = harness
        .workflow
        .list_info_requests(&harness.financier, application.id)
        .expect("listing works");
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].request.id, mine.id);

    let error = harness
        .workflow
        .info_request(&harness.financier, theirs.id)
        .expect_err("another financier's thread");
    assert!(matches!(error, WorkflowError::Forbidden(_)));

    let all = harness
        .workflow
        .list_info_requests(&harness.customer, application.id)
        .expect("customer sees every request");
    assert_eq!(all.len(), 2);
}

#[test]
fn open_question_does_not_block_acceptance() {
    let harness = Harness::new();
    let (application, offer) = harness.sent_offer();
    harness
        .workflow
        .assign_application(
            &harness.admin,
            AssignmentRequest {
                application_id: application.id,
                financier_id: harness.other_financier_id,
                notes: None,
            },
        )
        .expect("second financier assigned");
    ask(&harness, &harness.other_financier, &application).expect("rival asks");
    assert_eq!(harness.application_status(&application), ApplicationStatus::InfoRequested);

    harness
        .workflow
        .accept_offer(&harness.customer, offer.id)
        .expect("released offer stays actionable");
    assert_eq!(harness.application_status(&application), ApplicationStatus::OfferAccepted);
}

#[test]
fn question_after_acceptance_keeps_the_status() {
    let harness = Harness::new();
    let (application, _) = harness.accepted_offer();

    let request = ask(&harness, &harness.financier, &application).expect("still allowed");
    assert_eq!(request.status, InfoRequestStatus::Pending);
    assert_eq!(harness.application_status(&application), ApplicationStatus::OfferAccepted);
}
