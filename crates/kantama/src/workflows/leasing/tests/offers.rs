use super::common::*;

use crate::workflows::leasing::domain::{ApplicationStatus, AssignmentRequest, NotificationKind};
use crate::workflows::leasing::error::WorkflowError;
use crate::workflows::leasing::offer::{OfferPatch, OfferStatus, OfferView};

#[test]
fn offer_travels_through_admin_gate_to_acceptance() {
    let harness = Harness::new();
    let (application, pending) = harness.pending_offer();
    assert_eq!(pending.status, OfferStatus::PendingAdmin);

    let admin_notes = harness.notifications_for(&harness.admin);
    assert!(admin_notes
        .iter()
        .any(|note| note.kind == NotificationKind::OfferPending));
    assert!(harness
        .mailer
        .sent_to("myynti@kantama.fi")
        .iter()
        .any(|mail| mail.subject.contains("awaits approval")));

    let sent = harness
        .workflow
        .approve_offer(&harness.admin, pending.id)
        .expect("admin approves");
    assert_eq!(sent.status, OfferStatus::Sent);
    assert!(sent.sent_at.is_some());
    let reloaded = harness
        .workflow
        .application(&harness.customer, application.id)
        .expect("customer reads");
    assert_eq!(reloaded.status, ApplicationStatus::OfferSent);
    assert!(harness
        .notifications_for(&harness.customer)
        .iter()
        .any(|note| note.kind == NotificationKind::OfferSent));
    assert_eq!(harness.mailer.sent_to(CUSTOMER_EMAIL).len(), 1);

    let accepted = harness
        .workflow
        .accept_offer(&harness.customer, pending.id)
        .expect("customer accepts");
    assert_eq!(accepted.status, OfferStatus::Accepted);
    assert!(accepted.responded_at.is_some());
    let reloaded = harness
        .workflow
        .application(&harness.financier, application.id)
        .expect("financier reads");
    assert_eq!(reloaded.status, ApplicationStatus::OfferAccepted);

    let accepted_notes = harness.notifications_of_kind(NotificationKind::OfferAccepted);
    // Both Lakeside users plus the customer.
    assert_eq!(accepted_notes.len(), 3);
    assert_eq!(harness.mailer.sent_to("offers@lakeside.fi").len(), 2);

    let error = harness
        .workflow
        .accept_offer(&harness.customer, pending.id)
        .expect_err("already accepted");
    assert!(matches!(error, WorkflowError::InvalidState(_)));
}

#[test]
fn pending_offer_is_invisible_to_the_customer() {
    let harness = Harness::new();
    let (application, offer) = harness.pending_offer();

    let error = harness
        .workflow
        .offer(&harness.customer, offer.id)
        .expect_err("not yet released");
    assert!(matches!(error, WorkflowError::Forbidden(_)));

    let listed = harness
        .workflow
        .list_offers(&harness.customer, Some(application.id))
        .expect("listing works");
    assert!(listed.is_empty());

    let error = harness
        .workflow
        .accept_offer(&harness.customer, offer.id)
        .expect_err("cannot accept a hidden offer");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[test]
fn customer_view_hides_margin_and_internal_notes() {
    let harness = Harness::new();
    let (_, offer) = harness.sent_offer();

    let view = harness
        .workflow
        .offer(&harness.customer, offer.id)
        .expect("customer reads released offer");
    assert!(matches!(view, OfferView::Customer(_)));
    let json = serde_json::to_value(&view).expect("offer serializes");
    assert_eq!(json["monthly_payment"], 300.0);
    assert!(json.get("internal_notes").is_none());
    assert!(json.get("interest_or_margin").is_none());

    let full = harness
        .workflow
        .offer(&harness.financier, offer.id)
        .expect("financier reads own offer");
    let json = serde_json::to_value(&full).expect("offer serializes");
    assert_eq!(json["internal_notes"], "Margin approved by credit desk");
}

#[test]
fn approval_is_reserved_for_admins_and_pending_offers() {
    let harness = Harness::new();
    let application = harness.assigned();
    let draft = harness
        .workflow
        .create_offer(&harness.financier, offer_draft(&application))
        .expect("offer drafted");

    let error = harness
        .workflow
        .approve_offer(&harness.admin, draft.id)
        .expect_err("draft has not been submitted");
    assert!(matches!(error, WorkflowError::InvalidState(_)));

    harness
        .workflow
        .submit_offer(&harness.financier, draft.id)
        .expect("submitted");
    let error = harness
        .workflow
        .approve_offer(&harness.financier, draft.id)
        .expect_err("financiers cannot approve");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[test]
fn offers_are_frozen_once_submitted() {
    let harness = Harness::new();
    let application = harness.assigned();
    let draft = harness
        .workflow
        .create_offer(&harness.financier, offer_draft(&application))
        .expect("offer drafted");

    let edited = harness
        .workflow
        .update_offer(
            &harness.financier,
            draft.id,
            OfferPatch {
                monthly_payment: Some(280.0),
                ..OfferPatch::default()
            },
        )
        .expect("draft is editable");
    assert_eq!(edited.terms.monthly_payment, 280.0);
    assert_eq!(edited.terms.term_months, 24);

    harness
        .workflow
        .submit_offer(&harness.financier, draft.id)
        .expect("submitted");
    let error = harness
        .workflow
        .update_offer(&harness.financier, draft.id, OfferPatch::default())
        .expect_err("pending offer is frozen");
    assert!(matches!(error, WorkflowError::InvalidState(_)));

    let error = harness
        .workflow
        .update_offer(&harness.other_financier, draft.id, OfferPatch::default())
        .expect_err("not their offer");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[test]
fn rejection_moves_application_to_offer_rejected() {
    let harness = Harness::new();
    let (application, offer) = harness.sent_offer();

    let rejected = harness
        .workflow
        .reject_offer(&harness.customer, offer.id)
        .expect("customer rejects");
    assert_eq!(rejected.status, OfferStatus::Rejected);
    let reloaded = harness
        .workflow
        .application(&harness.customer, application.id)
        .expect("customer reads");
    assert_eq!(reloaded.status, ApplicationStatus::OfferRejected);
}

#[test]
fn unassigned_financier_cannot_make_offers() {
    let harness = Harness::new();
    let application = harness.assigned();
    let error = harness
        .workflow
        .create_offer(&harness.other_financier, offer_draft(&application))
        .expect_err("not assigned");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[test]
fn invalid_terms_are_rejected() {
    let harness = Harness::new();
    let application = harness.assigned();
    let mut draft = offer_draft(&application);
    draft.terms.term_months = 0;
    let error = harness
        .workflow
        .create_offer(&harness.financier, draft)
        .expect_err("zero term");
    assert!(matches!(error, WorkflowError::Validation(_)));
}

#[test]
fn admin_overview_joins_application_and_financier() {
    let harness = Harness::new();
    let (application, offer) = harness.pending_offer();

    let overview = harness
        .workflow
        .offer_overview(&harness.admin, Some(OfferStatus::PendingAdmin))
        .expect("admin overview");
    assert_eq!(overview.len(), 1);
    assert_eq!(overview[0].offer.id, offer.id);
    assert_eq!(overview[0].financier_name.as_deref(), Some("Lakeside Rahoitus"));
    let summary = overview[0].application.as_ref().expect("application joined");
    assert_eq!(summary.reference_number, application.reference_number);
    assert_eq!(summary.company_name, "Konepaja Oy");

    assert!(harness
        .workflow
        .offer_overview(&harness.admin, Some(OfferStatus::Sent))
        .expect("admin overview")
        .is_empty());
    let error = harness
        .workflow
        .offer_overview(&harness.financier, None)
        .expect_err("admin only");
    assert!(matches!(error, WorkflowError::Forbidden(_)));
}

#[test]
fn financiers_list_only_their_own_offers() {
    let harness = Harness::new();
    let (_, offer) = harness.pending_offer();

    let mine = harness
        .workflow
        .list_offers(&harness.financier_colleague, None)
        .expect("listing works");
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id(), offer.id);

    assert!(harness
        .workflow
        .list_offers(&harness.other_financier, None)
        .expect("listing works")
        .is_empty());
}

#[test]
fn customer_chooses_among_released_offers() {
    let harness = Harness::new();
    let (application, lakeside, northern) = harness.competing_offers();
    assert_eq!(harness.application_status(&application), ApplicationStatus::OfferSent);
    assert_eq!(
        harness
            .workflow
            .list_offers(&harness.customer, Some(application.id))
            .expect("customer lists")
            .len(),
        2
    );

    harness
        .workflow
        .reject_offer(&harness.customer, lakeside.id)
        .expect("first offer declined");
    assert_eq!(harness.application_status(&application), ApplicationStatus::OfferRejected);
    assert_eq!(harness.offer_status(northern.id), OfferStatus::Sent);

    let accepted = harness
        .workflow
        .accept_offer(&harness.customer, northern.id)
        .expect("remaining offer still open");
    assert_eq!(accepted.status, OfferStatus::Accepted);
    assert_eq!(harness.application_status(&application), ApplicationStatus::OfferAccepted);
    assert_eq!(harness.offer_status(lakeside.id), OfferStatus::Rejected);
}

#[test]
fn accepting_one_offer_leaves_siblings_untouched() {
    let harness = Harness::new();
    let (application, lakeside, northern) = harness.competing_offers();

    harness
        .workflow
        .accept_offer(&harness.customer, lakeside.id)
        .expect("accepted");
    assert_eq!(harness.offer_status(northern.id), OfferStatus::Sent);

    // Declining the sibling afterwards keeps the accepted status.
    harness
        .workflow
        .reject_offer(&harness.customer, northern.id)
        .expect("sibling declined");
    assert_eq!(harness.offer_status(northern.id), OfferStatus::Rejected);
    assert_eq!(harness.application_status(&application), ApplicationStatus::OfferAccepted);
}

#[test]
fn late_release_does_not_reopen_an_accepted_application() {
    let harness = Harness::new();
    let (application, lakeside) = harness.sent_offer();
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
        .expect("second assignment");
    let northern = harness
        .workflow
        .create_offer(&harness.other_financier, offer_draft(&application))
        .expect("rival offer drafted");
    harness
        .workflow
        .submit_offer(&harness.other_financier, northern.id)
        .expect("rival offer submitted");

    harness
        .workflow
        .accept_offer(&harness.customer, lakeside.id)
        .expect("accepted");
    harness
        .workflow
        .approve_offer(&harness.admin, northern.id)
        .expect("late offer still released");
    assert_eq!(harness.offer_status(northern.id), OfferStatus::Sent);
    assert_eq!(harness.application_status(&application), ApplicationStatus::OfferAccepted);
}
