use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::super::domain::{Application, ApplicationId, ApplicationStatus, Financier, OfferId};
use super::super::effects::WorkflowEvent;
use super::super::error::WorkflowError;
use super::super::identity::Actor;
use super::super::lifecycle::{attempt_transition, ApplicationEvent, OfferEvent};
use super::super::messaging::Mailer;
use super::super::offer::{Offer, OfferDraft, OfferPatch, OfferStatus, OfferView};
use super::super::repository::{Change, ChangeSet, NotificationSink, OfferFilter, WorkflowStore};
use super::{require_admin, LeasingWorkflow};

/// Application fields shown next to offers and contracts in admin lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub reference_number: String,
    pub company_name: String,
    pub status: ApplicationStatus,
}

impl From<&Application> for ApplicationSummary {
    fn from(application: &Application) -> Self {
        Self {
            id: application.id,
            reference_number: application.reference_number.clone(),
            company_name: application.company.company_name.clone(),
            status: application.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferOverview {
    #[serde(flatten)]
    pub offer: Offer,
    pub application: Option<ApplicationSummary>,
    pub financier_name: Option<String>,
}

impl<S, N, M> LeasingWorkflow<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    /// Draft an offer for an assigned application.
    pub fn create_offer(&self, actor: &Actor, draft: OfferDraft) -> Result<Offer, WorkflowError> {
        let Actor::Financier { financier_id, .. } = *actor else {
            return Err(WorkflowError::forbidden("only financiers can create offers"));
        };
        let application = self.load_application(draft.application_id)?;
        self.ensure_assigned(actor, &application)?;
        if !application.status.is_active() {
            return Err(WorkflowError::invalid_state(format!(
                "offers cannot be made while the application is {}",
                application.status
            )));
        }
        draft.terms.validate()?;

        let now = Utc::now();
        let offer = Offer {
            id: OfferId::new(),
            application_id: application.id,
            financier_id,
            status: OfferStatus::Draft,
            terms: draft.terms,
            notes_to_customer: draft.notes_to_customer,
            internal_notes: draft.internal_notes,
            extra_terms: draft.extra_terms,
            attachment_file_id: None,
            expires_at: draft.expires_at,
            created_at: now,
            updated_at: now,
            sent_at: None,
            responded_at: None,
        };
        self.commit_and_dispatch(ChangeSet::new().with(Change::PutOffer(offer.clone())), &[])?;
        info!(offer_id = %offer.id, application_id = %application.id, "offer drafted");
        Ok(offer)
    }

    pub fn update_offer(
        &self,
        actor: &Actor,
        id: OfferId,
        patch: OfferPatch,
    ) -> Result<Offer, WorkflowError> {
        let mut offer = self.load_offer(id)?;
        self.ensure_offer_owner(actor, &offer)?;
        attempt_transition(offer.status, OfferEvent::Edit, actor.role())?;
        patch.apply(&mut offer)?;
        offer.updated_at = Utc::now();
        self.commit_and_dispatch(ChangeSet::new().with(Change::PutOffer(offer.clone())), &[])?;
        Ok(offer)
    }

    /// Hand a draft to the admin queue.
    pub fn submit_offer(&self, actor: &Actor, id: OfferId) -> Result<Offer, WorkflowError> {
        let mut offer = self.load_offer(id)?;
        self.ensure_offer_owner(actor, &offer)?;
        let application = self.load_application(offer.application_id)?;
        let financier = self.load_financier(&offer)?;

        let previous = offer.status;
        offer.status = attempt_transition(previous, OfferEvent::SubmitForApproval, actor.role())?;
        offer.updated_at = Utc::now();

        self.commit_and_dispatch(
            ChangeSet::new().with(Change::PutOffer(offer.clone())),
            &[WorkflowEvent::OfferSubmitted {
                application: &application,
                offer: &offer,
                financier: &financier,
            }],
        )?;
        info!(
            offer_id = %offer.id,
            from = previous.label(),
            to = offer.status.label(),
            "offer submitted for approval"
        );
        Ok(offer)
    }

    /// Release a pending offer to the customer.
    pub fn approve_offer(&self, actor: &Actor, id: OfferId) -> Result<Offer, WorkflowError> {
        require_admin(actor)?;
        let mut offer = self.load_offer(id)?;
        let mut application = self.load_application(offer.application_id)?;

        offer.status = attempt_transition(offer.status, OfferEvent::Approve, actor.role())?;
        let previous = application.status;
        application.status =
            attempt_transition(previous, ApplicationEvent::OfferReleased, actor.role())?;

        let now = Utc::now();
        offer.sent_at = Some(now);
        offer.updated_at = now;
        application.updated_at = now;

        self.commit_and_dispatch(
            ChangeSet::new()
                .with(Change::PutOffer(offer.clone()))
                .with(Change::PutApplication(application.clone())),
            &[WorkflowEvent::OfferApproved {
                application: &application,
                offer: &offer,
            }],
        )?;
        info!(
            offer_id = %offer.id,
            application_id = %application.id,
            from = %previous,
            to = %application.status,
            "offer approved and sent"
        );
        Ok(offer)
    }

    pub fn accept_offer(&self, actor: &Actor, id: OfferId) -> Result<Offer, WorkflowError> {
        let (mut offer, mut application) = self.customer_offer_context(actor, id)?;
        let financier = self.load_financier(&offer)?;

        offer.status = attempt_transition(offer.status, OfferEvent::Accept, actor.role())?;
        let previous = application.status;
        application.status =
            attempt_transition(previous, ApplicationEvent::OfferAccepted, actor.role())?;

        let now = Utc::now();
        offer.responded_at = Some(now);
        offer.updated_at = now;
        application.updated_at = now;

        self.commit_and_dispatch(
            ChangeSet::new()
                .with(Change::PutOffer(offer.clone()))
                .with(Change::PutApplication(application.clone())),
            &[WorkflowEvent::OfferAccepted {
                application: &application,
                offer: &offer,
                financier: &financier,
            }],
        )?;
        info!(
            offer_id = %offer.id,
            application_id = %application.id,
            from = %previous,
            to = %application.status,
            "offer accepted"
        );
        Ok(offer)
    }

    pub fn reject_offer(&self, actor: &Actor, id: OfferId) -> Result<Offer, WorkflowError> {
        let (mut offer, mut application) = self.customer_offer_context(actor, id)?;

        offer.status = attempt_transition(offer.status, OfferEvent::Reject, actor.role())?;
        let previous = application.status;
        application.status =
            attempt_transition(previous, ApplicationEvent::OfferRejected, actor.role())?;

        let now = Utc::now();
        offer.responded_at = Some(now);
        offer.updated_at = now;
        application.updated_at = now;

        self.commit_and_dispatch(
            ChangeSet::new()
                .with(Change::PutOffer(offer.clone()))
                .with(Change::PutApplication(application.clone())),
            &[],
        )?;
        info!(
            offer_id = %offer.id,
            application_id = %application.id,
            from = %previous,
            to = %application.status,
            "offer rejected"
        );
        Ok(offer)
    }

    /// Offers the actor may see. Customers get the redacted view and never
    /// see drafts or offers awaiting approval.
    pub fn list_offers(
        &self,
        actor: &Actor,
        application_id: Option<ApplicationId>,
    ) -> Result<Vec<OfferView>, WorkflowError> {
        let mut filter = OfferFilter {
            application_id,
            ..OfferFilter::default()
        };
        match actor {
            Actor::Admin { .. } => {}
            Actor::Financier { financier_id, .. } => filter.financier_id = Some(*financier_id),
            Actor::Customer { .. } => {
                let owned: Vec<ApplicationId> = match application_id {
                    Some(id) => {
                        let application = self.load_application(id)?;
                        self.ensure_owner(actor, &application)?;
                        vec![application.id]
                    }
                    None => self
                        .list_applications(actor, &Default::default())?
                        .into_iter()
                        .map(|application| application.id)
                        .collect(),
                };
                filter.statuses = Some(vec![
                    OfferStatus::Sent,
                    OfferStatus::Accepted,
                    OfferStatus::Rejected,
                    OfferStatus::Expired,
                ]);
                return Ok(self
                    .store
                    .offers(&filter)?
                    .into_iter()
                    .filter(|offer| owned.contains(&offer.application_id))
                    .map(|offer| OfferView::Customer(offer.into()))
                    .collect());
            }
        }
        Ok(self
            .store
            .offers(&filter)?
            .into_iter()
            .map(OfferView::Full)
            .collect())
    }

    pub fn offer(&self, actor: &Actor, id: OfferId) -> Result<OfferView, WorkflowError> {
        let offer = self.load_offer(id)?;
        match actor {
            Actor::Admin { .. } => Ok(OfferView::Full(offer)),
            Actor::Financier { .. } => {
                self.ensure_offer_owner(actor, &offer)?;
                Ok(OfferView::Full(offer))
            }
            Actor::Customer { .. } => {
                let application = self.load_application(offer.application_id)?;
                self.ensure_owner(actor, &application)?;
                if !offer.status.customer_visible() {
                    return Err(WorkflowError::forbidden("this offer is not available yet"));
                }
                Ok(OfferView::Customer(offer.into()))
            }
        }
    }

    /// Every offer with its application and financier, for the admin queue.
    pub fn offer_overview(
        &self,
        actor: &Actor,
        status: Option<OfferStatus>,
    ) -> Result<Vec<OfferOverview>, WorkflowError> {
        require_admin(actor)?;
        let filter = OfferFilter {
            statuses: status.map(|status| vec![status]),
            ..OfferFilter::default()
        };
        self.store
            .offers(&filter)?
            .into_iter()
            .map(|offer| {
                let application = self.store.application(offer.application_id)?;
                let financier = self.store.financier(offer.financier_id)?;
                Ok(OfferOverview {
                    application: application.as_ref().map(ApplicationSummary::from),
                    financier_name: financier.map(|financier| financier.name),
                    offer,
                })
            })
            .collect()
    }

    fn load_offer(&self, id: OfferId) -> Result<Offer, WorkflowError> {
        self.store.offer(id)?.ok_or(WorkflowError::not_found("offer"))
    }

    fn load_financier(&self, offer: &Offer) -> Result<Financier, WorkflowError> {
        self.store
            .financier(offer.financier_id)?
            .ok_or(WorkflowError::not_found("financier"))
    }

    fn ensure_offer_owner(&self, actor: &Actor, offer: &Offer) -> Result<(), WorkflowError> {
        match actor.financier_id() {
            Some(financier_id) if financier_id == offer.financier_id => Ok(()),
            _ => Err(WorkflowError::forbidden(
                "only the financier that made this offer may do this",
            )),
        }
    }

    /// Loads an offer and its application for the owning customer, hiding
    /// offers that have not been released.
    fn customer_offer_context(
        &self,
        actor: &Actor,
        id: OfferId,
    ) -> Result<(Offer, Application), WorkflowError> {
        let offer = self.load_offer(id)?;
        let application = self.load_application(offer.application_id)?;
        self.ensure_owner(actor, &application)?;
        if !offer.status.customer_visible() {
            return Err(WorkflowError::forbidden("this offer is not available yet"));
        }
        Ok((offer, application))
    }
}
