use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::super::domain::{
    Application, ApplicationDraft, ApplicationId, ApplicationPatch, ApplicationStatus,
    ApplicationSubmission, ApplicationType, UserId,
};
use super::super::effects::WorkflowEvent;
use super::super::error::WorkflowError;
use super::super::identity::{Actor, Role, User};
use super::super::lifecycle::override_application_status;
use super::super::messaging::Mailer;
use super::super::reference::application_reference;
use super::super::repository::{
    ApplicationFilter, Change, ChangeSet, NotificationSink, WorkflowStore,
};
use super::{require_admin, LeasingWorkflow};

const REFERENCE_ATTEMPTS: usize = 8;

/// Optional filters for application listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApplicationListQuery {
    pub status: Option<ApplicationStatus>,
    pub application_type: Option<ApplicationType>,
}

/// Result of an anonymous submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicSubmission {
    pub application: Application,
    pub customer_id: UserId,
    pub account_created: bool,
}

/// Statuses in which the applicant may still edit the application.
const CUSTOMER_EDITABLE: [ApplicationStatus; 3] = [
    ApplicationStatus::Draft,
    ApplicationStatus::Submitted,
    ApplicationStatus::InfoRequested,
];

fn build_application(
    draft: ApplicationDraft,
    customer_id: UserId,
    reference_number: String,
    now: DateTime<Utc>,
) -> Application {
    Application {
        id: ApplicationId::new(),
        reference_number,
        application_type: draft.application_type,
        status: ApplicationStatus::Submitted,
        customer_id,
        company: draft.company,
        equipment: draft.equipment,
        requested_terms: draft.requested_terms,
        additional_info: draft.additional_info,
        extras: draft.extras,
        created_at: now,
        updated_at: now,
        submitted_at: Some(now),
    }
}

impl<S, N, M> LeasingWorkflow<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    /// Submit an application on behalf of an authenticated customer.
    pub fn submit_application(
        &self,
        actor: &Actor,
        submission: ApplicationSubmission,
    ) -> Result<Application, WorkflowError> {
        let Actor::Customer { user_id } = *actor else {
            return Err(WorkflowError::forbidden(
                "only customers can submit applications",
            ));
        };
        submission.validate()?;

        let now = Utc::now();
        let reference = self.allocate_reference(submission.application_type(), now)?;
        let application = build_application(submission.into_draft(), user_id, reference, now);

        self.commit_and_dispatch(
            ChangeSet::new().with(Change::PutApplication(application.clone())),
            &[WorkflowEvent::ApplicationSubmitted {
                application: &application,
            }],
        )?;
        info!(
            application_id = %application.id,
            reference = %application.reference_number,
            status = %application.status,
            "application submitted"
        );
        Ok(application)
    }

    /// Submit without signing in. The contact e-mail selects an existing
    /// customer account or provisions a new one.
    pub fn submit_public_application(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<PublicSubmission, WorkflowError> {
        submission.validate()?;
        let now = Utc::now();

        let contact = submission.company().clone();
        let existing = self.store.user_by_email(&contact.contact_email)?;
        let (customer, account_created) = match existing {
            Some(user) if user.role == Role::Customer && user.is_active => (user, false),
            Some(_) => {
                return Err(WorkflowError::validation(
                    "contact e-mail belongs to an account that cannot submit applications",
                ))
            }
            None => {
                let (first_name, last_name) = contact.contact_names();
                let user = User {
                    id: UserId::new(),
                    email: contact.contact_email.trim().to_string(),
                    role: Role::Customer,
                    first_name,
                    last_name,
                    phone: contact.contact_phone.clone(),
                    company_name: Some(contact.company_name.clone()),
                    business_id: Some(contact.business_id.clone()),
                    financier_id: None,
                    is_active: true,
                    is_verified: false,
                    created_at: now,
                    updated_at: now,
                };
                (user, true)
            }
        };

        let reference = self.allocate_reference(submission.application_type(), now)?;
        let application = build_application(submission.into_draft(), customer.id, reference, now);

        let mut changes = ChangeSet::new();
        if account_created {
            changes.push(Change::PutUser(customer.clone()));
        }
        changes.push(Change::PutApplication(application.clone()));

        let mut events = Vec::with_capacity(2);
        if account_created {
            events.push(WorkflowEvent::CustomerProvisioned {
                customer: &customer,
            });
        }
        events.push(WorkflowEvent::ApplicationSubmitted {
            application: &application,
        });
        self.commit_and_dispatch(changes, &events)?;

        info!(
            application_id = %application.id,
            reference = %application.reference_number,
            account_created,
            "public application submitted"
        );
        Ok(PublicSubmission {
            customer_id: customer.id,
            application,
            account_created,
        })
    }

    /// Applications visible to the actor, newest first.
    pub fn list_applications(
        &self,
        actor: &Actor,
        query: &ApplicationListQuery,
    ) -> Result<Vec<Application>, WorkflowError> {
        let mut filter = ApplicationFilter {
            status: query.status,
            application_type: query.application_type,
            ..ApplicationFilter::default()
        };
        match actor {
            Actor::Customer { user_id } => filter.customer_id = Some(*user_id),
            Actor::Financier { financier_id, .. } => filter.financier_id = Some(*financier_id),
            Actor::Admin { .. } => {}
        }
        Ok(self.store.applications(&filter)?)
    }

    pub fn application(
        &self,
        actor: &Actor,
        id: ApplicationId,
    ) -> Result<Application, WorkflowError> {
        let application = self.load_application(id)?;
        self.ensure_can_view(actor, &application)?;
        Ok(application)
    }

    /// Edit descriptive fields. Customers may edit only early in the
    /// lifecycle and their `status` field is ignored; admins may also move
    /// the status through the override rules.
    pub fn update_application(
        &self,
        actor: &Actor,
        id: ApplicationId,
        mut patch: ApplicationPatch,
    ) -> Result<Application, WorkflowError> {
        let mut application = self.load_application(id)?;
        let requested_status = match actor {
            Actor::Customer { .. } => {
                self.ensure_owner(actor, &application)?;
                if !CUSTOMER_EDITABLE.contains(&application.status) {
                    return Err(WorkflowError::invalid_state(format!(
                        "application cannot be edited while {}",
                        application.status
                    )));
                }
                patch.status = None;
                None
            }
            Actor::Admin { .. } => patch.status.take(),
            Actor::Financier { .. } => {
                return Err(WorkflowError::forbidden(
                    "financiers cannot edit applications",
                ))
            }
        };

        let previous = application.status;
        patch.apply(&mut application)?;
        if let Some(target) = requested_status.filter(|target| *target != previous) {
            application.status = override_application_status(previous, target, actor.role())?;
        }
        application.updated_at = Utc::now();

        self.commit_and_dispatch(
            ChangeSet::new().with(Change::PutApplication(application.clone())),
            &[],
        )?;
        info!(
            application_id = %application.id,
            actor = %actor.user_id(),
            from = %previous,
            to = %application.status,
            "application updated"
        );
        Ok(application)
    }

    /// Administrative jump to any status, including ones no regular
    /// transition reaches.
    pub fn override_status(
        &self,
        actor: &Actor,
        id: ApplicationId,
        target: ApplicationStatus,
    ) -> Result<Application, WorkflowError> {
        require_admin(actor)?;
        let mut application = self.load_application(id)?;
        let previous = application.status;
        application.status = override_application_status(previous, target, actor.role())?;
        application.updated_at = Utc::now();

        self.commit_and_dispatch(
            ChangeSet::new().with(Change::PutApplication(application.clone())),
            &[],
        )?;
        info!(
            application_id = %application.id,
            admin = %actor.user_id(),
            from = %previous,
            to = %application.status,
            "application status overridden"
        );
        Ok(application)
    }

    fn allocate_reference(
        &self,
        kind: ApplicationType,
        at: DateTime<Utc>,
    ) -> Result<String, WorkflowError> {
        let mut rng = rand::thread_rng();
        for _ in 0..REFERENCE_ATTEMPTS {
            let candidate = application_reference(kind, at, &mut rng);
            if self.store.application_by_reference(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(WorkflowError::Duplicate(
            "could not allocate a unique reference number".to_string(),
        ))
    }
}
