//! Orchestration layer of the leasing workflow.
//!
//! Every operation follows the same shape: load fresh records, check the
//! actor against them, compute the transition, commit one [`ChangeSet`], and
//! only then deliver side effects. Delivery failures are logged, never
//! returned.

mod applications;
mod assignments;
mod contracts;
mod directory;
mod files;
mod info_requests;
mod notifications;
mod offers;

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::config::AppConfig;

use super::domain::{Application, ApplicationId, Notification, NotificationId, UserId};
use super::effects::{
    absolute_link, render_email, Audience, EmailRecipient, SideEffect, WorkflowEvent,
};
use super::error::WorkflowError;
use super::files::{BlobStore, UploadPolicy};
use super::identity::{Actor, Role};
use super::messaging::{Mailer, MessagingGateway};
use super::repository::{ChangeSet, NotificationSink, UserFilter, WorkflowStore};

pub use applications::{ApplicationListQuery, PublicSubmission};
pub use contracts::{ContractOverview, SignatureInput};
pub use directory::{FinancierUserDraft, ProfilePatch, UserListQuery};
pub use notifications::{NotificationQuery, UnreadCount, DEFAULT_NOTIFICATION_LIMIT};
pub use offers::{ApplicationSummary, OfferOverview};

/// Values the workflow reads from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub frontend_url: String,
    pub admin_email: String,
    pub uploads: UploadPolicy,
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            frontend_url: config.workflow.frontend_url.clone(),
            admin_email: config.workflow.admin_email.clone(),
            uploads: UploadPolicy::from(&config.uploads),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            admin_email: "myynti@kantama.fi".to_string(),
            uploads: UploadPolicy::default(),
        }
    }
}

/// Service composing storage, the notification inbox and e-mail delivery.
pub struct LeasingWorkflow<S, N, M> {
    store: Arc<S>,
    notifications: Arc<N>,
    messaging: MessagingGateway<M>,
    blobs: Arc<dyn BlobStore>,
    settings: WorkflowSettings,
}

impl<S, N, M> LeasingWorkflow<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifications: Arc<N>,
        mailer: Arc<M>,
        blobs: Arc<dyn BlobStore>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            store,
            notifications,
            messaging: MessagingGateway::new(mailer),
            blobs,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    fn load_application(&self, id: ApplicationId) -> Result<Application, WorkflowError> {
        self.store
            .application(id)?
            .ok_or(WorkflowError::not_found("application"))
    }

    fn is_assigned(&self, actor: &Actor, application_id: ApplicationId) -> Result<bool, WorkflowError> {
        match actor.financier_id() {
            Some(financier_id) => Ok(self
                .store
                .assignment_for(application_id, financier_id)?
                .is_some()),
            None => Ok(false),
        }
    }

    /// Owner, assigned financier, or admin.
    fn can_view_application(
        &self,
        actor: &Actor,
        application: &Application,
    ) -> Result<bool, WorkflowError> {
        match actor {
            Actor::Admin { .. } => Ok(true),
            Actor::Customer { user_id } => Ok(application.customer_id == *user_id),
            Actor::Financier { .. } => self.is_assigned(actor, application.id),
        }
    }

    fn ensure_can_view(&self, actor: &Actor, application: &Application) -> Result<(), WorkflowError> {
        if self.can_view_application(actor, application)? {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(
                "you do not have access to this application",
            ))
        }
    }

    fn ensure_assigned(&self, actor: &Actor, application: &Application) -> Result<(), WorkflowError> {
        if self.is_assigned(actor, application.id)? {
            Ok(())
        } else {
            Err(WorkflowError::forbidden(
                "your organisation is not assigned to this application",
            ))
        }
    }

    fn ensure_owner(&self, actor: &Actor, application: &Application) -> Result<(), WorkflowError> {
        match actor {
            Actor::Customer { user_id } if application.customer_id == *user_id => Ok(()),
            _ => Err(WorkflowError::forbidden(
                "only the applicant may perform this action",
            )),
        }
    }

    /// Commit atomically, then deliver what the events imply.
    fn commit_and_dispatch(
        &self,
        changes: ChangeSet,
        events: &[WorkflowEvent<'_>],
    ) -> Result<(), WorkflowError> {
        self.store.commit(changes)?;
        for event in events {
            self.dispatch(event.effects());
        }
        Ok(())
    }

    fn dispatch(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::Notify(spec) => {
                    let recipients = match self.resolve_audience(spec.audience) {
                        Ok(recipients) => recipients,
                        Err(error) => {
                            warn!(kind = ?spec.kind, %error, "could not resolve notification audience");
                            continue;
                        }
                    };
                    let action_url = absolute_link(&self.settings.frontend_url, &spec.link);
                    for user_id in recipients {
                        let notification = Notification {
                            id: NotificationId::new(),
                            user_id,
                            kind: spec.kind,
                            title: spec.title.clone(),
                            message: spec.message.clone(),
                            reference_kind: Some(spec.reference_kind),
                            reference_id: Some(spec.reference_id),
                            action_url: Some(action_url.clone()),
                            is_read: false,
                            created_at: Utc::now(),
                            read_at: None,
                        };
                        if let Err(error) = self.notifications.record(notification) {
                            warn!(%user_id, kind = ?spec.kind, %error, "notification not recorded");
                        }
                    }
                }
                SideEffect::Email(spec) => {
                    let to = match &spec.to {
                        EmailRecipient::Address(address) => address.as_str(),
                        EmailRecipient::AdminInbox => self.settings.admin_email.as_str(),
                    };
                    let (html, text) = render_email(&spec, &self.settings.frontend_url);
                    self.messaging
                        .send_email(to, &spec.subject, &html, Some(&text), &[]);
                }
            }
        }
    }

    fn resolve_audience(
        &self,
        audience: Audience,
    ) -> Result<Vec<UserId>, WorkflowError> {
        let filter = match audience {
            Audience::User(user_id) => return Ok(vec![user_id]),
            Audience::ActiveFinancierUsers(financier_id) => UserFilter {
                role: Some(Role::Financier),
                financier_id: Some(financier_id),
                active_only: true,
            },
            Audience::ActiveAdmins => UserFilter {
                role: Some(Role::Admin),
                financier_id: None,
                active_only: true,
            },
        };
        Ok(self
            .store
            .users(&filter)?
            .into_iter()
            .map(|user| user.id)
            .collect())
    }
}

fn require_admin(actor: &Actor) -> Result<(), WorkflowError> {
    match actor {
        Actor::Admin { .. } => Ok(()),
        _ => Err(WorkflowError::forbidden("administrator access required")),
    }
}
