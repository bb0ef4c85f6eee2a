use chrono::Utc;
use tracing::info;

use super::super::domain::{
    ApplicationId, Assignment, AssignmentId, AssignmentRequest, AssignmentStatus,
};
use super::super::effects::WorkflowEvent;
use super::super::error::WorkflowError;
use super::super::identity::Actor;
use super::super::lifecycle::{attempt_transition, ApplicationEvent};
use super::super::messaging::Mailer;
use super::super::repository::{Change, ChangeSet, NotificationSink, WorkflowStore};
use super::{require_admin, LeasingWorkflow};

impl<S, N, M> LeasingWorkflow<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    /// Route an application to a financier.
    ///
    /// The duplicate check here is advisory; the store's uniqueness rule on
    /// (application, financier) decides concurrent attempts.
    pub fn assign_application(
        &self,
        actor: &Actor,
        request: AssignmentRequest,
    ) -> Result<Assignment, WorkflowError> {
        require_admin(actor)?;
        let mut application = self.load_application(request.application_id)?;
        let financier = self
            .store
            .financier(request.financier_id)?
            .ok_or(WorkflowError::not_found("financier"))?;
        if !financier.is_active {
            return Err(WorkflowError::validation(format!(
                "financier {} is not active",
                financier.name
            )));
        }
        if self
            .store
            .assignment_for(application.id, financier.id)?
            .is_some()
        {
            return Err(WorkflowError::Duplicate(format!(
                "application is already assigned to {}",
                financier.name
            )));
        }

        let previous = application.status;
        let next = attempt_transition(
            previous,
            ApplicationEvent::AssignedToFinancier,
            actor.role(),
        )?;

        let now = Utc::now();
        let assignment = Assignment {
            id: AssignmentId::new(),
            application_id: application.id,
            financier_id: financier.id,
            assigned_by: actor.user_id(),
            status: AssignmentStatus::Pending,
            notes: request.notes,
            assigned_at: now,
            updated_at: now,
        };
        application.status = next;
        application.updated_at = now;

        self.commit_and_dispatch(
            ChangeSet::new()
                .with(Change::InsertAssignment(assignment.clone()))
                .with(Change::PutApplication(application.clone())),
            &[WorkflowEvent::AssignedToFinancier {
                application: &application,
                financier: &financier,
            }],
        )?;
        info!(
            application_id = %application.id,
            financier_id = %financier.id,
            from = %previous,
            to = %application.status,
            "application assigned"
        );
        Ok(assignment)
    }

    /// Delete an assignment. The application keeps its current status.
    pub fn remove_assignment(&self, actor: &Actor, id: AssignmentId) -> Result<(), WorkflowError> {
        require_admin(actor)?;
        let assignment = self
            .store
            .assignment(id)?
            .ok_or(WorkflowError::not_found("assignment"))?;
        self.commit_and_dispatch(
            ChangeSet::new().with(Change::RemoveAssignment(assignment.id)),
            &[],
        )?;
        info!(
            assignment_id = %assignment.id,
            application_id = %assignment.application_id,
            financier_id = %assignment.financier_id,
            "assignment removed"
        );
        Ok(())
    }

    /// Assignments of one application, newest first.
    pub fn list_assignments(
        &self,
        actor: &Actor,
        application_id: ApplicationId,
    ) -> Result<Vec<Assignment>, WorkflowError> {
        require_admin(actor)?;
        let application = self.load_application(application_id)?;
        Ok(self.store.assignments_for_application(application.id)?)
    }
}
