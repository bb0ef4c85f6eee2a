use chrono::Utc;
use tracing::info;

use super::super::domain::{
    require_text, Application, ApplicationId, InfoRequest, InfoRequestDraft, InfoRequestId,
    InfoRequestResponse, InfoRequestStatus, InfoRequestThread, InfoResponseDraft, InfoResponseId,
};
use super::super::effects::WorkflowEvent;
use super::super::error::WorkflowError;
use super::super::identity::Actor;
use super::super::lifecycle::{attempt_transition, ApplicationEvent};
use super::super::messaging::Mailer;
use super::super::repository::{Change, ChangeSet, NotificationSink, WorkflowStore};
use super::LeasingWorkflow;

impl<S, N, M> LeasingWorkflow<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    /// Financier asks the applicant for more information.
    pub fn request_info(
        &self,
        actor: &Actor,
        draft: InfoRequestDraft,
    ) -> Result<InfoRequest, WorkflowError> {
        let Actor::Financier {
            user_id,
            financier_id,
        } = *actor
        else {
            return Err(WorkflowError::forbidden(
                "only financiers can request information",
            ));
        };
        let mut application = self.load_application(draft.application_id)?;
        self.ensure_assigned(actor, &application)?;
        require_text(&draft.message, "message")?;

        let previous = application.status;
        let next = attempt_transition(previous, ApplicationEvent::InfoRequested, actor.role())?;

        let now = Utc::now();
        let request = InfoRequest {
            id: InfoRequestId::new(),
            application_id: application.id,
            financier_id,
            requested_by: user_id,
            message: draft.message,
            requested_items: draft
                .requested_items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            status: InfoRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        application.status = next;
        application.updated_at = now;

        self.commit_and_dispatch(
            ChangeSet::new()
                .with(Change::PutInfoRequest(request.clone()))
                .with(Change::PutApplication(application.clone())),
            &[WorkflowEvent::InfoRequested {
                application: &application,
                request: &request,
            }],
        )?;
        info!(
            application_id = %application.id,
            info_request_id = %request.id,
            from = %previous,
            to = %application.status,
            "information requested"
        );
        Ok(request)
    }

    /// Append a reply. A reply from the applicant marks the request as
    /// responded and notifies the financier; a financier reply changes
    /// nothing else.
    pub fn respond_to_info_request(
        &self,
        actor: &Actor,
        id: InfoRequestId,
        draft: InfoResponseDraft,
    ) -> Result<InfoRequestResponse, WorkflowError> {
        let mut request = self.load_info_request(id)?;
        let application = self.load_application(request.application_id)?;
        let from_customer = match actor {
            Actor::Customer { .. } => {
                self.ensure_owner(actor, &application)?;
                true
            }
            Actor::Financier { financier_id, .. } if *financier_id == request.financier_id => {
                self.ensure_assigned(actor, &application)?;
                false
            }
            _ => {
                return Err(WorkflowError::forbidden(
                    "only the applicant or the requesting financier may respond",
                ))
            }
        };
        if request.status == InfoRequestStatus::Closed {
            return Err(WorkflowError::invalid_state(
                "info request cannot be answered while CLOSED",
            ));
        }
        require_text(&draft.message, "message")?;
        for file_id in &draft.attachment_ids {
            let attached = self.store.file(*file_id)?;
            if !attached.is_some_and(|file| file.application_id == Some(application.id)) {
                return Err(WorkflowError::validation(format!(
                    "attachment {file_id} does not belong to this application"
                )));
            }
        }

        let now = Utc::now();
        let response = InfoRequestResponse {
            id: InfoResponseId::new(),
            info_request_id: request.id,
            responder_id: actor.user_id(),
            message: draft.message,
            attachment_ids: draft.attachment_ids,
            created_at: now,
        };

        let mut changes = ChangeSet::new().with(Change::InsertInfoResponse(response.clone()));
        if from_customer {
            request.status = InfoRequestStatus::Responded;
            request.updated_at = now;
            changes.push(Change::PutInfoRequest(request.clone()));
        }
        let provided = [WorkflowEvent::InfoProvided {
            application: &application,
            request: &request,
        }];
        let events: &[WorkflowEvent<'_>] = if from_customer { &provided } else { &[] };
        self.commit_and_dispatch(changes, events)?;

        info!(
            info_request_id = %request.id,
            responder = %actor.user_id(),
            from_customer,
            "info request answered"
        );
        Ok(response)
    }

    /// Threads of one application. Financiers see only their own requests.
    pub fn list_info_requests(
        &self,
        actor: &Actor,
        application_id: ApplicationId,
    ) -> Result<Vec<InfoRequestThread>, WorkflowError> {
        let application = self.load_application(application_id)?;
        self.ensure_can_view(actor, &application)?;
        self.store
            .info_requests_for_application(application.id)?
            .into_iter()
            .filter(|request| {
                actor
                    .financier_id()
                    .map_or(true, |financier_id| request.financier_id == financier_id)
            })
            .map(|request| self.thread(request))
            .collect()
    }

    pub fn info_request(
        &self,
        actor: &Actor,
        id: InfoRequestId,
    ) -> Result<InfoRequestThread, WorkflowError> {
        let request = self.load_info_request(id)?;
        let application = self.load_application(request.application_id)?;
        self.ensure_can_view_request(actor, &application, &request)?;
        self.thread(request)
    }

    fn ensure_can_view_request(
        &self,
        actor: &Actor,
        application: &Application,
        request: &InfoRequest,
    ) -> Result<(), WorkflowError> {
        self.ensure_can_view(actor, application)?;
        match actor.financier_id() {
            Some(financier_id) if financier_id != request.financier_id => Err(
                WorkflowError::forbidden("this info request belongs to another financier"),
            ),
            _ => Ok(()),
        }
    }

    fn load_info_request(&self, id: InfoRequestId) -> Result<InfoRequest, WorkflowError> {
        self.store
            .info_request(id)?
            .ok_or(WorkflowError::not_found("info request"))
    }

    fn thread(&self, request: InfoRequest) -> Result<InfoRequestThread, WorkflowError> {
        let responses = self.store.info_responses(request.id)?;
        Ok(InfoRequestThread { request, responses })
    }
}
