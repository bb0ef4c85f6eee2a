use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::auth::TokenIssuer;
use super::contract::{ContractDraft, ContractPatch};
use super::domain::{
    ApplicationId, ApplicationPatch, ApplicationStatus, ApplicationSubmission, AssignmentId,
    AssignmentRequest, ContractId, FileId, FinancierDraft, FinancierId, FinancierPatch,
    InfoRequestDraft, InfoRequestId, InfoResponseDraft, NotificationId, OfferId, UserId,
};
use super::error::WorkflowError;
use super::files::{Upload, UploadContext};
use super::identity::Actor;
use super::messaging::Mailer;
use super::offer::{OfferDraft, OfferPatch, OfferStatus};
use super::registry::{BusinessId, CompanyRegistry, NameQuery};
use super::repository::{NotificationSink, WorkflowStore};
use super::service::{
    ApplicationListQuery, FinancierUserDraft, LeasingWorkflow, NotificationQuery, ProfilePatch,
    SignatureInput, UserListQuery,
};

const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Shared state behind every leasing endpoint.
pub struct ApiState<S, N, M> {
    pub workflow: Arc<LeasingWorkflow<S, N, M>>,
    pub tokens: TokenIssuer,
    pub registry: Arc<dyn CompanyRegistry>,
}

impl<S, N, M> Clone for ApiState<S, N, M> {
    fn clone(&self) -> Self {
        Self {
            workflow: Arc::clone(&self.workflow),
            tokens: self.tokens.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Actor resolved from the bearer token and the stored account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S, N, M> FromRequestParts<ApiState<S, N, M>> for CurrentActor
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    type Rejection = WorkflowError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState<S, N, M>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let claims = state.tokens.verify_header(header).map_err(|error| {
            debug!(%error, "bearer token rejected");
            WorkflowError::from(error)
        })?;
        let (_, actor) = state.workflow.resolve_actor(claims.user_id())?;
        Ok(CurrentActor(actor))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApplicationScope {
    pub application_id: Option<ApplicationId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OfferStatusQuery {
    pub status: Option<OfferStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FinancierListQuery {
    pub active_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusOverride {
    pub status: ApplicationStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UploadParams {
    pub filename: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanySearchParams {
    pub name: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
struct Count {
    updated: usize,
}

/// Router builder exposing the leasing workflow under `/api/v1`.
pub fn leasing_router<S, N, M>(state: ApiState<S, N, M>) -> Router
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    // Leave headroom so the upload policy, not the transport, reports
    // oversized files.
    let body_limit = state
        .workflow
        .settings()
        .uploads
        .limit_for(UploadContext::Document)
        .saturating_mul(2);

    Router::new()
        .route(
            "/api/v1/applications",
            get(list_applications_handler::<S, N, M>).post(submit_application_handler::<S, N, M>),
        )
        .route(
            "/api/v1/applications/public",
            post(submit_public_application_handler::<S, N, M>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(application_handler::<S, N, M>).patch(update_application_handler::<S, N, M>),
        )
        .route(
            "/api/v1/applications/:application_id/status",
            post(override_status_handler::<S, N, M>),
        )
        .route(
            "/api/v1/applications/:application_id/assignments",
            get(list_assignments_handler::<S, N, M>),
        )
        .route(
            "/api/v1/applications/:application_id/info-requests",
            get(list_info_requests_handler::<S, N, M>),
        )
        .route(
            "/api/v1/applications/:application_id/files",
            get(list_files_handler::<S, N, M>).post(upload_document_handler::<S, N, M>),
        )
        .route("/api/v1/assignments", post(assign_handler::<S, N, M>))
        .route(
            "/api/v1/assignments/:assignment_id",
            delete(remove_assignment_handler::<S, N, M>),
        )
        .route("/api/v1/info-requests", post(request_info_handler::<S, N, M>))
        .route(
            "/api/v1/info-requests/:info_request_id",
            get(info_request_handler::<S, N, M>),
        )
        .route(
            "/api/v1/info-requests/:info_request_id/responses",
            post(respond_info_request_handler::<S, N, M>),
        )
        .route(
            "/api/v1/offers",
            get(list_offers_handler::<S, N, M>).post(create_offer_handler::<S, N, M>),
        )
        .route(
            "/api/v1/offers/:offer_id",
            get(offer_handler::<S, N, M>).patch(update_offer_handler::<S, N, M>),
        )
        .route(
            "/api/v1/offers/:offer_id/submit",
            post(submit_offer_handler::<S, N, M>),
        )
        .route(
            "/api/v1/offers/:offer_id/approve",
            post(approve_offer_handler::<S, N, M>),
        )
        .route(
            "/api/v1/offers/:offer_id/accept",
            post(accept_offer_handler::<S, N, M>),
        )
        .route(
            "/api/v1/offers/:offer_id/reject",
            post(reject_offer_handler::<S, N, M>),
        )
        .route(
            "/api/v1/admin/offers",
            get(offer_overview_handler::<S, N, M>),
        )
        .route(
            "/api/v1/contracts",
            get(list_contracts_handler::<S, N, M>).post(create_contract_handler::<S, N, M>),
        )
        .route(
            "/api/v1/contracts/:contract_id",
            get(contract_handler::<S, N, M>).patch(update_contract_handler::<S, N, M>),
        )
        .route(
            "/api/v1/contracts/:contract_id/logo",
            post(contract_logo_handler::<S, N, M>),
        )
        .route(
            "/api/v1/contracts/:contract_id/document",
            post(contract_document_handler::<S, N, M>),
        )
        .route(
            "/api/v1/contracts/:contract_id/send",
            post(send_contract_handler::<S, N, M>),
        )
        .route(
            "/api/v1/contracts/:contract_id/sign",
            post(sign_contract_handler::<S, N, M>),
        )
        .route(
            "/api/v1/contracts/:contract_id/signed-upload",
            post(signed_upload_handler::<S, N, M>),
        )
        .route(
            "/api/v1/admin/contracts",
            get(contract_overview_handler::<S, N, M>),
        )
        .route(
            "/api/v1/files/:file_id",
            get(file_handler::<S, N, M>).delete(delete_file_handler::<S, N, M>),
        )
        .route(
            "/api/v1/files/:file_id/download",
            get(download_file_handler::<S, N, M>),
        )
        .route(
            "/api/v1/notifications",
            get(notifications_handler::<S, N, M>),
        )
        .route(
            "/api/v1/notifications/unread-count",
            get(unread_count_handler::<S, N, M>),
        )
        .route(
            "/api/v1/notifications/read-all",
            post(mark_all_read_handler::<S, N, M>),
        )
        .route(
            "/api/v1/notifications/:notification_id/read",
            post(mark_read_handler::<S, N, M>),
        )
        .route(
            "/api/v1/financiers",
            get(list_financiers_handler::<S, N, M>).post(create_financier_handler::<S, N, M>),
        )
        .route(
            "/api/v1/financiers/:financier_id",
            get(financier_handler::<S, N, M>)
                .patch(update_financier_handler::<S, N, M>)
                .delete(deactivate_financier_handler::<S, N, M>),
        )
        .route(
            "/api/v1/financiers/:financier_id/users",
            post(create_financier_user_handler::<S, N, M>),
        )
        .route("/api/v1/users", get(list_users_handler::<S, N, M>))
        .route("/api/v1/users/:user_id", get(user_handler::<S, N, M>))
        .route(
            "/api/v1/users/:user_id/activate",
            post(activate_user_handler::<S, N, M>),
        )
        .route(
            "/api/v1/users/:user_id/deactivate",
            post(deactivate_user_handler::<S, N, M>),
        )
        .route(
            "/api/v1/me",
            get(me_handler::<S, N, M>).patch(update_profile_handler::<S, N, M>),
        )
        .route(
            "/api/v1/registry/companies/:business_id",
            get(company_lookup_handler::<S, N, M>),
        )
        .route(
            "/api/v1/registry/search",
            get(company_search_handler::<S, N, M>),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, WorkflowError>) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

fn respond_empty(result: Result<(), WorkflowError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

fn upload_from(params: UploadParams, headers: &HeaderMap, body: Bytes) -> Upload {
    Upload {
        filename: params.filename.unwrap_or_default(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        bytes: body.to_vec(),
    }
}

// Applications

pub(crate) async fn submit_application_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    axum::Json(submission): axum::Json<ApplicationSubmission>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::CREATED,
        state.workflow.submit_application(&actor, submission),
    )
}

pub(crate) async fn submit_public_application_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    axum::Json(submission): axum::Json<ApplicationSubmission>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::CREATED,
        state.workflow.submit_public_application(submission),
    )
}

pub(crate) async fn list_applications_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<ApplicationListQuery>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.list_applications(&actor, &query))
}

pub(crate) async fn application_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<ApplicationId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.application(&actor, application_id))
}

pub(crate) async fn update_application_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<ApplicationId>,
    axum::Json(patch): axum::Json<ApplicationPatch>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state
            .workflow
            .update_application(&actor, application_id, patch),
    )
}

pub(crate) async fn override_status_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<ApplicationId>,
    axum::Json(body): axum::Json<StatusOverride>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state
            .workflow
            .override_status(&actor, application_id, body.status),
    )
}

// Assignments

pub(crate) async fn assign_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    axum::Json(request): axum::Json<AssignmentRequest>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::CREATED,
        state.workflow.assign_application(&actor, request),
    )
}

pub(crate) async fn remove_assignment_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(assignment_id): Path<AssignmentId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond_empty(state.workflow.remove_assignment(&actor, assignment_id))
}

pub(crate) async fn list_assignments_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<ApplicationId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.list_assignments(&actor, application_id),
    )
}

// Info requests

pub(crate) async fn request_info_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    axum::Json(draft): axum::Json<InfoRequestDraft>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::CREATED, state.workflow.request_info(&actor, draft))
}

pub(crate) async fn respond_info_request_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(info_request_id): Path<InfoRequestId>,
    axum::Json(draft): axum::Json<InfoResponseDraft>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::CREATED,
        state
            .workflow
            .respond_to_info_request(&actor, info_request_id, draft),
    )
}

pub(crate) async fn list_info_requests_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<ApplicationId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.list_info_requests(&actor, application_id),
    )
}

pub(crate) async fn info_request_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(info_request_id): Path<InfoRequestId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.info_request(&actor, info_request_id),
    )
}

// Offers

pub(crate) async fn create_offer_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    axum::Json(draft): axum::Json<OfferDraft>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::CREATED, state.workflow.create_offer(&actor, draft))
}

pub(crate) async fn update_offer_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(offer_id): Path<OfferId>,
    axum::Json(patch): axum::Json<OfferPatch>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.update_offer(&actor, offer_id, patch),
    )
}

pub(crate) async fn submit_offer_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(offer_id): Path<OfferId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.submit_offer(&actor, offer_id))
}

pub(crate) async fn approve_offer_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(offer_id): Path<OfferId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.approve_offer(&actor, offer_id))
}

pub(crate) async fn accept_offer_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(offer_id): Path<OfferId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.accept_offer(&actor, offer_id))
}

pub(crate) async fn reject_offer_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(offer_id): Path<OfferId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.reject_offer(&actor, offer_id))
}

pub(crate) async fn list_offers_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Query(scope): Query<ApplicationScope>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.list_offers(&actor, scope.application_id),
    )
}

pub(crate) async fn offer_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(offer_id): Path<OfferId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.offer(&actor, offer_id))
}

pub(crate) async fn offer_overview_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<OfferStatusQuery>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.offer_overview(&actor, query.status),
    )
}

// Contracts

pub(crate) async fn create_contract_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    axum::Json(draft): axum::Json<ContractDraft>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::CREATED,
        state.workflow.create_contract(&actor, draft),
    )
}

pub(crate) async fn update_contract_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(contract_id): Path<ContractId>,
    axum::Json(patch): axum::Json<ContractPatch>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.update_contract(&actor, contract_id, patch),
    )
}

pub(crate) async fn contract_logo_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(contract_id): Path<ContractId>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let upload = upload_from(params, &headers, body);
    respond(
        StatusCode::OK,
        state
            .workflow
            .upload_contract_logo(&actor, contract_id, upload),
    )
}

pub(crate) async fn contract_document_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(contract_id): Path<ContractId>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let upload = upload_from(params, &headers, body);
    respond(
        StatusCode::OK,
        state
            .workflow
            .upload_contract_document(&actor, contract_id, upload),
    )
}

pub(crate) async fn send_contract_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(contract_id): Path<ContractId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.send_contract(&actor, contract_id),
    )
}

pub(crate) async fn sign_contract_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(contract_id): Path<ContractId>,
    axum::Json(input): axum::Json<SignatureInput>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.sign_contract(&actor, contract_id, input),
    )
}

pub(crate) async fn signed_upload_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(contract_id): Path<ContractId>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let upload = upload_from(params, &headers, body);
    respond(
        StatusCode::OK,
        state
            .workflow
            .upload_signed_contract(&actor, contract_id, upload),
    )
}

pub(crate) async fn list_contracts_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Query(scope): Query<ApplicationScope>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.list_contracts(&actor, scope.application_id),
    )
}

pub(crate) async fn contract_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(contract_id): Path<ContractId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.contract(&actor, contract_id))
}

pub(crate) async fn contract_overview_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.contract_overview(&actor))
}

// Files

pub(crate) async fn upload_document_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<ApplicationId>,
    Query(mut params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let description = params.description.take();
    let upload = upload_from(params, &headers, body);
    respond(
        StatusCode::CREATED,
        state
            .workflow
            .upload_document(&actor, application_id, upload, description),
    )
}

pub(crate) async fn list_files_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(application_id): Path<ApplicationId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.list_files(&actor, application_id))
}

pub(crate) async fn file_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(file_id): Path<FileId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.file(&actor, file_id))
}

pub(crate) async fn download_file_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(file_id): Path<FileId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    match state.workflow.download_file(&actor, file_id) {
        Ok((file, bytes)) => {
            let disposition = format!(
                "attachment; filename=\"{}\"",
                file.original_filename.replace('"', "")
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, file.content_type),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn delete_file_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(file_id): Path<FileId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond_empty(state.workflow.delete_file(&actor, file_id))
}

// Notifications

pub(crate) async fn notifications_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<NotificationQuery>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.notifications(&actor, &query))
}

pub(crate) async fn unread_count_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.unread_notifications(&actor))
}

pub(crate) async fn mark_read_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(notification_id): Path<NotificationId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond_empty(
        state
            .workflow
            .mark_notification_read(&actor, notification_id),
    )
}

pub(crate) async fn mark_all_read_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let result = state
        .workflow
        .mark_all_notifications_read(&actor)
        .map(|updated| Count { updated });
    respond(StatusCode::OK, result)
}

// Directory

pub(crate) async fn create_financier_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    axum::Json(draft): axum::Json<FinancierDraft>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::CREATED,
        state.workflow.create_financier(&actor, draft),
    )
}

pub(crate) async fn list_financiers_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<FinancierListQuery>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.list_financiers(&actor, query.active_only),
    )
}

pub(crate) async fn financier_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(financier_id): Path<FinancierId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.financier(&actor, financier_id))
}

pub(crate) async fn update_financier_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(financier_id): Path<FinancierId>,
    axum::Json(patch): axum::Json<FinancierPatch>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state
            .workflow
            .update_financier(&actor, financier_id, patch),
    )
}

pub(crate) async fn deactivate_financier_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(financier_id): Path<FinancierId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.deactivate_financier(&actor, financier_id),
    )
}

pub(crate) async fn create_financier_user_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(financier_id): Path<FinancierId>,
    axum::Json(draft): axum::Json<FinancierUserDraft>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::CREATED,
        state
            .workflow
            .create_financier_user(&actor, financier_id, draft),
    )
}

pub(crate) async fn list_users_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Query(query): Query<UserListQuery>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.list_users(&actor, query))
}

pub(crate) async fn user_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(user_id): Path<UserId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.user(&actor, user_id))
}

pub(crate) async fn activate_user_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(user_id): Path<UserId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.activate_user(&actor, user_id))
}

pub(crate) async fn deactivate_user_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    Path(user_id): Path<UserId>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.deactivate_user(&actor, user_id),
    )
}

pub(crate) async fn me_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(
        StatusCode::OK,
        state.workflow.user(&actor, actor.user_id()),
    )
}

pub(crate) async fn update_profile_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(actor): CurrentActor,
    axum::Json(patch): axum::Json<ProfilePatch>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    respond(StatusCode::OK, state.workflow.update_profile(&actor, patch))
}

// Company registry

pub(crate) async fn company_lookup_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(_actor): CurrentActor,
    Path(business_id): Path<String>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let business_id = match business_id.parse::<BusinessId>() {
        Ok(id) => id,
        Err(error) => return WorkflowError::from(error).into_response(),
    };
    let result = state
        .registry
        .lookup(&business_id)
        .await
        .map_err(WorkflowError::from);
    respond(StatusCode::OK, result)
}

pub(crate) async fn company_search_handler<S, N, M>(
    State(state): State<ApiState<S, N, M>>,
    CurrentActor(_actor): CurrentActor,
    Query(params): Query<CompanySearchParams>,
) -> Response
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    let query = match NameQuery::new(
        &params.name,
        params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
    ) {
        Ok(query) => query,
        Err(error) => return WorkflowError::from(error).into_response(),
    };
    let result = state
        .registry
        .search(&query)
        .await
        .map_err(WorkflowError::from);
    respond(StatusCode::OK, result)
}
