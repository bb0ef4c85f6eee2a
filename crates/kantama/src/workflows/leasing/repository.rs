use chrono::{DateTime, Utc};

use super::contract::Contract;
use super::domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationType, Assignment, AssignmentId,
    ContractId, FileId, Financier, FinancierId, InfoRequest, InfoRequestId, InfoRequestResponse,
    Notification, NotificationId, OfferId, StoredFile, UserId,
};
use super::identity::{Role, User};
use super::offer::{Offer, OfferStatus};

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("conflicting record: {0}")]
    Conflict(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub financier_id: Option<FinancierId>,
    pub active_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationFilter {
    pub customer_id: Option<UserId>,
    /// Restrict to applications assigned to this financier.
    pub financier_id: Option<FinancierId>,
    pub status: Option<ApplicationStatus>,
    pub application_type: Option<ApplicationType>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferFilter {
    pub application_id: Option<ApplicationId>,
    pub financier_id: Option<FinancierId>,
    pub statuses: Option<Vec<OfferStatus>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractFilter {
    pub application_id: Option<ApplicationId>,
    pub financier_id: Option<FinancierId>,
}

/// One write inside an atomic [`ChangeSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    PutUser(User),
    PutFinancier(Financier),
    PutApplication(Application),
    InsertAssignment(Assignment),
    RemoveAssignment(AssignmentId),
    PutInfoRequest(InfoRequest),
    InsertInfoResponse(InfoRequestResponse),
    PutOffer(Offer),
    PutContract(Contract),
    InsertFile(StoredFile),
    RemoveFile(FileId),
}

/// Writes committed all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, change: Change) -> Self {
        self.changes.push(change);
        self
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

/// Storage abstraction for every workflow entity.
///
/// Implementations must apply a [`ChangeSet`] atomically and enforce:
/// a unique (application, financier) assignment, a unique application
/// reference number, a unique contract number, a unique (case-insensitive)
/// user e-mail, and at most one signed contract per application. Violations
/// surface as [`RepositoryError::Conflict`].
pub trait WorkflowStore: Send + Sync {
    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    fn user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    fn users(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError>;

    fn financier(&self, id: FinancierId) -> Result<Option<Financier>, RepositoryError>;
    fn financiers(&self, active_only: bool) -> Result<Vec<Financier>, RepositoryError>;

    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError>;
    fn application_by_reference(
        &self,
        reference_number: &str,
    ) -> Result<Option<Application>, RepositoryError>;
    /// Newest first.
    fn applications(&self, filter: &ApplicationFilter)
        -> Result<Vec<Application>, RepositoryError>;

    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, RepositoryError>;
    fn assignment_for(
        &self,
        application_id: ApplicationId,
        financier_id: FinancierId,
    ) -> Result<Option<Assignment>, RepositoryError>;
    fn assignments_for_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<Assignment>, RepositoryError>;

    fn info_request(&self, id: InfoRequestId) -> Result<Option<InfoRequest>, RepositoryError>;
    fn info_requests_for_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<InfoRequest>, RepositoryError>;
    fn info_responses(
        &self,
        info_request_id: InfoRequestId,
    ) -> Result<Vec<InfoRequestResponse>, RepositoryError>;

    fn offer(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError>;
    /// Newest first.
    fn offers(&self, filter: &OfferFilter) -> Result<Vec<Offer>, RepositoryError>;

    fn contract(&self, id: ContractId) -> Result<Option<Contract>, RepositoryError>;
    fn contract_by_number(&self, number: &str) -> Result<Option<Contract>, RepositoryError>;
    /// Newest first.
    fn contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, RepositoryError>;

    fn file(&self, id: FileId) -> Result<Option<StoredFile>, RepositoryError>;
    fn files_for_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<StoredFile>, RepositoryError>;

    fn commit(&self, changes: ChangeSet) -> Result<(), RepositoryError>;
}

/// Notification inbox storage, one inbox per user.
pub trait NotificationSink: Send + Sync {
    fn record(&self, notification: Notification) -> Result<(), SinkError>;
    /// Newest first, at most `limit` entries.
    fn list(
        &self,
        user_id: UserId,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>, SinkError>;
    fn unread_count(&self, user_id: UserId) -> Result<usize, SinkError>;
    /// `false` when the notification does not exist in that user's inbox.
    fn mark_read(
        &self,
        user_id: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<bool, SinkError>;
    fn mark_all_read(&self, user_id: UserId, at: DateTime<Utc>) -> Result<usize, SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("notification store unavailable: {0}")]
    Unavailable(String),
}
