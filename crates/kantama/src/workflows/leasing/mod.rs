//! Equipment-leasing workflow: applications routed to financiers, offers
//! released through an admin gate, and contracts signed by the applicant.
//!
//! Lifecycle rules live in [`lifecycle`] as pure functions; [`service`]
//! orchestrates storage, notifications and e-mail around them.

pub mod auth;
pub mod contract;
pub mod domain;
pub mod effects;
pub mod error;
pub mod files;
pub mod identity;
pub mod lifecycle;
pub mod memory;
pub mod messaging;
pub mod offer;
pub(crate) mod reference;
pub mod registry;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use auth::{AuthError, Claims, TokenIssuer};
pub use contract::{Contract, ContractDraft, ContractPatch, ContractStatus};
pub use domain::{
    Application, ApplicationId, ApplicationPatch, ApplicationStatus, ApplicationSubmission,
    ApplicationType, Assignment, AssignmentId, AssignmentRequest, AssignmentStatus, ContractId,
    FileId, Financier, FinancierDraft, FinancierId, FinancierPatch, InfoRequest, InfoRequestDraft,
    InfoRequestId, InfoRequestStatus, InfoRequestThread, InfoResponseDraft, Notification,
    NotificationId, NotificationKind, OfferId, StoredFile, UserId, ValidationError,
};
pub use error::WorkflowError;
pub use files::{BlobStore, DiskBlobStore, MemoryBlobStore, Upload, UploadContext, UploadPolicy};
pub use identity::{Actor, Role, User};
pub use lifecycle::{attempt_transition, ApplicationEvent, ContractEvent, OfferEvent};
pub use memory::{MemoryNotificationSink, MemoryWorkflowStore};
pub use messaging::{EmailMessage, LogMailer, MailError, Mailer};
pub use offer::{Offer, OfferDraft, OfferPatch, OfferStatus, OfferTerms, OfferView};
pub use registry::{
    BusinessId, CompanyRecord, CompanyRegistry, CompanySummary, NameQuery, PrhRegistryClient,
    RegistryError,
};
pub use repository::{NotificationSink, RepositoryError, WorkflowStore};
pub use router::{leasing_router, ApiState, CurrentActor};
pub use service::{LeasingWorkflow, WorkflowSettings};
