use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::registry::CompanyRecord;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(UserId);
entity_id!(
    /// Financing institution identifier.
    FinancierId
);
entity_id!(ApplicationId);
entity_id!(AssignmentId);
entity_id!(InfoRequestId);
entity_id!(InfoResponseId);
entity_id!(OfferId);
entity_id!(ContractId);
entity_id!(FileId);
entity_id!(NotificationId);

/// Rejected input, reported back to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new(format!("{field} is required")))
    } else {
        Ok(())
    }
}

pub(crate) fn require_positive(value: f64, field: &str) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new(format!("{field} must be greater than zero")))
    }
}

pub(crate) fn require_non_negative(value: Option<f64>, field: &str) -> Result<(), ValidationError> {
    match value {
        Some(amount) if !amount.is_finite() || amount < 0.0 => Err(ValidationError::new(
            format!("{field} must not be negative"),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn require_email(value: &str, field: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::new(format!(
            "{field} must be a valid e-mail address"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationType {
    Leasing,
    SaleLeaseback,
}

impl ApplicationType {
    pub fn reference_prefix(self) -> &'static str {
        match self {
            ApplicationType::Leasing => "LEA",
            ApplicationType::SaleLeaseback => "SLB",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ApplicationType::Leasing => "Leasing",
            ApplicationType::SaleLeaseback => "Sale-leaseback",
        }
    }
}

/// Lifecycle of a financing application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    SubmittedToFinancier,
    InfoRequested,
    OfferSent,
    OfferAccepted,
    OfferRejected,
    ContractSent,
    Signed,
    Closed,
    Cancelled,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 11] = [
        ApplicationStatus::Draft,
        ApplicationStatus::Submitted,
        ApplicationStatus::SubmittedToFinancier,
        ApplicationStatus::InfoRequested,
        ApplicationStatus::OfferSent,
        ApplicationStatus::OfferAccepted,
        ApplicationStatus::OfferRejected,
        ApplicationStatus::ContractSent,
        ApplicationStatus::Signed,
        ApplicationStatus::Closed,
        ApplicationStatus::Cancelled,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "DRAFT",
            ApplicationStatus::Submitted => "SUBMITTED",
            ApplicationStatus::SubmittedToFinancier => "SUBMITTED_TO_FINANCIER",
            ApplicationStatus::InfoRequested => "INFO_REQUESTED",
            ApplicationStatus::OfferSent => "OFFER_SENT",
            ApplicationStatus::OfferAccepted => "OFFER_ACCEPTED",
            ApplicationStatus::OfferRejected => "OFFER_REJECTED",
            ApplicationStatus::ContractSent => "CONTRACT_SENT",
            ApplicationStatus::Signed => "SIGNED",
            ApplicationStatus::Closed => "CLOSED",
            ApplicationStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Signed | ApplicationStatus::Closed | ApplicationStatus::Cancelled
        )
    }

    /// Submitted and not yet finished.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != ApplicationStatus::Draft
    }

    /// An offer has been accepted; the status only moves towards signature.
    pub fn is_committed(self) -> bool {
        matches!(
            self,
            ApplicationStatus::OfferAccepted | ApplicationStatus::ContractSent
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Applicant company and contact person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyContact {
    pub company_name: String,
    pub business_id: String,
    pub contact_person: Option<String>,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
}

impl CompanyContact {
    fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.company_name, "company_name")?;
        require_text(&self.business_id, "business_id")?;
        require_email(&self.contact_email, "contact_email")
    }

    /// Splits the contact person into first and last name.
    pub fn contact_names(&self) -> (Option<String>, Option<String>) {
        let Some(person) = self.contact_person.as_deref() else {
            return (None, None);
        };
        let mut parts = person.split_whitespace();
        let first = parts.next().map(str::to_string);
        let rest: Vec<&str> = parts.collect();
        let last = if rest.is_empty() {
            None
        } else {
            Some(rest.join(" "))
        };
        (first, last)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EquipmentRequest {
    pub description: String,
    pub supplier: Option<String>,
    pub price: f64,
    pub link: Option<String>,
    pub current_value: Option<f64>,
    pub original_purchase_price: Option<f64>,
}

/// Financing terms the customer asks for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestedTerms {
    pub term_months: Option<u32>,
    pub residual_value: Option<f64>,
}

/// Usage history captured for sale-leaseback equipment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SaleLeasebackExtras {
    pub year_model: Option<i32>,
    pub hours: Option<u32>,
    pub kilometers: Option<u32>,
}

/// Typed extension data; `other` holds keys no variant anticipates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApplicationExtras {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_leaseback: Option<SaleLeasebackExtras>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_snapshot: Option<CompanyRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub other: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub reference_number: String,
    pub application_type: ApplicationType,
    pub status: ApplicationStatus,
    pub customer_id: UserId,
    pub company: CompanyContact,
    pub equipment: EquipmentRequest,
    pub requested_terms: RequestedTerms,
    pub additional_info: Option<String>,
    pub extras: ApplicationExtras,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// Intake payload for a leasing application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeasingSubmission {
    #[serde(flatten)]
    pub company: CompanyContact,
    pub equipment_description: Option<String>,
    pub equipment_supplier: Option<String>,
    pub equipment_price: f64,
    pub link_to_item: Option<String>,
    pub requested_term_months: Option<u32>,
    pub requested_residual_value: Option<f64>,
    pub additional_info: Option<String>,
    #[serde(default)]
    pub registry_snapshot: Option<CompanyRecord>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

/// Intake payload for a sale-leaseback application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLeasebackSubmission {
    #[serde(flatten)]
    pub company: CompanyContact,
    pub equipment_description: String,
    pub current_value: f64,
    pub original_purchase_price: Option<f64>,
    pub year_model: Option<i32>,
    pub hours: Option<u32>,
    pub kilometers: Option<u32>,
    pub requested_term_months: Option<u32>,
    pub additional_info: Option<String>,
    #[serde(default)]
    pub registry_snapshot: Option<CompanyRecord>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "application_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationSubmission {
    Leasing(LeasingSubmission),
    SaleLeaseback(SaleLeasebackSubmission),
}

/// Application content without identity, status, or timestamps.
pub(crate) struct ApplicationDraft {
    pub application_type: ApplicationType,
    pub company: CompanyContact,
    pub equipment: EquipmentRequest,
    pub requested_terms: RequestedTerms,
    pub additional_info: Option<String>,
    pub extras: ApplicationExtras,
}

impl ApplicationSubmission {
    pub fn application_type(&self) -> ApplicationType {
        match self {
            ApplicationSubmission::Leasing(_) => ApplicationType::Leasing,
            ApplicationSubmission::SaleLeaseback(_) => ApplicationType::SaleLeaseback,
        }
    }

    pub fn company(&self) -> &CompanyContact {
        match self {
            ApplicationSubmission::Leasing(submission) => &submission.company,
            ApplicationSubmission::SaleLeaseback(submission) => &submission.company,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.company().validate()?;
        match self {
            ApplicationSubmission::Leasing(submission) => {
                require_positive(submission.equipment_price, "equipment_price")?;
                require_non_negative(submission.requested_residual_value, "requested_residual_value")
            }
            ApplicationSubmission::SaleLeaseback(submission) => {
                require_text(&submission.equipment_description, "equipment_description")?;
                require_positive(submission.current_value, "current_value")?;
                require_non_negative(submission.original_purchase_price, "original_purchase_price")
            }
        }?;
        match self.requested_term_months() {
            Some(0) => Err(ValidationError::new(
                "requested_term_months must be greater than zero",
            )),
            _ => Ok(()),
        }
    }

    fn requested_term_months(&self) -> Option<u32> {
        match self {
            ApplicationSubmission::Leasing(submission) => submission.requested_term_months,
            ApplicationSubmission::SaleLeaseback(submission) => submission.requested_term_months,
        }
    }

    pub(crate) fn into_draft(self) -> ApplicationDraft {
        match self {
            ApplicationSubmission::Leasing(submission) => ApplicationDraft {
                application_type: ApplicationType::Leasing,
                company: submission.company,
                equipment: EquipmentRequest {
                    description: submission
                        .equipment_description
                        .filter(|text| !text.trim().is_empty())
                        .unwrap_or_else(|| "See linked item".to_string()),
                    supplier: submission.equipment_supplier,
                    price: submission.equipment_price,
                    link: submission.link_to_item,
                    current_value: None,
                    original_purchase_price: None,
                },
                requested_terms: RequestedTerms {
                    term_months: submission.requested_term_months,
                    residual_value: submission.requested_residual_value,
                },
                additional_info: submission.additional_info,
                extras: ApplicationExtras {
                    sale_leaseback: None,
                    registry_snapshot: submission.registry_snapshot,
                    other: submission.extra,
                },
            },
            ApplicationSubmission::SaleLeaseback(submission) => ApplicationDraft {
                application_type: ApplicationType::SaleLeaseback,
                company: submission.company,
                equipment: EquipmentRequest {
                    description: submission.equipment_description,
                    supplier: None,
                    price: submission.current_value,
                    link: None,
                    current_value: Some(submission.current_value),
                    original_purchase_price: submission.original_purchase_price,
                },
                requested_terms: RequestedTerms {
                    term_months: submission.requested_term_months,
                    residual_value: None,
                },
                additional_info: submission.additional_info,
                extras: ApplicationExtras {
                    sale_leaseback: Some(SaleLeasebackExtras {
                        year_model: submission.year_model,
                        hours: submission.hours,
                        kilometers: submission.kilometers,
                    }),
                    registry_snapshot: submission.registry_snapshot,
                    other: submission.extra,
                },
            },
        }
    }
}

/// Partial update of an application's descriptive fields.
///
/// `status` is only honored for admins and goes through the override rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationPatch {
    pub company_name: Option<String>,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub equipment_description: Option<String>,
    pub equipment_supplier: Option<String>,
    pub equipment_price: Option<f64>,
    pub link_to_item: Option<String>,
    pub requested_term_months: Option<u32>,
    pub requested_residual_value: Option<f64>,
    pub additional_info: Option<String>,
    pub status: Option<ApplicationStatus>,
}

impl ApplicationPatch {
    pub(crate) fn apply(self, application: &mut Application) -> Result<(), ValidationError> {
        if let Some(name) = self.company_name {
            require_text(&name, "company_name")?;
            application.company.company_name = name;
        }
        if let Some(email) = self.contact_email {
            require_email(&email, "contact_email")?;
            application.company.contact_email = email;
        }
        if let Some(price) = self.equipment_price {
            require_positive(price, "equipment_price")?;
            application.equipment.price = price;
        }
        if let Some(months) = self.requested_term_months {
            if months == 0 {
                return Err(ValidationError::new(
                    "requested_term_months must be greater than zero",
                ));
            }
            application.requested_terms.term_months = Some(months);
        }
        if let Some(residual) = self.requested_residual_value {
            require_non_negative(Some(residual), "requested_residual_value")?;
            application.requested_terms.residual_value = Some(residual);
        }
        if let Some(description) = self.equipment_description {
            require_text(&description, "equipment_description")?;
            application.equipment.description = description;
        }

        let company = &mut application.company;
        replace(&mut company.contact_person, self.contact_person);
        replace(&mut company.contact_phone, self.contact_phone);
        replace(&mut company.street_address, self.street_address);
        replace(&mut company.postal_code, self.postal_code);
        replace(&mut company.city, self.city);
        replace(&mut application.equipment.supplier, self.equipment_supplier);
        replace(&mut application.equipment.link, self.link_to_item);
        replace(&mut application.additional_info, self.additional_info);
        Ok(())
    }
}

fn replace<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// Financing institution receiving applications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Financier {
    pub id: FinancierId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub business_id: Option<String>,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancierDraft {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub business_id: Option<String>,
    pub notes: Option<String>,
}

impl FinancierDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.name, "name")?;
        require_email(&self.email, "email")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancierPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub business_id: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

impl FinancierPatch {
    pub(crate) fn apply(self, financier: &mut Financier) -> Result<(), ValidationError> {
        if let Some(name) = self.name {
            require_text(&name, "name")?;
            financier.name = name;
        }
        if let Some(email) = self.email {
            require_email(&email, "email")?;
            financier.email = email;
        }
        replace(&mut financier.phone, self.phone);
        replace(&mut financier.address, self.address);
        replace(&mut financier.business_id, self.business_id);
        replace(&mut financier.notes, self.notes);
        if let Some(active) = self.is_active {
            financier.is_active = active;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Pending,
    Accepted,
    Rejected,
    InProgress,
    Completed,
}

/// Routing of an application to one financier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub application_id: ApplicationId,
    pub financier_id: FinancierId,
    pub assigned_by: UserId,
    pub status: AssignmentStatus,
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub application_id: ApplicationId,
    pub financier_id: FinancierId,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InfoRequestStatus {
    Pending,
    Responded,
    Closed,
}

/// Financier question to the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRequest {
    pub id: InfoRequestId,
    pub application_id: ApplicationId,
    pub financier_id: FinancierId,
    pub requested_by: UserId,
    pub message: String,
    pub requested_items: Vec<String>,
    pub status: InfoRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRequestResponse {
    pub id: InfoResponseId,
    pub info_request_id: InfoRequestId,
    pub responder_id: UserId,
    pub message: String,
    pub attachment_ids: Vec<FileId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRequestDraft {
    pub application_id: ApplicationId,
    pub message: String,
    #[serde(default)]
    pub requested_items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoResponseDraft {
    pub message: String,
    #[serde(default)]
    pub attachment_ids: Vec<FileId>,
}

/// An info request together with its replies, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoRequestThread {
    #[serde(flatten)]
    pub request: InfoRequest,
    pub responses: Vec<InfoRequestResponse>,
}

/// Metadata for an uploaded blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: FileId,
    pub filename: String,
    pub original_filename: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub application_id: Option<ApplicationId>,
    pub uploaded_by: UserId,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ApplicationSubmitted,
    SubmittedToFinancier,
    NewApplication,
    InfoRequested,
    InfoProvided,
    OfferPending,
    OfferSent,
    OfferAccepted,
    ContractSent,
    ContractSigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Application,
    Offer,
    Contract,
    InfoRequest,
}

/// In-app message delivered to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub reference_kind: Option<ReferenceKind>,
    pub reference_id: Option<Uuid>,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}
