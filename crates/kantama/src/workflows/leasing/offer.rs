use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{
    require_non_negative, require_positive, ApplicationId, FileId, FinancierId, OfferId,
    ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Draft,
    PendingAdmin,
    Sent,
    Accepted,
    Rejected,
    Expired,
}

impl OfferStatus {
    pub fn label(self) -> &'static str {
        match self {
            OfferStatus::Draft => "DRAFT",
            OfferStatus::PendingAdmin => "PENDING_ADMIN",
            OfferStatus::Sent => "SENT",
            OfferStatus::Accepted => "ACCEPTED",
            OfferStatus::Rejected => "REJECTED",
            OfferStatus::Expired => "EXPIRED",
        }
    }

    /// Customers only ever see offers an admin has released.
    pub fn customer_visible(self) -> bool {
        !matches!(self, OfferStatus::Draft | OfferStatus::PendingAdmin)
    }
}

/// Commercial terms of an offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferTerms {
    pub monthly_payment: f64,
    pub term_months: u32,
    #[serde(default)]
    pub upfront_payment: Option<f64>,
    #[serde(default)]
    pub residual_value: Option<f64>,
    #[serde(default)]
    pub interest_or_margin: Option<f64>,
    #[serde(default)]
    pub included_services: Option<String>,
}

impl OfferTerms {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_positive(self.monthly_payment, "monthly_payment")?;
        if self.term_months == 0 {
            return Err(ValidationError::new("term_months must be greater than zero"));
        }
        require_non_negative(self.upfront_payment, "upfront_payment")?;
        require_non_negative(self.residual_value, "residual_value")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub application_id: ApplicationId,
    pub financier_id: FinancierId,
    pub status: OfferStatus,
    pub terms: OfferTerms,
    pub notes_to_customer: Option<String>,
    pub internal_notes: Option<String>,
    pub extra_terms: BTreeMap<String, Value>,
    pub attachment_file_id: Option<FileId>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferDraft {
    pub application_id: ApplicationId,
    #[serde(flatten)]
    pub terms: OfferTerms,
    #[serde(default)]
    pub notes_to_customer: Option<String>,
    #[serde(default)]
    pub internal_notes: Option<String>,
    #[serde(default)]
    pub extra_terms: BTreeMap<String, Value>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Edits allowed while an offer is still a draft.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferPatch {
    pub monthly_payment: Option<f64>,
    pub term_months: Option<u32>,
    pub upfront_payment: Option<f64>,
    pub residual_value: Option<f64>,
    pub interest_or_margin: Option<f64>,
    pub included_services: Option<String>,
    pub notes_to_customer: Option<String>,
    pub internal_notes: Option<String>,
    pub extra_terms: Option<BTreeMap<String, Value>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OfferPatch {
    pub(crate) fn apply(self, offer: &mut Offer) -> Result<(), ValidationError> {
        let mut terms = offer.terms.clone();
        if let Some(monthly) = self.monthly_payment {
            terms.monthly_payment = monthly;
        }
        if let Some(months) = self.term_months {
            terms.term_months = months;
        }
        terms.upfront_payment = self.upfront_payment.or(terms.upfront_payment);
        terms.residual_value = self.residual_value.or(terms.residual_value);
        terms.interest_or_margin = self.interest_or_margin.or(terms.interest_or_margin);
        terms.included_services = self.included_services.or(terms.included_services);
        terms.validate()?;

        offer.terms = terms;
        offer.notes_to_customer = self.notes_to_customer.or(offer.notes_to_customer.take());
        offer.internal_notes = self.internal_notes.or(offer.internal_notes.take());
        if let Some(extra) = self.extra_terms {
            offer.extra_terms = extra;
        }
        offer.expires_at = self.expires_at.or(offer.expires_at);
        Ok(())
    }
}

/// Offer as shown to the customer: no margin, no internal notes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerOffer {
    pub id: OfferId,
    pub application_id: ApplicationId,
    pub financier_id: FinancierId,
    pub status: OfferStatus,
    pub monthly_payment: f64,
    pub term_months: u32,
    pub upfront_payment: Option<f64>,
    pub residual_value: Option<f64>,
    pub included_services: Option<String>,
    pub notes_to_customer: Option<String>,
    pub attachment_file_id: Option<FileId>,
    pub expires_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl From<Offer> for CustomerOffer {
    fn from(offer: Offer) -> Self {
        Self {
            id: offer.id,
            application_id: offer.application_id,
            financier_id: offer.financier_id,
            status: offer.status,
            monthly_payment: offer.terms.monthly_payment,
            term_months: offer.terms.term_months,
            upfront_payment: offer.terms.upfront_payment,
            residual_value: offer.terms.residual_value,
            included_services: offer.terms.included_services,
            notes_to_customer: offer.notes_to_customer,
            attachment_file_id: offer.attachment_file_id,
            expires_at: offer.expires_at,
            sent_at: offer.sent_at,
            responded_at: offer.responded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OfferView {
    Full(Offer),
    Customer(CustomerOffer),
}

impl OfferView {
    pub fn id(&self) -> OfferId {
        match self {
            OfferView::Full(offer) => offer.id,
            OfferView::Customer(offer) => offer.id,
        }
    }

    pub fn status(&self) -> OfferStatus {
        match self {
            OfferView::Full(offer) => offer.status,
            OfferView::Customer(offer) => offer.status,
        }
    }
}
