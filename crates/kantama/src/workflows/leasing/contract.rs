//! Lease contract aggregate.
//!
//! Contract fields are grouped into sub-records that can be validated and
//! merged independently. Pre-fill follows one precedence everywhere: a value
//! supplied by the caller wins over a value derived from the application,
//! financier, or accepted offer, which wins over the house default.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    require_non_negative, Application, ApplicationId, ContractId, FileId, Financier, FinancierId,
    OfferId, ValidationError,
};
use super::offer::Offer;

pub const DEFAULT_PROCESSING_FEE: f64 = 500.0;
pub const DEFAULT_ARRANGEMENT_FEE: f64 = 10.0;
pub const DEFAULT_INVOICING_METHOD: &str = "E-Lasku";
pub const DEFAULT_LESSEE_COUNTRY: &str = "Finland";
pub const DEFAULT_TAX_COUNTRY: &str = "Suomi";
pub const DEFAULT_USAGE_LOCATION: &str = "Suomi";
pub const DEFAULT_SIGNING_PLACE: &str = "Finland";

/// Whether a value counts as supplied. Blank strings do not.
pub trait Presence {
    fn is_present(&self) -> bool;
}

macro_rules! always_present {
    ($($ty:ty),+) => {
        $(impl Presence for $ty {
            fn is_present(&self) -> bool {
                true
            }
        })+
    };
}

always_present!(f64, u32, i32, NaiveDate, DateTime<Utc>);

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

fn pick<T: Presence>(preferred: Option<T>, fallback: Option<T>) -> Option<T> {
    match preferred {
        Some(value) if value.is_present() => Some(value),
        _ => fallback.filter(Presence::is_present),
    }
}

/// Field-wise merge where `self` wins and `fallback` fills the gaps.
pub trait Overlay: Sized {
    fn overlay(self, fallback: Self) -> Self;
}

macro_rules! overlay_group {
    ($ty:ident { $($field:ident),+ $(,)? }) => {
        impl Overlay for $ty {
            fn overlay(self, fallback: Self) -> Self {
                Self {
                    $($field: pick(self.$field, fallback.$field)),+
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Draft,
    Sent,
    Signed,
    Cancelled,
}

impl ContractStatus {
    pub fn label(self) -> &'static str {
        match self {
            ContractStatus::Draft => "DRAFT",
            ContractStatus::Sent => "SENT",
            ContractStatus::Signed => "SIGNED",
            ContractStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LesseeInfo {
    pub company_name: Option<String>,
    pub business_id: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub tax_country: Option<String>,
}

overlay_group!(LesseeInfo {
    company_name,
    business_id,
    street_address,
    postal_code,
    city,
    country,
    contact_person,
    contact_email,
    contact_phone,
    tax_country,
});

impl LesseeInfo {
    pub fn from_application(application: &Application) -> Self {
        let company = &application.company;
        Self {
            company_name: Some(company.company_name.clone()),
            business_id: Some(company.business_id.clone()),
            street_address: company.street_address.clone(),
            postal_code: company.postal_code.clone(),
            city: company.city.clone(),
            country: None,
            contact_person: company.contact_person.clone(),
            contact_email: Some(company.contact_email.clone()),
            contact_phone: company.contact_phone.clone(),
            tax_country: None,
        }
    }

    pub fn defaults() -> Self {
        Self {
            country: Some(DEFAULT_LESSEE_COUNTRY.to_string()),
            tax_country: Some(DEFAULT_TAX_COUNTRY.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LessorInfo {
    pub company_name: Option<String>,
    pub business_id: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub contact_person: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

overlay_group!(LessorInfo {
    company_name,
    business_id,
    street_address,
    postal_code,
    city,
    contact_person,
    contact_email,
    contact_phone,
});

impl LessorInfo {
    pub fn from_financier(financier: &Financier) -> Self {
        Self {
            company_name: Some(financier.name.clone()),
            business_id: financier.business_id.clone(),
            street_address: financier.address.clone(),
            contact_email: Some(financier.email.clone()),
            contact_phone: financier.phone.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SellerInfo {
    pub company_name: Option<String>,
    pub business_id: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub contact_person: Option<String>,
    pub contact_phone: Option<String>,
}

overlay_group!(SellerInfo {
    company_name,
    business_id,
    street_address,
    postal_code,
    city,
    contact_person,
    contact_phone,
});

impl SellerInfo {
    pub fn from_application(application: &Application) -> Self {
        Self {
            company_name: application.equipment.supplier.clone(),
            ..Self::default()
        }
    }
}

/// One leased item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseObject {
    pub description: String,
    pub brand_model: Option<String>,
    pub is_new: Option<bool>,
    pub accessories: Option<String>,
    pub serial_number: Option<String>,
    pub year_model: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryTerms {
    pub delivery_method: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub other_terms: Option<String>,
}

overlay_group!(DeliveryTerms {
    delivery_method,
    estimated_delivery_date,
    other_terms,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RentTerms {
    pub advance_payment: Option<f64>,
    pub monthly_rent: Option<f64>,
    pub rent_installments_count: Option<u32>,
    pub rent_installments_start: Option<u32>,
    pub rent_installments_end: Option<u32>,
    pub residual_value: Option<f64>,
    pub processing_fee: Option<f64>,
    pub arrangement_fee: Option<f64>,
    pub invoicing_method: Option<String>,
    pub lease_period_months: Option<u32>,
    pub lease_start_date: Option<NaiveDate>,
}

overlay_group!(RentTerms {
    advance_payment,
    monthly_rent,
    rent_installments_count,
    rent_installments_start,
    rent_installments_end,
    residual_value,
    processing_fee,
    arrangement_fee,
    invoicing_method,
    lease_period_months,
    lease_start_date,
});

impl RentTerms {
    pub fn from_offer(offer: &Offer) -> Self {
        let terms = &offer.terms;
        Self {
            advance_payment: terms.upfront_payment,
            monthly_rent: Some(terms.monthly_payment),
            rent_installments_count: Some(terms.term_months),
            rent_installments_end: Some(terms.term_months),
            residual_value: terms.residual_value,
            lease_period_months: Some(terms.term_months),
            ..Self::default()
        }
    }

    pub fn defaults() -> Self {
        Self {
            processing_fee: Some(DEFAULT_PROCESSING_FEE),
            arrangement_fee: Some(DEFAULT_ARRANGEMENT_FEE),
            invoicing_method: Some(DEFAULT_INVOICING_METHOD.to_string()),
            rent_installments_start: Some(1),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_negative(self.advance_payment, "advance_payment")?;
        require_non_negative(self.monthly_rent, "monthly_rent")?;
        require_non_negative(self.residual_value, "residual_value")?;
        require_non_negative(self.processing_fee, "processing_fee")?;
        require_non_negative(self.arrangement_fee, "arrangement_fee")?;
        if let (Some(start), Some(end)) = (self.rent_installments_start, self.rent_installments_end)
        {
            if start > end {
                return Err(ValidationError::new(
                    "rent_installments_start must not be after rent_installments_end",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsuranceInfo {
    pub insurance_type: Option<String>,
    pub insurance_provider: Option<String>,
    pub insurance_policy_number: Option<String>,
}

overlay_group!(InsuranceInfo {
    insurance_type,
    insurance_provider,
    insurance_policy_number,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankDetails {
    pub bank_name: Option<String>,
    pub iban: Option<String>,
    pub bic: Option<String>,
}

overlay_group!(BankDetails {
    bank_name,
    iban,
    bic
});

impl BankDetails {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let Some(iban) = self.iban.as_deref() else {
            return Ok(());
        };
        let compact: String = iban.chars().filter(|c| !c.is_whitespace()).collect();
        let well_formed = (15..=34).contains(&compact.len())
            && compact.chars().all(|c| c.is_ascii_alphanumeric())
            && compact.chars().take(2).all(|c| c.is_ascii_alphabetic());
        if well_formed {
            Ok(())
        } else {
            Err(ValidationError::new("iban is not a valid account number"))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuaranteeTerms {
    pub guarantees: Option<String>,
    pub guarantee_type: Option<String>,
}

overlay_group!(GuaranteeTerms {
    guarantees,
    guarantee_type
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Signature {
    pub date: Option<DateTime<Utc>>,
    pub place: Option<String>,
    pub signer_name: Option<String>,
}

overlay_group!(Signature {
    date,
    place,
    signer_name
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractDocuments {
    pub logo_file_id: Option<FileId>,
    pub contract_file_id: Option<FileId>,
    pub signed_file_id: Option<FileId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub contract_number: String,
    pub application_id: ApplicationId,
    pub financier_id: FinancierId,
    pub offer_id: Option<OfferId>,
    pub status: ContractStatus,
    pub lessee: LesseeInfo,
    pub lessor: LessorInfo,
    pub seller: SellerInfo,
    pub lease_objects: Vec<LeaseObject>,
    pub usage_location: Option<String>,
    pub delivery: DeliveryTerms,
    pub rent: RentTerms,
    pub insurance: InsuranceInfo,
    pub bank: BankDetails,
    pub guarantees: GuaranteeTerms,
    pub special_conditions: Option<String>,
    pub message_to_customer: Option<String>,
    pub internal_notes: Option<String>,
    pub documents: ContractDocuments,
    pub lessee_signature: Signature,
    pub lessor_signature: Signature,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub signed_at: Option<DateTime<Utc>>,
}

impl Contract {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.rent.validate()?;
        self.bank.validate()?;
        if self
            .lease_objects
            .iter()
            .any(|object| object.description.trim().is_empty())
        {
            return Err(ValidationError::new("lease object description is required"));
        }
        Ok(())
    }

    /// A contract goes to the customer only with a named lessee and a monthly rent.
    pub fn ensure_sendable(&self) -> Result<(), ValidationError> {
        if !self
            .lessee
            .company_name
            .as_ref()
            .is_some_and(Presence::is_present)
        {
            return Err(ValidationError::new(
                "lessee company name is required before sending",
            ));
        }
        if self.rent.monthly_rent.is_none() {
            return Err(ValidationError::new(
                "monthly rent is required before sending",
            ));
        }
        Ok(())
    }
}

/// Contract content supplied by the financier at creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractDraft {
    pub application_id: Option<ApplicationId>,
    pub offer_id: Option<OfferId>,
    pub lessee: LesseeInfo,
    pub lessor: LessorInfo,
    pub seller: SellerInfo,
    pub lease_objects: Vec<LeaseObject>,
    pub usage_location: Option<String>,
    pub delivery: DeliveryTerms,
    pub rent: RentTerms,
    pub insurance: InsuranceInfo,
    pub bank: BankDetails,
    pub guarantees: GuaranteeTerms,
    pub special_conditions: Option<String>,
    pub message_to_customer: Option<String>,
    pub internal_notes: Option<String>,
}

/// Sources for pre-filling a new contract.
pub struct PrefillSources<'a> {
    pub application: &'a Application,
    pub financier: &'a Financier,
    pub accepted_offer: Option<&'a Offer>,
}

impl ContractDraft {
    pub(crate) fn prefill(self, sources: &PrefillSources<'_>) -> ContractContent {
        let offer_rent = sources
            .accepted_offer
            .map(RentTerms::from_offer)
            .unwrap_or_default();
        ContractContent {
            lessee: self
                .lessee
                .overlay(LesseeInfo::from_application(sources.application))
                .overlay(LesseeInfo::defaults()),
            lessor: self
                .lessor
                .overlay(LessorInfo::from_financier(sources.financier)),
            seller: self
                .seller
                .overlay(SellerInfo::from_application(sources.application)),
            lease_objects: self.lease_objects,
            usage_location: pick(
                self.usage_location,
                Some(DEFAULT_USAGE_LOCATION.to_string()),
            ),
            delivery: self.delivery,
            rent: self.rent.overlay(offer_rent).overlay(RentTerms::defaults()),
            insurance: self.insurance,
            bank: self.bank,
            guarantees: self.guarantees,
            special_conditions: self.special_conditions,
            message_to_customer: self.message_to_customer,
            internal_notes: self.internal_notes,
        }
    }
}

/// Resolved contract content after pre-fill.
pub(crate) struct ContractContent {
    pub lessee: LesseeInfo,
    pub lessor: LessorInfo,
    pub seller: SellerInfo,
    pub lease_objects: Vec<LeaseObject>,
    pub usage_location: Option<String>,
    pub delivery: DeliveryTerms,
    pub rent: RentTerms,
    pub insurance: InsuranceInfo,
    pub bank: BankDetails,
    pub guarantees: GuaranteeTerms,
    pub special_conditions: Option<String>,
    pub message_to_customer: Option<String>,
    pub internal_notes: Option<String>,
}

/// Edits to a draft contract. Supplied fields replace stored ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractPatch {
    pub lessee: LesseeInfo,
    pub lessor: LessorInfo,
    pub seller: SellerInfo,
    pub lease_objects: Option<Vec<LeaseObject>>,
    pub usage_location: Option<String>,
    pub delivery: DeliveryTerms,
    pub rent: RentTerms,
    pub insurance: InsuranceInfo,
    pub bank: BankDetails,
    pub guarantees: GuaranteeTerms,
    pub lessor_signature: Signature,
    pub special_conditions: Option<String>,
    pub message_to_customer: Option<String>,
    pub internal_notes: Option<String>,
}

impl ContractPatch {
    pub(crate) fn apply(self, contract: &mut Contract) -> Result<(), ValidationError> {
        let mut next = contract.clone();
        next.lessee = self.lessee.overlay(next.lessee);
        next.lessor = self.lessor.overlay(next.lessor);
        next.seller = self.seller.overlay(next.seller);
        if let Some(objects) = self.lease_objects {
            next.lease_objects = objects;
        }
        next.usage_location = pick(self.usage_location, next.usage_location);
        next.delivery = self.delivery.overlay(next.delivery);
        next.rent = self.rent.overlay(next.rent);
        next.insurance = self.insurance.overlay(next.insurance);
        next.bank = self.bank.overlay(next.bank);
        next.guarantees = self.guarantees.overlay(next.guarantees);
        next.lessor_signature = self.lessor_signature.overlay(next.lessor_signature);
        next.special_conditions = pick(self.special_conditions, next.special_conditions);
        next.message_to_customer = pick(self.message_to_customer, next.message_to_customer);
        next.internal_notes = pick(self.internal_notes, next.internal_notes);
        next.validate()?;
        *contract = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::leasing::domain::{
        ApplicationExtras, ApplicationStatus, ApplicationType, CompanyContact, EquipmentRequest,
        RequestedTerms, UserId,
    };
    use crate::workflows::leasing::offer::{OfferStatus, OfferTerms};
    use std::collections::BTreeMap;

    fn application() -> Application {
        let now = Utc::now();
        Application {
            id: ApplicationId::new(),
            reference_number: "LEA-2026-00042".to_string(),
            application_type: ApplicationType::Leasing,
            status: ApplicationStatus::OfferAccepted,
            customer_id: UserId::new(),
            company: CompanyContact {
                company_name: "Konepaja Oy".to_string(),
                business_id: "1234567-8".to_string(),
                contact_person: Some("Anna Virtanen".to_string()),
                contact_email: "anna@konepaja.fi".to_string(),
                contact_phone: Some("+358401234567".to_string()),
                street_address: Some("Tehtaankatu 1".to_string()),
                postal_code: Some("00140".to_string()),
                city: Some("Helsinki".to_string()),
            },
            equipment: EquipmentRequest {
                description: "CNC lathe".to_string(),
                supplier: Some("Machinery Ab".to_string()),
                price: 85000.0,
                ..EquipmentRequest::default()
            },
            requested_terms: RequestedTerms {
                term_months: Some(48),
                residual_value: None,
            },
            additional_info: None,
            extras: ApplicationExtras::default(),
            created_at: now,
            updated_at: now,
            submitted_at: Some(now),
        }
    }

    fn financier() -> Financier {
        let now = Utc::now();
        Financier {
            id: FinancierId::new(),
            name: "Rahoitus Oy".to_string(),
            email: "offers@rahoitus.fi".to_string(),
            phone: None,
            address: Some("Pankkikatu 2".to_string()),
            business_id: Some("7654321-0".to_string()),
            notes: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn accepted_offer(application: &Application, financier: &Financier) -> Offer {
        let now = Utc::now();
        Offer {
            id: OfferId::new(),
            application_id: application.id,
            financier_id: financier.id,
            status: OfferStatus::Accepted,
            terms: OfferTerms {
                monthly_payment: 1890.0,
                term_months: 48,
                upfront_payment: Some(8500.0),
                residual_value: Some(4250.0),
                interest_or_margin: Some(3.9),
                included_services: None,
            },
            notes_to_customer: None,
            internal_notes: None,
            extra_terms: BTreeMap::new(),
            attachment_file_id: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
            sent_at: Some(now),
            responded_at: Some(now),
        }
    }

    #[test]
    fn prefill_takes_parties_and_rent_from_sources() {
        let application = application();
        let financier = financier();
        let offer = accepted_offer(&application, &financier);
        let content = ContractDraft::default().prefill(&PrefillSources {
            application: &application,
            financier: &financier,
            accepted_offer: Some(&offer),
        });

        assert_eq!(content.lessee.company_name.as_deref(), Some("Konepaja Oy"));
        assert_eq!(content.lessee.country.as_deref(), Some("Finland"));
        assert_eq!(content.lessee.tax_country.as_deref(), Some("Suomi"));
        assert_eq!(content.lessor.company_name.as_deref(), Some("Rahoitus Oy"));
        assert_eq!(content.lessor.street_address.as_deref(), Some("Pankkikatu 2"));
        assert_eq!(content.seller.company_name.as_deref(), Some("Machinery Ab"));
        assert_eq!(content.rent.monthly_rent, Some(1890.0));
        assert_eq!(content.rent.advance_payment, Some(8500.0));
        assert_eq!(content.rent.rent_installments_count, Some(48));
        assert_eq!(content.rent.rent_installments_start, Some(1));
        assert_eq!(content.rent.rent_installments_end, Some(48));
        assert_eq!(content.rent.lease_period_months, Some(48));
        assert_eq!(content.rent.processing_fee, Some(500.0));
        assert_eq!(content.rent.arrangement_fee, Some(10.0));
        assert_eq!(content.rent.invoicing_method.as_deref(), Some("E-Lasku"));
        assert_eq!(content.usage_location.as_deref(), Some("Suomi"));
    }

    #[test]
    fn explicit_values_win_over_prefill_and_defaults() {
        let application = application();
        let financier = financier();
        let offer = accepted_offer(&application, &financier);
        let draft = ContractDraft {
            lessee: LesseeInfo {
                company_name: Some("Konepaja Group Oy".to_string()),
                country: Some("Sweden".to_string()),
                city: Some("   ".to_string()),
                ..LesseeInfo::default()
            },
            rent: RentTerms {
                monthly_rent: Some(1750.0),
                processing_fee: Some(0.0),
                ..RentTerms::default()
            },
            ..ContractDraft::default()
        };
        let content = draft.prefill(&PrefillSources {
            application: &application,
            financier: &financier,
            accepted_offer: Some(&offer),
        });

        assert_eq!(
            content.lessee.company_name.as_deref(),
            Some("Konepaja Group Oy")
        );
        assert_eq!(content.lessee.country.as_deref(), Some("Sweden"));
        assert_eq!(content.lessee.city.as_deref(), Some("Helsinki"));
        assert_eq!(content.rent.monthly_rent, Some(1750.0));
        assert_eq!(content.rent.processing_fee, Some(0.0));
        assert_eq!(content.rent.residual_value, Some(4250.0));
    }

    #[test]
    fn rent_without_offer_keeps_only_defaults() {
        let application = application();
        let financier = financier();
        let content = ContractDraft::default().prefill(&PrefillSources {
            application: &application,
            financier: &financier,
            accepted_offer: None,
        });
        assert_eq!(content.rent.monthly_rent, None);
        assert_eq!(content.rent.processing_fee, Some(DEFAULT_PROCESSING_FEE));
    }

    #[test]
    fn rent_rejects_inverted_installment_range() {
        let rent = RentTerms {
            rent_installments_start: Some(12),
            rent_installments_end: Some(6),
            ..RentTerms::default()
        };
        assert!(rent.validate().is_err());
    }

    #[test]
    fn bank_details_require_plausible_iban() {
        let bank = BankDetails {
            iban: Some("FI21 1234 5600 0007 85".to_string()),
            ..BankDetails::default()
        };
        bank.validate().expect("finnish iban accepted");

        let bank = BankDetails {
            iban: Some("12345".to_string()),
            ..BankDetails::default()
        };
        assert!(bank.validate().is_err());
    }
}
