//! Finnish company registry (YTJ / PRH open data v3) lookups.
//!
//! The adapter owns transport concerns only: timeouts, HTTP status mapping and
//! decoding the registry payload into [`CompanyRecord`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::config::RegistryConfig;

/// Language code the registry uses for Finnish descriptions.
const FINNISH: &str = "1";
const MAX_SEARCH_RESULTS: usize = 50;

/// Finnish business id (Y-tunnus), `1234567-8`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BusinessId(String);

impl BusinessId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BusinessId {
    type Err = RegistryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let well_formed = trimmed.len() == 9
            && trimmed
                .char_indices()
                .all(|(index, c)| if index == 7 { c == '-' } else { c.is_ascii_digit() });
        if well_formed {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(RegistryError::InvalidBusinessId(value.to_string()))
        }
    }
}

impl TryFrom<String> for BusinessId {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BusinessId> for String {
    fn from(value: BusinessId) -> Self {
        value.0
    }
}

impl fmt::Display for BusinessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated name search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameQuery {
    name: String,
    limit: usize,
}

impl NameQuery {
    pub fn new(name: &str, limit: usize) -> Result<Self, RegistryError> {
        let name = name.trim();
        if name.chars().count() < 2 {
            return Err(RegistryError::InvalidQuery(
                "search term must be at least 2 characters".to_string(),
            ));
        }
        if !(1..=MAX_SEARCH_RESULTS).contains(&limit) {
            return Err(RegistryError::InvalidQuery(format!(
                "limit must be between 1 and {MAX_SEARCH_RESULTS}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            limit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryAddress {
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessLine {
    pub code: Option<String>,
    pub description: Option<String>,
}

/// Company details as published by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub business_id: String,
    pub name: Option<String>,
    pub company_form: Option<String>,
    pub company_form_code: Option<String>,
    pub is_active: bool,
    pub is_liquidated: bool,
    pub visiting_address: Option<RegistryAddress>,
    pub postal_address: Option<RegistryAddress>,
    pub main_business_line: Option<BusinessLine>,
    #[serde(default)]
    pub business_lines: Vec<BusinessLine>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub registration_date: Option<String>,
}

impl CompanyRecord {
    /// Visiting address when published, otherwise the postal one.
    pub fn preferred_address(&self) -> Option<&RegistryAddress> {
        self.visiting_address
            .as_ref()
            .or(self.postal_address.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySummary {
    pub business_id: String,
    pub name: String,
    pub company_form: Option<String>,
    pub is_active: bool,
    pub is_liquidated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid business id '{0}', expected the form 1234567-8")]
    InvalidBusinessId(String),
    #[error("{0}")]
    InvalidQuery(String),
    #[error("company not found")]
    NotFound,
    #[error("company registry did not respond in time: {0}")]
    Timeout(String),
    #[error("company registry request failed: {0}")]
    Transport(String),
    #[error("company registry returned an unreadable payload: {0}")]
    Decode(String),
}

/// Lookup port for company registry data.
#[async_trait]
pub trait CompanyRegistry: Send + Sync {
    async fn lookup(&self, business_id: &BusinessId) -> Result<CompanyRecord, RegistryError>;
    async fn search(&self, query: &NameQuery) -> Result<Vec<CompanySummary>, RegistryError>;
}

/// Reqwest-backed client for the PRH open data API.
pub struct PrhRegistryClient {
    client: Client,
    endpoint: Url,
}

impl PrhRegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let endpoint = Url::parse(&format!("{}/companies", base_url.trim_end_matches('/')))
            .map_err(|error| RegistryError::Transport(format!("invalid registry url: {error}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| RegistryError::Transport(error.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        Self::new(&config.base_url, config.timeout())
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<Option<CompaniesDto>, RegistryError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(RegistryError::Transport(format!("status {}", status.as_u16())));
        }
        decode_companies(body.as_ref()).map(Some)
    }
}

#[async_trait]
impl CompanyRegistry for PrhRegistryClient {
    async fn lookup(&self, business_id: &BusinessId) -> Result<CompanyRecord, RegistryError> {
        let payload = self
            .fetch(&[("businessId", business_id.to_string())])
            .await?
            .ok_or(RegistryError::NotFound)?;
        payload
            .companies
            .into_iter()
            .next()
            .map(|company| company.into_record(business_id))
            .ok_or(RegistryError::NotFound)
    }

    async fn search(&self, query: &NameQuery) -> Result<Vec<CompanySummary>, RegistryError> {
        let Some(payload) = self
            .fetch(&[
                ("name", query.name().to_string()),
                ("maxResults", query.limit().to_string()),
            ])
            .await?
        else {
            return Ok(Vec::new());
        };
        Ok(payload
            .companies
            .into_iter()
            .filter_map(CompanyDto::into_summary)
            .take(query.limit())
            .collect())
    }
}

fn map_transport_error(error: reqwest::Error) -> RegistryError {
    if error.is_timeout() {
        RegistryError::Timeout(error.to_string())
    } else {
        RegistryError::Transport(error.to_string())
    }
}

fn decode_companies(body: &[u8]) -> Result<CompaniesDto, RegistryError> {
    serde_json::from_slice(body).map_err(|error| RegistryError::Decode(error.to_string()))
}

/// The registry mixes string and numeric codes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CodeDto {
    Text(String),
    Number(i64),
}

impl CodeDto {
    fn is(&self, expected: &str) -> bool {
        match self {
            CodeDto::Text(text) => text == expected,
            CodeDto::Number(number) => number.to_string() == expected,
        }
    }

    fn into_string(self) -> String {
        match self {
            CodeDto::Text(text) => text,
            CodeDto::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BusinessIdDto {
    Plain(String),
    Wrapped { value: Option<String> },
}

impl BusinessIdDto {
    fn into_value(self) -> Option<String> {
        match self {
            BusinessIdDto::Plain(value) => Some(value),
            BusinessIdDto::Wrapped { value } => value,
        }
        .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct CompaniesDto {
    #[serde(default)]
    companies: Vec<CompanyDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompanyDto {
    business_id: Option<BusinessIdDto>,
    #[serde(default)]
    names: Vec<NameDto>,
    #[serde(default)]
    company_forms: Vec<CompanyFormDto>,
    #[serde(default)]
    addresses: Vec<AddressDto>,
    main_business_line: Option<BusinessLineDto>,
    #[serde(default)]
    business_lines: Vec<BusinessLineDto>,
    #[serde(default)]
    contact_details: Vec<ContactDto>,
    #[serde(default)]
    company_situations: Vec<serde_json::Value>,
    status: Option<CodeDto>,
    trade_register_status: Option<CodeDto>,
    registration_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameDto {
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<CodeDto>,
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescriptionDto {
    #[serde(rename = "languageCode")]
    language_code: Option<CodeDto>,
    description: Option<String>,
}

fn finnish_description(descriptions: Vec<DescriptionDto>) -> Option<String> {
    descriptions
        .into_iter()
        .find(|entry| entry.language_code.as_ref().is_some_and(|code| code.is(FINNISH)))
        .and_then(|entry| entry.description)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompanyFormDto {
    #[serde(rename = "type")]
    kind: Option<CodeDto>,
    end_date: Option<String>,
    #[serde(default)]
    descriptions: Vec<DescriptionDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressDto {
    #[serde(rename = "type")]
    kind: Option<CodeDto>,
    street: Option<String>,
    building_number: Option<String>,
    post_code: Option<String>,
    #[serde(default)]
    post_offices: Vec<PostOfficeDto>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostOfficeDto {
    city: Option<String>,
    language_code: Option<CodeDto>,
}

#[derive(Debug, Deserialize)]
struct BusinessLineDto {
    code: Option<CodeDto>,
    #[serde(default)]
    descriptions: Vec<DescriptionDto>,
}

#[derive(Debug, Deserialize)]
struct ContactDto {
    #[serde(rename = "type")]
    kind: Option<CodeDto>,
    value: Option<String>,
}

impl BusinessLineDto {
    fn into_line(self) -> BusinessLine {
        BusinessLine {
            code: self.code.map(CodeDto::into_string),
            description: finnish_description(self.descriptions),
        }
    }
}

impl AddressDto {
    fn into_address(self) -> RegistryAddress {
        let street = match (self.street, self.building_number) {
            (Some(street), Some(number)) => Some(format!("{} {}", street.trim(), number.trim())),
            (street, _) => street,
        }
        .map(|street| street.trim().to_string())
        .filter(|street| !street.is_empty());
        let city = self
            .post_offices
            .into_iter()
            .find(|office| office.language_code.as_ref().is_some_and(|code| code.is(FINNISH)))
            .and_then(|office| office.city);
        RegistryAddress {
            street,
            postal_code: self.post_code,
            city,
            country: self.country,
        }
    }
}

impl CompanyDto {
    fn current_name(names: &[NameDto]) -> Option<String> {
        names
            .iter()
            .find(|name| {
                name.kind.as_ref().is_some_and(|kind| kind.is("1")) && name.end_date.is_none()
            })
            .or_else(|| names.first())
            .and_then(|name| name.name.clone())
    }

    fn status_flags(&self) -> (bool, bool) {
        let registered = self
            .status
            .as_ref()
            .is_some_and(|status| status.is("1") || status.is("2"));
        let trading = self
            .trade_register_status
            .as_ref()
            .is_some_and(|status| status.is("1"));
        let liquidated = !self.company_situations.is_empty();
        (registered && trading && !liquidated, liquidated)
    }

    fn current_form(forms: Vec<CompanyFormDto>) -> (Option<String>, Option<String>) {
        forms
            .into_iter()
            .find(|form| form.end_date.is_none())
            .map(|form| {
                (
                    finnish_description(form.descriptions),
                    form.kind.map(CodeDto::into_string),
                )
            })
            .unwrap_or((None, None))
    }

    fn into_summary(self) -> Option<CompanySummary> {
        let (is_active, is_liquidated) = self.status_flags();
        let business_id = self.business_id.and_then(BusinessIdDto::into_value)?;
        let name = Self::current_name(&self.names)?;
        let (company_form, _) = Self::current_form(self.company_forms);
        Some(CompanySummary {
            business_id,
            name,
            company_form,
            is_active,
            is_liquidated,
        })
    }

    fn into_record(self, requested: &BusinessId) -> CompanyRecord {
        let (is_active, is_liquidated) = self.status_flags();
        let name = Self::current_name(&self.names);
        let (company_form, company_form_code) = Self::current_form(self.company_forms);

        let mut visiting_address = None;
        let mut postal_address = None;
        for address in self.addresses {
            if address.kind.as_ref().is_some_and(|kind| kind.is("1")) {
                visiting_address = Some(address.into_address());
            } else if address.kind.as_ref().is_some_and(|kind| kind.is("2")) {
                postal_address = Some(address.into_address());
            }
        }

        let mut phone = None;
        let mut website = None;
        let mut email = None;
        for contact in self.contact_details {
            let slot = match contact.kind {
                Some(ref kind) if kind.is("1") => &mut phone,
                Some(ref kind) if kind.is("2") => &mut website,
                Some(ref kind) if kind.is("3") => &mut email,
                _ => continue,
            };
            if slot.is_none() {
                *slot = contact.value;
            }
        }

        CompanyRecord {
            business_id: requested.to_string(),
            name,
            company_form,
            company_form_code,
            is_active,
            is_liquidated,
            visiting_address,
            postal_address,
            main_business_line: self.main_business_line.map(BusinessLineDto::into_line),
            business_lines: self
                .business_lines
                .into_iter()
                .map(BusinessLineDto::into_line)
                .collect(),
            phone,
            website,
            email,
            registration_date: self.registration_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPANY_PAYLOAD: &str = r#"{
        "totalResults": 1,
        "companies": [{
            "businessId": { "value": "0112038-9", "registrationDate": "1978-03-15" },
            "names": [
                { "name": "Old Name Oy", "type": "1", "endDate": "2001-01-01" },
                { "name": "Nokia Oyj", "type": "1" },
                { "name": "Nokia Abp", "type": "3" }
            ],
            "companyForms": [{
                "type": "17",
                "descriptions": [
                    { "languageCode": "3", "description": "Public limited company" },
                    { "languageCode": "1", "description": "Julkinen osakeyhtiö" }
                ]
            }],
            "mainBusinessLine": {
                "code": "26300",
                "descriptions": [{ "languageCode": "1", "description": "Viestintälaitteiden valmistus" }]
            },
            "addresses": [
                {
                    "type": 1,
                    "street": "Karakaari",
                    "buildingNumber": "7",
                    "postCode": "02610",
                    "postOffices": [
                        { "city": "ESBO", "languageCode": "2" },
                        { "city": "ESPOO", "languageCode": "1" }
                    ]
                },
                { "type": 2, "street": "PL 226", "postCode": "00045", "postOffices": [{ "city": "NOKIA GROUP", "languageCode": "1" }] }
            ],
            "contactDetails": [
                { "type": "2", "value": "www.nokia.com" },
                { "type": "1", "value": "010 44 88000" }
            ],
            "companySituations": [],
            "status": "2",
            "tradeRegisterStatus": "1",
            "registrationDate": "1896-01-01"
        }]
    }"#;

    fn business_id() -> BusinessId {
        "0112038-9".parse().expect("valid business id")
    }

    #[test]
    fn business_id_requires_seven_digits_and_check_digit() {
        assert!("0112038-9".parse::<BusinessId>().is_ok());
        assert!("112038-9".parse::<BusinessId>().is_err());
        assert!("01120389".parse::<BusinessId>().is_err());
        assert!("0112038-X".parse::<BusinessId>().is_err());
    }

    #[test]
    fn name_query_bounds_are_enforced() {
        assert!(NameQuery::new(" a ", 10).is_err());
        assert!(NameQuery::new("Nokia", 0).is_err());
        assert!(NameQuery::new("Nokia", 51).is_err());
        let query = NameQuery::new("  Nokia ", 50).expect("valid query");
        assert_eq!(query.name(), "Nokia");
    }

    #[test]
    fn registry_payload_maps_to_company_record() {
        let payload = decode_companies(COMPANY_PAYLOAD.as_bytes()).expect("payload decodes");
        let company = payload.companies.into_iter().next().expect("one company");
        let record = company.into_record(&business_id());

        assert_eq!(record.name.as_deref(), Some("Nokia Oyj"));
        assert_eq!(record.company_form.as_deref(), Some("Julkinen osakeyhtiö"));
        assert_eq!(record.company_form_code.as_deref(), Some("17"));
        assert!(record.is_active);
        assert!(!record.is_liquidated);

        let visiting = record.visiting_address.as_ref().expect("visiting address");
        assert_eq!(visiting.street.as_deref(), Some("Karakaari 7"));
        assert_eq!(visiting.city.as_deref(), Some("ESPOO"));
        assert_eq!(
            record.postal_address.as_ref().and_then(|a| a.city.as_deref()),
            Some("NOKIA GROUP")
        );
        assert_eq!(record.phone.as_deref(), Some("010 44 88000"));
        assert_eq!(record.website.as_deref(), Some("www.nokia.com"));
        assert_eq!(record.email, None);
        assert_eq!(
            record.main_business_line.and_then(|line| line.code).as_deref(),
            Some("26300")
        );
    }

    #[test]
    fn company_situations_mark_liquidation() {
        let payload = r#"{"companies":[{
            "businessId": "1234567-8",
            "names": [{ "name": "Konkurssi Oy", "type": "1" }],
            "companySituations": [{ "type": "KONK" }],
            "status": "2",
            "tradeRegisterStatus": "1"
        }]}"#;
        let company = decode_companies(payload.as_bytes())
            .expect("decodes")
            .companies
            .into_iter()
            .next()
            .expect("one company");
        let summary = company.into_summary().expect("summary");
        assert!(summary.is_liquidated);
        assert!(!summary.is_active);
        assert_eq!(summary.business_id, "1234567-8");
    }

    #[test]
    fn search_results_without_name_are_dropped() {
        let payload = r#"{"companies":[{ "businessId": "1234567-8", "names": [] }]}"#;
        let company = decode_companies(payload.as_bytes())
            .expect("decodes")
            .companies
            .into_iter()
            .next()
            .expect("one company");
        assert!(company.into_summary().is_none());
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        assert!(matches!(
            decode_companies(b"<html>maintenance</html>"),
            Err(RegistryError::Decode(_))
        ));
    }
}
