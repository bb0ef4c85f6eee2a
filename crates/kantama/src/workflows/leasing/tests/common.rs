use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::workflows::leasing::auth::TokenIssuer;
use crate::workflows::leasing::contract::{Contract, ContractDraft};
use crate::workflows::leasing::domain::{
    Application, ApplicationStatus, ApplicationSubmission, AssignmentRequest, CompanyContact,
    Financier, FinancierId, LeasingSubmission, Notification, NotificationKind, OfferId, UserId,
};
use crate::workflows::leasing::files::{MemoryBlobStore, Upload};
use crate::workflows::leasing::identity::{Actor, Role, User};
use crate::workflows::leasing::memory::{MemoryNotificationSink, MemoryWorkflowStore};
use crate::workflows::leasing::messaging::{EmailMessage, MailError, Mailer};
use crate::workflows::leasing::offer::{Offer, OfferDraft, OfferStatus, OfferTerms};
use crate::workflows::leasing::registry::{
    BusinessId, CompanyRecord, CompanyRegistry, CompanySummary, NameQuery, RegistryError,
};
use crate::workflows::leasing::repository::{Change, ChangeSet, WorkflowStore};
use crate::workflows::leasing::router::{leasing_router, ApiState};
use crate::workflows::leasing::service::{LeasingWorkflow, WorkflowSettings};

pub(super) const CUSTOMER_EMAIL: &str = "anna@konepaja.fi";
pub(super) const TOKEN_SECRET: &str = "leasing-tests-token-secret-0123456789";

pub(super) type Workflow =
    LeasingWorkflow<MemoryWorkflowStore, MemoryNotificationSink, RecordingMailer>;

/// Mailer that keeps every message; can be switched to fail.
#[derive(Default)]
pub(super) struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: bool,
}

impl RecordingMailer {
    pub(super) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub(super) fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }

    pub(super) fn sent_to(&self, address: &str) -> Vec<EmailMessage> {
        self.sent()
            .into_iter()
            .filter(|message| message.to == address)
            .collect()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if self.failing {
            return Err(MailError::Transport("smtp relay offline".to_string()));
        }
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}

/// Registry double answering for a single company.
pub(super) struct StubRegistry;

pub(super) fn nokia() -> CompanyRecord {
    CompanyRecord {
        business_id: "0112038-9".to_string(),
        name: Some("Nokia Oyj".to_string()),
        company_form: Some("Julkinen osakeyhtiö".to_string()),
        company_form_code: Some("17".to_string()),
        is_active: true,
        is_liquidated: false,
        visiting_address: None,
        postal_address: None,
        main_business_line: None,
        business_lines: Vec::new(),
        phone: None,
        website: Some("www.nokia.com".to_string()),
        email: None,
        registration_date: Some("1896-01-01".to_string()),
    }
}

#[async_trait]
impl CompanyRegistry for StubRegistry {
    async fn lookup(&self, business_id: &BusinessId) -> Result<CompanyRecord, RegistryError> {
        if business_id.as_str() == "0112038-9" {
            Ok(nokia())
        } else {
            Err(RegistryError::NotFound)
        }
    }

    async fn search(&self, query: &NameQuery) -> Result<Vec<CompanySummary>, RegistryError> {
        if query.name().to_lowercase().contains("nokia") {
            Ok(vec![CompanySummary {
                business_id: "0112038-9".to_string(),
                name: "Nokia Oyj".to_string(),
                company_form: Some("Julkinen osakeyhtiö".to_string()),
                is_active: true,
                is_liquidated: false,
            }])
        } else {
            Ok(Vec::new())
        }
    }
}

pub(super) fn user(email: &str, role: Role, financier_id: Option<FinancierId>) -> User {
    let now = Utc::now();
    User {
        id: UserId::new(),
        email: email.to_string(),
        role,
        first_name: None,
        last_name: None,
        phone: None,
        company_name: None,
        business_id: None,
        financier_id,
        is_active: true,
        is_verified: true,
        created_at: now,
        updated_at: now,
    }
}

pub(super) fn financier(name: &str, email: &str) -> Financier {
    let now = Utc::now();
    Financier {
        id: FinancierId::new(),
        name: name.to_string(),
        email: email.to_string(),
        phone: None,
        address: Some("Rahoituskatu 1, Helsinki".to_string()),
        business_id: Some("7654321-0".to_string()),
        notes: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub(super) fn company() -> CompanyContact {
    CompanyContact {
        company_name: "Konepaja Oy".to_string(),
        business_id: "1234567-8".to_string(),
        contact_person: Some("Anna Virtanen".to_string()),
        contact_email: CUSTOMER_EMAIL.to_string(),
        contact_phone: Some("+358401234567".to_string()),
        street_address: Some("Tehtaankatu 3".to_string()),
        postal_code: Some("00140".to_string()),
        city: Some("Helsinki".to_string()),
    }
}

pub(super) fn leasing_submission(price: f64) -> ApplicationSubmission {
    ApplicationSubmission::Leasing(LeasingSubmission {
        company: company(),
        equipment_description: Some("Wheel loader".to_string()),
        equipment_supplier: Some("Konekauppa Oy".to_string()),
        equipment_price: price,
        link_to_item: None,
        requested_term_months: Some(36),
        requested_residual_value: None,
        additional_info: None,
        registry_snapshot: None,
        extra: BTreeMap::new(),
    })
}

pub(super) fn offer_draft(application: &Application) -> OfferDraft {
    OfferDraft {
        application_id: application.id,
        terms: OfferTerms {
            monthly_payment: 300.0,
            term_months: 24,
            upfront_payment: Some(1500.0),
            residual_value: Some(1000.0),
            interest_or_margin: Some(4.9),
            included_services: None,
        },
        notes_to_customer: Some("Includes maintenance".to_string()),
        internal_notes: Some("Margin approved by credit desk".to_string()),
        extra_terms: BTreeMap::new(),
        expires_at: None,
    }
}

pub(super) fn pdf(name: &str) -> Upload {
    Upload {
        filename: name.to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: b"%PDF-1.7 signed".to_vec(),
    }
}

/// A workflow over in-memory adapters with one admin, one customer and two
/// financiers, the first of which has two active users and one inactive.
pub(super) struct Harness {
    pub workflow: Arc<Workflow>,
    pub store: Arc<MemoryWorkflowStore>,
    pub inbox: Arc<MemoryNotificationSink>,
    pub mailer: Arc<RecordingMailer>,
    pub blobs: Arc<MemoryBlobStore>,
    pub admin: Actor,
    pub customer: Actor,
    pub financier: Actor,
    pub financier_colleague: Actor,
    pub financier_id: FinancierId,
    pub other_financier: Actor,
    pub other_financier_id: FinancierId,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with_mailer(RecordingMailer::default())
    }

    pub(super) fn with_mailer(mailer: RecordingMailer) -> Self {
        let store = Arc::new(MemoryWorkflowStore::new());
        let inbox = Arc::new(MemoryNotificationSink::new());
        let mailer = Arc::new(mailer);
        let blobs = Arc::new(MemoryBlobStore::new());

        let lakeside = financier("Lakeside Rahoitus", "offers@lakeside.fi");
        let northern = financier("Northern Leasing", "desk@northern.fi");
        let admin = user("admin@kantama.fi", Role::Admin, None);
        let customer = user(CUSTOMER_EMAIL, Role::Customer, None);
        let analyst = user("analyst@lakeside.fi", Role::Financier, Some(lakeside.id));
        let colleague = user("credit@lakeside.fi", Role::Financier, Some(lakeside.id));
        let mut retired = user("retired@lakeside.fi", Role::Financier, Some(lakeside.id));
        retired.is_active = false;
        let rival = user("analyst@northern.fi", Role::Financier, Some(northern.id));

        let actors: Vec<Actor> = [&admin, &customer, &analyst, &colleague, &rival]
            .into_iter()
            .map(|account| Actor::from_user(account).expect("seeded account is consistent"))
            .collect();

        store
            .commit(
                ChangeSet::new()
                    .with(Change::PutFinancier(lakeside.clone()))
                    .with(Change::PutFinancier(northern.clone()))
                    .with(Change::PutUser(admin))
                    .with(Change::PutUser(customer))
                    .with(Change::PutUser(analyst))
                    .with(Change::PutUser(colleague))
                    .with(Change::PutUser(retired))
                    .with(Change::PutUser(rival)),
            )
            .expect("seed commit succeeds");

        let workflow = Arc::new(LeasingWorkflow::new(
            store.clone(),
            inbox.clone(),
            mailer.clone(),
            blobs.clone(),
            WorkflowSettings::default(),
        ));

        Self {
            workflow,
            store,
            inbox,
            mailer,
            blobs,
            admin: actors[0],
            customer: actors[1],
            financier: actors[2],
            financier_colleague: actors[3],
            financier_id: lakeside.id,
            other_financier: actors[4],
            other_financier_id: northern.id,
        }
    }

    pub(super) fn notifications_for(&self, actor: &Actor) -> Vec<Notification> {
        self.inbox
            .all()
            .into_iter()
            .filter(|notification| notification.user_id == actor.user_id())
            .collect()
    }

    pub(super) fn notifications_of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.inbox
            .all()
            .into_iter()
            .filter(|notification| notification.kind == kind)
            .collect()
    }

    pub(super) fn submitted(&self) -> Application {
        self.workflow
            .submit_application(&self.customer, leasing_submission(15000.0))
            .expect("customer submission succeeds")
    }

    pub(super) fn assigned(&self) -> Application {
        let application = self.submitted();
        self.workflow
            .assign_application(
                &self.admin,
                AssignmentRequest {
                    application_id: application.id,
                    financier_id: self.financier_id,
                    notes: None,
                },
            )
            .expect("assignment succeeds");
        self.workflow
            .application(&self.admin, application.id)
            .expect("application reloads")
    }

    pub(super) fn pending_offer(&self) -> (Application, Offer) {
        let application = self.assigned();
        let offer = self
            .workflow
            .create_offer(&self.financier, offer_draft(&application))
            .expect("offer drafted");
        let offer = self
            .workflow
            .submit_offer(&self.financier, offer.id)
            .expect("offer submitted");
        (application, offer)
    }

    pub(super) fn sent_offer(&self) -> (Application, Offer) {
        let (application, offer) = self.pending_offer();
        let offer = self
            .workflow
            .approve_offer(&self.admin, offer.id)
            .expect("offer approved");
        (application, offer)
    }

    /// Lakeside and Northern both assigned, each with a released offer.
    pub(super) fn competing_offers(&self) -> (Application, Offer, Offer) {
        let (application, lakeside) = self.sent_offer();
        self.workflow
            .assign_application(
                &self.admin,
                AssignmentRequest {
                    application_id: application.id,
                    financier_id: self.other_financier_id,
                    notes: None,
                },
            )
            .expect("second assignment succeeds");
        let northern = self
            .workflow
            .create_offer(&self.other_financier, offer_draft(&application))
            .expect("rival offer drafted");
        self.workflow
            .submit_offer(&self.other_financier, northern.id)
            .expect("rival offer submitted");
        let northern = self
            .workflow
            .approve_offer(&self.admin, northern.id)
            .expect("rival offer approved");
        (application, lakeside, northern)
    }

    pub(super) fn offer_status(&self, id: OfferId) -> OfferStatus {
        self.store
            .offer(id)
            .expect("store readable")
            .expect("offer stored")
            .status
    }

    pub(super) fn application_status(&self, application: &Application) -> ApplicationStatus {
        self.workflow
            .application(&self.admin, application.id)
            .expect("application readable")
            .status
    }

    pub(super) fn accepted_offer(&self) -> (Application, Offer) {
        let (application, offer) = self.sent_offer();
        let offer = self
            .workflow
            .accept_offer(&self.customer, offer.id)
            .expect("offer accepted");
        (application, offer)
    }

    pub(super) fn draft_contract(&self) -> (Application, Contract) {
        let (application, offer) = self.accepted_offer();
        let contract = self
            .workflow
            .create_contract(
                &self.financier,
                ContractDraft {
                    offer_id: Some(offer.id),
                    ..ContractDraft::default()
                },
            )
            .expect("contract drafted");
        (application, contract)
    }

    pub(super) fn sent_contract(&self) -> (Application, Contract) {
        let (application, contract) = self.draft_contract();
        let contract = self
            .workflow
            .send_contract(&self.financier, contract.id)
            .expect("contract sent");
        (application, contract)
    }

    pub(super) fn api_state(&self) -> ApiState<MemoryWorkflowStore, MemoryNotificationSink, RecordingMailer> {
        ApiState {
            workflow: self.workflow.clone(),
            tokens: self.tokens(),
            registry: Arc::new(StubRegistry),
        }
    }

    pub(super) fn router(&self) -> axum::Router {
        leasing_router(self.api_state())
    }

    pub(super) fn tokens(&self) -> TokenIssuer {
        TokenIssuer::new(TOKEN_SECRET, chrono::Duration::minutes(30))
    }

    pub(super) fn bearer(&self, actor: &Actor) -> String {
        let account = self
            .store
            .user(actor.user_id())
            .expect("store readable")
            .expect("seeded account");
        let token = self.tokens().issue(&account).expect("token issued");
        format!("Bearer {token}")
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
