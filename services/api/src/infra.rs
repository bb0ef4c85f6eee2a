use chrono::Utc;
use kantama::config::AppConfig;
use kantama::error::AppError;
use kantama::workflows::leasing::repository::{Change, ChangeSet};
use kantama::workflows::leasing::{
    ApiState, BlobStore, DiskBlobStore, Financier, FinancierId, LeasingWorkflow, LogMailer,
    MemoryNotificationSink, MemoryWorkflowStore, PrhRegistryClient, Role, TokenIssuer, User,
    UserId, WorkflowError, WorkflowSettings, WorkflowStore,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use uuid::Uuid;

pub(crate) type Workflow = LeasingWorkflow<MemoryWorkflowStore, MemoryNotificationSink, LogMailer>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

// Fixed ids so tokens minted by `kantama-api token` stay valid across restarts.
const ADMIN_ID: u128 = 0x4b41_4e54_414d_4100_0000_0000_0000_0001;
const FINANCIER_ID: u128 = 0x4b41_4e54_414d_4100_0000_0000_0000_0101;
const FINANCIER_USER_ID: u128 = 0x4b41_4e54_414d_4100_0000_0000_0000_0102;
const CUSTOMER_ID: u128 = 0x4b41_4e54_414d_4100_0000_0000_0000_0201;

/// Accounts present in every freshly started in-memory store.
#[derive(Debug, Clone)]
pub(crate) struct SeedDirectory {
    pub(crate) financier: Financier,
    pub(crate) users: Vec<User>,
}

impl SeedDirectory {
    pub(crate) fn standard(admin_email: &str) -> Self {
        let now = Utc::now();
        let financier = Financier {
            id: FinancierId::from(Uuid::from_u128(FINANCIER_ID)),
            name: "Lakeside Rahoitus".to_string(),
            email: "offers@lakeside.fi".to_string(),
            phone: Some("+358 9 4242 4242".to_string()),
            address: Some("Rantakatu 4, 00100 Helsinki".to_string()),
            business_id: Some("7654321-0".to_string()),
            notes: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let account = |id: u128, email: &str, role: Role, first: &str, last: &str| User {
            id: UserId::from(Uuid::from_u128(id)),
            email: email.to_ascii_lowercase(),
            role,
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            phone: None,
            company_name: None,
            business_id: None,
            financier_id: None,
            is_active: true,
            is_verified: true,
            created_at: now,
            updated_at: now,
        };

        let admin = account(ADMIN_ID, admin_email, Role::Admin, "Kantama", "Myynti");
        let mut analyst = account(
            FINANCIER_USER_ID,
            "analyst@lakeside.fi",
            Role::Financier,
            "Lauri",
            "Laine",
        );
        analyst.financier_id = Some(financier.id);
        analyst.company_name = Some(financier.name.clone());
        let mut customer = account(
            CUSTOMER_ID,
            "anna@konepaja.fi",
            Role::Customer,
            "Anna",
            "Virtanen",
        );
        customer.company_name = Some("Konepaja Oy".to_string());
        customer.business_id = Some("1234567-8".to_string());

        Self {
            financier,
            users: vec![admin, analyst, customer],
        }
    }

    pub(crate) fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|user| user.email.eq_ignore_ascii_case(email.trim()))
    }

    pub(crate) fn apply<S: WorkflowStore>(&self, store: &S) -> Result<(), WorkflowError> {
        let changes = self
            .users
            .iter()
            .cloned()
            .fold(
                ChangeSet::new().with(Change::PutFinancier(self.financier.clone())),
                |changes, user| changes.with(Change::PutUser(user)),
            );
        store.commit(changes)?;
        Ok(())
    }
}

/// Builds a seeded in-memory workflow around the given blob store.
pub(crate) fn build_workflow(
    settings: WorkflowSettings,
    seed: &SeedDirectory,
    blobs: Arc<dyn BlobStore>,
) -> Result<Workflow, WorkflowError> {
    let store = Arc::new(MemoryWorkflowStore::new());
    seed.apply(store.as_ref())?;
    Ok(LeasingWorkflow::new(
        store,
        Arc::new(MemoryNotificationSink::new()),
        Arc::new(LogMailer),
        blobs,
        settings,
    ))
}

pub(crate) fn api_state(
    config: &AppConfig,
) -> Result<ApiState<MemoryWorkflowStore, MemoryNotificationSink, LogMailer>, AppError> {
    let seed = SeedDirectory::standard(&config.workflow.admin_email);
    let blobs: Arc<dyn BlobStore> = Arc::new(DiskBlobStore::new(&config.uploads.directory));
    let workflow = build_workflow(WorkflowSettings::from_config(config), &seed, blobs)?;
    let registry = PrhRegistryClient::from_config(&config.registry)?;

    Ok(ApiState {
        workflow: Arc::new(workflow),
        tokens: TokenIssuer::from_config(&config.auth),
        registry: Arc::new(registry),
    })
}
