//! Side effects emitted by committed workflow events.
//!
//! Each [`WorkflowEvent`] expands into a list of [`SideEffect`]s with no I/O.
//! The service resolves audiences and delivers them after the state change is
//! persisted.

use uuid::Uuid;

use super::contract::Contract;
use super::domain::{
    Application, Financier, FinancierId, InfoRequest, NotificationKind, ReferenceKind, UserId,
};
use super::identity::User;
use super::offer::Offer;

/// Who receives an in-app notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    User(UserId),
    ActiveFinancierUsers(FinancierId),
    ActiveAdmins,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailRecipient {
    Address(String),
    AdminInbox,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSpec {
    pub audience: Audience,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub reference_kind: ReferenceKind,
    pub reference_id: Uuid,
    /// Frontend path, joined to the configured base URL on delivery.
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSpec {
    pub to: EmailRecipient,
    pub subject: String,
    pub heading: String,
    pub paragraphs: Vec<String>,
    pub details: Vec<(String, String)>,
    pub action: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    Notify(NotificationSpec),
    Email(EmailSpec),
}

impl SideEffect {
    pub fn kind(&self) -> Option<NotificationKind> {
        match self {
            SideEffect::Notify(spec) => Some(spec.kind),
            SideEffect::Email(_) => None,
        }
    }
}

/// Committed transitions that fan out to users.
#[derive(Debug, Clone, Copy)]
pub enum WorkflowEvent<'a> {
    ApplicationSubmitted {
        application: &'a Application,
    },
    CustomerProvisioned {
        customer: &'a User,
    },
    AssignedToFinancier {
        application: &'a Application,
        financier: &'a Financier,
    },
    InfoRequested {
        application: &'a Application,
        request: &'a InfoRequest,
    },
    InfoProvided {
        application: &'a Application,
        request: &'a InfoRequest,
    },
    OfferSubmitted {
        application: &'a Application,
        offer: &'a Offer,
        financier: &'a Financier,
    },
    OfferApproved {
        application: &'a Application,
        offer: &'a Offer,
    },
    OfferAccepted {
        application: &'a Application,
        offer: &'a Offer,
        financier: &'a Financier,
    },
    ContractSent {
        application: &'a Application,
        contract: &'a Contract,
    },
    ContractSigned {
        application: &'a Application,
        contract: &'a Contract,
    },
}

pub(crate) mod paths {
    use super::super::contract::Contract;
    use super::super::domain::Application;

    pub fn customer_application(application: &Application) -> String {
        format!("/dashboard/applications/{}", application.id)
    }

    pub fn financier_application(application: &Application) -> String {
        format!("/financier/applications/{}", application.id)
    }

    pub fn admin_application(application: &Application) -> String {
        format!("/admin/applications/{}", application.id)
    }

    pub fn customer_contract(contract: &Contract) -> String {
        format!("/dashboard/contracts/{}", contract.id)
    }

    pub fn financier_contract(contract: &Contract) -> String {
        format!("/financier/contracts/{}", contract.id)
    }

    pub const ADMIN_OFFERS: &str = "/admin/offers";
    pub const LOGIN: &str = "/login";
}

fn money(amount: f64) -> String {
    format!("{amount:.2} €")
}

fn application_details(application: &Application) -> Vec<(String, String)> {
    vec![
        ("Reference".to_string(), application.reference_number.clone()),
        ("Type".to_string(), application.application_type.label().to_string()),
        ("Company".to_string(), application.company.company_name.clone()),
        ("Business ID".to_string(), application.company.business_id.clone()),
        ("Equipment".to_string(), application.equipment.description.clone()),
        ("Amount".to_string(), money(application.equipment.price)),
    ]
}

fn offer_details(offer: &Offer) -> Vec<(String, String)> {
    let mut details = vec![
        ("Monthly payment".to_string(), money(offer.terms.monthly_payment)),
        ("Term".to_string(), format!("{} months", offer.terms.term_months)),
    ];
    if let Some(upfront) = offer.terms.upfront_payment {
        details.push(("Upfront payment".to_string(), money(upfront)));
    }
    if let Some(residual) = offer.terms.residual_value {
        details.push(("Residual value".to_string(), money(residual)));
    }
    details
}

fn notify(
    audience: Audience,
    kind: NotificationKind,
    title: &str,
    message: String,
    reference: (ReferenceKind, Uuid),
    link: String,
) -> SideEffect {
    SideEffect::Notify(NotificationSpec {
        audience,
        kind,
        title: title.to_string(),
        message,
        reference_kind: reference.0,
        reference_id: reference.1,
        link,
    })
}

impl WorkflowEvent<'_> {
    pub fn effects(&self) -> Vec<SideEffect> {
        match *self {
            WorkflowEvent::ApplicationSubmitted { application } => vec![
                notify(
                    Audience::User(application.customer_id),
                    NotificationKind::ApplicationSubmitted,
                    "Application received",
                    format!(
                        "Your application {} has been received and is being processed.",
                        application.reference_number
                    ),
                    (ReferenceKind::Application, application.id.0),
                    paths::customer_application(application),
                ),
                SideEffect::Email(EmailSpec {
                    to: EmailRecipient::AdminInbox,
                    subject: format!(
                        "New {} application {}",
                        application.application_type.label().to_lowercase(),
                        application.reference_number
                    ),
                    heading: "New financing application".to_string(),
                    paragraphs: vec![format!(
                        "{} submitted a new application.",
                        application.company.company_name
                    )],
                    details: application_details(application),
                    action: Some((
                        "Open application".to_string(),
                        paths::admin_application(application),
                    )),
                }),
            ],
            WorkflowEvent::CustomerProvisioned { customer } => vec![SideEffect::Email(EmailSpec {
                to: EmailRecipient::Address(customer.email.clone()),
                subject: "Your Kantama account".to_string(),
                heading: "Welcome to Kantama".to_string(),
                paragraphs: vec![
                    "An account was created for you when your application was submitted."
                        .to_string(),
                    "Sign in with this e-mail address to follow your application.".to_string(),
                ],
                details: vec![("E-mail".to_string(), customer.email.clone())],
                action: Some(("Sign in".to_string(), paths::LOGIN.to_string())),
            })],
            WorkflowEvent::AssignedToFinancier {
                application,
                financier,
            } => vec![
                notify(
                    Audience::User(application.customer_id),
                    NotificationKind::SubmittedToFinancier,
                    "Application sent to financier",
                    format!(
                        "Your application {} is now being reviewed by {}.",
                        application.reference_number, financier.name
                    ),
                    (ReferenceKind::Application, application.id.0),
                    paths::customer_application(application),
                ),
                notify(
                    Audience::ActiveFinancierUsers(financier.id),
                    NotificationKind::NewApplication,
                    "New application",
                    format!(
                        "Application {} from {} is awaiting your review.",
                        application.reference_number, application.company.company_name
                    ),
                    (ReferenceKind::Application, application.id.0),
                    paths::financier_application(application),
                ),
                SideEffect::Email(EmailSpec {
                    to: EmailRecipient::Address(financier.email.clone()),
                    subject: format!("New application {}", application.reference_number),
                    heading: "New application for review".to_string(),
                    paragraphs: vec![format!(
                        "Kantama has routed application {} to {}.",
                        application.reference_number, financier.name
                    )],
                    details: application_details(application),
                    action: Some((
                        "Review application".to_string(),
                        paths::financier_application(application),
                    )),
                }),
            ],
            WorkflowEvent::InfoRequested {
                application,
                request,
            } => {
                let mut paragraphs = vec![request.message.clone()];
                if !request.requested_items.is_empty() {
                    paragraphs.push(format!(
                        "Requested items: {}",
                        request.requested_items.join(", ")
                    ));
                }
                vec![
                    notify(
                        Audience::User(application.customer_id),
                        NotificationKind::InfoRequested,
                        "Additional information requested",
                        format!(
                            "The financier needs more information about application {}.",
                            application.reference_number
                        ),
                        (ReferenceKind::InfoRequest, request.id.0),
                        paths::customer_application(application),
                    ),
                    SideEffect::Email(EmailSpec {
                        to: EmailRecipient::Address(application.company.contact_email.clone()),
                        subject: format!(
                            "Additional information needed for {}",
                            application.reference_number
                        ),
                        heading: "Additional information requested".to_string(),
                        paragraphs,
                        details: Vec::new(),
                        action: Some((
                            "Respond".to_string(),
                            paths::customer_application(application),
                        )),
                    }),
                ]
            }
            WorkflowEvent::InfoProvided {
                application,
                request,
            } => vec![notify(
                Audience::ActiveFinancierUsers(request.financier_id),
                NotificationKind::InfoProvided,
                "Customer responded",
                format!(
                    "{} answered your information request on {}.",
                    application.company.company_name, application.reference_number
                ),
                (ReferenceKind::InfoRequest, request.id.0),
                paths::financier_application(application),
            )],
            WorkflowEvent::OfferSubmitted {
                application,
                offer,
                financier,
            } => vec![
                notify(
                    Audience::ActiveAdmins,
                    NotificationKind::OfferPending,
                    "Offer awaiting approval",
                    format!(
                        "{} submitted an offer for {}.",
                        financier.name, application.reference_number
                    ),
                    (ReferenceKind::Offer, offer.id.0),
                    paths::ADMIN_OFFERS.to_string(),
                ),
                SideEffect::Email(EmailSpec {
                    to: EmailRecipient::AdminInbox,
                    subject: format!("Offer for {} awaits approval", application.reference_number),
                    heading: "Offer awaiting approval".to_string(),
                    paragraphs: vec![format!(
                        "{} submitted an offer to {}.",
                        financier.name, application.company.company_name
                    )],
                    details: offer_details(offer),
                    action: Some((
                        "Review offers".to_string(),
                        paths::ADMIN_OFFERS.to_string(),
                    )),
                }),
            ],
            WorkflowEvent::OfferApproved { application, offer } => vec![
                notify(
                    Audience::User(application.customer_id),
                    NotificationKind::OfferSent,
                    "New offer",
                    format!(
                        "You have received an offer for application {}.",
                        application.reference_number
                    ),
                    (ReferenceKind::Offer, offer.id.0),
                    paths::customer_application(application),
                ),
                SideEffect::Email(EmailSpec {
                    to: EmailRecipient::Address(application.company.contact_email.clone()),
                    subject: format!("Offer for {}", application.reference_number),
                    heading: "You have a new financing offer".to_string(),
                    paragraphs: offer.notes_to_customer.iter().cloned().collect(),
                    details: offer_details(offer),
                    action: Some((
                        "View offer".to_string(),
                        paths::customer_application(application),
                    )),
                }),
            ],
            WorkflowEvent::OfferAccepted {
                application,
                offer,
                financier,
            } => vec![
                notify(
                    Audience::ActiveFinancierUsers(offer.financier_id),
                    NotificationKind::OfferAccepted,
                    "Offer accepted",
                    format!(
                        "{} accepted your offer on {}.",
                        application.company.company_name, application.reference_number
                    ),
                    (ReferenceKind::Offer, offer.id.0),
                    paths::financier_application(application),
                ),
                SideEffect::Email(EmailSpec {
                    to: EmailRecipient::Address(financier.email.clone()),
                    subject: format!("Offer accepted: {}", application.reference_number),
                    heading: "Your offer was accepted".to_string(),
                    paragraphs: vec![
                        "Prepare the lease contract to continue.".to_string()
                    ],
                    details: offer_details(offer),
                    action: Some((
                        "Open application".to_string(),
                        paths::financier_application(application),
                    )),
                }),
                notify(
                    Audience::User(application.customer_id),
                    NotificationKind::OfferAccepted,
                    "Offer accepted",
                    format!(
                        "You accepted the offer for {}. The financier will prepare the contract.",
                        application.reference_number
                    ),
                    (ReferenceKind::Offer, offer.id.0),
                    paths::customer_application(application),
                ),
                SideEffect::Email(EmailSpec {
                    to: EmailRecipient::Address(application.company.contact_email.clone()),
                    subject: format!("You accepted the offer for {}", application.reference_number),
                    heading: "Offer accepted".to_string(),
                    paragraphs: vec![format!(
                        "{} will send you the lease contract next.",
                        financier.name
                    )],
                    details: offer_details(offer),
                    action: None,
                }),
            ],
            WorkflowEvent::ContractSent {
                application,
                contract,
            } => vec![
                notify(
                    Audience::User(application.customer_id),
                    NotificationKind::ContractSent,
                    "Contract ready for signing",
                    format!(
                        "Contract {} for application {} is ready for signing.",
                        contract.contract_number, application.reference_number
                    ),
                    (ReferenceKind::Contract, contract.id.0),
                    paths::customer_contract(contract),
                ),
                SideEffect::Email(EmailSpec {
                    to: EmailRecipient::Address(application.company.contact_email.clone()),
                    subject: format!("Contract {} ready for signing", contract.contract_number),
                    heading: "Your lease contract is ready".to_string(),
                    paragraphs: contract.message_to_customer.iter().cloned().collect(),
                    details: vec![
                        ("Contract".to_string(), contract.contract_number.clone()),
                        (
                            "Monthly rent".to_string(),
                            contract.rent.monthly_rent.map(money).unwrap_or_default(),
                        ),
                    ],
                    action: Some((
                        "Review and sign".to_string(),
                        paths::customer_contract(contract),
                    )),
                }),
            ],
            WorkflowEvent::ContractSigned {
                application,
                contract,
            } => vec![
                notify(
                    Audience::ActiveFinancierUsers(contract.financier_id),
                    NotificationKind::ContractSigned,
                    "Contract signed",
                    format!(
                        "{} signed contract {}.",
                        application.company.company_name, contract.contract_number
                    ),
                    (ReferenceKind::Contract, contract.id.0),
                    paths::financier_contract(contract),
                ),
                SideEffect::Email(EmailSpec {
                    to: EmailRecipient::AdminInbox,
                    subject: format!("Contract {} signed", contract.contract_number),
                    heading: "Contract signed".to_string(),
                    paragraphs: vec![format!(
                        "{} signed the lease contract for {}.",
                        application.company.company_name, application.reference_number
                    )],
                    details: vec![
                        ("Contract".to_string(), contract.contract_number.clone()),
                        ("Reference".to_string(), application.reference_number.clone()),
                    ],
                    action: Some((
                        "Open application".to_string(),
                        paths::admin_application(application),
                    )),
                }),
            ],
        }
    }
}

/// Joins a frontend path onto the configured base URL.
pub fn absolute_link(frontend_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        frontend_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// HTML and plain-text bodies for an e-mail.
pub fn render_email(spec: &EmailSpec, frontend_url: &str) -> (String, String) {
    let mut html = format!("<h2>{}</h2>\n", escape_html(&spec.heading));
    let mut text = format!("{}\n\n", spec.heading);

    for paragraph in &spec.paragraphs {
        html.push_str(&format!("<p>{}</p>\n", escape_html(paragraph)));
        text.push_str(paragraph);
        text.push_str("\n\n");
    }

    if !spec.details.is_empty() {
        html.push_str("<table>\n");
        for (label, value) in &spec.details {
            html.push_str(&format!(
                "<tr><th align=\"left\">{}</th><td>{}</td></tr>\n",
                escape_html(label),
                escape_html(value)
            ));
            text.push_str(&format!("{label}: {value}\n"));
        }
        html.push_str("</table>\n");
        text.push('\n');
    }

    if let Some((label, path)) = &spec.action {
        let url = absolute_link(frontend_url, path);
        html.push_str(&format!(
            "<p><a href=\"{}\">{}</a></p>\n",
            escape_html(&url),
            escape_html(label)
        ));
        text.push_str(&format!("{label}: {url}\n"));
    }

    (html, text)
}
