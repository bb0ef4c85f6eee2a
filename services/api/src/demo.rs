use crate::infra::{build_workflow, SeedDirectory, Workflow};
use clap::Args;
use kantama::error::AppError;
use kantama::workflows::leasing::domain::{CompanyContact, LeasingSubmission};
use kantama::workflows::leasing::service::{NotificationQuery, SignatureInput};
use kantama::workflows::leasing::{
    Actor, Application, ApplicationSubmission, AssignmentRequest, ContractDraft,
    InfoRequestDraft, InfoResponseDraft, MemoryBlobStore, OfferDraft, OfferTerms, Role,
    WorkflowError, WorkflowSettings,
};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Contact e-mail used for the public submission
    #[arg(long, default_value = "mikko@sahapuu.fi")]
    pub(crate) applicant_email: String,
    /// Equipment price in euros (VAT 0%)
    #[arg(long, default_value_t = 48_000.0)]
    pub(crate) price: f64,
    /// Stop after the offer has been accepted
    #[arg(long)]
    pub(crate) skip_contract: bool,
    /// Print every inbox once the walkthrough finishes
    #[arg(long)]
    pub(crate) show_notifications: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        applicant_email,
        price,
        skip_contract,
        show_notifications,
    } = args;

    let settings = WorkflowSettings::default();
    let seed = SeedDirectory::standard(&settings.admin_email);
    let workflow = build_workflow(settings, &seed, Arc::new(MemoryBlobStore::new()))?;
    let admin = seeded_actor(&workflow, &seed, Role::Admin)?;
    let financier = seeded_actor(&workflow, &seed, Role::Financier)?;

    println!("Kantama leasing walkthrough");
    let outcome = workflow.submit_public_application(demo_submission(&applicant_email, price))?;
    let (_, customer) = workflow.resolve_actor(outcome.customer_id)?;
    let application = outcome.application;
    println!(
        "- {} submitted by {} ({} account)",
        application.reference_number,
        applicant_email,
        if outcome.account_created {
            "new"
        } else {
            "existing"
        }
    );
    print_status(&workflow, &admin, &application, "public submission")?;

    workflow.assign_application(
        &admin,
        AssignmentRequest {
            application_id: application.id,
            financier_id: seed.financier.id,
            notes: Some("Machinery, strong balance sheet".to_string()),
        },
    )?;
    print_status(
        &workflow,
        &admin,
        &application,
        &format!("assigned to {}", seed.financier.name),
    )?;

    let request = workflow.request_info(
        &financier,
        InfoRequestDraft {
            application_id: application.id,
            message: "Please share the latest financial statements".to_string(),
            requested_items: vec!["Financial statements 2025".to_string()],
        },
    )?;
    print_status(&workflow, &admin, &application, "information requested")?;
    let reply = workflow.respond_to_info_request(
        &customer,
        request.id,
        InfoResponseDraft {
            message: "Statements sent by e-mail to the analyst".to_string(),
            attachment_ids: Vec::new(),
        },
    )?;
    println!("  info request {} answered at {}", request.id, reply.created_at);

    let term_months: u32 = 48;
    let offer = workflow.create_offer(
        &financier,
        OfferDraft {
            application_id: application.id,
            terms: OfferTerms {
                monthly_payment: (price * 1.08 / f64::from(term_months) * 100.0).round() / 100.0,
                term_months,
                upfront_payment: None,
                residual_value: Some((price * 0.1).round()),
                interest_or_margin: Some(3.9),
                included_services: Some("Maintenance and insurance".to_string()),
            },
            notes_to_customer: Some("Valid for 30 days".to_string()),
            internal_notes: None,
            extra_terms: BTreeMap::new(),
            expires_at: None,
        },
    )?;
    let offer = workflow.submit_offer(&financier, offer.id)?;
    println!("  offer {} {}", offer.id, offer.status.label());
    let offer = workflow.approve_offer(&admin, offer.id)?;
    print_status(&workflow, &admin, &application, "offer approved and sent")?;
    let offer = workflow.accept_offer(&customer, offer.id)?;
    println!(
        "  offer {} {} at {:.2} EUR/month",
        offer.id,
        offer.status.label(),
        offer.terms.monthly_payment
    );
    print_status(&workflow, &admin, &application, "offer accepted")?;

    if !skip_contract {
        let contract = workflow.create_contract(
            &financier,
            ContractDraft {
                offer_id: Some(offer.id),
                ..ContractDraft::default()
            },
        )?;
        println!(
            "  contract {} drafted ({})",
            contract.contract_number,
            contract.status.label()
        );
        workflow.send_contract(&financier, contract.id)?;
        print_status(&workflow, &admin, &application, "contract sent")?;
        let signed = workflow.sign_contract(&customer, contract.id, SignatureInput::default())?;
        println!(
            "  contract {} {} by {}",
            signed.contract_number,
            signed.status.label(),
            signed
                .lessee_signature
                .signer_name
                .as_deref()
                .unwrap_or("the lessee")
        );
        print_status(&workflow, &admin, &application, "contract signed")?;
    }

    if show_notifications {
        println!("\nInboxes");
        for (label, actor) in [
            ("admin", &admin),
            ("financier", &financier),
            ("customer", &customer),
        ] {
            let inbox = workflow.notifications(actor, &NotificationQuery::default())?;
            println!("- {label}: {} notification(s)", inbox.len());
            for note in inbox.iter().rev() {
                println!("  - [{:?}] {}", note.kind, note.title);
            }
        }
    }

    Ok(())
}

fn seeded_actor(
    workflow: &Workflow,
    seed: &SeedDirectory,
    role: Role,
) -> Result<Actor, WorkflowError> {
    let user = seed
        .users
        .iter()
        .find(|user| user.role == role)
        .ok_or_else(|| WorkflowError::not_found("user"))?;
    Ok(workflow.resolve_actor(user.id)?.1)
}

fn print_status(
    workflow: &Workflow,
    admin: &Actor,
    application: &Application,
    step: &str,
) -> Result<(), WorkflowError> {
    let current = workflow.application(admin, application.id)?;
    println!("  {step:<32} -> {}", current.status);
    Ok(())
}

fn demo_submission(email: &str, price: f64) -> ApplicationSubmission {
    ApplicationSubmission::Leasing(LeasingSubmission {
        company: CompanyContact {
            company_name: "Sahapuu Oy".to_string(),
            business_id: "2345678-9".to_string(),
            contact_person: Some("Mikko Korhonen".to_string()),
            contact_email: email.to_string(),
            contact_phone: Some("+358401234567".to_string()),
            street_address: Some("Sahatie 3".to_string()),
            postal_code: Some("33100".to_string()),
            city: Some("Tampere".to_string()),
        },
        equipment_description: Some("Wheel loader".to_string()),
        equipment_supplier: Some("Konekauppa Oy".to_string()),
        equipment_price: price,
        link_to_item: None,
        requested_term_months: Some(48),
        requested_residual_value: None,
        additional_info: None,
        registry_snapshot: None,
        extra: BTreeMap::new(),
    })
}
