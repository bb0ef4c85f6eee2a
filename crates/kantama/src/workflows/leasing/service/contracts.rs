use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::super::contract::{
    Contract, ContractDocuments, ContractDraft, ContractPatch, ContractStatus, PrefillSources,
    Signature, DEFAULT_SIGNING_PLACE,
};
use super::super::domain::{
    Application, ApplicationId, ApplicationStatus, ContractId, StoredFile,
};
use super::super::effects::WorkflowEvent;
use super::super::error::WorkflowError;
use super::super::files::{Upload, UploadContext};
use super::super::identity::Actor;
use super::super::lifecycle::{attempt_transition, ApplicationEvent, ContractEvent};
use super::super::messaging::Mailer;
use super::super::offer::OfferStatus;
use super::super::reference::contract_number;
use super::super::repository::{
    Change, ChangeSet, ContractFilter, NotificationSink, WorkflowStore,
};
use super::offers::ApplicationSummary;
use super::{require_admin, LeasingWorkflow};

const CONTRACT_NUMBER_ATTEMPTS: usize = 8;

/// Electronic signature details supplied by the lessee.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SignatureInput {
    pub signer_name: Option<String>,
    pub place: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractOverview {
    #[serde(flatten)]
    pub contract: Contract,
    pub application: Option<ApplicationSummary>,
    pub financier_name: Option<String>,
}

impl<S, N, M> LeasingWorkflow<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    /// Draft a contract, pre-filled from the application, the financier and
    /// an accepted offer when one is named.
    pub fn create_contract(
        &self,
        actor: &Actor,
        draft: ContractDraft,
    ) -> Result<Contract, WorkflowError> {
        let Actor::Financier { financier_id, .. } = *actor else {
            return Err(WorkflowError::forbidden(
                "only financiers can create contracts",
            ));
        };
        let offer = match draft.offer_id {
            Some(offer_id) => Some(
                self.store
                    .offer(offer_id)?
                    .ok_or(WorkflowError::not_found("offer"))?,
            ),
            None => None,
        };
        let application_id = draft
            .application_id
            .or(offer.as_ref().map(|offer| offer.application_id))
            .ok_or_else(|| WorkflowError::validation("application_id is required"))?;

        let application = self.load_application(application_id)?;
        self.ensure_assigned(actor, &application)?;
        if !matches!(
            application.status,
            ApplicationStatus::OfferAccepted | ApplicationStatus::ContractSent
        ) {
            return Err(WorkflowError::invalid_state(format!(
                "contracts can be drafted only after an offer is accepted; application is {}",
                application.status
            )));
        }
        if let Some(offer) = &offer {
            let usable = offer.status == OfferStatus::Accepted
                && offer.application_id == application.id
                && offer.financier_id == financier_id;
            if !usable {
                return Err(WorkflowError::validation(
                    "offer_id must name your accepted offer for this application",
                ));
            }
        }
        let financier = self
            .store
            .financier(financier_id)?
            .ok_or(WorkflowError::not_found("financier"))?;

        let offer_id = offer.as_ref().map(|offer| offer.id);
        let content = draft.prefill(&PrefillSources {
            application: &application,
            financier: &financier,
            accepted_offer: offer.as_ref(),
        });

        let now = Utc::now();
        let contract = Contract {
            id: ContractId::new(),
            contract_number: self.allocate_contract_number()?,
            application_id: application.id,
            financier_id,
            offer_id,
            status: ContractStatus::Draft,
            lessee: content.lessee,
            lessor: content.lessor,
            seller: content.seller,
            lease_objects: content.lease_objects,
            usage_location: content.usage_location,
            delivery: content.delivery,
            rent: content.rent,
            insurance: content.insurance,
            bank: content.bank,
            guarantees: content.guarantees,
            special_conditions: content.special_conditions,
            message_to_customer: content.message_to_customer,
            internal_notes: content.internal_notes,
            documents: ContractDocuments::default(),
            lessee_signature: Signature::default(),
            lessor_signature: Signature::default(),
            created_at: now,
            updated_at: now,
            sent_at: None,
            signed_at: None,
        };
        contract.validate()?;

        self.commit_and_dispatch(
            ChangeSet::new().with(Change::PutContract(contract.clone())),
            &[],
        )?;
        info!(
            contract_id = %contract.id,
            contract_number = %contract.contract_number,
            application_id = %application.id,
            "contract drafted"
        );
        Ok(contract)
    }

    pub fn update_contract(
        &self,
        actor: &Actor,
        id: ContractId,
        patch: ContractPatch,
    ) -> Result<Contract, WorkflowError> {
        let mut contract = self.load_contract(id)?;
        self.ensure_contract_owner(actor, &contract)?;
        attempt_transition(contract.status, ContractEvent::Edit, actor.role())?;
        patch.apply(&mut contract)?;
        contract.updated_at = Utc::now();
        self.commit_and_dispatch(
            ChangeSet::new().with(Change::PutContract(contract.clone())),
            &[],
        )?;
        Ok(contract)
    }

    /// Attach the lessor logo. Allowed in any contract status.
    pub fn upload_contract_logo(
        &self,
        actor: &Actor,
        id: ContractId,
        upload: Upload,
    ) -> Result<Contract, WorkflowError> {
        self.attach_contract_file(actor, id, UploadContext::Logo, upload)
    }

    /// Attach the contract PDF. Allowed in any contract status.
    pub fn upload_contract_document(
        &self,
        actor: &Actor,
        id: ContractId,
        upload: Upload,
    ) -> Result<Contract, WorkflowError> {
        self.attach_contract_file(actor, id, UploadContext::Contract, upload)
    }

    pub fn send_contract(&self, actor: &Actor, id: ContractId) -> Result<Contract, WorkflowError> {
        let mut contract = self.load_contract(id)?;
        self.ensure_contract_owner(actor, &contract)?;
        let mut application = self.load_application(contract.application_id)?;

        contract.status = attempt_transition(contract.status, ContractEvent::Send, actor.role())?;
        contract.ensure_sendable()?;
        let previous = application.status;
        application.status =
            attempt_transition(previous, ApplicationEvent::ContractSent, actor.role())?;

        let now = Utc::now();
        contract.sent_at = Some(now);
        contract.updated_at = now;
        application.updated_at = now;

        self.commit_and_dispatch(
            ChangeSet::new()
                .with(Change::PutContract(contract.clone()))
                .with(Change::PutApplication(application.clone())),
            &[WorkflowEvent::ContractSent {
                application: &application,
                contract: &contract,
            }],
        )?;
        info!(
            contract_id = %contract.id,
            application_id = %application.id,
            from = %previous,
            to = %application.status,
            "contract sent"
        );
        Ok(contract)
    }

    /// Electronic signature by the lessee.
    pub fn sign_contract(
        &self,
        actor: &Actor,
        id: ContractId,
        input: SignatureInput,
    ) -> Result<Contract, WorkflowError> {
        self.complete_signature(actor, id, input, None)
    }

    /// Signing by uploading the signed PDF.
    pub fn upload_signed_contract(
        &self,
        actor: &Actor,
        id: ContractId,
        upload: Upload,
    ) -> Result<Contract, WorkflowError> {
        self.complete_signature(actor, id, SignatureInput::default(), Some(upload))
    }

    /// Contracts the actor may see. Customers never see drafts.
    pub fn list_contracts(
        &self,
        actor: &Actor,
        application_id: Option<ApplicationId>,
    ) -> Result<Vec<Contract>, WorkflowError> {
        let mut filter = ContractFilter {
            application_id,
            ..ContractFilter::default()
        };
        match actor {
            Actor::Admin { .. } => Ok(self.store.contracts(&filter)?),
            Actor::Financier { financier_id, .. } => {
                filter.financier_id = Some(*financier_id);
                Ok(self.store.contracts(&filter)?)
            }
            Actor::Customer { .. } => {
                let owned: Vec<ApplicationId> = match application_id {
                    Some(id) => {
                        let application = self.load_application(id)?;
                        self.ensure_owner(actor, &application)?;
                        vec![application.id]
                    }
                    None => self
                        .list_applications(actor, &Default::default())?
                        .into_iter()
                        .map(|application| application.id)
                        .collect(),
                };
                Ok(self
                    .store
                    .contracts(&filter)?
                    .into_iter()
                    .filter(|contract| contract.status != ContractStatus::Draft)
                    .filter(|contract| owned.contains(&contract.application_id))
                    .collect())
            }
        }
    }

    pub fn contract(&self, actor: &Actor, id: ContractId) -> Result<Contract, WorkflowError> {
        let contract = self.load_contract(id)?;
        match actor {
            Actor::Admin { .. } => {}
            Actor::Financier { .. } => self.ensure_contract_owner(actor, &contract)?,
            Actor::Customer { .. } => {
                self.customer_contract_application(actor, &contract)?;
            }
        }
        Ok(contract)
    }

    /// Every contract with its application and financier, for admins.
    pub fn contract_overview(&self, actor: &Actor) -> Result<Vec<ContractOverview>, WorkflowError> {
        require_admin(actor)?;
        self.store
            .contracts(&ContractFilter::default())?
            .into_iter()
            .map(|contract| {
                let application = self.store.application(contract.application_id)?;
                let financier = self.store.financier(contract.financier_id)?;
                Ok(ContractOverview {
                    application: application.as_ref().map(ApplicationSummary::from),
                    financier_name: financier.map(|financier| financier.name),
                    contract,
                })
            })
            .collect()
    }

    fn complete_signature(
        &self,
        actor: &Actor,
        id: ContractId,
        input: SignatureInput,
        upload: Option<Upload>,
    ) -> Result<Contract, WorkflowError> {
        let mut contract = self.load_contract(id)?;
        let mut application = self.customer_contract_application(actor, &contract)?;

        contract.status = attempt_transition(contract.status, ContractEvent::Sign, actor.role())?;
        let previous = application.status;
        application.status =
            attempt_transition(previous, ApplicationEvent::ContractSigned, actor.role())?;

        let now = Utc::now();
        let signer_name = input
            .signer_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| application.company.contact_person.clone());
        contract.lessee_signature = Signature {
            date: Some(now),
            place: input
                .place
                .filter(|place| !place.trim().is_empty())
                .or_else(|| Some(DEFAULT_SIGNING_PLACE.to_string())),
            signer_name,
        };
        contract.signed_at = Some(now);
        contract.updated_at = now;
        application.updated_at = now;

        let staged = match upload {
            Some(upload) => Some(self.stage_upload(
                actor,
                UploadContext::SignedContract,
                upload,
                Some(application.id),
                Some(format!("Signed contract {}", contract.contract_number)),
            )?),
            None => None,
        };

        let mut changes = ChangeSet::new();
        if let Some(file) = &staged {
            contract.documents.signed_file_id = Some(file.id);
            changes.push(Change::InsertFile(file.clone()));
        }
        changes.push(Change::PutContract(contract.clone()));
        changes.push(Change::PutApplication(application.clone()));

        let events = [WorkflowEvent::ContractSigned {
            application: &application,
            contract: &contract,
        }];
        match &staged {
            Some(file) => self.commit_upload(file, changes, &events)?,
            None => self.commit_and_dispatch(changes, &events)?,
        }
        info!(
            contract_id = %contract.id,
            application_id = %application.id,
            from = %previous,
            to = %application.status,
            uploaded = staged.is_some(),
            "contract signed"
        );
        Ok(contract)
    }

    fn attach_contract_file(
        &self,
        actor: &Actor,
        id: ContractId,
        context: UploadContext,
        upload: Upload,
    ) -> Result<Contract, WorkflowError> {
        let mut contract = self.load_contract(id)?;
        self.ensure_contract_owner(actor, &contract)?;
        let description = match context {
            UploadContext::Logo => "Lessor logo",
            _ => "Contract document",
        };
        let file: StoredFile = self.stage_upload(
            actor,
            context,
            upload,
            Some(contract.application_id),
            Some(description.to_string()),
        )?;
        match context {
            UploadContext::Logo => contract.documents.logo_file_id = Some(file.id),
            _ => contract.documents.contract_file_id = Some(file.id),
        }
        contract.updated_at = Utc::now();

        self.commit_upload(
            &file,
            ChangeSet::new()
                .with(Change::InsertFile(file.clone()))
                .with(Change::PutContract(contract.clone())),
            &[],
        )?;
        info!(contract_id = %contract.id, file_id = %file.id, ?context, "contract file attached");
        Ok(contract)
    }

    fn load_contract(&self, id: ContractId) -> Result<Contract, WorkflowError> {
        self.store
            .contract(id)?
            .ok_or(WorkflowError::not_found("contract"))
    }

    fn ensure_contract_owner(&self, actor: &Actor, contract: &Contract) -> Result<(), WorkflowError> {
        match actor.financier_id() {
            Some(financier_id) if financier_id == contract.financier_id => Ok(()),
            _ => Err(WorkflowError::forbidden(
                "only the financier that drafted this contract may do this",
            )),
        }
    }

    /// The application behind a contract, provided the actor is its owner
    /// and the contract has left draft.
    fn customer_contract_application(
        &self,
        actor: &Actor,
        contract: &Contract,
    ) -> Result<Application, WorkflowError> {
        let application = self.load_application(contract.application_id)?;
        self.ensure_owner(actor, &application)?;
        if contract.status == ContractStatus::Draft {
            return Err(WorkflowError::forbidden("this contract is not available yet"));
        }
        Ok(application)
    }

    fn allocate_contract_number(&self) -> Result<String, WorkflowError> {
        let mut rng = rand::thread_rng();
        for _ in 0..CONTRACT_NUMBER_ATTEMPTS {
            let candidate = contract_number(&mut rng);
            if self.store.contract_by_number(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(WorkflowError::Duplicate(
            "could not allocate a unique contract number".to_string(),
        ))
    }
}
