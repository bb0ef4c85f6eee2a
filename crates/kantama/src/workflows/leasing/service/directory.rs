use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::super::domain::{
    require_email, require_text, Financier, FinancierDraft, FinancierId, FinancierPatch, UserId,
};
use super::super::error::WorkflowError;
use super::super::identity::{Actor, Role, User};
use super::super::messaging::Mailer;
use super::super::repository::{Change, ChangeSet, NotificationSink, UserFilter, WorkflowStore};
use super::{require_admin, LeasingWorkflow};

/// New login for a financier organisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancierUserDraft {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

/// Fields a user may change on their own account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub business_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserListQuery {
    pub role: Option<Role>,
}

impl<S, N, M> LeasingWorkflow<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    /// Maps an authenticated user id to the stored account and the actor it
    /// acts as. Role and financier scope always come from the store.
    pub fn resolve_actor(&self, user_id: UserId) -> Result<(User, Actor), WorkflowError> {
        let user = self
            .store
            .user(user_id)?
            .ok_or(WorkflowError::Unauthenticated)?;
        if !user.is_active {
            return Err(WorkflowError::Unauthenticated);
        }
        let actor = Actor::from_user(&user)?;
        Ok((user, actor))
    }

    pub fn create_financier(
        &self,
        actor: &Actor,
        draft: FinancierDraft,
    ) -> Result<Financier, WorkflowError> {
        require_admin(actor)?;
        draft.validate()?;
        let now = Utc::now();
        let financier = Financier {
            id: FinancierId::new(),
            name: draft.name.trim().to_string(),
            email: draft.email.trim().to_string(),
            phone: draft.phone,
            address: draft.address,
            business_id: draft.business_id,
            notes: draft.notes,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.commit_and_dispatch(
            ChangeSet::new().with(Change::PutFinancier(financier.clone())),
            &[],
        )?;
        info!(financier_id = %financier.id, name = %financier.name, "financier created");
        Ok(financier)
    }

    pub fn update_financier(
        &self,
        actor: &Actor,
        id: FinancierId,
        patch: FinancierPatch,
    ) -> Result<Financier, WorkflowError> {
        require_admin(actor)?;
        let mut financier = self.load_financier_record(id)?;
        patch.apply(&mut financier)?;
        financier.updated_at = Utc::now();
        self.commit_and_dispatch(
            ChangeSet::new().with(Change::PutFinancier(financier.clone())),
            &[],
        )?;
        Ok(financier)
    }

    pub fn list_financiers(
        &self,
        actor: &Actor,
        active_only: bool,
    ) -> Result<Vec<Financier>, WorkflowError> {
        require_admin(actor)?;
        Ok(self.store.financiers(active_only)?)
    }

    /// Admins read any financier; financier users read their own.
    pub fn financier(&self, actor: &Actor, id: FinancierId) -> Result<Financier, WorkflowError> {
        match actor {
            Actor::Admin { .. } => {}
            Actor::Financier { financier_id, .. } if *financier_id == id => {}
            _ => return Err(WorkflowError::forbidden("administrator access required")),
        }
        self.load_financier_record(id)
    }

    /// Soft delete. Existing assignments are kept.
    pub fn deactivate_financier(
        &self,
        actor: &Actor,
        id: FinancierId,
    ) -> Result<Financier, WorkflowError> {
        require_admin(actor)?;
        let mut financier = self.load_financier_record(id)?;
        financier.is_active = false;
        financier.updated_at = Utc::now();
        self.commit_and_dispatch(
            ChangeSet::new().with(Change::PutFinancier(financier.clone())),
            &[],
        )?;
        info!(financier_id = %financier.id, "financier deactivated");
        Ok(financier)
    }

    /// Create a FINANCIER login bound to an existing financier. Duplicate
    /// e-mails are rejected by the store.
    pub fn create_financier_user(
        &self,
        actor: &Actor,
        financier_id: FinancierId,
        draft: FinancierUserDraft,
    ) -> Result<User, WorkflowError> {
        require_admin(actor)?;
        let financier = self.load_financier_record(financier_id)?;
        require_email(&draft.email, "email")?;

        let now = Utc::now();
        let user = User {
            id: UserId::new(),
            email: draft.email.trim().to_string(),
            role: Role::Financier,
            first_name: draft.first_name,
            last_name: draft.last_name,
            phone: draft.phone,
            company_name: Some(financier.name.clone()),
            business_id: financier.business_id.clone(),
            financier_id: Some(financier.id),
            is_active: true,
            is_verified: true,
            created_at: now,
            updated_at: now,
        };
        self.commit_and_dispatch(ChangeSet::new().with(Change::PutUser(user.clone())), &[])?;
        info!(user_id = %user.id, financier_id = %financier.id, "financier user created");
        Ok(user)
    }

    pub fn list_users(&self, actor: &Actor, query: UserListQuery) -> Result<Vec<User>, WorkflowError> {
        require_admin(actor)?;
        Ok(self.store.users(&UserFilter {
            role: query.role,
            ..UserFilter::default()
        })?)
    }

    pub fn user(&self, actor: &Actor, id: UserId) -> Result<User, WorkflowError> {
        if actor.user_id() != id {
            require_admin(actor)?;
        }
        self.load_user(id)
    }

    pub fn activate_user(&self, actor: &Actor, id: UserId) -> Result<User, WorkflowError> {
        self.set_user_active(actor, id, true)
    }

    pub fn deactivate_user(&self, actor: &Actor, id: UserId) -> Result<User, WorkflowError> {
        require_admin(actor)?;
        if actor.user_id() == id {
            return Err(WorkflowError::validation(
                "you cannot deactivate your own account",
            ));
        }
        self.set_user_active(actor, id, false)
    }

    pub fn update_profile(&self, actor: &Actor, patch: ProfilePatch) -> Result<User, WorkflowError> {
        let mut user = self.load_user(actor.user_id())?;
        if let Some(first_name) = patch.first_name {
            require_text(&first_name, "first_name")?;
            user.first_name = Some(first_name);
        }
        if let Some(last_name) = patch.last_name {
            require_text(&last_name, "last_name")?;
            user.last_name = Some(last_name);
        }
        if patch.phone.is_some() {
            user.phone = patch.phone;
        }
        if patch.company_name.is_some() {
            user.company_name = patch.company_name;
        }
        if patch.business_id.is_some() {
            user.business_id = patch.business_id;
        }
        user.updated_at = Utc::now();
        self.commit_and_dispatch(ChangeSet::new().with(Change::PutUser(user.clone())), &[])?;
        Ok(user)
    }

    fn set_user_active(&self, actor: &Actor, id: UserId, active: bool) -> Result<User, WorkflowError> {
        require_admin(actor)?;
        let mut user = self.load_user(id)?;
        user.is_active = active;
        user.updated_at = Utc::now();
        self.commit_and_dispatch(ChangeSet::new().with(Change::PutUser(user.clone())), &[])?;
        info!(user_id = %user.id, active, "account status changed");
        Ok(user)
    }

    fn load_user(&self, id: UserId) -> Result<User, WorkflowError> {
        self.store.user(id)?.ok_or(WorkflowError::not_found("user"))
    }

    fn load_financier_record(&self, id: FinancierId) -> Result<Financier, WorkflowError> {
        self.store
            .financier(id)?
            .ok_or(WorkflowError::not_found("financier"))
    }
}
