use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{FinancierId, UserId};

/// Platform role carried by every account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Admin,
    Financier,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
            Role::Financier => "FINANCIER",
        }
    }
}

/// Stored account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub business_id: Option<String>,
    pub financier_id: Option<FinancierId>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    /// Full name when known, otherwise the e-mail address.
    pub fn display_name(&self) -> String {
        self.full_name().unwrap_or_else(|| self.email.clone())
    }
}

/// Authenticated principal performing an operation.
///
/// A financier actor always carries the financier organization it acts for;
/// customers and admins never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer { user_id: UserId },
    Admin { user_id: UserId },
    Financier {
        user_id: UserId,
        financier_id: FinancierId,
    },
}

impl Actor {
    pub fn from_user(user: &User) -> Result<Self, IdentityError> {
        match (user.role, user.financier_id) {
            (Role::Customer, None) => Ok(Actor::Customer { user_id: user.id }),
            (Role::Admin, None) => Ok(Actor::Admin { user_id: user.id }),
            (Role::Financier, Some(financier_id)) => Ok(Actor::Financier {
                user_id: user.id,
                financier_id,
            }),
            (Role::Financier, None) => Err(IdentityError::MissingFinancier),
            (role, Some(_)) => Err(IdentityError::UnexpectedFinancier { role }),
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            Actor::Customer { user_id }
            | Actor::Admin { user_id }
            | Actor::Financier { user_id, .. } => *user_id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Actor::Customer { .. } => Role::Customer,
            Actor::Admin { .. } => Role::Admin,
            Actor::Financier { .. } => Role::Financier,
        }
    }

    pub fn financier_id(&self) -> Option<FinancierId> {
        match self {
            Actor::Financier { financier_id, .. } => Some(*financier_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("financier account is not linked to a financier")]
    MissingFinancier,
    #[error("{} account must not be linked to a financier", role.label())]
    UnexpectedFinancier { role: Role },
}
