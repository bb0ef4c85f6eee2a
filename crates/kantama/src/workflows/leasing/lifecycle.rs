//! Transition tables for applications, offers and contracts.
//!
//! Every status change goes through [`attempt_transition`], which checks the
//! acting role before the current state so a caller learns about missing
//! permission before it learns anything about the record.

use std::fmt;

use super::contract::ContractStatus;
use super::domain::ApplicationStatus;
use super::identity::Role;
use super::offer::OfferStatus;

/// A status machine with role-gated events.
pub trait Lifecycle: Copy + PartialEq + fmt::Debug {
    type Event: Copy + fmt::Debug;

    const ENTITY: &'static str;

    fn next(self, event: Self::Event) -> Option<Self>;
    fn permitted_role(event: Self::Event) -> Role;
    /// Past-tense verb for error messages, e.g. "accepted".
    fn action(event: Self::Event) -> &'static str;
    fn label(self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("{role} may not perform this action on the {entity}")]
    RoleNotPermitted { entity: &'static str, role: &'static str },
    #[error("{entity} cannot be {action} while {current}")]
    InvalidState {
        entity: &'static str,
        action: &'static str,
        current: &'static str,
    },
}

pub fn attempt_transition<L: Lifecycle>(
    current: L,
    event: L::Event,
    role: Role,
) -> Result<L, TransitionError> {
    if L::permitted_role(event) != role {
        return Err(TransitionError::RoleNotPermitted {
            entity: L::ENTITY,
            role: role.label(),
        });
    }
    current
        .next(event)
        .ok_or_else(|| TransitionError::InvalidState {
            entity: L::ENTITY,
            action: L::action(event),
            current: current.label(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationEvent {
    AssignedToFinancier,
    InfoRequested,
    OfferReleased,
    OfferAccepted,
    OfferRejected,
    ContractSent,
    ContractSigned,
}

impl Lifecycle for ApplicationStatus {
    type Event = ApplicationEvent;

    const ENTITY: &'static str = "application";

    fn next(self, event: ApplicationEvent) -> Option<Self> {
        type S = ApplicationStatus;
        type E = ApplicationEvent;

        match (self, event) {
            (S::Submitted, E::AssignedToFinancier) => Some(S::SubmittedToFinancier),
            // Further assignments on a progressing application keep its status.
            (status, E::AssignedToFinancier) if status.is_active() => Some(status),
            // Sibling offers and late questions never pull a committed
            // application back.
            (status, E::InfoRequested | E::OfferReleased | E::OfferRejected)
                if status.is_committed() =>
            {
                Some(status)
            }
            (status, E::InfoRequested) if status.is_active() => Some(S::InfoRequested),
            (status, E::OfferReleased) if status.is_active() => Some(S::OfferSent),
            // The offer's own status gates accept and reject; these arms only
            // record the outcome on the application.
            (S::ContractSent, E::OfferAccepted) => None,
            (status, E::OfferAccepted) if status.is_active() => Some(S::OfferAccepted),
            (status, E::OfferRejected) if status.is_active() => Some(S::OfferRejected),
            (S::OfferAccepted | S::ContractSent, E::ContractSent) => Some(S::ContractSent),
            (status, E::ContractSigned) if status.is_active() => Some(S::Signed),
            _ => None,
        }
    }

    fn permitted_role(event: ApplicationEvent) -> Role {
        match event {
            ApplicationEvent::AssignedToFinancier | ApplicationEvent::OfferReleased => Role::Admin,
            ApplicationEvent::InfoRequested | ApplicationEvent::ContractSent => Role::Financier,
            ApplicationEvent::OfferAccepted
            | ApplicationEvent::OfferRejected
            | ApplicationEvent::ContractSigned => Role::Customer,
        }
    }

    fn action(event: ApplicationEvent) -> &'static str {
        match event {
            ApplicationEvent::AssignedToFinancier => "assigned",
            ApplicationEvent::InfoRequested => "queried",
            ApplicationEvent::OfferReleased => "offered",
            ApplicationEvent::OfferAccepted => "accepted",
            ApplicationEvent::OfferRejected => "rejected",
            ApplicationEvent::ContractSent => "contracted",
            ApplicationEvent::ContractSigned => "signed",
        }
    }

    fn label(self) -> &'static str {
        ApplicationStatus::label(self)
    }
}

/// Admin-only jump to any status, bypassing the table.
pub fn override_application_status(
    current: ApplicationStatus,
    target: ApplicationStatus,
    role: Role,
) -> Result<ApplicationStatus, TransitionError> {
    if role != Role::Admin {
        return Err(TransitionError::RoleNotPermitted {
            entity: ApplicationStatus::ENTITY,
            role: role.label(),
        });
    }
    if current == target {
        return Err(TransitionError::InvalidState {
            entity: ApplicationStatus::ENTITY,
            action: "moved",
            current: current.label(),
        });
    }
    Ok(target)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferEvent {
    Edit,
    SubmitForApproval,
    Approve,
    Accept,
    Reject,
}

impl Lifecycle for OfferStatus {
    type Event = OfferEvent;

    const ENTITY: &'static str = "offer";

    fn next(self, event: OfferEvent) -> Option<Self> {
        match (self, event) {
            (OfferStatus::Draft, OfferEvent::Edit) => Some(OfferStatus::Draft),
            (OfferStatus::Draft, OfferEvent::SubmitForApproval) => Some(OfferStatus::PendingAdmin),
            (OfferStatus::PendingAdmin, OfferEvent::Approve) => Some(OfferStatus::Sent),
            (OfferStatus::Sent, OfferEvent::Accept) => Some(OfferStatus::Accepted),
            (OfferStatus::Sent, OfferEvent::Reject) => Some(OfferStatus::Rejected),
            _ => None,
        }
    }

    fn permitted_role(event: OfferEvent) -> Role {
        match event {
            OfferEvent::Edit | OfferEvent::SubmitForApproval => Role::Financier,
            OfferEvent::Approve => Role::Admin,
            OfferEvent::Accept | OfferEvent::Reject => Role::Customer,
        }
    }

    fn action(event: OfferEvent) -> &'static str {
        match event {
            OfferEvent::Edit => "edited",
            OfferEvent::SubmitForApproval => "submitted for approval",
            OfferEvent::Approve => "approved",
            OfferEvent::Accept => "accepted",
            OfferEvent::Reject => "rejected",
        }
    }

    fn label(self) -> &'static str {
        OfferStatus::label(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractEvent {
    Edit,
    Send,
    Sign,
}

impl Lifecycle for ContractStatus {
    type Event = ContractEvent;

    const ENTITY: &'static str = "contract";

    fn next(self, event: ContractEvent) -> Option<Self> {
        match (self, event) {
            (ContractStatus::Draft, ContractEvent::Edit) => Some(ContractStatus::Draft),
            (ContractStatus::Draft, ContractEvent::Send) => Some(ContractStatus::Sent),
            (ContractStatus::Sent, ContractEvent::Sign) => Some(ContractStatus::Signed),
            _ => None,
        }
    }

    fn permitted_role(event: ContractEvent) -> Role {
        match event {
            ContractEvent::Edit | ContractEvent::Send => Role::Financier,
            ContractEvent::Sign => Role::Customer,
        }
    }

    fn action(event: ContractEvent) -> &'static str {
        match event {
            ContractEvent::Edit => "edited",
            ContractEvent::Send => "sent",
            ContractEvent::Sign => "signed",
        }
    }

    fn label(self) -> &'static str {
        ContractStatus::label(self)
    }
}
