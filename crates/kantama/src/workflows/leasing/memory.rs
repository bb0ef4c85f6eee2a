//! In-process store and notification inbox used by the API binary and tests.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};

use super::contract::{Contract, ContractStatus};
use super::domain::{
    Application, ApplicationId, Assignment, AssignmentId, ContractId, FileId, Financier,
    FinancierId, InfoRequest, InfoRequestId, InfoRequestResponse, Notification, NotificationId,
    OfferId, StoredFile, UserId,
};
use super::identity::User;
use super::offer::Offer;
use super::repository::{
    ApplicationFilter, Change, ChangeSet, ContractFilter, NotificationSink, OfferFilter,
    RepositoryError, SinkError, UserFilter, WorkflowStore,
};

#[derive(Debug, Clone, Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    financiers: HashMap<FinancierId, Financier>,
    applications: HashMap<ApplicationId, Application>,
    assignments: HashMap<AssignmentId, Assignment>,
    info_requests: HashMap<InfoRequestId, InfoRequest>,
    info_responses: Vec<InfoRequestResponse>,
    offers: HashMap<OfferId, Offer>,
    contracts: HashMap<ContractId, Contract>,
    files: HashMap<FileId, StoredFile>,
}

impl StoreState {
    fn apply(&mut self, change: Change) -> Result<(), RepositoryError> {
        match change {
            Change::PutUser(user) => {
                let duplicate = self.users.values().any(|existing| {
                    existing.id != user.id && existing.email.eq_ignore_ascii_case(&user.email)
                });
                if duplicate {
                    return Err(RepositoryError::Conflict(format!(
                        "e-mail {} is already registered",
                        user.email
                    )));
                }
                self.users.insert(user.id, user);
            }
            Change::PutFinancier(financier) => {
                self.financiers.insert(financier.id, financier);
            }
            Change::PutApplication(application) => {
                let duplicate = self.applications.values().any(|existing| {
                    existing.id != application.id
                        && existing.reference_number == application.reference_number
                });
                if duplicate {
                    return Err(RepositoryError::Conflict(format!(
                        "reference number {} is taken",
                        application.reference_number
                    )));
                }
                self.applications.insert(application.id, application);
            }
            Change::InsertAssignment(assignment) => {
                let duplicate = self.assignments.values().any(|existing| {
                    existing.id == assignment.id
                        || (existing.application_id == assignment.application_id
                            && existing.financier_id == assignment.financier_id)
                });
                if duplicate {
                    return Err(RepositoryError::Conflict(
                        "application is already assigned to this financier".to_string(),
                    ));
                }
                if !self.applications.contains_key(&assignment.application_id) {
                    return Err(RepositoryError::NotFound);
                }
                self.assignments.insert(assignment.id, assignment);
            }
            Change::RemoveAssignment(id) => {
                self.assignments
                    .remove(&id)
                    .ok_or(RepositoryError::NotFound)?;
            }
            Change::PutInfoRequest(request) => {
                self.info_requests.insert(request.id, request);
            }
            Change::InsertInfoResponse(response) => {
                if !self.info_requests.contains_key(&response.info_request_id) {
                    return Err(RepositoryError::NotFound);
                }
                self.info_responses.push(response);
            }
            Change::PutOffer(offer) => {
                self.offers.insert(offer.id, offer);
            }
            Change::PutContract(contract) => {
                let number_taken = self.contracts.values().any(|existing| {
                    existing.id != contract.id
                        && existing.contract_number == contract.contract_number
                });
                if number_taken {
                    return Err(RepositoryError::Conflict(format!(
                        "contract number {} is taken",
                        contract.contract_number
                    )));
                }
                let second_signature = contract.status == ContractStatus::Signed
                    && self.contracts.values().any(|existing| {
                        existing.id != contract.id
                            && existing.application_id == contract.application_id
                            && existing.status == ContractStatus::Signed
                    });
                if second_signature {
                    return Err(RepositoryError::Conflict(
                        "application already has a signed contract".to_string(),
                    ));
                }
                self.contracts.insert(contract.id, contract);
            }
            Change::InsertFile(file) => {
                if self.files.contains_key(&file.id) {
                    return Err(RepositoryError::Conflict(format!(
                        "file {} already exists",
                        file.id
                    )));
                }
                self.files.insert(file.id, file);
            }
            Change::RemoveFile(id) => {
                self.files.remove(&id).ok_or(RepositoryError::NotFound)?;
            }
        }
        Ok(())
    }
}

fn newest_first<T>(mut items: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(created_at(item)));
    items
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("store lock poisoned".to_string())
}

/// Lock-guarded in-memory [`WorkflowStore`]; commits swap in a fully
/// validated copy of the state.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    state: RwLock<StoreState>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> Result<T, RepositoryError> {
        let guard = self.state.read().map_err(|_| poisoned())?;
        Ok(f(&guard))
    }
}

impl WorkflowStore for MemoryWorkflowStore {
    fn user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.read(|state| state.users.get(&id).cloned())
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let email = email.trim();
        self.read(|state| {
            state
                .users
                .values()
                .find(|user| user.email.eq_ignore_ascii_case(email))
                .cloned()
        })
    }

    fn users(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError> {
        let users: Vec<User> = self.read(|state| {
            state
                .users
                .values()
                .filter(|user| filter.role.map_or(true, |role| user.role == role))
                .filter(|user| {
                    filter
                        .financier_id
                        .map_or(true, |id| user.financier_id == Some(id))
                })
                .filter(|user| !filter.active_only || user.is_active)
                .cloned()
                .collect()
        })?;
        Ok(newest_first(users, |user| user.created_at))
    }

    fn financier(&self, id: FinancierId) -> Result<Option<Financier>, RepositoryError> {
        self.read(|state| state.financiers.get(&id).cloned())
    }

    fn financiers(&self, active_only: bool) -> Result<Vec<Financier>, RepositoryError> {
        let mut financiers: Vec<Financier> = self.read(|state| {
            state
                .financiers
                .values()
                .filter(|financier| !active_only || financier.is_active)
                .cloned()
                .collect()
        })?;
        financiers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(financiers)
    }

    fn application(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        self.read(|state| state.applications.get(&id).cloned())
    }

    fn application_by_reference(
        &self,
        reference_number: &str,
    ) -> Result<Option<Application>, RepositoryError> {
        self.read(|state| {
            state
                .applications
                .values()
                .find(|application| application.reference_number == reference_number)
                .cloned()
        })
    }

    fn applications(
        &self,
        filter: &ApplicationFilter,
    ) -> Result<Vec<Application>, RepositoryError> {
        let applications: Vec<Application> = self.read(|state| {
            state
                .applications
                .values()
                .filter(|app| filter.customer_id.map_or(true, |id| app.customer_id == id))
                .filter(|app| filter.status.map_or(true, |status| app.status == status))
                .filter(|app| {
                    filter
                        .application_type
                        .map_or(true, |kind| app.application_type == kind)
                })
                .filter(|app| {
                    filter.financier_id.map_or(true, |financier_id| {
                        state.assignments.values().any(|assignment| {
                            assignment.application_id == app.id
                                && assignment.financier_id == financier_id
                        })
                    })
                })
                .cloned()
                .collect()
        })?;
        Ok(newest_first(applications, |app| app.created_at))
    }

    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, RepositoryError> {
        self.read(|state| state.assignments.get(&id).cloned())
    }

    fn assignment_for(
        &self,
        application_id: ApplicationId,
        financier_id: FinancierId,
    ) -> Result<Option<Assignment>, RepositoryError> {
        self.read(|state| {
            state
                .assignments
                .values()
                .find(|assignment| {
                    assignment.application_id == application_id
                        && assignment.financier_id == financier_id
                })
                .cloned()
        })
    }

    fn assignments_for_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<Assignment>, RepositoryError> {
        let assignments: Vec<Assignment> = self.read(|state| {
            state
                .assignments
                .values()
                .filter(|assignment| assignment.application_id == application_id)
                .cloned()
                .collect()
        })?;
        Ok(newest_first(assignments, |assignment| assignment.assigned_at))
    }

    fn info_request(&self, id: InfoRequestId) -> Result<Option<InfoRequest>, RepositoryError> {
        self.read(|state| state.info_requests.get(&id).cloned())
    }

    fn info_requests_for_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<InfoRequest>, RepositoryError> {
        let requests: Vec<InfoRequest> = self.read(|state| {
            state
                .info_requests
                .values()
                .filter(|request| request.application_id == application_id)
                .cloned()
                .collect()
        })?;
        Ok(newest_first(requests, |request| request.created_at))
    }

    fn info_responses(
        &self,
        info_request_id: InfoRequestId,
    ) -> Result<Vec<InfoRequestResponse>, RepositoryError> {
        self.read(|state| {
            state
                .info_responses
                .iter()
                .filter(|response| response.info_request_id == info_request_id)
                .cloned()
                .collect()
        })
    }

    fn offer(&self, id: OfferId) -> Result<Option<Offer>, RepositoryError> {
        self.read(|state| state.offers.get(&id).cloned())
    }

    fn offers(&self, filter: &OfferFilter) -> Result<Vec<Offer>, RepositoryError> {
        let offers: Vec<Offer> = self.read(|state| {
            state
                .offers
                .values()
                .filter(|offer| {
                    filter
                        .application_id
                        .map_or(true, |id| offer.application_id == id)
                })
                .filter(|offer| filter.financier_id.map_or(true, |id| offer.financier_id == id))
                .filter(|offer| {
                    filter
                        .statuses
                        .as_ref()
                        .map_or(true, |statuses| statuses.contains(&offer.status))
                })
                .cloned()
                .collect()
        })?;
        Ok(newest_first(offers, |offer| offer.created_at))
    }

    fn contract(&self, id: ContractId) -> Result<Option<Contract>, RepositoryError> {
        self.read(|state| state.contracts.get(&id).cloned())
    }

    fn contract_by_number(&self, number: &str) -> Result<Option<Contract>, RepositoryError> {
        self.read(|state| {
            state
                .contracts
                .values()
                .find(|contract| contract.contract_number == number)
                .cloned()
        })
    }

    fn contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>, RepositoryError> {
        let contracts: Vec<Contract> = self.read(|state| {
            state
                .contracts
                .values()
                .filter(|contract| {
                    filter
                        .application_id
                        .map_or(true, |id| contract.application_id == id)
                })
                .filter(|contract| {
                    filter
                        .financier_id
                        .map_or(true, |id| contract.financier_id == id)
                })
                .cloned()
                .collect()
        })?;
        Ok(newest_first(contracts, |contract| contract.created_at))
    }

    fn file(&self, id: FileId) -> Result<Option<StoredFile>, RepositoryError> {
        self.read(|state| state.files.get(&id).cloned())
    }

    fn files_for_application(
        &self,
        application_id: ApplicationId,
    ) -> Result<Vec<StoredFile>, RepositoryError> {
        let files: Vec<StoredFile> = self.read(|state| {
            state
                .files
                .values()
                .filter(|file| file.application_id == Some(application_id))
                .cloned()
                .collect()
        })?;
        Ok(newest_first(files, |file| file.created_at))
    }

    fn commit(&self, changes: ChangeSet) -> Result<(), RepositoryError> {
        let mut guard = self.state.write().map_err(|_| poisoned())?;
        let mut next = guard.clone();
        for change in changes.into_changes() {
            next.apply(change)?;
        }
        *guard = next;
        Ok(())
    }
}

/// In-memory notification inboxes.
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    entries: Mutex<Vec<Notification>>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded notification, in insertion order.
    pub fn all(&self) -> Vec<Notification> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Notification>>, SinkError> {
        self.entries
            .lock()
            .map_err(|_| SinkError::Unavailable("inbox lock poisoned".to_string()))
    }
}

impl NotificationSink for MemoryNotificationSink {
    fn record(&self, notification: Notification) -> Result<(), SinkError> {
        self.lock()?.push(notification);
        Ok(())
    }

    fn list(
        &self,
        user_id: UserId,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>, SinkError> {
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user_id)
            .filter(|entry| !unread_only || !entry.is_read)
            .take(limit)
            .cloned()
            .collect())
    }

    fn unread_count(&self, user_id: UserId) -> Result<usize, SinkError> {
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .filter(|entry| entry.user_id == user_id && !entry.is_read)
            .count())
    }

    fn mark_read(
        &self,
        user_id: UserId,
        id: NotificationId,
        at: DateTime<Utc>,
    ) -> Result<bool, SinkError> {
        let mut entries = self.lock()?;
        match entries
            .iter_mut()
            .find(|entry| entry.id == id && entry.user_id == user_id)
        {
            Some(entry) => {
                if !entry.is_read {
                    entry.is_read = true;
                    entry.read_at = Some(at);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn mark_all_read(&self, user_id: UserId, at: DateTime<Utc>) -> Result<usize, SinkError> {
        let mut entries = self.lock()?;
        let mut marked = 0;
        for entry in entries
            .iter_mut()
            .filter(|entry| entry.user_id == user_id && !entry.is_read)
        {
            entry.is_read = true;
            entry.read_at = Some(at);
            marked += 1;
        }
        Ok(marked)
    }
}
