use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::super::domain::{Notification, NotificationId};
use super::super::error::WorkflowError;
use super::super::identity::Actor;
use super::super::messaging::Mailer;
use super::super::repository::{NotificationSink, WorkflowStore};
use super::LeasingWorkflow;

pub const DEFAULT_NOTIFICATION_LIMIT: usize = 50;
const MAX_NOTIFICATION_LIMIT: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotificationQuery {
    pub unread_only: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnreadCount {
    pub unread: usize,
}

impl<S, N, M> LeasingWorkflow<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    /// The actor's own inbox, newest first.
    pub fn notifications(
        &self,
        actor: &Actor,
        query: &NotificationQuery,
    ) -> Result<Vec<Notification>, WorkflowError> {
        let limit = query
            .limit
            .unwrap_or(DEFAULT_NOTIFICATION_LIMIT)
            .clamp(1, MAX_NOTIFICATION_LIMIT);
        Ok(self
            .notifications
            .list(actor.user_id(), query.unread_only, limit)?)
    }

    pub fn unread_notifications(&self, actor: &Actor) -> Result<UnreadCount, WorkflowError> {
        Ok(UnreadCount {
            unread: self.notifications.unread_count(actor.user_id())?,
        })
    }

    /// Another user's notification is reported as missing.
    pub fn mark_notification_read(
        &self,
        actor: &Actor,
        id: NotificationId,
    ) -> Result<(), WorkflowError> {
        if self
            .notifications
            .mark_read(actor.user_id(), id, Utc::now())?
        {
            Ok(())
        } else {
            Err(WorkflowError::not_found("notification"))
        }
    }

    pub fn mark_all_notifications_read(&self, actor: &Actor) -> Result<usize, WorkflowError> {
        Ok(self
            .notifications
            .mark_all_read(actor.user_id(), Utc::now())?)
    }
}
