use chrono::Utc;
use tracing::{info, warn};

use super::super::domain::{ApplicationId, FileId, StoredFile};
use super::super::effects::WorkflowEvent;
use super::super::error::WorkflowError;
use super::super::files::{Upload, UploadContext};
use super::super::identity::Actor;
use super::super::messaging::Mailer;
use super::super::repository::{Change, ChangeSet, NotificationSink, WorkflowStore};
use super::LeasingWorkflow;

impl<S, N, M> LeasingWorkflow<S, N, M>
where
    S: WorkflowStore + 'static,
    N: NotificationSink + 'static,
    M: Mailer + 'static,
{
    /// Upload a supporting document to an application.
    pub fn upload_document(
        &self,
        actor: &Actor,
        application_id: ApplicationId,
        upload: Upload,
        description: Option<String>,
    ) -> Result<StoredFile, WorkflowError> {
        let application = self.load_application(application_id)?;
        self.ensure_can_view(actor, &application)?;
        let file = self.stage_upload(
            actor,
            UploadContext::Document,
            upload,
            Some(application.id),
            description,
        )?;
        self.commit_upload(&file, ChangeSet::new().with(Change::InsertFile(file.clone())), &[])?;
        info!(
            file_id = %file.id,
            application_id = %application.id,
            size = file.size_bytes,
            "document uploaded"
        );
        Ok(file)
    }

    /// Files of one application, newest first.
    pub fn list_files(
        &self,
        actor: &Actor,
        application_id: ApplicationId,
    ) -> Result<Vec<StoredFile>, WorkflowError> {
        let application = self.load_application(application_id)?;
        self.ensure_can_view(actor, &application)?;
        Ok(self.store.files_for_application(application.id)?)
    }

    pub fn file(&self, actor: &Actor, id: FileId) -> Result<StoredFile, WorkflowError> {
        let file = self
            .store
            .file(id)?
            .ok_or(WorkflowError::not_found("file"))?;
        self.ensure_can_view_file(actor, &file)?;
        Ok(file)
    }

    /// File metadata together with its bytes.
    pub fn download_file(
        &self,
        actor: &Actor,
        id: FileId,
    ) -> Result<(StoredFile, Vec<u8>), WorkflowError> {
        let file = self.file(actor, id)?;
        let bytes = self.blobs.get(&file.storage_path)?;
        Ok((file, bytes))
    }

    /// Remove a file. Only its uploader or an admin may do this.
    pub fn delete_file(&self, actor: &Actor, id: FileId) -> Result<(), WorkflowError> {
        let file = self
            .store
            .file(id)?
            .ok_or(WorkflowError::not_found("file"))?;
        let permitted = matches!(actor, Actor::Admin { .. }) || file.uploaded_by == actor.user_id();
        if !permitted {
            return Err(WorkflowError::forbidden(
                "only the uploader or an administrator may delete this file",
            ));
        }
        self.commit_and_dispatch(ChangeSet::new().with(Change::RemoveFile(file.id)), &[])?;
        if let Err(error) = self.blobs.remove(&file.storage_path) {
            warn!(file_id = %file.id, %error, "file row removed but blob remained");
        }
        info!(file_id = %file.id, actor = %actor.user_id(), "file deleted");
        Ok(())
    }

    fn ensure_can_view_file(&self, actor: &Actor, file: &StoredFile) -> Result<(), WorkflowError> {
        match file.application_id {
            Some(application_id) => {
                let application = self.load_application(application_id)?;
                self.ensure_can_view(actor, &application)
            }
            None if matches!(actor, Actor::Admin { .. }) || file.uploaded_by == actor.user_id() => {
                Ok(())
            }
            None => Err(WorkflowError::forbidden("you do not have access to this file")),
        }
    }

    /// Checks the upload against policy and writes the bytes. The returned
    /// row is not yet committed.
    pub(super) fn stage_upload(
        &self,
        actor: &Actor,
        context: UploadContext,
        upload: Upload,
        application_id: Option<ApplicationId>,
        description: Option<String>,
    ) -> Result<StoredFile, WorkflowError> {
        let id = FileId::new();
        let accepted = self.settings.uploads.check(context, &upload, id)?;
        let storage_path = self.blobs.put(&accepted.storage_key, &upload.bytes)?;
        Ok(StoredFile {
            id,
            filename: accepted.stored_filename,
            original_filename: accepted.original_filename,
            storage_path,
            content_type: accepted.content_type,
            size_bytes: upload.bytes.len() as u64,
            application_id,
            uploaded_by: actor.user_id(),
            description,
            created_at: Utc::now(),
        })
    }

    /// Commits changes that reference a staged file, removing the blob
    /// again if the commit fails.
    pub(super) fn commit_upload(
        &self,
        file: &StoredFile,
        changes: ChangeSet,
        events: &[WorkflowEvent<'_>],
    ) -> Result<(), WorkflowError> {
        match self.commit_and_dispatch(changes, events) {
            Ok(()) => Ok(()),
            Err(error) => {
                if let Err(cleanup) = self.blobs.remove(&file.storage_path) {
                    warn!(file_id = %file.id, error = %cleanup, "staged blob not removed");
                }
                Err(error)
            }
        }
    }
}
