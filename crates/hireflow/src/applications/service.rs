use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::documents::{is_safe_name, store_new_document, DocumentStore, DocumentStoreError};
use super::domain::{
    ApplicationForm, ApplicationId, ApplicationRecord, ApplicationStatus, ContactDetails,
    DocumentField, DocumentPointers, NewApplication, ProfileDetails, ReferenceId,
    SubmissionReceipt, UploadedDocument,
};
use super::intake::{IntakePolicy, IntakeRejection, ValidatedSubmission, ValidationError};
use super::locks::ApplicationLocks;
use super::reference::{ReferenceGenerator, TimestampReferenceGenerator};
use super::repository::{ApplicationRepository, RepositoryError, UniqueField};
use super::status::{check_transition, StateViolation};

/// Upper bound on reference id regeneration after uniqueness conflicts.
pub const MAX_REFERENCE_ATTEMPTS: usize = 5;

/// Service composing intake validation, the document store, and the repository.
pub struct HiringService<R, D> {
    repository: Arc<R>,
    documents: Arc<D>,
    policy: IntakePolicy,
    references: Arc<dyn ReferenceGenerator>,
    locks: ApplicationLocks,
}

/// Bytes of a stored document ready to stream back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl<R, D> HiringService<R, D>
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    pub fn new(repository: Arc<R>, documents: Arc<D>, policy: IntakePolicy) -> Self {
        Self {
            repository,
            documents,
            policy,
            references: Arc::new(TimestampReferenceGenerator),
            locks: ApplicationLocks::default(),
        }
    }

    pub fn with_reference_generator(mut self, generator: Arc<dyn ReferenceGenerator>) -> Self {
        self.references = generator;
        self
    }

    /// Validate a form, stage its documents, and insert the record. Staged
    /// documents are removed again whenever no record ends up referencing them.
    pub fn submit(
        &self,
        form: ApplicationForm,
    ) -> Result<SubmissionReceipt, ApplicationServiceError> {
        let ValidatedSubmission {
            contact,
            profile,
            documents,
        } = self.policy.validate(form)?;

        let mut staged = Vec::with_capacity(documents.len());
        let mut pointers = DocumentPointers::default();
        for document in &documents {
            match store_new_document(
                self.documents.as_ref(),
                document.field,
                &document.extension,
                &document.bytes,
            ) {
                Ok(name) => {
                    pointers.assign(document.field, name.clone());
                    staged.push(name);
                }
                Err(err) => {
                    self.discard(&staged);
                    return Err(err.into());
                }
            }
        }

        match self.insert_with_fresh_reference(contact, profile, pointers) {
            Ok(record) => {
                info!(
                    application_id = %record.id,
                    reference_id = %record.reference_id,
                    documents = staged.len(),
                    "application submitted"
                );
                Ok(SubmissionReceipt {
                    id: record.id,
                    reference_id: record.reference_id,
                })
            }
            Err(err) => {
                self.discard(&staged);
                Err(err)
            }
        }
    }

    fn insert_with_fresh_reference(
        &self,
        contact: ContactDetails,
        profile: ProfileDetails,
        documents: DocumentPointers,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let application = NewApplication {
                reference_id: self.references.generate(),
                contact: contact.clone(),
                profile: profile.clone(),
                documents: documents.clone(),
            };

            match self.repository.insert(application) {
                Ok(record) => return Ok(record),
                Err(RepositoryError::Conflict(UniqueField::ReferenceId)) => {
                    debug!(attempt, "reference id already taken, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ApplicationServiceError::GenerationExhausted {
            attempts: MAX_REFERENCE_ATTEMPTS,
        })
    }

    fn discard(&self, names: &[String]) {
        for name in names {
            if let Err(err) = self.documents.delete(name) {
                warn!(document = %name, error = %err, "failed to remove staged document");
            }
        }
    }

    /// Newest first, optionally filtered by status.
    pub fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, ApplicationServiceError> {
        Ok(self.repository.list(status)?)
    }

    pub fn get(&self, id: ApplicationId) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.repository
            .fetch(id)?
            .ok_or(ApplicationServiceError::NotFound(Missing::Application))
    }

    /// Move a `Pending` application to `Approved` or `Rejected`.
    pub fn set_status(
        &self,
        id: ApplicationId,
        requested: &str,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let target = parse_status(requested)?;

        self.locks.with_lock(id, || -> Result<_, ApplicationServiceError> {
            let mut record = self.get(id)?;
            check_transition(record.status, target)?;

            let from = record.status;
            record.status = target;
            let stored = self.repository.update(&record)?;
            info!(application_id = %id, %from, to = %target, "application status changed");
            Ok(stored)
        })
    }

    /// Attach (or replace) the offer letter of an `Approved` application and
    /// return the stored filename.
    pub fn issue_offer_letter(
        &self,
        id: ApplicationId,
        uploads: Vec<UploadedDocument>,
    ) -> Result<String, ApplicationServiceError> {
        let letter = self.policy.validate_offer_letter(uploads)?;

        self.locks.with_lock(id, || -> Result<_, ApplicationServiceError> {
            let mut record = self.get(id)?;
            if record.status != ApplicationStatus::Approved {
                return Err(StateViolation::NotApproved(record.status).into());
            }

            let name = store_new_document(
                self.documents.as_ref(),
                DocumentField::OfferLetter,
                &letter.extension,
                &letter.bytes,
            )?;
            let previous = record.offer_letter_path.replace(name.clone());

            if let Err(err) = self.repository.update(&record) {
                self.discard(std::slice::from_ref(&name));
                return Err(err.into());
            }

            if let Some(previous) = previous.filter(|previous| *previous != name) {
                if let Err(err) = self.documents.delete(&previous) {
                    warn!(
                        application_id = %id,
                        document = %previous,
                        error = %err,
                        "failed to remove superseded offer letter"
                    );
                }
            }

            info!(application_id = %id, document = %name, "offer letter issued");
            Ok(name)
        })
    }

    /// Find the offer letter of an approved application.
    ///
    /// The e-mail acts as a weak shared secret next to the reference id; it is
    /// not an authentication scheme.
    pub fn locate_offer_letter(
        &self,
        reference_id: &str,
        email: &str,
    ) -> Result<String, ApplicationServiceError> {
        let reference_id = reference_id.trim();
        let email = email.trim().to_lowercase();
        let missing: Vec<String> = [("reference_id", reference_id), ("email", email.as_str())]
            .into_iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingParameters(missing).into());
        }

        let record = self
            .repository
            .find_by_reference(&ReferenceId(reference_id.to_string()))?
            .filter(|record| {
                record.contact.email == email && record.status == ApplicationStatus::Approved
            })
            .ok_or(Missing::ApprovedApplication)?;

        let path = record.offer_letter_path.ok_or(Missing::OfferLetter)?;
        if !self.documents.exists(&path)? {
            return Err(Missing::OfferLetterFile.into());
        }
        Ok(path)
    }

    /// Raw download by generated filename.
    pub fn open_document(&self, name: &str) -> Result<StoredDocument, ApplicationServiceError> {
        if !is_safe_name(name) {
            return Err(Missing::Document.into());
        }

        let bytes = self.documents.read(name)?.ok_or(Missing::Document)?;
        let content_type = mime_guess::from_path(name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(StoredDocument {
            name: name.to_string(),
            content_type,
            bytes,
        })
    }
}

/// Parse a client-supplied status value.
pub fn parse_status(raw: &str) -> Result<ApplicationStatus, ApplicationServiceError> {
    ApplicationStatus::parse(raw)
        .ok_or_else(|| ValidationError::InvalidStatus(raw.to_string()).into())
}

/// Which uniqueness rule or concurrency check a write ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCause {
    Email,
    MobileNumber,
    ReferenceId,
    ConcurrentModification,
}

impl fmt::Display for ConflictCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::Email => "an application with this email already exists",
            Self::MobileNumber => "an application with this mobile number already exists",
            Self::ReferenceId => "reference id already in use",
            Self::ConcurrentModification => "application was modified concurrently, retry",
        };
        f.write_str(message)
    }
}

/// What a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Application,
    ApprovedApplication,
    OfferLetter,
    OfferLetterFile,
    Document,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Self::Application => "application not found",
            Self::ApprovedApplication => {
                "no approved application matches this reference id and email"
            }
            Self::OfferLetter => "offer letter has not been issued yet",
            Self::OfferLetterFile => "offer letter file is no longer available",
            Self::Document => "document not found",
        };
        f.write_str(message)
    }
}

/// Error raised by the hiring service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("document '{field}' has unsupported media type '{content_type}'")]
    UnsupportedMedia { field: String, content_type: String },
    #[error("document '{field}' is {size} bytes, above the {limit} byte limit")]
    PayloadTooLarge {
        field: String,
        size: usize,
        limit: usize,
    },
    #[error("{0}")]
    Conflict(ConflictCause),
    #[error("{0}")]
    NotFound(Missing),
    #[error(transparent)]
    InvalidState(#[from] StateViolation),
    #[error("could not generate a unique reference id after {attempts} attempts")]
    GenerationExhausted { attempts: usize },
    #[error("document storage failure: {0}")]
    Storage(#[from] DocumentStoreError),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error("request task did not complete: {0}")]
    Interrupted(#[from] tokio::task::JoinError),
}

impl From<IntakeRejection> for ApplicationServiceError {
    fn from(value: IntakeRejection) -> Self {
        match value {
            IntakeRejection::Validation(err) => Self::Validation(err),
            IntakeRejection::UnsupportedMedia {
                field,
                content_type,
            } => Self::UnsupportedMedia {
                field,
                content_type,
            },
            IntakeRejection::PayloadTooLarge { field, size, limit } => {
                Self::PayloadTooLarge { field, size, limit }
            }
        }
    }
}

impl From<RepositoryError> for ApplicationServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict(UniqueField::Email) => Self::Conflict(ConflictCause::Email),
            RepositoryError::Conflict(UniqueField::MobileNumber) => {
                Self::Conflict(ConflictCause::MobileNumber)
            }
            RepositoryError::Conflict(UniqueField::ReferenceId) => {
                Self::Conflict(ConflictCause::ReferenceId)
            }
            RepositoryError::StaleVersion => Self::Conflict(ConflictCause::ConcurrentModification),
            RepositoryError::NotFound => Self::NotFound(Missing::Application),
            other @ RepositoryError::Unavailable(_) => Self::Repository(other),
        }
    }
}

impl From<Missing> for ApplicationServiceError {
    fn from(value: Missing) -> Self {
        Self::NotFound(value)
    }
}
