//! Application intake, review, and offer-letter exchange.
//!
//! Submissions arrive as multipart forms, their documents are staged in the
//! document store, and the record is inserted through the repository. HR
//! moves records out of `Pending`, and approved applicants collect their
//! offer letter with the reference id plus e-mail they applied with.

pub mod documents;
pub mod domain;
pub mod intake;
pub(crate) mod locks;
pub mod reference;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;

#[cfg(test)]
mod tests;

pub use documents::{DocumentStore, DocumentStoreError, LocalDocumentStore};
pub use domain::{
    ApplicationForm, ApplicationId, ApplicationRecord, ApplicationStatus, ContactDetails,
    DocumentField, DocumentPointers, NewApplication, ProfileDetails, ReferenceId,
    SubmissionReceipt, UploadedDocument,
};
pub use intake::{IntakePolicy, IntakeProfile, ValidationError, MAX_DOCUMENT_BYTES};
pub use reference::{ReferenceGenerator, TimestampReferenceGenerator};
pub use repository::{ApplicationRepository, RepositoryError, UniqueField};
pub use router::application_router;
pub use service::{
    ApplicationServiceError, ConflictCause, HiringService, Missing, StoredDocument,
    MAX_REFERENCE_ATTEMPTS,
};
pub use status::StateViolation;
