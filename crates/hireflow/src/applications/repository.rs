use std::fmt;

use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, NewApplication, ReferenceId,
};

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Every call acquires whatever backing connection it needs and releases it
/// before returning; implementations hold no state between calls.
pub trait ApplicationRepository: Send + Sync {
    /// Insert a new row with status `Pending` and version 1.
    fn insert(&self, application: NewApplication) -> Result<ApplicationRecord, RepositoryError>;

    /// Persist `status` and `offer_letter_path` of `record`, provided the
    /// stored version still equals `record.version`. Returns the row as
    /// stored, with the bumped version and refreshed `updated_at`.
    fn update(&self, record: &ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;

    fn find_by_reference(
        &self,
        reference_id: &ReferenceId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;

    /// Newest first, optionally restricted to one status.
    fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Column guarded by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    ReferenceId,
    Email,
    MobileNumber,
}

impl UniqueField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::ReferenceId => "reference_id",
            Self::Email => "email",
            Self::MobileNumber => "mobile_number",
        }
    }

    pub fn from_column(column: &str) -> Option<Self> {
        match column {
            "reference_id" => Some(Self::ReferenceId),
            "email" => Some(Self::Email),
            "mobile_number" => Some(Self::MobileNumber),
            _ => None,
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("duplicate value for {0}")]
    Conflict(UniqueField),
    #[error("record was modified concurrently")]
    StaleVersion,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
