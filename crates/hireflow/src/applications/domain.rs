use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Database-assigned identifier of an application row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub i64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Applicant-facing identifier, distinct from the row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceId(pub String);

impl ReferenceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReferenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }

    /// Parse the exact status vocabulary; anything else is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.label() == trimmed)
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields every deployment requires at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub full_name: String,
    pub email: String,
    pub mobile_number: String,
    pub department: String,
    pub job_role: String,
}

/// Optional profile data captured on the application form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub date_of_birth: Option<NaiveDate>,
    pub father_name: Option<String>,
    pub address: Option<String>,
    pub expected_salary: Option<f64>,
    pub interview_date: Option<NaiveDate>,
    pub joining_date: Option<NaiveDate>,
    pub employment_type: Option<String>,
    pub branch: Option<String>,
    pub ssc_year: Option<u16>,
    pub ssc_percentage: Option<f32>,
    pub intermediate_year: Option<u16>,
    pub intermediate_percentage: Option<f32>,
    pub graduation_year: Option<u16>,
    pub graduation_percentage: Option<f32>,
    pub college_name: Option<String>,
    pub register_number: Option<String>,
    pub certifications: Option<String>,
    pub experience_status: Option<String>,
    pub experience_years: Option<f32>,
    pub previous_employer: Option<String>,
}

/// Named upload slots on the application and offer-letter forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentField {
    Ssc,
    Intermediate,
    Graduation,
    Additional,
    OfferLetter,
}

impl DocumentField {
    pub const REQUIRED_FOR_INTAKE: [DocumentField; 3] =
        [Self::Ssc, Self::Intermediate, Self::Graduation];

    /// Multipart field name, also used as the stored filename prefix.
    pub fn form_name(&self) -> &'static str {
        match self {
            Self::Ssc => "ssc_document",
            Self::Intermediate => "intermediate_document",
            Self::Graduation => "graduation_document",
            Self::Additional => "additional_files",
            Self::OfferLetter => "offer_letter",
        }
    }

    pub fn from_form_name(name: &str) -> Option<Self> {
        [
            Self::Ssc,
            Self::Intermediate,
            Self::Graduation,
            Self::Additional,
            Self::OfferLetter,
        ]
        .into_iter()
        .find(|field| field.form_name() == name)
    }
}

/// Filenames of the intake documents held in the document store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPointers {
    pub ssc_document: Option<String>,
    pub intermediate_document: Option<String>,
    pub graduation_document: Option<String>,
    #[serde(default)]
    pub additional_documents: Vec<String>,
}

impl DocumentPointers {
    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.ssc_document
            .iter()
            .chain(self.intermediate_document.iter())
            .chain(self.graduation_document.iter())
            .chain(self.additional_documents.iter())
            .map(String::as_str)
    }

    pub(crate) fn assign(&mut self, field: DocumentField, filename: String) {
        match field {
            DocumentField::Ssc => self.ssc_document = Some(filename),
            DocumentField::Intermediate => self.intermediate_document = Some(filename),
            DocumentField::Graduation => self.graduation_document = Some(filename),
            DocumentField::Additional => self.additional_documents.push(filename),
            DocumentField::OfferLetter => {}
        }
    }
}

/// A file received from the client, not yet persisted anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Raw multipart submission: text fields by name plus every uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationForm {
    pub fields: BTreeMap<String, String>,
    pub documents: Vec<UploadedDocument>,
}

impl ApplicationForm {
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_document(mut self, document: UploadedDocument) -> Self {
        self.documents.push(document);
        self
    }
}

/// Values handed to the repository for a new row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewApplication {
    pub reference_id: ReferenceId,
    pub contact: ContactDetails,
    pub profile: ProfileDetails,
    pub documents: DocumentPointers,
}

/// Persisted application row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub reference_id: ReferenceId,
    #[serde(flatten)]
    pub contact: ContactDetails,
    #[serde(flatten)]
    pub profile: ProfileDetails,
    #[serde(flatten)]
    pub documents: DocumentPointers,
    pub offer_letter_path: Option<String>,
    pub status: ApplicationStatus,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned to the applicant after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub id: ApplicationId,
    pub reference_id: ReferenceId,
}
