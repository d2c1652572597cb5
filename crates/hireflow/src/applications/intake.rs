use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use super::domain::{
    ApplicationForm, ContactDetails, DocumentField, ProfileDetails, UploadedDocument,
};

/// Per-file ceiling for every uploaded document.
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

const STANDARD_REQUIRED_FIELDS: &[&str] =
    &["full_name", "email", "mobile_number", "department", "job_role"];

const EXTENDED_REQUIRED_FIELDS: &[&str] = &[
    "full_name",
    "email",
    "mobile_number",
    "department",
    "job_role",
    "date_of_birth",
    "father_name",
    "address",
    "expected_salary",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Which scalar fields a deployment insists on at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntakeProfile {
    #[default]
    Standard,
    Extended,
}

impl IntakeProfile {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "extended" => Some(Self::Extended),
            _ => None,
        }
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Standard => STANDARD_REQUIRED_FIELDS,
            Self::Extended => EXTENDED_REQUIRED_FIELDS,
        }
    }
}

/// A single field that was present but could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    pub field: String,
    pub reason: String,
}

impl fmt::Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.field, self.reason)
    }
}

/// Client input problems detected before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("invalid fields: {}", join_invalid(.0))]
    InvalidFields(Vec<InvalidField>),
    #[error("unexpected document field '{0}'")]
    UnexpectedDocument(String),
    #[error("document field '{0}' accepts a single file")]
    DuplicateDocument(String),
    #[error("missing required documents: {}", .0.join(", "))]
    MissingDocuments(Vec<String>),
    #[error("invalid status '{0}'; expected one of Pending, Approved, Rejected")]
    InvalidStatus(String),
    #[error("no file uploaded")]
    MissingUpload,
    #[error("missing query parameters: {}", .0.join(", "))]
    MissingParameters(Vec<String>),
    #[error("malformed form data: {0}")]
    MalformedForm(String),
}

fn join_invalid(fields: &[InvalidField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reasons a submission or upload is turned away by the policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntakeRejection {
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
}

/// Upload that passed the type and size checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedDocument {
    pub field: DocumentField,
    pub extension: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Submission whose fields and documents are all known good.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSubmission {
    pub contact: ContactDetails,
    pub profile: ProfileDetails,
    pub documents: Vec<AcceptedDocument>,
}

/// Field, document, and media rules applied to inbound forms.
#[derive(Debug, Clone, Default)]
pub struct IntakePolicy {
    profile: IntakeProfile,
    allow_images: bool,
}

impl IntakePolicy {
    pub fn new(profile: IntakeProfile, allow_images: bool) -> Self {
        Self {
            profile,
            allow_images,
        }
    }

    /// Check an application form: required fields, typed fields, documents,
    /// then media type and size of every file.
    pub fn validate(&self, form: ApplicationForm) -> Result<ValidatedSubmission, IntakeRejection> {
        let ApplicationForm { fields, documents } = form;

        let missing: Vec<String> = self
            .profile
            .required_fields()
            .iter()
            .filter(|name| field_value(&fields, name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing).into());
        }

        let mut parser = FieldParser::new(&fields);
        let contact = ContactDetails {
            full_name: parser.required("full_name"),
            email: parser.email("email"),
            mobile_number: parser.mobile("mobile_number"),
            department: parser.required("department"),
            job_role: parser.required("job_role"),
        };
        let profile = ProfileDetails {
            date_of_birth: parser.date("date_of_birth"),
            father_name: parser.text("father_name"),
            address: parser.text("address"),
            expected_salary: parser.non_negative("expected_salary"),
            interview_date: parser.date("interview_date"),
            joining_date: parser.date("joining_date"),
            employment_type: parser.text("employment_type"),
            branch: parser.text("branch"),
            ssc_year: parser.year("ssc_year"),
            ssc_percentage: parser.percentage("ssc_percentage"),
            intermediate_year: parser.year("intermediate_year"),
            intermediate_percentage: parser.percentage("intermediate_percentage"),
            graduation_year: parser.year("graduation_year"),
            graduation_percentage: parser.percentage("graduation_percentage"),
            college_name: parser.text("college_name"),
            register_number: parser.text("register_number"),
            certifications: parser.text("certifications"),
            experience_status: parser.text("experience_status"),
            experience_years: parser.non_negative("experience_years"),
            previous_employer: parser.text("previous_employer"),
        };
        parser.finish()?;

        let mut slotted: BTreeMap<DocumentField, Vec<UploadedDocument>> = BTreeMap::new();
        for upload in documents {
            match DocumentField::from_form_name(&upload.field) {
                Some(field) if field != DocumentField::OfferLetter => {
                    slotted.entry(field).or_default().push(upload);
                }
                _ => return Err(ValidationError::UnexpectedDocument(upload.field).into()),
            }
        }

        let missing_documents: Vec<String> = DocumentField::REQUIRED_FOR_INTAKE
            .iter()
            .filter(|field| !slotted.contains_key(field))
            .map(|field| field.form_name().to_string())
            .collect();
        if !missing_documents.is_empty() {
            return Err(ValidationError::MissingDocuments(missing_documents).into());
        }

        let mut accepted = Vec::new();
        for (field, uploads) in slotted {
            if field != DocumentField::Additional && uploads.len() > 1 {
                return Err(
                    ValidationError::DuplicateDocument(field.form_name().to_string()).into(),
                );
            }
            for upload in uploads {
                accepted.push(self.accept(field, upload)?);
            }
        }

        Ok(ValidatedSubmission {
            contact,
            profile,
            documents: accepted,
        })
    }

    /// Pick the single `offer_letter` file out of an upload form.
    pub fn validate_offer_letter(
        &self,
        uploads: Vec<UploadedDocument>,
    ) -> Result<AcceptedDocument, IntakeRejection> {
        let mut selected = None;
        for upload in uploads {
            if upload.field != DocumentField::OfferLetter.form_name() {
                return Err(ValidationError::UnexpectedDocument(upload.field).into());
            }
            if selected.is_some() {
                return Err(ValidationError::DuplicateDocument(upload.field).into());
            }
            selected = Some(upload);
        }

        let upload = selected.ok_or(ValidationError::MissingUpload)?;
        self.accept(DocumentField::OfferLetter, upload)
    }

    fn accept(
        &self,
        field: DocumentField,
        upload: UploadedDocument,
    ) -> Result<AcceptedDocument, IntakeRejection> {
        let media_type = resolve_media_type(&upload);
        let accepted = media_type
            .as_deref()
            .map(|essence| self.is_accepted_media(essence))
            .unwrap_or(false);
        let media_type = match media_type {
            Some(essence) if accepted => essence,
            other => {
                return Err(IntakeRejection::UnsupportedMedia {
                    field: upload.field,
                    content_type: other.unwrap_or_else(|| "unknown".to_string()),
                })
            }
        };

        if upload.bytes.len() > MAX_DOCUMENT_BYTES {
            return Err(IntakeRejection::PayloadTooLarge {
                field: upload.field,
                size: upload.bytes.len(),
                limit: MAX_DOCUMENT_BYTES,
            });
        }

        let extension = stored_extension(upload.file_name.as_deref(), &media_type);

        Ok(AcceptedDocument {
            field,
            extension,
            media_type,
            bytes: upload.bytes,
        })
    }

    fn is_accepted_media(&self, essence: &str) -> bool {
        if essence == mime::APPLICATION_PDF.essence_str() {
            return true;
        }
        self.allow_images
            && (essence == mime::IMAGE_JPEG.essence_str() || essence == mime::IMAGE_PNG.essence_str())
    }
}

fn resolve_media_type(upload: &UploadedDocument) -> Option<String> {
    let declared = upload
        .content_type
        .as_deref()
        .and_then(|raw| raw.parse::<mime::Mime>().ok())
        .filter(|parsed| *parsed != mime::APPLICATION_OCTET_STREAM);

    declared
        .or_else(|| {
            upload
                .file_name
                .as_deref()
                .and_then(|name| mime_guess::from_path(name).first())
        })
        .map(|parsed| parsed.essence_str().to_ascii_lowercase())
}

fn original_extension(file_name: &str) -> Option<String> {
    let (_, extension) = file_name.rsplit_once('.')?;
    let valid = !extension.is_empty()
        && extension.len() <= 5
        && extension.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| extension.to_ascii_lowercase())
}

/// Keep the client's extension only when it maps back to the accepted media
/// type; downloads pick their Content-Type from the stored name.
fn stored_extension(file_name: Option<&str>, media_type: &str) -> String {
    file_name
        .and_then(original_extension)
        .filter(|extension| {
            mime_guess::from_ext(extension)
                .iter()
                .any(|guess| guess.essence_str() == media_type)
        })
        .unwrap_or_else(|| canonical_extension(media_type).to_string())
}

fn canonical_extension(media_type: &str) -> &'static str {
    match media_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        _ => "pdf",
    }
}

fn field_value<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    fields
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

/// Reads typed values out of the raw form, collecting every failure.
struct FieldParser<'a> {
    fields: &'a BTreeMap<String, String>,
    invalid: Vec<InvalidField>,
}

impl<'a> FieldParser<'a> {
    fn new(fields: &'a BTreeMap<String, String>) -> Self {
        Self {
            fields,
            invalid: Vec::new(),
        }
    }

    fn reject(&mut self, field: &str, reason: &str) {
        self.invalid.push(InvalidField {
            field: field.to_string(),
            reason: reason.to_string(),
        });
    }

    fn text(&mut self, field: &str) -> Option<String> {
        field_value(self.fields, field).map(str::to_string)
    }

    fn required(&mut self, field: &str) -> String {
        self.text(field).unwrap_or_default()
    }

    /// Addresses are stored lowercased so uniqueness ignores case.
    fn email(&mut self, field: &str) -> String {
        let value = self.required(field).to_lowercase();
        let well_formed = value
            .split_once('@')
            .map(|(local, domain)| {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            })
            .unwrap_or(false);
        if !value.is_empty() && !well_formed {
            self.reject(field, "expected an e-mail address");
        }
        value
    }

    fn mobile(&mut self, field: &str) -> String {
        let value = self.required(field);
        let digits = value.chars().filter(char::is_ascii_digit).count();
        let allowed = value
            .chars()
            .enumerate()
            .all(|(idx, c)| c.is_ascii_digit() || c == ' ' || c == '-' || (idx == 0 && c == '+'));
        if !value.is_empty() && (!allowed || digits < 7) {
            self.reject(field, "expected a phone number");
        }
        value
    }

    fn date(&mut self, field: &str) -> Option<NaiveDate> {
        let raw = field_value(self.fields, field)?;
        match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            Ok(date) => Some(date),
            Err(_) => {
                self.reject(field, "expected YYYY-MM-DD");
                None
            }
        }
    }

    fn parsed<T: FromStr>(&mut self, field: &str, reason: &str) -> Option<T> {
        let raw = field_value(self.fields, field)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.reject(field, reason);
                None
            }
        }
    }

    fn year(&mut self, field: &str) -> Option<u16> {
        let year = self.parsed::<u16>(field, "expected a four digit year")?;
        if (1900..=2200).contains(&year) {
            Some(year)
        } else {
            self.reject(field, "expected a four digit year");
            None
        }
    }

    fn percentage(&mut self, field: &str) -> Option<f32> {
        let value = self.parsed::<f32>(field, "expected a percentage")?;
        if value.is_finite() && (0.0..=100.0).contains(&value) {
            Some(value)
        } else {
            self.reject(field, "expected a percentage between 0 and 100");
            None
        }
    }

    fn non_negative<T>(&mut self, field: &str) -> Option<T>
    where
        T: FromStr + PartialOrd + Default,
    {
        let value = self.parsed::<T>(field, "expected a number")?;
        if value >= T::default() {
            Some(value)
        } else {
            self.reject(field, "expected a non-negative number");
            None
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.invalid.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::InvalidFields(self.invalid))
        }
    }
}
