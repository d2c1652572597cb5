use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;

use crate::applications::domain::{
    ApplicationForm, ApplicationId, ApplicationRecord, ApplicationStatus, ContactDetails,
    DocumentPointers, NewApplication, ProfileDetails, ReferenceId, UploadedDocument,
};
use crate::applications::reference::ReferenceGenerator;
use crate::applications::repository::{ApplicationRepository, RepositoryError, UniqueField};
use crate::applications::{application_router, HiringService, IntakePolicy, LocalDocumentStore};

pub(super) type TestService = HiringService<MemoryRepository, LocalDocumentStore>;

pub(super) fn pdf(field: &str, file_name: &str) -> UploadedDocument {
    UploadedDocument {
        field: field.to_string(),
        file_name: Some(file_name.to_string()),
        content_type: Some("application/pdf".to_string()),
        bytes: b"%PDF-1.4 test document".to_vec(),
    }
}

pub(super) fn application_form(email: &str, mobile: &str) -> ApplicationForm {
    ApplicationForm::default()
        .with_field("full_name", "Asha Rao")
        .with_field("email", email)
        .with_field("mobile_number", mobile)
        .with_field("department", "Engineering")
        .with_field("job_role", "Backend Developer")
        .with_field("ssc_year", "2014")
        .with_document(pdf("ssc_document", "ssc.pdf"))
        .with_document(pdf("intermediate_document", "intermediate.pdf"))
        .with_document(pdf("graduation_document", "graduation.pdf"))
}

pub(super) fn offer_letter_upload() -> Vec<UploadedDocument> {
    vec![pdf("offer_letter", "offer.pdf")]
}

pub(super) fn new_application(reference: &str, email: &str, mobile: &str) -> NewApplication {
    NewApplication {
        reference_id: ReferenceId(reference.to_string()),
        contact: ContactDetails {
            full_name: "Seeded Applicant".to_string(),
            email: email.to_string(),
            mobile_number: mobile.to_string(),
            department: "Finance".to_string(),
            job_role: "Analyst".to_string(),
        },
        profile: ProfileDetails::default(),
        documents: DocumentPointers::default(),
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) documents: Arc<LocalDocumentStore>,
    _dir: TempDir,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with_policy(IntakePolicy::default())
    }

    pub(super) fn with_policy(policy: IntakePolicy) -> Self {
        Self::build(policy, None)
    }

    pub(super) fn with_references(generator: Arc<dyn ReferenceGenerator>) -> Self {
        Self::build(IntakePolicy::default(), Some(generator))
    }

    fn build(policy: IntakePolicy, generator: Option<Arc<dyn ReferenceGenerator>>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let documents =
            Arc::new(LocalDocumentStore::open(dir.path().join("uploads")).expect("open store"));
        let repository = Arc::new(MemoryRepository::default());
        let mut service = HiringService::new(repository.clone(), documents.clone(), policy);
        if let Some(generator) = generator {
            service = service.with_reference_generator(generator);
        }
        Self {
            service: Arc::new(service),
            repository,
            documents,
            _dir: dir,
        }
    }

    pub(super) fn files(&self) -> Vec<String> {
        stored_files(self.documents.root())
    }

    pub(super) fn files_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.files()
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect()
    }

    pub(super) fn router(&self) -> axum::Router {
        application_router(self.service.clone())
    }

    /// Submit a valid form and return the new id.
    pub(super) fn submitted(&self, email: &str, mobile: &str) -> ApplicationId {
        self.service
            .submit(application_form(email, mobile))
            .expect("submission accepted")
            .id
    }

    pub(super) fn approved(&self, email: &str, mobile: &str) -> ApplicationRecord {
        let id = self.submitted(email, mobile);
        self.service
            .set_status(id, "Approved")
            .expect("approval accepted")
    }
}

pub(super) fn stored_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .expect("read upload dir")
        .map(|entry| {
            entry
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    names.sort();
    names
}

/// In-memory repository enforcing the same uniqueness and version rules as
/// the SQLite one.
#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<Vec<ApplicationRecord>>,
    fail_updates: AtomicBool,
}

impl MemoryRepository {
    pub(super) fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("repository mutex poisoned").len()
    }
}

impl ApplicationRepository for MemoryRepository {
    fn insert(&self, application: NewApplication) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        for existing in guard.iter() {
            if existing.reference_id == application.reference_id {
                return Err(RepositoryError::Conflict(UniqueField::ReferenceId));
            }
            if existing.contact.email == application.contact.email {
                return Err(RepositoryError::Conflict(UniqueField::Email));
            }
            if existing.contact.mobile_number == application.contact.mobile_number {
                return Err(RepositoryError::Conflict(UniqueField::MobileNumber));
            }
        }

        let now = Utc::now();
        let record = ApplicationRecord {
            id: ApplicationId(guard.len() as i64 + 1),
            reference_id: application.reference_id,
            contact: application.contact,
            profile: application.profile,
            documents: application.documents,
            offer_letter_path: None,
            status: ApplicationStatus::Pending,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        guard.push(record.clone());
        Ok(record)
    }

    fn update(&self, record: &ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("disk full".to_string()));
        }
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let stored = guard
            .iter_mut()
            .find(|existing| existing.id == record.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != record.version {
            return Err(RepositoryError::StaleVersion);
        }
        stored.status = record.status;
        stored.offer_letter_path = record.offer_letter_path.clone();
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.iter().find(|record| record.id == id).cloned())
    }

    fn find_by_reference(
        &self,
        reference_id: &ReferenceId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .find(|record| &record.reference_id == reference_id)
            .cloned())
    }

    fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .iter()
            .rev()
            .filter(|record| status.map_or(true, |wanted| record.status == wanted))
            .cloned()
            .collect())
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _application: NewApplication) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: &ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_reference(
        &self,
        _reference_id: &ReferenceId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(
        &self,
        _status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Hands out queued ids, then repeats the last one forever.
pub(super) struct ScriptedReferences {
    queue: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl ScriptedReferences {
    pub(super) fn new(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(ids.iter().map(|id| id.to_string()).collect()),
            last: Mutex::new(ids.last().copied().unwrap_or_default().to_string()),
        })
    }
}

impl ReferenceGenerator for ScriptedReferences {
    fn generate(&self) -> ReferenceId {
        let next = self.queue.lock().expect("queue mutex poisoned").pop_front();
        match next {
            Some(id) => ReferenceId(id),
            None => ReferenceId(self.last.lock().expect("last mutex poisoned").clone()),
        }
    }
}

pub(super) const BOUNDARY: &str = "hireflow-test-boundary";

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub(super) struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub(super) fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub(super) fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub(super) fn application(email: &str, mobile: &str) -> Self {
        Self::default()
            .text("full_name", "Asha Rao")
            .text("email", email)
            .text("mobile_number", mobile)
            .text("department", "Engineering")
            .text("job_role", "Backend Developer")
            .file("ssc_document", "ssc.pdf", "application/pdf", b"%PDF-1.4 ssc")
            .file(
                "intermediate_document",
                "intermediate.pdf",
                "application/pdf",
                b"%PDF-1.4 intermediate",
            )
            .file(
                "graduation_document",
                "graduation.pdf",
                "application/pdf",
                b"%PDF-1.4 graduation",
            )
    }

    pub(super) fn request(mut self, uri: &str) -> axum::http::Request<axum::body::Body> {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        axum::http::Request::post(uri)
            .header(
                axum::http::header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(axum::body::Body::from(self.bytes))
            .expect("multipart request")
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
