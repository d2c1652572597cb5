use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::documents::DocumentStore;
use super::domain::{ApplicationForm, ApplicationId, UploadedDocument};
use super::intake::ValidationError;
use super::repository::ApplicationRepository;
use super::service::{parse_status, ApplicationServiceError, HiringService, Missing};

/// Router builder exposing the application, offer-letter, and document endpoints.
pub fn application_router<R, D>(service: Arc<HiringService<R, D>>) -> Router
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    Router::new()
        .route(
            "/api/applications",
            post(submit_handler::<R, D>).get(list_handler::<R, D>),
        )
        .route(
            "/api/applications/:id",
            get(fetch_handler::<R, D>).put(status_handler::<R, D>),
        )
        .route(
            "/api/applications/:id/offer-letter",
            post(offer_letter_handler::<R, D>),
        )
        .route("/api/offer-letter", get(locate_offer_letter_handler::<R, D>))
        .route("/api/documents/:filename", get(document_handler::<R, D>))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusUpdateRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OfferLetterQuery {
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

pub(crate) async fn submit_handler<R, D>(
    State(service): State<Arc<HiringService<R, D>>>,
    multipart: Multipart,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };

    match run_blocking(move || service.submit(form)).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn list_handler<R, D>(
    State(service): State<Arc<HiringService<R, D>>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match parse_status(raw) {
            Ok(status) => Some(status),
            Err(err) => return err.into_response(),
        },
    };

    match run_blocking(move || service.list(status)).await {
        Ok(records) => (StatusCode::OK, Json(json!({ "data": records }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn fetch_handler<R, D>(
    State(service): State<Arc<HiringService<R, D>>>,
    Path(raw_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = match parse_id(&raw_id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    match run_blocking(move || service.get(id)).await {
        Ok(record) => (StatusCode::OK, Json(json!({ "data": record }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn status_handler<R, D>(
    State(service): State<Arc<HiringService<R, D>>>,
    Path(raw_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = match parse_id(&raw_id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };

    match run_blocking(move || service.set_status(id, &request.status)).await {
        Ok(record) => (StatusCode::OK, Json(json!({ "data": record }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn offer_letter_handler<R, D>(
    State(service): State<Arc<HiringService<R, D>>>,
    Path(raw_id): Path<String>,
    multipart: Multipart,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let id = match parse_id(&raw_id) {
        Ok(id) => id,
        Err(err) => return err.into_response(),
    };
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };

    match run_blocking(move || service.issue_offer_letter(id, form.documents)).await {
        Ok(path) => (StatusCode::OK, Json(json!({ "offer_letter_path": path }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn locate_offer_letter_handler<R, D>(
    State(service): State<Arc<HiringService<R, D>>>,
    Query(query): Query<OfferLetterQuery>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    let reference_id = query.reference_id.unwrap_or_default();
    let email = query.email.unwrap_or_default();

    match run_blocking(move || service.locate_offer_letter(&reference_id, &email)).await {
        Ok(path) => (StatusCode::OK, Json(json!({ "offer_letter_path": path }))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn document_handler<R, D>(
    State(service): State<Arc<HiringService<R, D>>>,
    Path(filename): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    D: DocumentStore + 'static,
{
    match run_blocking(move || service.open_document(&filename)).await {
        Ok(document) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, document.content_type),
                (
                    header::CONTENT_DISPOSITION,
                    format!("inline; filename=\"{}\"", document.name),
                ),
            ],
            document.bytes,
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// Service calls block on files and SQLite, so they run on the blocking pool.
pub(crate) async fn run_blocking<T, F>(task: F) -> Result<T, ApplicationServiceError>
where
    F: FnOnce() -> Result<T, ApplicationServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await?
}

fn parse_id(raw: &str) -> Result<ApplicationId, ApplicationServiceError> {
    raw.trim()
        .parse::<i64>()
        .map(ApplicationId)
        .map_err(|_| ApplicationServiceError::NotFound(Missing::Application))
}

/// Collect text fields and files from a multipart body. Empty file parts
/// (a form input left blank) are skipped.
async fn read_form(mut multipart: Multipart) -> Result<ApplicationForm, ApplicationServiceError> {
    let mut form = ApplicationForm::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if file_name.is_some() {
            let bytes = field.bytes().await.map_err(malformed)?;
            let blank_name = file_name.as_deref().map_or(true, str::is_empty);
            if bytes.is_empty() && blank_name {
                continue;
            }
            form.documents.push(UploadedDocument {
                field: name,
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else {
            let value = field.text().await.map_err(malformed)?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

fn malformed(err: MultipartError) -> ApplicationServiceError {
    ValidationError::MalformedForm(err.body_text()).into()
}

impl ApplicationServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::UnsupportedMedia { .. }
            | Self::PayloadTooLarge { .. }
            | Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::GenerationExhausted { .. }
            | Self::Storage(_)
            | Self::Repository(_)
            | Self::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApplicationServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
            let body = Json(json!({ "error": "internal server error" }));
            return (status, body).into_response();
        }

        let mut body = json!({ "error": self.to_string() });
        match &self {
            Self::Validation(ValidationError::MissingFields(fields)) => {
                body["missing"] = json!(fields);
            }
            Self::Validation(ValidationError::MissingDocuments(documents)) => {
                body["missing_documents"] = json!(documents);
            }
            Self::Validation(ValidationError::InvalidFields(fields)) => {
                body["invalid"] = fields
                    .iter()
                    .map(|field| json!({ "field": field.field, "reason": field.reason }))
                    .collect();
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
