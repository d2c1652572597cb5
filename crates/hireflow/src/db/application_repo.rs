//! `applications` table access behind the `ApplicationRepository` seam.

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::applications::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, ContactDetails, DocumentPointers,
    NewApplication, ProfileDetails, ReferenceId,
};
use crate::applications::repository::{ApplicationRepository, RepositoryError, UniqueField};

const UNIQUE_PREFIX: &str = "UNIQUE constraint failed: applications.";

const SELECT_COLUMNS: &str = "SELECT id, reference_id, full_name, email, mobile_number,
    department, job_role, date_of_birth, father_name, address, expected_salary,
    interview_date, joining_date, employment_type, branch, ssc_year, ssc_percentage,
    intermediate_year, intermediate_percentage, graduation_year, graduation_percentage,
    college_name, register_number, certifications, experience_status, experience_years,
    previous_employer, ssc_document, intermediate_document, graduation_document,
    additional_documents, offer_letter_path, status, version, created_at, updated_at
    FROM applications";

/// SQLite-backed application repository.
#[derive(Clone)]
pub struct SqliteApplicationRepository {
    db: Database,
}

impl SqliteApplicationRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl ApplicationRepository for SqliteApplicationRepository {
    fn insert(&self, application: NewApplication) -> Result<ApplicationRecord, RepositoryError> {
        let additional = serde_json::to_string(&application.documents.additional_documents)
            .map_err(|err| RepositoryError::Unavailable(err.to_string()))?;
        let now = Utc::now();
        let contact = &application.contact;
        let profile = &application.profile;
        let documents = &application.documents;

        self.db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO applications (reference_id, full_name, email, mobile_number,
                     department, job_role, date_of_birth, father_name, address, expected_salary,
                     interview_date, joining_date, employment_type, branch, ssc_year,
                     ssc_percentage, intermediate_year, intermediate_percentage, graduation_year,
                     graduation_percentage, college_name, register_number, certifications,
                     experience_status, experience_years, previous_employer, ssc_document,
                     intermediate_document, graduation_document, additional_documents,
                     status, version, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                             ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28,
                             ?29, ?30, ?31, 1, ?32, ?32)",
                    params![
                        application.reference_id.as_str(),
                        contact.full_name,
                        contact.email,
                        contact.mobile_number,
                        contact.department,
                        contact.job_role,
                        profile.date_of_birth,
                        profile.father_name,
                        profile.address,
                        profile.expected_salary,
                        profile.interview_date,
                        profile.joining_date,
                        profile.employment_type,
                        profile.branch,
                        profile.ssc_year,
                        profile.ssc_percentage,
                        profile.intermediate_year,
                        profile.intermediate_percentage,
                        profile.graduation_year,
                        profile.graduation_percentage,
                        profile.college_name,
                        profile.register_number,
                        profile.certifications,
                        profile.experience_status,
                        profile.experience_years,
                        profile.previous_employer,
                        documents.ssc_document,
                        documents.intermediate_document,
                        documents.graduation_document,
                        additional,
                        ApplicationStatus::Pending.label(),
                        now,
                    ],
                )?;
                let id = ApplicationId(conn.last_insert_rowid());
                select_one(conn, "WHERE id = ?1", id.0)?
                    .ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
            })
            .map_err(into_repository_error)
    }

    fn update(&self, record: &ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let version = i64::try_from(record.version)
            .map_err(|_| RepositoryError::Unavailable("version out of range".to_string()))?;

        let outcome = self
            .db
            .with_conn(|conn| {
                let changed = conn.execute(
                    "UPDATE applications
                     SET status = ?1, offer_letter_path = ?2, version = version + 1,
                         updated_at = ?3
                     WHERE id = ?4 AND version = ?5",
                    params![
                        record.status.label(),
                        record.offer_letter_path,
                        Utc::now(),
                        record.id.0,
                        version,
                    ],
                )?;
                // Zero rows means either no such id or another writer got there first.
                select_one(conn, "WHERE id = ?1", record.id.0).map(|row| (changed, row))
            })
            .map_err(into_repository_error)?;

        match outcome {
            (1, Some(stored)) => Ok(stored),
            (_, None) => Err(RepositoryError::NotFound),
            (_, Some(_)) => Err(RepositoryError::StaleVersion),
        }
    }

    fn fetch(&self, id: ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.db
            .with_conn(|conn| select_one(conn, "WHERE id = ?1", id.0))
            .map_err(into_repository_error)
    }

    fn find_by_reference(
        &self,
        reference_id: &ReferenceId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        self.db
            .with_conn(|conn| select_one(conn, "WHERE reference_id = ?1", reference_id.as_str()))
            .map_err(into_repository_error)
    }

    fn list(
        &self,
        status: Option<ApplicationStatus>,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        self.db
            .with_conn(|conn| {
                // AUTOINCREMENT ids follow insertion order, so id DESC is newest first.
                let rows = match status {
                    Some(status) => {
                        let sql = format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY id DESC");
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map(params![status.label()], record_from_row)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let sql = format!("{SELECT_COLUMNS} ORDER BY id DESC");
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map([], record_from_row)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(rows)
            })
            .map_err(into_repository_error)
    }
}

fn select_one<P: rusqlite::ToSql>(
    conn: &Connection,
    filter: &str,
    value: P,
) -> Result<Option<ApplicationRecord>, DatabaseError> {
    let sql = format!("{SELECT_COLUMNS} {filter}");
    let record = conn
        .query_row(&sql, params![value], record_from_row)
        .optional()?;
    Ok(record)
}

fn record_from_row(row: &Row<'_>) -> Result<ApplicationRecord, rusqlite::Error> {
    let raw_status: String = row.get("status")?;
    let status = ApplicationStatus::parse(&raw_status).ok_or_else(|| {
        conversion_failure(row, "status", format!("unknown status '{raw_status}'").into())
    })?;

    let raw_additional: String = row.get("additional_documents")?;
    let additional_documents: Vec<String> = serde_json::from_str(&raw_additional)
        .map_err(|err| conversion_failure(row, "additional_documents", Box::new(err)))?;

    let version: i64 = row.get("version")?;

    Ok(ApplicationRecord {
        id: ApplicationId(row.get("id")?),
        reference_id: ReferenceId(row.get("reference_id")?),
        contact: ContactDetails {
            full_name: row.get("full_name")?,
            email: row.get("email")?,
            mobile_number: row.get("mobile_number")?,
            department: row.get("department")?,
            job_role: row.get("job_role")?,
        },
        profile: ProfileDetails {
            date_of_birth: row.get("date_of_birth")?,
            father_name: row.get("father_name")?,
            address: row.get("address")?,
            expected_salary: row.get("expected_salary")?,
            interview_date: row.get("interview_date")?,
            joining_date: row.get("joining_date")?,
            employment_type: row.get("employment_type")?,
            branch: row.get("branch")?,
            ssc_year: row.get("ssc_year")?,
            ssc_percentage: row.get("ssc_percentage")?,
            intermediate_year: row.get("intermediate_year")?,
            intermediate_percentage: row.get("intermediate_percentage")?,
            graduation_year: row.get("graduation_year")?,
            graduation_percentage: row.get("graduation_percentage")?,
            college_name: row.get("college_name")?,
            register_number: row.get("register_number")?,
            certifications: row.get("certifications")?,
            experience_status: row.get("experience_status")?,
            experience_years: row.get("experience_years")?,
            previous_employer: row.get("previous_employer")?,
        },
        documents: DocumentPointers {
            ssc_document: row.get("ssc_document")?,
            intermediate_document: row.get("intermediate_document")?,
            graduation_document: row.get("graduation_document")?,
            additional_documents,
        },
        offer_letter_path: row.get("offer_letter_path")?,
        status,
        version: u64::try_from(version).unwrap_or_default(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn conversion_failure(
    row: &Row<'_>,
    column: &str,
    source: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    let index = row.as_ref().column_index(column).unwrap_or_default();
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, source)
}

/// Unique-constraint failures become typed conflicts; everything else means
/// the store could not serve the request.
fn into_repository_error(err: DatabaseError) -> RepositoryError {
    if let DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(failure, Some(message))) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            if let Some(field) = message
                .strip_prefix(UNIQUE_PREFIX)
                .and_then(UniqueField::from_column)
            {
                return RepositoryError::Conflict(field);
            }
        }
    }
    RepositoryError::Unavailable(err.to_string())
}
