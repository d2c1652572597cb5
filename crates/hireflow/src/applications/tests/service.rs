use super::common::*;
use crate::applications::domain::{ApplicationId, ApplicationStatus};
use crate::applications::intake::ValidationError;
use crate::applications::repository::ApplicationRepository;
use crate::applications::status::StateViolation;
use crate::applications::{
    ApplicationServiceError, ConflictCause, DocumentStore, IntakePolicy, IntakeProfile, Missing,
    MAX_REFERENCE_ATTEMPTS,
};

#[test]
fn submit_stores_documents_and_creates_pending_record() {
    let harness = Harness::new();

    let receipt = harness
        .service
        .submit(application_form("asha@example.com", "9000000001"))
        .expect("submission accepted");

    assert!(receipt.reference_id.is_well_formed());
    let record = harness.service.get(receipt.id).expect("record stored");
    assert_eq!(record.status, ApplicationStatus::Pending);
    assert_eq!(record.reference_id, receipt.reference_id);
    assert_eq!(record.profile.ssc_year, Some(2014));
    assert_eq!(record.offer_letter_path, None);

    let stored: Vec<String> = record.documents.filenames().map(str::to_string).collect();
    assert_eq!(stored.len(), 3);
    assert_eq!(harness.files(), {
        let mut sorted = stored.clone();
        sorted.sort();
        sorted
    });
    assert!(record
        .documents
        .ssc_document
        .as_deref()
        .is_some_and(|name| name.starts_with("ssc_document-") && name.ends_with(".pdf")));
}

#[test]
fn additional_files_are_all_kept() {
    let harness = Harness::new();
    let form = application_form("asha@example.com", "9000000001")
        .with_document(pdf("additional_files", "cert-1.pdf"))
        .with_document(pdf("additional_files", "cert-2.pdf"));

    let receipt = harness.service.submit(form).expect("submission accepted");
    let record = harness.service.get(receipt.id).expect("record stored");

    assert_eq!(record.documents.additional_documents.len(), 2);
    assert_eq!(harness.files().len(), 5);
}

#[test]
fn invalid_form_writes_nothing() {
    let harness = Harness::new();
    let mut form = application_form("asha@example.com", "9000000001");
    form.fields.remove("job_role");

    match harness.service.submit(form) {
        Err(ApplicationServiceError::Validation(ValidationError::MissingFields(fields))) => {
            assert_eq!(fields, vec!["job_role".to_string()]);
        }
        other => panic!("expected missing fields, got {other:?}"),
    }
    assert!(harness.files().is_empty());
    assert_eq!(harness.repository.len(), 0);
}

#[test]
fn extended_profile_requires_personal_details() {
    let harness = Harness::with_policy(IntakePolicy::new(IntakeProfile::Extended, false));

    match harness
        .service
        .submit(application_form("asha@example.com", "9000000001"))
    {
        Err(ApplicationServiceError::Validation(ValidationError::MissingFields(fields))) => {
            assert!(fields.contains(&"date_of_birth".to_string()));
            assert!(fields.contains(&"expected_salary".to_string()));
        }
        other => panic!("expected missing fields, got {other:?}"),
    }
}

#[test]
fn duplicate_email_leaves_no_new_files() {
    let harness = Harness::new();
    harness.submitted("asha@example.com", "9000000001");
    let before = harness.files();

    match harness
        .service
        .submit(application_form("asha@example.com", "9000000002"))
    {
        Err(ApplicationServiceError::Conflict(ConflictCause::Email)) => {}
        other => panic!("expected email conflict, got {other:?}"),
    }
    assert_eq!(harness.files(), before);
    assert_eq!(harness.repository.len(), 1);
}

#[test]
fn email_case_variant_is_a_duplicate() {
    let harness = Harness::new();
    harness.submitted("asha@example.com", "9000000001");
    let before = harness.files();

    match harness
        .service
        .submit(application_form("Asha@Example.COM", "9000000002"))
    {
        Err(ApplicationServiceError::Conflict(ConflictCause::Email)) => {}
        other => panic!("expected email conflict, got {other:?}"),
    }
    assert_eq!(harness.files(), before);
    assert_eq!(harness.repository.len(), 1);
}

#[test]
fn concurrent_submissions_with_one_email_keep_one_record() {
    let harness = Harness::new();

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|n| {
                let service = harness.service.clone();
                let mobile = format!("900000000{n}");
                scope.spawn(move || service.submit(application_form("asha@example.com", &mobile)))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finished"))
            .collect()
    });

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|result| result.is_err())
        .all(|result| matches!(
            result,
            Err(ApplicationServiceError::Conflict(ConflictCause::Email))
        )));
    assert_eq!(harness.repository.len(), 1);
    assert_eq!(harness.files().len(), 3);
}

#[test]
fn duplicate_mobile_is_a_conflict() {
    let harness = Harness::new();
    harness.submitted("asha@example.com", "9000000001");

    match harness
        .service
        .submit(application_form("ravi@example.com", "9000000001"))
    {
        Err(ApplicationServiceError::Conflict(ConflictCause::MobileNumber)) => {}
        other => panic!("expected mobile conflict, got {other:?}"),
    }
    assert_eq!(harness.files().len(), 3);
}

#[test]
fn reference_collision_is_retried_with_fresh_id() {
    let taken = "APP1700000000000TAKN";
    let fresh = "APP1700000000001FRSH";
    let harness = Harness::with_references(ScriptedReferences::new(&[taken, fresh]));
    harness
        .repository
        .insert(new_application(taken, "seed@example.com", "9000000009"))
        .expect("seeded");

    let receipt = harness
        .service
        .submit(application_form("asha@example.com", "9000000001"))
        .expect("retry succeeds");

    assert_eq!(receipt.reference_id.as_str(), fresh);
}

#[test]
fn exhausted_reference_generation_discards_staged_documents() {
    let taken = "APP1700000000000TAKN";
    let harness = Harness::with_references(ScriptedReferences::new(&[taken]));
    harness
        .repository
        .insert(new_application(taken, "seed@example.com", "9000000009"))
        .expect("seeded");

    match harness
        .service
        .submit(application_form("asha@example.com", "9000000001"))
    {
        Err(ApplicationServiceError::GenerationExhausted { attempts }) => {
            assert_eq!(attempts, MAX_REFERENCE_ATTEMPTS);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert!(harness.files().is_empty());
}

#[test]
fn approve_and_reject_from_pending() {
    let harness = Harness::new();
    let first = harness.submitted("asha@example.com", "9000000001");
    let second = harness.submitted("ravi@example.com", "9000000002");

    let approved = harness.service.set_status(first, "Approved").expect("approve");
    assert_eq!(approved.status, ApplicationStatus::Approved);
    let rejected = harness.service.set_status(second, "Rejected").expect("reject");
    assert_eq!(rejected.status, ApplicationStatus::Rejected);

    let pending = harness
        .service
        .list(Some(ApplicationStatus::Pending))
        .expect("list");
    assert!(pending.is_empty());
    let all = harness.service.list(None).expect("list");
    assert_eq!(
        all.iter().map(|record| record.id).collect::<Vec<_>>(),
        vec![second, first]
    );
}

#[test]
fn unknown_status_leaves_record_unchanged() {
    let harness = Harness::new();
    let id = harness.submitted("asha@example.com", "9000000001");

    match harness.service.set_status(id, "Cancelled") {
        Err(ApplicationServiceError::Validation(ValidationError::InvalidStatus(raw))) => {
            assert_eq!(raw, "Cancelled");
        }
        other => panic!("expected invalid status, got {other:?}"),
    }
    assert_eq!(
        harness.service.get(id).expect("record").status,
        ApplicationStatus::Pending
    );
}

#[test]
fn terminal_states_never_move() {
    let harness = Harness::new();
    let record = harness.approved("asha@example.com", "9000000001");

    for target in ["Rejected", "Pending", "Approved"] {
        match harness.service.set_status(record.id, target) {
            Err(ApplicationServiceError::InvalidState(StateViolation::IllegalTransition {
                from: ApplicationStatus::Approved,
                ..
            })) => {}
            other => panic!("expected illegal transition to {target}, got {other:?}"),
        }
    }
}

#[test]
fn status_change_on_missing_application_is_not_found() {
    let harness = Harness::new();
    match harness.service.set_status(ApplicationId(404), "Approved") {
        Err(ApplicationServiceError::NotFound(Missing::Application)) => {}
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn offer_letter_requires_approval_and_creates_no_file_otherwise() {
    let harness = Harness::new();
    let id = harness.submitted("asha@example.com", "9000000001");

    match harness.service.issue_offer_letter(id, offer_letter_upload()) {
        Err(ApplicationServiceError::InvalidState(StateViolation::NotApproved(
            ApplicationStatus::Pending,
        ))) => {}
        other => panic!("expected not approved, got {other:?}"),
    }
    assert!(harness.files_with_prefix("offer_letter-").is_empty());

    harness.service.set_status(id, "Rejected").expect("reject");
    assert!(harness
        .service
        .issue_offer_letter(id, offer_letter_upload())
        .is_err());
    assert!(harness.files_with_prefix("offer_letter-").is_empty());
}

#[test]
fn offer_letter_without_file_is_rejected() {
    let harness = Harness::new();
    let record = harness.approved("asha@example.com", "9000000001");

    match harness.service.issue_offer_letter(record.id, Vec::new()) {
        Err(ApplicationServiceError::Validation(ValidationError::MissingUpload)) => {}
        other => panic!("expected missing upload, got {other:?}"),
    }
}

#[test]
fn reissuing_offer_letter_replaces_previous_file() {
    let harness = Harness::new();
    let record = harness.approved("asha@example.com", "9000000001");

    let first = harness
        .service
        .issue_offer_letter(record.id, offer_letter_upload())
        .expect("first letter");
    let second = harness
        .service
        .issue_offer_letter(record.id, offer_letter_upload())
        .expect("second letter");

    assert_ne!(first, second);
    assert_eq!(harness.files_with_prefix("offer_letter-"), vec![second.clone()]);
    assert_eq!(
        harness.service.get(record.id).expect("record").offer_letter_path,
        Some(second)
    );
}

#[test]
fn failed_pointer_update_discards_new_offer_letter() {
    let harness = Harness::new();
    let record = harness.approved("asha@example.com", "9000000001");
    harness.repository.fail_updates();

    match harness
        .service
        .issue_offer_letter(record.id, offer_letter_upload())
    {
        Err(ApplicationServiceError::Repository(_)) => {}
        other => panic!("expected repository failure, got {other:?}"),
    }
    assert!(harness.files_with_prefix("offer_letter-").is_empty());
}

#[test]
fn concurrent_offer_letters_leave_exactly_one_file() {
    let harness = Harness::new();
    let record = harness.approved("asha@example.com", "9000000001");

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = harness.service.clone();
                scope.spawn(move || service.issue_offer_letter(record.id, offer_letter_upload()))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker finished"))
            .collect()
    });

    assert!(results.iter().all(Result::is_ok));
    let letters = harness.files_with_prefix("offer_letter-");
    assert_eq!(letters.len(), 1);
    assert_eq!(
        harness.service.get(record.id).expect("record").offer_letter_path,
        letters.into_iter().next()
    );
}

#[test]
fn locate_offer_letter_requires_both_parameters() {
    let harness = Harness::new();

    match harness.service.locate_offer_letter("  ", "") {
        Err(ApplicationServiceError::Validation(ValidationError::MissingParameters(names))) => {
            assert_eq!(names, vec!["reference_id".to_string(), "email".to_string()]);
        }
        other => panic!("expected missing parameters, got {other:?}"),
    }
}

#[test]
fn locate_offer_letter_ignores_email_case() {
    let harness = Harness::new();
    let record = harness.approved("asha@example.com", "9000000001");
    let path = harness
        .service
        .issue_offer_letter(record.id, offer_letter_upload())
        .expect("offer letter issued");

    let located = harness
        .service
        .locate_offer_letter(record.reference_id.as_str(), " ASHA@Example.com ")
        .expect("offer letter located");
    assert_eq!(located, path);
}

#[test]
fn locate_offer_letter_distinguishes_missing_states() {
    let harness = Harness::new();
    let pending_id = harness.submitted("ravi@example.com", "9000000002");
    let pending = harness.service.get(pending_id).expect("pending record");
    let approved = harness.approved("asha@example.com", "9000000001");
    let reference = approved.reference_id.as_str();

    let expect_missing = |reference: &str, email: &str, expected: Missing| {
        match harness.service.locate_offer_letter(reference, email) {
            Err(ApplicationServiceError::NotFound(missing)) => assert_eq!(missing, expected),
            other => panic!("expected {expected:?}, got {other:?}"),
        }
    };

    expect_missing(reference, "someone@example.com", Missing::ApprovedApplication);
    expect_missing(
        pending.reference_id.as_str(),
        "ravi@example.com",
        Missing::ApprovedApplication,
    );
    expect_missing("APP0000000000000NONE", "asha@example.com", Missing::ApprovedApplication);
    expect_missing(reference, "asha@example.com", Missing::OfferLetter);

    let letter = harness
        .service
        .issue_offer_letter(approved.id, offer_letter_upload())
        .expect("letter issued");
    assert_eq!(
        harness
            .service
            .locate_offer_letter(reference, " asha@example.com ")
            .expect("located"),
        letter
    );

    harness.documents.delete(&letter).expect("remove file");
    expect_missing(reference, "asha@example.com", Missing::OfferLetterFile);
}

#[test]
fn open_document_serves_stored_bytes_with_guessed_type() {
    let harness = Harness::new();
    let id = harness.submitted("asha@example.com", "9000000001");
    let record = harness.service.get(id).expect("record");
    let name = record.documents.ssc_document.expect("ssc stored");

    let document = harness.service.open_document(&name).expect("document");
    assert_eq!(document.content_type, "application/pdf");
    assert_eq!(document.bytes, b"%PDF-1.4 test document".to_vec());
}

#[test]
fn open_document_serves_declared_type_whatever_the_client_filename() {
    let harness = Harness::new();
    let mut form = application_form("asha@example.com", "9000000001");
    form.documents[2] = pdf("graduation_document", "payload.html");
    let receipt = harness.service.submit(form).expect("submission accepted");
    let name = harness
        .service
        .get(receipt.id)
        .expect("record")
        .documents
        .graduation_document
        .expect("graduation stored");

    let document = harness.service.open_document(&name).expect("document");
    assert!(document.name.ends_with(".pdf"), "{}", document.name);
    assert_eq!(document.content_type, "application/pdf");
}

#[test]
fn open_document_refuses_unsafe_or_unknown_names() {
    let harness = Harness::new();
    for name in ["../secrets.pdf", "nested/file.pdf", "missing.pdf"] {
        match harness.service.open_document(name) {
            Err(ApplicationServiceError::NotFound(Missing::Document)) => {}
            other => panic!("expected not found for {name}, got {other:?}"),
        }
    }
}
