use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::domain::ReferenceId;

pub const REFERENCE_PREFIX: &str = "APP";
const TIMESTAMP_DIGITS: usize = 13;
const RANDOM_SUFFIX_LEN: usize = 4;
pub const MIN_REFERENCE_LEN: usize = 15;

/// Source of applicant-facing reference ids.
///
/// Implementations make no uniqueness promise; callers retry on a repository
/// conflict.
pub trait ReferenceGenerator: Send + Sync {
    fn generate(&self) -> ReferenceId;
}

/// `APP` + zero-padded millisecond timestamp + uppercase random suffix.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampReferenceGenerator;

impl ReferenceGenerator for TimestampReferenceGenerator {
    fn generate(&self) -> ReferenceId {
        let millis = Utc::now().timestamp_millis().max(0);
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RANDOM_SUFFIX_LEN)
            .map(|byte| char::from(byte).to_ascii_uppercase())
            .collect();

        ReferenceId(format!(
            "{REFERENCE_PREFIX}{millis:0width$}{suffix}",
            width = TIMESTAMP_DIGITS
        ))
    }
}

impl ReferenceId {
    pub fn is_well_formed(&self) -> bool {
        let value = self.as_str();
        value.len() >= MIN_REFERENCE_LEN
            && value.starts_with(REFERENCE_PREFIX)
            && value
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    }
}
