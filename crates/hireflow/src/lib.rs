//! Job application intake and lifecycle engine.
//!
//! Applicants submit a form plus supporting documents, HR moves the record
//! through the `Pending -> {Approved, Rejected}` state machine, and approved
//! applicants collect an offer letter using their reference id and e-mail.

pub mod applications;
pub mod config;
pub mod db;
pub mod error;
pub mod telemetry;
