//! Abuse protection for BlueChat: admission control and request validation.
//!
//! Provides:
//! - **Admission**: per-client sliding-window rate limiting (minute + hour)
//! - **Validation**: conversation shape/size limits and a phrase block-list

pub mod admission;
pub mod validator;

pub use admission::{AdmissionController, AdmissionError, AdmissionLimits};
pub use validator::{RequestValidator, ValidationError, ValidationLimits};
