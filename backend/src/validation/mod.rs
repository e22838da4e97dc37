//! Validation rules for request payloads beyond what `validator` derives.

pub mod rules;

pub use validator::Validate;
