//! Vendor wire formats.

pub mod anthropic;
pub mod openai;
pub mod responses;
mod unknown_fields;

pub use unknown_fields::UnknownFields;
