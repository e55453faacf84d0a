//! Export of session records.

pub mod export;
