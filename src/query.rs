//! SQL plumbing shared by the reservation modules: sea-query parameter binding
//! and driver error classification.

pub mod error_handling;
pub mod value_conversion;

pub use error_handling::{classify, ErrorClass};
pub use value_conversion::with_converted_params;
