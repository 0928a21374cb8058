//! Service layer module

pub mod extract;

pub use extract::ExtractService;
