pub mod config;
pub mod globals;
pub mod query;
pub mod template;

pub mod error;

pub use error::DosmatError;
