pub mod error;

pub use error::{AdvisorError, AdvisorResult};
