// Core modules
pub mod advisor;
pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use advisor::Advisor;
pub use error::AdvisorError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, AdvisorError>;
