//! Configuration module
//!
//! Settings shared by every command.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the controller service
    pub controller_url: String,
    /// Namespace objects are addressed in
    pub namespace: String,
}
