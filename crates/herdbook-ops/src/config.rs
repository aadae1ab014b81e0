//! Manager configuration.

/// Limits applied by the managers before a unit of work is opened.
#[derive(Debug, Clone)]
pub struct OpsConfig {
    /// Maximum number of animals in one assign, release or transfer call
    /// (default: 200).
    pub max_batch_size: usize,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 200,
        }
    }
}
