use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    /// Request did not complete, returned a non-2xx status, or sent a body we could not parse.
    #[error("{call} request failed: {detail}")]
    Network { call: &'static str, detail: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Empty or non-numeric input for a numeric field. Callers drop the field instead of failing.
    #[error("Skipped invalid input for {field}")]
    ValidationSkip { field: &'static str },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Import error: {0}")]
    Import(String),

    #[error("Mask error: {0}")]
    Mask(String),
}

impl DashboardError {
    pub fn network(call: &'static str, detail: impl ToString) -> Self {
        DashboardError::Network {
            call,
            detail: detail.to_string(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, DashboardError::Network { .. })
    }
}

impl From<DashboardError> for String {
    fn from(err: DashboardError) -> Self {
        err.to_string()
    }
}
