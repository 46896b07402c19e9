use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum VizError {
    #[error("failed to load {path}: {reason}")]
    MissingFileOrParse { path: PathBuf, reason: String },

    #[error("CSV must contain {} columns (missing: {})", .required.join(", "), .missing.join(", "))]
    Schema {
        required: Vec<&'static str>,
        missing: Vec<&'static str>,
    },

    #[error("{0}")]
    NoMatchingData(String),

    #[error("Input CSV appears empty or failed to load. Exiting.")]
    EmptyInput,
}

impl VizError {
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        VizError::MissingFileOrParse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
