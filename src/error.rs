use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClassifyError>;

/// Everything that can abort a classification request. None of these leave
/// partial output behind.
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// The upload could not be read or parsed as a workbook.
    #[error("Error reading the Excel file: {0}")]
    DatasetLoad(String),

    /// The required column is absent after label normalization.
    #[error("Column '{expected}' not found in Excel file")]
    MissingColumn {
        expected: String,
        available: Vec<String>,
    },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A subset exceeds what a single worksheet can hold.
    #[error("{category} report too large: {detail}")]
    TooLarge { category: String, detail: String },

    #[error("failed to write {category} workbook: {message}")]
    Serialize { category: String, message: String },
}

impl ClassifyError {
    pub fn load(msg: impl Into<String>) -> Self {
        ClassifyError::DatasetLoad(msg.into())
    }

    /// Stable code used in IPC error frames.
    pub fn code(&self) -> &'static str {
        match self {
            ClassifyError::DatasetLoad(_) => "dataset_load_failed",
            ClassifyError::MissingColumn { .. } => "missing_column",
            ClassifyError::InvalidOptions(_) => "bad_params",
            ClassifyError::TooLarge { .. } | ClassifyError::Serialize { .. } => "serialize_failed",
        }
    }
}
