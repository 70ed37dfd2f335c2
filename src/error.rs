use thiserror::Error;

/// Errors surfaced at the I/O boundaries (DOCX import, JSON documents, CLI).
/// Measurement, pagination and position mapping never fail; they degrade.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid DOCX: {0}")]
    InvalidDocx(String),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
