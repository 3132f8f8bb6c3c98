//! Request-level error taxonomy. Every variant becomes a flashed notice plus
//! a redirect; the detail text is only ever logged.

use thiserror::Error;

use crate::{archive::ArchiveError, render::RenderError, sheet::SheetError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("spreadsheet has no {0} column")]
    MissingColumn(String),
    #[error(transparent)]
    RenderBackend(RenderError),
    #[error("ambiguous cities: {0}")]
    NameClash(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("nothing to archive")]
    NothingToArchive,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Text safe to show the user.
    pub fn notice(&self) -> String {
        match self {
            AppError::InvalidInput(_) => "Please upload a valid .xlsx file".to_string(),
            AppError::MissingColumn(col) => format!("The spreadsheet has no {col} column"),
            AppError::RenderBackend(_) => "PDF generation failed".to_string(),
            AppError::NameClash(_) => {
                "Some city names map to the same PDF file name; please rename them".to_string()
            }
            AppError::NotFound(_) => "File not found".to_string(),
            AppError::NothingToArchive => "No PDFs generated yet.".to_string(),
            AppError::Internal(_) => "Something went wrong, please try again".to_string(),
        }
    }
}

impl From<SheetError> for AppError {
    fn from(e: SheetError) -> Self {
        AppError::InvalidInput(e.to_string())
    }
}

impl From<RenderError> for AppError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Backend(_) => AppError::RenderBackend(e),
            RenderError::NameClash { .. } => AppError::NameClash(e.to_string()),
            RenderError::Persist { .. } => AppError::Internal(e.to_string()),
        }
    }
}

impl From<ArchiveError> for AppError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::NothingToArchive(_) => AppError::NothingToArchive,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}
