use std::{
    fs::{self, File},
    io::{self, Cursor},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, instrument};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::render::DOCUMENT_EXTENSION;

pub const ARCHIVE_NAME: &str = "city_reports.zip";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no documents to archive in {0}")]
    NothingToArchive(PathBuf),
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("building archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Document files directly inside `dir`, in directory-listing order.
pub fn list_documents(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ArchiveError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    // suffix match, so the blank-city document ".pdf" counts too
    let suffix = format!(".{DOCUMENT_EXTENSION}");
    let mut docs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ArchiveError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_doc = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(&suffix));
        if is_doc && path.is_file() {
            docs.push(path);
        }
    }
    Ok(docs)
}

/// Zip every document in `documents_dir` into an in-memory archive.
///
/// Members are stored under their bare filenames. Member order follows the
/// directory listing and is not stable across filesystems.
#[instrument(level = "info", skip(documents_dir), fields(dir = %documents_dir.display()))]
pub fn build_archive(documents_dir: &Path) -> Result<Vec<u8>, ArchiveError> {
    let docs = list_documents(documents_dir)?;
    if docs.is_empty() {
        return Err(ArchiveError::NothingToArchive(documents_dir.to_path_buf()));
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    for path in &docs {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };
        let mut file = File::open(path).map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
        zip.start_file(name.as_str(), options)?;
        io::copy(&mut file, &mut zip).map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(member = %name, "added to archive");
    }

    let bytes = zip.finish()?.into_inner();
    info!(members = docs.len(), bytes = bytes.len(), "archive built");
    Ok(bytes)
}
