// src/render/mod.rs

pub mod convert;
pub mod template;

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::group::CityGroup;
pub use convert::{DocumentConverter, PageLayout, WkHtmlToPdf};

pub const DOCUMENT_EXTENSION: &str = "pdf";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering backend unavailable: {0}")]
    Backend(String),
    #[error("writing document {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cities {first:?} and {second:?} both map to {filename}")]
    NameClash {
        filename: String,
        first: String,
        second: String,
    },
}

/// `"{prefix} {city}.pdf"`, or `"{city}.pdf"` when the prefix is blank.
///
/// Path separators and NUL are replaced so the name stays inside its area.
pub fn document_filename(prefix: &str, city: &str) -> String {
    let prefix = prefix.trim();
    let stem = if prefix.is_empty() {
        city.to_string()
    } else {
        format!("{prefix} {city}")
    };
    let safe: String = stem
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    format!("{safe}.{DOCUMENT_EXTENSION}")
}

/// Renders city groups through the document template and a converter.
#[derive(Clone)]
pub struct DocumentRenderer {
    converter: Arc<dyn DocumentConverter>,
    layout: PageLayout,
}

impl DocumentRenderer {
    pub fn new(converter: Arc<dyn DocumentConverter>) -> Self {
        Self {
            converter,
            layout: PageLayout::default(),
        }
    }

    /// Markup for `group`, converted to document bytes.
    #[instrument(level = "debug", skip(self, group, headers), fields(city = %group.city, rows = group.rows.len()))]
    pub fn render_group(&self, group: &CityGroup, headers: &[String]) -> Result<Vec<u8>, RenderError> {
        let markup = template::city_document(&group.city, headers, group);
        self.converter.convert(&markup, &self.layout)
    }

    /// Render `group` and persist it under `documents_dir`, replacing any
    /// document with the same filename. Returns the written path.
    pub fn write_document(
        &self,
        group: &CityGroup,
        headers: &[String],
        prefix: &str,
        documents_dir: &Path,
    ) -> Result<PathBuf, RenderError> {
        let bytes = self.render_group(group, headers)?;
        let path = documents_dir.join(document_filename(prefix, &group.city));
        persist(&path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "generated document");
        Ok(path)
    }

    /// Render every group in order. Stops at the first failure.
    ///
    /// Fails before rendering anything if two cities would share a filename.
    pub fn write_all(
        &self,
        groups: &[CityGroup],
        headers: &[String],
        prefix: &str,
        documents_dir: &Path,
    ) -> Result<Vec<PathBuf>, RenderError> {
        check_unique_names(groups, prefix)?;
        let mut written = Vec::with_capacity(groups.len());
        for group in groups {
            written.push(self.write_document(group, headers, prefix, documents_dir)?);
        }
        info!(count = written.len(), dir = %documents_dir.display(), "documents generated");
        Ok(written)
    }
}

fn check_unique_names(groups: &[CityGroup], prefix: &str) -> Result<(), RenderError> {
    let mut seen: HashMap<String, &str> = HashMap::with_capacity(groups.len());
    for group in groups {
        let filename = document_filename(prefix, &group.city);
        if let Some(first) = seen.insert(filename.clone(), &group.city) {
            return Err(RenderError::NameClash {
                filename,
                first: first.to_string(),
                second: group.city.clone(),
            });
        }
    }
    Ok(())
}

// Write to a temp file in the same directory, then rename into place.
fn persist(path: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    let wrap = |source| RenderError::Persist {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(wrap)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(wrap)?;
    tmp.write_all(bytes).map_err(wrap)?;
    tmp.persist(path).map_err(|e| wrap(e.error))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sheet::{CellValue, Row};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Converter that echoes the markup back, optionally failing on the n-th call.
    pub(crate) struct FakeConverter {
        pub calls: AtomicUsize,
        pub fail_on: Option<usize>,
    }

    impl FakeConverter {
        pub(crate) fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
            }
        }

        pub(crate) fn failing_on(call: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: Some(call),
            }
        }
    }

    impl DocumentConverter for FakeConverter {
        fn convert(&self, markup: &str, layout: &PageLayout) -> Result<Vec<u8>, RenderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(n) {
                return Err(RenderError::Backend("fake converter down".to_string()));
            }
            let mut out = format!("%PDF-fake {} {}\n", layout.page_size, layout.orientation)
                .into_bytes();
            out.extend_from_slice(markup.as_bytes());
            Ok(out)
        }
    }

    fn group(city: &str, names: &[&str]) -> CityGroup {
        CityGroup {
            city: city.to_string(),
            rows: names
                .iter()
                .map(|n| Row::new(vec![CellValue::Text(n.to_string()), CellValue::Text(city.into())]))
                .collect(),
        }
    }

    fn headers() -> Vec<String> {
        vec!["NAME".into(), "CONTACTCITY".into()]
    }

    #[test]
    fn test_document_filename() {
        assert_eq!(document_filename("Q1", "Denver"), "Q1 Denver.pdf");
        assert_eq!(document_filename("", "Denver"), "Denver.pdf");
        assert_eq!(document_filename("  ", "Denver"), "Denver.pdf");
        assert_eq!(document_filename("", ""), ".pdf");
        assert_eq!(document_filename("a/b", "..\\x"), "a_b .._x.pdf");
    }

    #[test]
    fn test_write_all_in_order_with_layout() {
        let dir = tempdir().unwrap();
        let renderer = DocumentRenderer::new(Arc::new(FakeConverter::ok()));
        let groups = vec![group("Austin", &["Ann"]), group("Denver", &["Bob", "Cy"])];

        let paths = renderer
            .write_all(&groups, &headers(), "Q1", dir.path())
            .unwrap();
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["Q1 Austin.pdf", "Q1 Denver.pdf"]);

        let denver = fs::read_to_string(dir.path().join("Q1 Denver.pdf")).unwrap();
        assert!(denver.starts_with("%PDF-fake A4 Landscape"));
        assert!(denver.contains("<td>Cy</td>"));
    }

    #[test]
    fn test_same_identity_overwrites() {
        let dir = tempdir().unwrap();
        let renderer = DocumentRenderer::new(Arc::new(FakeConverter::ok()));

        renderer
            .write_document(&group("Denver", &["Old"]), &headers(), "", dir.path())
            .unwrap();
        renderer
            .write_document(&group("Denver", &["New"]), &headers(), "", dir.path())
            .unwrap();

        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
        let body = fs::read_to_string(dir.path().join("Denver.pdf")).unwrap();
        assert!(body.contains("New"));
        assert!(!body.contains("Old"));
    }

    #[test]
    fn test_colliding_names_render_nothing() {
        let dir = tempdir().unwrap();
        let converter = Arc::new(FakeConverter::ok());
        let renderer = DocumentRenderer::new(converter.clone());
        let groups = vec![group("a/b", &["1"]), group("a_b", &["2"])];

        let err = renderer
            .write_all(&groups, &headers(), "", dir.path())
            .unwrap_err();
        match err {
            RenderError::NameClash { filename, first, second } => {
                assert_eq!(filename, "a_b.pdf");
                assert_eq!((first.as_str(), second.as_str()), ("a/b", "a_b"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_backend_failure_stops_the_run() {
        let dir = tempdir().unwrap();
        let converter = Arc::new(FakeConverter::failing_on(1));
        let renderer = DocumentRenderer::new(converter.clone());
        let groups = vec![
            group("A", &["1"]),
            group("B", &["2"]),
            group("C", &["3"]),
        ];

        let err = renderer
            .write_all(&groups, &headers(), "", dir.path())
            .unwrap_err();
        assert!(matches!(err, RenderError::Backend(_)));
        assert_eq!(converter.calls.load(Ordering::SeqCst), 2);
        assert!(!dir.path().join("C.pdf").exists());
    }
}
