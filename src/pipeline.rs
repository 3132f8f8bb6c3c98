// src/pipeline.rs

use chrono::Utc;
use std::fs;
use tracing::{error, info, instrument, warn};

use crate::{
    cleanup::purge_areas,
    error::AppError,
    group::{group_rows, CityGroup},
    render::DocumentRenderer,
    session::UploadSession,
    sheet::load_xlsx,
    workspace::{upload_filename, CycleId, Workspace},
};

const XLSX_MAGIC: &[u8] = b"PK\x03\x04";

/// A validated, parsed and grouped upload that has not touched disk yet.
#[derive(Debug)]
pub struct PreparedUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub headers: Vec<String>,
    pub groups: Vec<CityGroup>,
}

/// Validate and group an uploaded workbook entirely in memory.
///
/// Rejects anything that is not named `*.xlsx`, is not a zip container, does
/// not parse, or lacks `city_column`.
#[instrument(level = "info", skip(bytes), fields(len = bytes.len()))]
pub fn prepare_upload(
    filename: &str,
    bytes: Vec<u8>,
    city_column: &str,
) -> Result<PreparedUpload, AppError> {
    if !filename.to_ascii_lowercase().ends_with(".xlsx") {
        return Err(AppError::InvalidInput(format!("not an .xlsx filename: {filename:?}")));
    }
    if !bytes.starts_with(XLSX_MAGIC) {
        return Err(AppError::InvalidInput("content is not an xlsx container".to_string()));
    }

    let dataset = load_xlsx(&bytes)?;
    let key = dataset
        .column_index(city_column)
        .ok_or_else(|| AppError::MissingColumn(city_column.to_string()))?;
    let groups = group_rows(&dataset, key);
    info!(rows = dataset.rows.len(), groups = groups.len(), "grouped upload");

    Ok(PreparedUpload {
        filename: filename.to_string(),
        bytes,
        headers: dataset.headers,
        groups,
    })
}

/// Store the spreadsheet and render every group into a fresh cycle.
///
/// All-or-nothing: if anything fails the cycle's areas are removed and no
/// session state is produced.
#[instrument(level = "info", skip_all, fields(file = %upload.filename, groups = upload.groups.len()))]
pub fn generate_cycle(
    upload: PreparedUpload,
    prefix: &str,
    workspace: &Workspace,
    renderer: &DocumentRenderer,
) -> Result<UploadSession, AppError> {
    let areas = workspace.cycle(CycleId::new());

    let result = (|| -> Result<(), AppError> {
        fs::create_dir_all(&areas.uploads)?;
        fs::create_dir_all(&areas.documents)?;
        let saved = areas
            .uploads
            .join(upload_filename(&upload.filename, Utc::now().timestamp()));
        fs::write(&saved, &upload.bytes)?;
        info!(path = %saved.display(), "saved spreadsheet");

        renderer.write_all(&upload.groups, &upload.headers, prefix, &areas.documents)?;
        Ok(())
    })();

    if let Err(e) = result {
        error!(cycle = %areas.id, "upload failed: {}", e);
        let report = purge_areas(&areas.all());
        if !report.failed.is_empty() {
            warn!(cycle = %areas.id, failed = report.failed.len(), "partial cycle left behind");
        }
        return Err(e);
    }

    Ok(UploadSession {
        cycle: areas.id,
        prefix: prefix.to_string(),
        headers: upload.headers,
        groups: upload.groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::FakeConverter;
    use crate::sheet::tests::xlsx_bytes;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn contacts() -> Vec<u8> {
        xlsx_bytes(&[
            &["NAME", "CONTACTCITY"],
            &["Ann", "Denver"],
            &["Bob", "Austin"],
            &["Cy", "Denver"],
        ])
    }

    #[test]
    fn test_prepare_groups_in_memory() {
        let prepared = prepare_upload("contacts.xlsx", contacts(), "CONTACTCITY").unwrap();
        assert_eq!(prepared.headers, vec!["NAME", "CONTACTCITY"]);
        let cities: Vec<&str> = prepared.groups.iter().map(|g| g.city.as_str()).collect();
        assert_eq!(cities, vec!["Austin", "Denver"]);
    }

    #[test]
    fn test_prepare_rejects_bad_input() {
        let err = prepare_upload("contacts.csv", contacts(), "CONTACTCITY").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = prepare_upload("contacts.xlsx", b"a,b\n1,2\n".to_vec(), "CONTACTCITY").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = prepare_upload("contacts.xlsx", b"PK\x03\x04garbage".to_vec(), "CONTACTCITY").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = prepare_upload("contacts.xlsx", contacts(), "CITY").unwrap_err();
        assert!(matches!(err, AppError::MissingColumn(_)));
    }

    #[test]
    fn test_generate_cycle_writes_documents() {
        let tmp = tempdir().unwrap();
        let workspace = Workspace::new(tmp.path());
        let renderer = DocumentRenderer::new(Arc::new(FakeConverter::ok()));

        let prepared = prepare_upload("contacts.xlsx", contacts(), "CONTACTCITY").unwrap();
        let session = generate_cycle(prepared, "Q1", &workspace, &renderer).unwrap();

        let areas = workspace.cycle(session.cycle);
        assert!(areas.documents.join("Q1 Austin.pdf").is_file());
        assert!(areas.documents.join("Q1 Denver.pdf").is_file());
        let uploads: Vec<_> = fs::read_dir(&areas.uploads).unwrap().collect();
        assert_eq!(uploads.len(), 1);
        assert_eq!(session.prefix, "Q1");
        assert_eq!(session.groups.len(), 2);
    }

    #[test]
    fn test_backend_failure_leaves_no_cycle() {
        let tmp = tempdir().unwrap();
        let workspace = Workspace::new(tmp.path());
        let renderer = DocumentRenderer::new(Arc::new(FakeConverter::failing_on(1)));

        let prepared = prepare_upload("contacts.xlsx", contacts(), "CONTACTCITY").unwrap();
        let err = generate_cycle(prepared, "", &workspace, &renderer).unwrap_err();
        assert!(matches!(err, AppError::RenderBackend(_)));

        let leftover = fs::read_dir(tmp.path().join("city_pdfs")).unwrap().count();
        assert_eq!(leftover, 0);
        let leftover = fs::read_dir(tmp.path().join("uploads")).unwrap().count();
        assert_eq!(leftover, 0);
    }
}
