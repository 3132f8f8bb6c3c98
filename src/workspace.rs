// src/workspace.rs

use std::{
    fmt,
    path::{Path, PathBuf},
};
use uuid::Uuid;

/// Identifies one upload-through-download cycle of transient files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CycleId(Uuid);

impl CycleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Root of the two transient areas: uploaded spreadsheets and generated documents.
#[derive(Debug, Clone)]
pub struct Workspace {
    uploads: PathBuf,
    documents: PathBuf,
}

impl Workspace {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            uploads: data_dir.join("uploads"),
            documents: data_dir.join("city_pdfs"),
        }
    }

    pub fn cycle(&self, id: CycleId) -> CycleAreas {
        let name = id.to_string();
        CycleAreas {
            id,
            uploads: self.uploads.join(&name),
            documents: self.documents.join(&name),
        }
    }
}

/// The per-cycle subdirectories of both areas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleAreas {
    pub id: CycleId,
    pub uploads: PathBuf,
    pub documents: PathBuf,
}

impl CycleAreas {
    pub fn all(&self) -> Vec<PathBuf> {
        vec![self.uploads.clone(), self.documents.clone()]
    }
}

/// Strip any client-supplied directories from an upload filename.
pub fn upload_filename(original: &str, unix_secs: i64) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("upload.xlsx");
    format!("{unix_secs}_{base}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycles_are_scoped() {
        let ws = Workspace::new("/srv/data");
        let a = ws.cycle(CycleId::new());
        let b = ws.cycle(CycleId::new());

        assert_ne!(a.documents, b.documents);
        assert!(a.uploads.starts_with("/srv/data/uploads"));
        assert!(a.documents.starts_with("/srv/data/city_pdfs"));
        assert_eq!(a.all().len(), 2);
    }

    #[test]
    fn test_upload_filename() {
        assert_eq!(upload_filename("contacts.xlsx", 1700000000), "1700000000_contacts.xlsx");
        assert_eq!(upload_filename("../../etc/x.xlsx", 1), "1_x.xlsx");
        assert_eq!(upload_filename("C:\\Users\\me\\c.xlsx", 1), "1_c.xlsx");
        assert_eq!(upload_filename("dir/", 1), "1_upload.xlsx");
    }
}
