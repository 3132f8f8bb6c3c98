use std::{
    io::Write,
    path::PathBuf,
    process::{Command, Stdio},
};
use tracing::{debug, instrument};

use super::RenderError;

/// Fixed page configuration handed to the converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    pub page_size: String,
    pub orientation: String,
    pub encoding: String,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            page_size: "A4".to_string(),
            orientation: "Landscape".to_string(),
            encoding: "UTF-8".to_string(),
        }
    }
}

/// Turns HTML markup into paginated document bytes.
pub trait DocumentConverter: Send + Sync {
    fn convert(&self, markup: &str, layout: &PageLayout) -> Result<Vec<u8>, RenderError>;
}

/// Pipes markup through an external `wkhtmltopdf` process.
#[derive(Debug, Clone)]
pub struct WkHtmlToPdf {
    binary: PathBuf,
}

impl WkHtmlToPdf {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn args(layout: &PageLayout) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--page-size".to_string(),
            layout.page_size.clone(),
            "--orientation".to_string(),
            layout.orientation.clone(),
            "--encoding".to_string(),
            layout.encoding.clone(),
            "-".to_string(),
            "-".to_string(),
        ]
    }
}

impl DocumentConverter for WkHtmlToPdf {
    #[instrument(level = "debug", skip(self, markup, layout), fields(binary = %self.binary.display()))]
    fn convert(&self, markup: &str, layout: &PageLayout) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(&self.binary)
            .args(Self::args(layout))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RenderError::Backend(format!("cannot start {}: {e}", self.binary.display()))
            })?;

        // Write on a separate thread so a full stdout pipe cannot deadlock us.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RenderError::Backend("converter stdin unavailable".to_string()))?;
        let input = markup.as_bytes().to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .map_err(|e| RenderError::Backend(format!("converter did not finish: {e}")))?;
        let written = writer.join();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Backend(format!(
                "converter exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RenderError::Backend(format!("writing markup: {e}"))),
            Err(_) => return Err(RenderError::Backend("markup writer panicked".to_string())),
        }
        if output.stdout.is_empty() {
            return Err(RenderError::Backend("converter produced no output".to_string()));
        }

        debug!(bytes = output.stdout.len(), "converted markup");
        Ok(output.stdout)
    }
}
