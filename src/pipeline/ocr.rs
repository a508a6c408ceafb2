//! OCR adapter: image region → recognised text.
//!
//! [`TesseractEngine`] shells out to the `tesseract` CLI. The child is
//! spawned with `kill_on_drop`, so when the worker pool abandons a timed-out
//! document the engine process dies with it instead of lingering.

use crate::config::OcrConfig;
use crate::error::OcrError;
use crate::pipeline::render::ImageRegion;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

/// Recognises text in one image region.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, region: &ImageRegion, config: &OcrConfig) -> Result<String, OcrError>;
}

/// Tesseract via its command-line interface.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    cmd: String,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractEngine {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    /// Run `tesseract --version` and return its first line.
    pub async fn check_available(&self) -> Result<String, OcrError> {
        let output = Command::new(&self.cmd)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(OcrError::EngineUnavailable(format!(
                "`{} --version` exited with {}",
                self.cmd, output.status
            )));
        }
        // Older releases print the version banner on stderr.
        let text = if output.stdout.is_empty() {
            String::from_utf8_lossy(&output.stderr).into_owned()
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        Ok(text.lines().next().unwrap_or_default().trim().to_string())
    }

    /// Command-line arguments for one image.
    pub fn args(image: &Path, config: &OcrConfig) -> Vec<String> {
        let mut args = vec![
            image.display().to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            config.language.clone(),
        ];
        if let Some(psm) = config.psm {
            args.push("--psm".into());
            args.push(psm.to_string());
        }
        if let Some(oem) = config.oem {
            args.push("--oem".into());
            args.push(oem.to_string());
        }
        args
    }

    fn spawn_error(&self, e: std::io::Error) -> OcrError {
        if e.kind() == std::io::ErrorKind::NotFound {
            OcrError::EngineUnavailable(format!(
                "'{}' not found (install tesseract-ocr and the language pack)",
                self.cmd
            ))
        } else {
            OcrError::Io(e)
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    async fn recognize(&self, region: &ImageRegion, config: &OcrConfig) -> Result<String, OcrError> {
        let start = Instant::now();

        let mut image = tempfile::Builder::new()
            .prefix("patocr-")
            .suffix(".png")
            .tempfile()?;
        image.write_all(&region.png)?;
        image.flush()?;

        let output = Command::new(&self.cmd)
            .args(Self::args(image.path(), config))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(OcrError::EngineFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let text = String::from_utf8(output.stdout).map_err(|e| OcrError::InvalidOutput(e.to_string()))?;
        debug!(
            region = %region.id,
            chars = text.chars().count(),
            ms = start.elapsed().as_millis() as u64,
            "OCR complete"
        );
        Ok(text)
    }
}
