use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("PDF converter `{program}` could not be started: {source}")]
    Unavailable {
        program: String,
        source: std::io::Error,
    },
    #[error("PDF conversion timed out after {0:?}")]
    Timeout(Duration),
    #[error("PDF converter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("PDF converter produced no output file")]
    MissingOutput,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

// ── Converter ────────────────────────────────────────────────────────────────

/// Converts documents to PDF through a headless office suite
/// (`soffice --headless --convert-to pdf`).
#[derive(Debug, Clone)]
pub struct PdfConverter {
    program: String,
    timeout: Duration,
}

impl PdfConverter {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Convert `.docx` bytes to PDF bytes. Inputs and outputs live in a
    /// scratch directory that is removed when this returns.
    pub async fn docx_to_pdf(&self, docx: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("document.docx");
        tokio::fs::write(&input, docx).await?;

        self.run(&input, workdir.path()).await?;

        let output = pdf_path_for(&input);
        match tokio::fs::read(&output).await {
            Ok(pdf) => Ok(pdf),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConvertError::MissingOutput),
            Err(e) => Err(e.into()),
        }
    }

    async fn run(&self, input: &Path, outdir: &Path) -> Result<(), ConvertError> {
        let started = std::time::Instant::now();
        let child = Command::new(&self.program)
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(outdir)
            .arg(input)
            // soffice will not run twice against one profile directory.
            .arg(format!(
                "-env:UserInstallation=file://{}",
                outdir.join("profile").display()
            ))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConvertError::Unavailable {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ConvertError::Timeout(self.timeout))??;

        if !output.status.success() {
            return Err(ConvertError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        tracing::info!(
            program = %self.program,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "PDF conversion finished"
        );
        Ok(())
    }
}

fn pdf_path_for(input: &Path) -> PathBuf {
    input.with_extension("pdf")
}
