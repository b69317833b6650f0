//! External command-line tools used by the render and extract stages.
//!
//! Stages only see the [`PageCounter`], [`Rasterizer`] and [`TextRecognizer`]
//! traits. ImageMagick and Tesseract wrappers are the production
//! implementations, with PDF page counts read in-process first.

mod magick;
mod pdf;
mod tesseract;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

pub use magick::MagickRasterizer;
pub use pdf::PdfPageCounter;
pub use tesseract::TesseractRecognizer;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("failed to launch {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{binary} exited with {status}: {stderr}")]
    Failed {
        binary: String,
        status: String,
        stderr: String,
    },
    #[error("{binary} produced no output at {path}")]
    MissingOutput { binary: String, path: PathBuf },
    #[error("unexpected output from {binary}: {detail}")]
    Parse { binary: String, detail: String },
    #[error("cannot read {path}: {detail}")]
    Unreadable { path: PathBuf, detail: String },
}

/// Reports how many pages a document has.
#[async_trait]
pub trait PageCounter: Send + Sync {
    async fn page_count(&self, source: &Path) -> Result<u32, ToolError>;
}

/// Turns a paged document into one image per page.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Render 1-based `page` of `source` to the image at `output`.
    async fn render_page(&self, source: &Path, page: u32, output: &Path)
        -> Result<(), ToolError>;
}

/// Reads the text off a single page image.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<String, ToolError>;
}

/// Location of the preview image for 1-based `page` inside an item's preview
/// directory.
pub fn page_artifact(dir: &Path, page: u32) -> PathBuf {
    dir.join(format!("{page}.jpg"))
}

/// Run `binary` to completion, mapping a non-zero exit to [`ToolError::Failed`].
pub(crate) async fn run_tool<I, S>(binary: &str, args: I) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(binary);
    cmd.args(args).kill_on_drop(true);
    trace!(?cmd, "Running external tool");

    let output = cmd.output().await.map_err(|source| ToolError::Spawn {
        binary: binary.to_string(),
        source,
    })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            binary: binary.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}
