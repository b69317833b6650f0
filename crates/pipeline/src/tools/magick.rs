use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use docflow_core::config::RenderConfig;
use tracing::debug;

use super::{run_tool, PageCounter, Rasterizer, ToolError};

/// Page rendering through ImageMagick's `magick` CLI.
#[derive(Debug, Clone)]
pub struct MagickRasterizer {
    binary: String,
    density: u32,
    quality: u32,
}

impl MagickRasterizer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            density: config.density,
            quality: config.quality,
        }
    }

    fn identify_args(&self, source: &Path) -> Vec<OsString> {
        vec![
            "identify".into(),
            "-ping".into(),
            "-format".into(),
            "%n\n".into(),
            source.into(),
        ]
    }

    fn render_args(&self, source: &Path, page: u32, output: &Path) -> Vec<OsString> {
        // ImageMagick frame selectors are zero-based.
        let mut selected = source.as_os_str().to_owned();
        selected.push(format!("[{}]", page.saturating_sub(1)));

        vec![
            "-density".into(),
            self.density.to_string().into(),
            selected,
            "-quality".into(),
            self.quality.to_string().into(),
            output.into(),
        ]
    }
}

/// `identify -format "%n\n"` prints the frame count once per frame.
fn parse_page_count(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.parse().ok())
}

#[async_trait]
impl PageCounter for MagickRasterizer {
    async fn page_count(&self, source: &Path) -> Result<u32, ToolError> {
        let output = run_tool(&self.binary, self.identify_args(source)).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_page_count(&stdout).ok_or_else(|| ToolError::Parse {
            binary: self.binary.clone(),
            detail: format!("page count not found in {:?}", stdout.trim()),
        })
    }
}

#[async_trait]
impl Rasterizer for MagickRasterizer {
    async fn render_page(&self, source: &Path, page: u32, output: &Path) -> Result<(), ToolError> {
        run_tool(&self.binary, self.render_args(source, page, output)).await?;
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(ToolError::MissingOutput {
                binary: self.binary.clone(),
                path: output.to_path_buf(),
            });
        }
        debug!(source = %source.display(), page, "Rendered page preview");
        Ok(())
    }
}
