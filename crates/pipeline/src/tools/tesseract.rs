use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use docflow_core::config::OcrConfig;

use super::{run_tool, TextRecognizer, ToolError};

/// OCR through the `tesseract` CLI, writing recognized text to stdout.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    config: OcrConfig,
}

impl TesseractRecognizer {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn args(&self, image: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![image.into(), "stdout".into()];
        if let Some(dir) = &self.config.tessdata_dir {
            args.push("--tessdata-dir".into());
            args.push(dir.into());
        }
        args.extend(
            [
                "-l".to_string(),
                self.config.languages.clone(),
                "--dpi".to_string(),
                self.config.dpi.to_string(),
                "--psm".to_string(),
                self.config.psm.to_string(),
            ]
            .map(OsString::from),
        );
        args
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &Path) -> Result<String, ToolError> {
        let output = run_tool(&self.config.binary, self.args(image)).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
