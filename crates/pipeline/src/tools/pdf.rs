use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{PageCounter, ToolError};

/// Counts PDF pages in-process with `lopdf`.
///
/// Files that are not PDFs, or that `lopdf` cannot parse, are handed to the
/// fallback counter (normally `magick identify`).
pub struct PdfPageCounter {
    fallback: Arc<dyn PageCounter>,
}

impl PdfPageCounter {
    pub fn new(fallback: Arc<dyn PageCounter>) -> Self {
        Self { fallback }
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

async fn count_pdf_pages(path: PathBuf) -> Result<u32, ToolError> {
    let unreadable = |detail: String| ToolError::Unreadable {
        path: path.clone(),
        detail,
    };
    let target = path.clone();
    let pages = tokio::task::spawn_blocking(move || {
        lopdf::Document::load(&target).map(|doc| doc.get_pages().len())
    })
    .await
    .map_err(|e| unreadable(e.to_string()))?
    .map_err(|e| unreadable(e.to_string()))?;

    u32::try_from(pages).map_err(|_| unreadable(format!("{pages} pages")))
}

#[async_trait]
impl PageCounter for PdfPageCounter {
    async fn page_count(&self, source: &Path) -> Result<u32, ToolError> {
        if is_pdf(source) {
            match count_pdf_pages(source.to_path_buf()).await {
                Ok(pages) => return Ok(pages),
                Err(e) => debug!(source = %source.display(), error = %e, "In-process page count failed"),
            }
        }
        self.fallback.page_count(source).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use lopdf::{dictionary, Document, Object};

    use super::*;

    #[derive(Default)]
    struct CountingFallback {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageCounter for CountingFallback {
        async fn page_count(&self, _source: &Path) -> Result<u32, ToolError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        }
    }

    fn write_pdf(path: &Path, pages: usize) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..pages)
            .map(|_| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[tokio::test]
    async fn counts_pdf_pages_without_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("three.PDF");
        write_pdf(&path, 3);

        let fallback = Arc::new(CountingFallback::default());
        let counter = PdfPageCounter::new(fallback.clone());
        assert_eq!(counter.page_count(&path).await.unwrap(), 3);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn other_formats_use_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.tiff");
        std::fs::write(&path, b"II*\0").unwrap();

        let fallback = Arc::new(CountingFallback::default());
        let counter = PdfPageCounter::new(fallback.clone());
        assert_eq!(counter.page_count(&path).await.unwrap(), 7);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparseable_pdf_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4 truncated").unwrap();

        let fallback = Arc::new(CountingFallback::default());
        let counter = PdfPageCounter::new(fallback.clone());
        assert_eq!(counter.page_count(&path).await.unwrap(), 7);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }
}
