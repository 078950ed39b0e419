//! Background page-dimension loading
//!
//! Opening a document only needs its page count up front; reading every
//! page's dimensions can take a while for large files, so it runs on a
//! dedicated thread. Each load is tagged with a generation; starting a new
//! load cancels the previous one and any result it still produces is dropped.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use pageview_render::{DocumentInfo, DocumentSource, PageSize, DEFAULT_PAGE_SIZE};
use pageview_scheduler::{CancellationToken, Generation};

use crate::error::ViewerError;

/// Page layout of a fully scanned document
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout {
    pub info: DocumentInfo,
    /// Displayed size of every page, defaults substituted where unreadable
    pub page_sizes: Vec<PageSize>,
    /// One entry per page whose size had to be substituted
    pub geometry_errors: Vec<ViewerError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(DocumentLayout),
    Failed(ViewerError),
}

#[derive(Debug)]
struct LoadMessage {
    generation: u64,
    outcome: LoadOutcome,
}

#[derive(Debug)]
pub struct DocumentLoader {
    generation: Generation,
    token: Option<CancellationToken>,
    sender: Sender<LoadMessage>,
    results: Receiver<LoadMessage>,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader {
    pub fn new() -> Self {
        let (sender, results) = flume::unbounded();
        Self { generation: Generation::new(), token: None, sender, results }
    }

    /// Scan `document` in the background, superseding any running scan
    pub fn start(&mut self, document: Arc<dyn DocumentSource>) -> io::Result<u64> {
        self.cancel();

        let generation = self.generation.current();
        let token = CancellationToken::new();
        let worker_token = token.clone();
        let sender = self.sender.clone();

        thread::Builder::new().name("pageview-loader".to_owned()).spawn(move || {
            let Some(outcome) = scan(document.as_ref(), &worker_token) else {
                debug!("document scan {generation} cancelled");
                return;
            };
            let _ = sender.send(LoadMessage { generation, outcome });
        })?;

        self.token = Some(token);
        Ok(generation)
    }

    /// Cancel the running scan; its result will never be returned
    pub fn cancel(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.generation.advance();
    }

    pub fn is_loading(&self) -> bool {
        self.token.is_some()
    }

    /// Result of the current scan, if it has finished
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        while let Ok(message) = self.results.try_recv() {
            if let Some(outcome) = self.accept(message) {
                return Some(outcome);
            }
        }
        None
    }

    /// Block up to `timeout` for the current scan to finish
    pub fn wait(&mut self, timeout: Duration) -> Option<LoadOutcome> {
        if let Some(outcome) = self.poll() {
            return Some(outcome);
        }
        if !self.is_loading() {
            return None;
        }

        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(message) => {
                    if let Some(outcome) = self.accept(message) {
                        return Some(outcome);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
    }

    fn accept(&mut self, message: LoadMessage) -> Option<LoadOutcome> {
        if !self.generation.is_current(message.generation) {
            debug!("dropping result of superseded document scan {}", message.generation);
            return None;
        }
        self.token = None;
        Some(message.outcome)
    }
}

/// Read the page count and every page size; `None` if cancelled midway
fn scan(document: &dyn DocumentSource, token: &CancellationToken) -> Option<LoadOutcome> {
    let page_count = match document.page_count() {
        Ok(count) => count,
        Err(error) => {
            warn!("document unavailable: {error}");
            return Some(LoadOutcome::Failed(ViewerError::document_unavailable(&error)));
        }
    };

    let mut info = document.info().unwrap_or_default();
    info.page_count = page_count;

    let mut page_sizes = Vec::with_capacity(page_count);
    let mut geometry_errors = Vec::new();

    for page in 0..page_count {
        if token.is_cancelled() {
            return None;
        }
        match document.page_dimensions(page) {
            Ok(size) if size.width > 0.0 && size.height > 0.0 => page_sizes.push(size),
            Ok(size) => {
                warn!("page {page} has degenerate size {size:?}; using US Letter");
                let message = format!("degenerate size {}x{}", size.width, size.height);
                geometry_errors.push(ViewerError::GeometryUnavailable { page, message });
                page_sizes.push(DEFAULT_PAGE_SIZE);
            }
            Err(error) => {
                warn!("page {page} dimensions unavailable ({error}); using US Letter");
                geometry_errors.push(ViewerError::geometry_unavailable(page, &error));
                page_sizes.push(DEFAULT_PAGE_SIZE);
            }
        }
    }

    if token.is_cancelled() {
        return None;
    }

    info!("scanned {page_count} pages");
    Some(LoadOutcome::Loaded(DocumentLayout { info, page_sizes, geometry_errors }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageview_render::{DocumentError, PageInfo, Rotation, SyntheticDocument};

    const WAIT: Duration = Duration::from_secs(5);

    /// Blocks inside `page_info` until released
    struct SlowDocument {
        pages: usize,
        gate: Receiver<()>,
    }

    impl DocumentSource for SlowDocument {
        fn page_count(&self) -> Result<usize, DocumentError> {
            Ok(self.pages)
        }

        fn page_info(&self, page: usize) -> Result<PageInfo, DocumentError> {
            let _ = self.gate.recv_timeout(WAIT);
            Ok(PageInfo { index: page, size: PageSize::new(300.0, 400.0), rotation: Rotation::None })
        }
    }

    struct BrokenDocument;

    impl DocumentSource for BrokenDocument {
        fn page_count(&self) -> Result<usize, DocumentError> {
            Err(DocumentError::Backend("file vanished".into()))
        }

        fn page_info(&self, page: usize) -> Result<PageInfo, DocumentError> {
            Err(DocumentError::PageOutOfRange { page, page_count: 0 })
        }
    }

    /// Page 1 has no dimensions
    struct PartialDocument;

    impl DocumentSource for PartialDocument {
        fn page_count(&self) -> Result<usize, DocumentError> {
            Ok(3)
        }

        fn page_info(&self, page: usize) -> Result<PageInfo, DocumentError> {
            if page == 1 {
                return Err(DocumentError::MissingMediaBox { page });
            }
            Ok(PageInfo { index: page, size: PageSize::new(500.0, 500.0), rotation: Rotation::None })
        }
    }

    #[test]
    fn scans_every_page() {
        let mut loader = DocumentLoader::new();
        let document = SyntheticDocument::uniform(4, PageSize::new(612.0, 792.0)).with_title("T");
        loader.start(Arc::new(document)).unwrap();

        let Some(LoadOutcome::Loaded(layout)) = loader.wait(WAIT) else {
            panic!("scan should finish");
        };
        assert_eq!(layout.page_sizes.len(), 4);
        assert_eq!(layout.info.title.as_deref(), Some("T"));
        assert!(layout.geometry_errors.is_empty());
        assert!(!loader.is_loading());
    }

    #[test]
    fn unreadable_document_fails() {
        let mut loader = DocumentLoader::new();
        loader.start(Arc::new(BrokenDocument)).unwrap();

        let outcome = loader.wait(WAIT).unwrap();
        assert!(matches!(outcome, LoadOutcome::Failed(ViewerError::DocumentUnavailable(_))));
    }

    #[test]
    fn unreadable_page_gets_default_size() {
        let mut loader = DocumentLoader::new();
        loader.start(Arc::new(PartialDocument)).unwrap();

        let Some(LoadOutcome::Loaded(layout)) = loader.wait(WAIT) else {
            panic!("scan should finish");
        };
        assert_eq!(layout.page_sizes[1], DEFAULT_PAGE_SIZE);
        assert_eq!(layout.page_sizes[2], PageSize::new(500.0, 500.0));
        assert!(matches!(
            layout.geometry_errors.as_slice(),
            [ViewerError::GeometryUnavailable { page: 1, .. }]
        ));
    }

    #[test]
    fn replaced_scan_never_reports() {
        let (release, gate) = flume::unbounded();
        let mut loader = DocumentLoader::new();

        loader.start(Arc::new(SlowDocument { pages: 2, gate })).unwrap();
        loader.start(Arc::new(SyntheticDocument::uniform(5, PageSize::new(1.0, 1.0)))).unwrap();

        // Let the first scan run to completion
        release.send(()).unwrap();
        release.send(()).unwrap();

        let Some(LoadOutcome::Loaded(layout)) = loader.wait(WAIT) else {
            panic!("second scan should finish");
        };
        assert_eq!(layout.page_sizes.len(), 5);

        std::thread::sleep(Duration::from_millis(50));
        assert!(loader.poll().is_none());
    }
}
