//! Error kinds surfaced by the viewer

use pageview_render::{DocumentError, RenderError};

/// Errors delivered to the host through [`ViewerEvent::Error`](crate::ViewerEvent::Error)
///
/// `DocumentUnavailable` ends the viewing session; the other kinds are
/// local to one page and recovered from automatically.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewerError {
    #[error("document unavailable: {0}")]
    DocumentUnavailable(String),
    #[error("page {page} failed to render: {message}")]
    PageRenderFailure { page: usize, message: String },
    #[error("page {page} has no usable dimensions ({message}); using a default page size")]
    GeometryUnavailable { page: usize, message: String },
}

impl ViewerError {
    pub fn document_unavailable(error: &DocumentError) -> Self {
        ViewerError::DocumentUnavailable(error.to_string())
    }

    pub fn page_render_failure(page: usize, error: &RenderError) -> Self {
        ViewerError::PageRenderFailure { page, message: error.to_string() }
    }

    pub fn geometry_unavailable(page: usize, error: &DocumentError) -> Self {
        ViewerError::GeometryUnavailable { page, message: error.to_string() }
    }

    /// Whether the session cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, ViewerError::DocumentUnavailable(_))
    }

    /// The page the error concerns, if it is page-local
    pub fn page(&self) -> Option<usize> {
        match self {
            ViewerError::DocumentUnavailable(_) => None,
            ViewerError::PageRenderFailure { page, .. }
            | ViewerError::GeometryUnavailable { page, .. } => Some(*page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_document_errors_are_fatal() {
        let fatal = ViewerError::document_unavailable(&DocumentError::Empty);
        assert!(fatal.is_fatal());
        assert_eq!(fatal.page(), None);

        let local =
            ViewerError::page_render_failure(3, &RenderError::Backend("out of memory".into()));
        assert!(!local.is_fatal());
        assert_eq!(local.page(), Some(3));
        assert_eq!(local.to_string(), "page 3 failed to render: backend error: out of memory");
    }
}
