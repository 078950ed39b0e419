//! Notifications from the controller to the host

use crate::error::ViewerError;

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    /// The page under the reading line changed (zero-based `current`)
    PageChanged { current: usize, total: usize },
    /// A document started (`true`) or finished (`false`) loading
    LoadingStateChanged(bool),
    Error(ViewerError),
    /// A freshly rendered bitmap for `page` is in the cache; redraw
    CacheChanged { page: usize },
}
