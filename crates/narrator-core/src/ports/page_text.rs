//! Page text port.

use async_trait::async_trait;

use crate::domain::PageText;

/// Supplies the text of the page the reader is showing.
#[async_trait]
pub trait PageTextProvider: Send + Sync {
    /// Text of the current page, `None` when nothing readable is shown.
    async fn current_page(&self) -> Option<PageText>;

    /// Move the reader to the next page.
    ///
    /// Returns `false` when there is no next page.
    async fn turn_page(&self) -> bool;
}
