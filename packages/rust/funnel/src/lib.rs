//! Landing-page scraping and funnel blueprint extraction.
//!
//! [`PageSource`] is the scrape collaborator seam; [`HttpPageSource`] is the
//! production implementation. [`extract`] turns raw HTML into a
//! [`funnelport_shared::FunnelBlueprint`].

mod extract;
mod price;
mod scrape;

use async_trait::async_trait;
use funnelport_shared::Result;

pub use extract::extract;
pub use price::parse_price;
pub use scrape::HttpPageSource;

/// Landing-page scrape collaborator.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Raw HTML of the page at `url`.
    async fn scrape(&self, url: &str) -> Result<String>;
}
