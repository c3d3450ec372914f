//! Landing-page fetcher with SSRF protection.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use funnelport_shared::{FunnelError, Result};

use crate::PageSource;

/// User-Agent string for page requests.
const USER_AGENT: &str = concat!("funnelport/", env!("CARGO_PKG_VERSION"));

/// Pages larger than this are rejected (5 MB).
const MAX_PAGE_BYTES: u64 = 5 * 1024 * 1024;

const COLLABORATOR: &str = "scrape";

/// Fetches raw landing-page HTML over HTTP.
pub struct HttpPageSource {
    client: Client,
    /// Allow localhost/private IPs (integration tests, self-hosted funnels).
    allow_private_hosts: bool,
}

impl HttpPageSource {
    pub fn new(timeout: Duration, allow_private_hosts: bool) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| {
                FunnelError::collaborator(COLLABORATOR, format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            allow_private_hosts,
        })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    #[instrument(skip(self))]
    async fn scrape(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)
            .map_err(|e| FunnelError::validation(format!("invalid funnel URL '{url}': {e}")))?;

        if !self.allow_private_hosts && is_ssrf_target(&parsed) {
            warn!(%url, "SSRF protection: blocked");
            return Err(FunnelError::validation(format!(
                "refusing to fetch private or non-HTTP address: {url}"
            )));
        }

        let response = self
            .client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| FunnelError::collaborator(COLLABORATOR, format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FunnelError::collaborator(
                COLLABORATOR,
                format!("{url}: HTTP {status}"),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_PAGE_BYTES {
                return Err(FunnelError::validation(format!(
                    "{url}: page too large ({len} bytes, max {MAX_PAGE_BYTES})"
                )));
            }
        }

        let body = response.text().await.map_err(|e| {
            FunnelError::collaborator(COLLABORATOR, format!("{url}: body read failed: {e}"))
        })?;
        debug!(bytes = body.len(), "page fetched");
        Ok(body)
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub(crate) fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
