//! Shared HTTP plumbing for venue adapters.
//!
//! Each adapter owns one [`VenueHttp`]: a reqwest client with bounded
//! timeouts plus a governor rate limiter sized from configuration. The
//! response handler maps status codes into the shared error taxonomy,
//! honouring `Retry-After` on 429s.

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::Client;
use spot_arb_core::{ExchangeSettings, VenueError, VenueId, VenueResult};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP client, base URL, and request quota for one venue.
pub struct VenueHttp {
    venue: VenueId,
    base_url: String,
    client: Client,
    limiter: Arc<DirectLimiter>,
}

impl VenueHttp {
    /// Builds the client from per-venue settings.
    ///
    /// # Errors
    /// Returns [`VenueError::Network`] if the client cannot be built.
    pub fn new(venue: VenueId, settings: &ExchangeSettings) -> VenueResult<Self> {
        let base_url = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| venue.default_endpoint().to_string());
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| VenueError::Network(format!("failed to build HTTP client: {e}")))?;
        let rpm = NonZeroU32::new(settings.requests_per_minute).unwrap_or(nonzero!(60u32));
        let limiter = Arc::new(RateLimiter::direct(Quota::per_minute(rpm)));
        Ok(Self {
            venue,
            base_url,
            client,
            limiter,
        })
    }

    /// The venue this client talks to.
    #[must_use]
    pub fn venue(&self) -> VenueId {
        self.venue
    }

    /// The configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a path.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The underlying reqwest client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Waits until the venue's request quota admits another call.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    /// Maps a response into `T`, converting error statuses into the
    /// shared taxonomy.
    ///
    /// # Errors
    /// `RateLimited` on 429 (honouring `Retry-After`), `Auth` on
    /// 401/403, `Api` otherwise, `Serialization` on undecodable bodies.
    pub async fn handle_json<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> VenueResult<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(VenueError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let text = response.text().await.unwrap_or_default();
            return Err(VenueError::Auth(format!(
                "{}: {} {}",
                self.venue,
                status.as_u16(),
                truncate(&text, 200)
            )));
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VenueError::api(status.as_u16(), truncate(&text, 500)));
        }

        response.json::<T>().await.map_err(|e| {
            VenueError::Serialization(format!("{}: undecodable body: {e}", self.venue))
        })
    }
}

impl std::fmt::Debug for VenueHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueHttp")
            .field("venue", &self.venue)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let http = VenueHttp::new(VenueId::Wallex, &ExchangeSettings::default()).unwrap();
        assert_eq!(http.url("/v1/depth"), "https://api.wallex.ir/v1/depth");
    }

    #[test]
    fn test_endpoint_override() {
        let settings = ExchangeSettings {
            endpoint: Some("http://localhost:9000".into()),
            ..ExchangeSettings::default()
        };
        let http = VenueHttp::new(VenueId::Nobitex, &settings).unwrap();
        assert_eq!(http.base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("hi", 10), "hi");
        // Multibyte input must not split a char.
        assert_eq!(truncate("héllo", 2), "hé");
    }

    #[tokio::test]
    async fn test_acquire_does_not_block_first_call() {
        let http = VenueHttp::new(VenueId::Kucoin, &ExchangeSettings::default()).unwrap();
        tokio::time::timeout(Duration::from_millis(100), http.acquire())
            .await
            .expect("first acquire should be immediate");
    }
}
