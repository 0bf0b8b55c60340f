//! Venue adapters for the cross-venue spot arbitrage engine.
//!
//! One adapter per venue, each composed from a signing strategy, an
//! endpoint map, the shared symbol renderer, and a fee table, behind the
//! uniform [`VenueAdapter`] trait. Transient transport failures are
//! retried with jittered backoff; authentication errors and business
//! rejections surface immediately.
//!
//! # Venues
//!
//! | Venue | Quotes | Auth |
//! |-------|--------|------|
//! | Nobitex | IRT | bearer token |
//! | Wallex | TMN, USDT | HMAC-SHA256 |
//! | Invex | IRR, USDT | RSA-PSS body signing |
//! | Tabdeal | IRT | HMAC-SHA256 (Binance style) |
//! | KuCoin | USDT | passphrase-HMAC |

pub mod adapter;
pub mod auth;
pub mod http;
pub mod invex;
pub mod kucoin;
pub mod nobitex;
pub mod paper;
pub mod retry;
pub mod tabdeal;
pub mod util;
pub mod wallex;

pub use adapter::{decimal_str, PlaceOrderRequest, VenueAdapter};
pub use invex::InvexAdapter;
pub use kucoin::KucoinAdapter;
pub use nobitex::NobitexAdapter;
pub use paper::{PaperBehavior, PaperVenue};
pub use retry::{retry, RetryPolicy};
pub use tabdeal::TabdealAdapter;
pub use wallex::WallexAdapter;

use spot_arb_core::{ExchangeSettings, VenueId, VenueResult};
use std::sync::Arc;

/// Builds the adapter for a venue from its settings.
///
/// # Errors
/// Returns an error if the HTTP client cannot be built or credentials
/// fail to parse.
pub fn build_adapter(
    venue: VenueId,
    settings: &ExchangeSettings,
) -> VenueResult<Arc<dyn VenueAdapter>> {
    Ok(match venue {
        VenueId::Nobitex => Arc::new(NobitexAdapter::new(settings)?),
        VenueId::Wallex => Arc::new(WallexAdapter::new(settings)?),
        VenueId::Invex => Arc::new(InvexAdapter::new(settings)?),
        VenueId::Tabdeal => Arc::new(TabdealAdapter::new(settings)?),
        VenueId::Kucoin => Arc::new(KucoinAdapter::new(settings)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_adapter_for_every_venue() {
        for venue in VenueId::ALL {
            let adapter = build_adapter(venue, &ExchangeSettings::default()).unwrap();
            assert_eq!(adapter.venue(), venue);
            // Without credentials every adapter is read-only.
            assert!(!adapter.is_authenticated());
        }
    }
}
