//! Venue identity and static per-venue metadata.
//!
//! Venues form a closed set. Everything the rest of the system needs to
//! know about a venue without talking to it lives here: display name,
//! default endpoint, symbol rendering style, preferred Iranian quote
//! alias, authentication scheme, and default fee schedule.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// =============================================================================
// Venue Identifiers
// =============================================================================

/// Identifies which venue a snapshot, order, or balance belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    /// Nobitex (IRT markets, token auth).
    Nobitex,
    /// Wallex (TMN and USDT markets, HMAC auth).
    Wallex,
    /// Invex (IRR and USDT markets, RSA-PSS body signing).
    Invex,
    /// Tabdeal (IRT markets, Binance-style HMAC auth).
    Tabdeal,
    /// KuCoin (USDT markets, passphrase-HMAC auth).
    Kucoin,
}

impl VenueId {
    /// All venues, in registry order.
    pub const ALL: [VenueId; 5] = [
        VenueId::Nobitex,
        VenueId::Wallex,
        VenueId::Invex,
        VenueId::Tabdeal,
        VenueId::Kucoin,
    ];

    /// Returns the display name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nobitex => "Nobitex",
            Self::Wallex => "Wallex",
            Self::Invex => "Invex",
            Self::Tabdeal => "Tabdeal",
            Self::Kucoin => "KuCoin",
        }
    }

    /// Default base endpoint for the venue's REST API.
    #[must_use]
    pub fn default_endpoint(self) -> &'static str {
        match self {
            Self::Nobitex => "https://apiv2.nobitex.ir",
            Self::Wallex => "https://api.wallex.ir",
            Self::Invex => "https://api.invex.ir/trading/v1",
            Self::Tabdeal => "https://api.tabdeal.org",
            Self::Kucoin => "https://api.kucoin.com",
        }
    }

    /// How the venue renders trading symbols.
    #[must_use]
    pub fn symbol_style(self) -> SymbolStyle {
        match self {
            Self::Nobitex | Self::Wallex | Self::Tabdeal => SymbolStyle::Plain,
            Self::Invex => SymbolStyle::Underscore,
            Self::Kucoin => SymbolStyle::Hyphen,
        }
    }

    /// The alias this venue uses for the Iranian toman family, if it
    /// lists toman markets at all.
    #[must_use]
    pub fn toman_alias(self) -> Option<&'static str> {
        match self {
            Self::Nobitex | Self::Tabdeal => Some("IRT"),
            Self::Wallex => Some("TMN"),
            Self::Invex => Some("IRR"),
            Self::Kucoin => None,
        }
    }

    /// Quote currencies the venue lists markets in, in the venue's own
    /// spelling.
    #[must_use]
    pub fn supported_quotes(self) -> &'static [&'static str] {
        match self {
            Self::Nobitex => &["IRT"],
            Self::Wallex => &["USDT", "TMN"],
            Self::Invex => &["USDT", "IRR"],
            Self::Tabdeal => &["IRT"],
            Self::Kucoin => &["USDT"],
        }
    }

    /// Authentication scheme the venue requires for signed endpoints.
    #[must_use]
    pub fn auth_scheme(self) -> AuthScheme {
        match self {
            Self::Nobitex => AuthScheme::BearerToken,
            Self::Wallex | Self::Tabdeal => AuthScheme::HmacSha256,
            Self::Invex => AuthScheme::RsaPssSha256,
            Self::Kucoin => AuthScheme::PassphraseHmac,
        }
    }

    /// Default maker fee rate.
    #[must_use]
    pub fn default_maker_fee(self) -> Decimal {
        match self {
            Self::Kucoin => dec!(0.001),
            _ => dec!(0.0005),
        }
    }

    /// Default taker fee rate.
    #[must_use]
    pub fn default_taker_fee(self) -> Decimal {
        dec!(0.001)
    }

    /// Whether the venue honours a post-only flag on limit orders.
    ///
    /// The Iranian venues accept limit orders that can still cross the
    /// book; only KuCoin enforces `postOnly`.
    #[must_use]
    pub fn supports_post_only(self) -> bool {
        matches!(self, Self::Kucoin)
    }

    /// Maximum order book depth the venue will return.
    #[must_use]
    pub fn max_book_depth(self) -> usize {
        match self {
            Self::Invex => 50,
            Self::Kucoin => 100,
            _ => 20,
        }
    }

    /// Parses a venue from its name, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nobitex" => Some(Self::Nobitex),
            "wallex" => Some(Self::Wallex),
            "invex" => Some(Self::Invex),
            "tabdeal" => Some(Self::Tabdeal),
            "kucoin" => Some(Self::Kucoin),
            _ => None,
        }
    }
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Rendering and Authentication Styles
// =============================================================================

/// Symbol rendering style per venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolStyle {
    /// No separator: `BTCUSDT`.
    Plain,
    /// Hyphen separator: `BTC-USDT`.
    Hyphen,
    /// Underscore separator: `BTC_USDT`.
    Underscore,
}

/// Authentication scheme for a venue's signed endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthScheme {
    /// Static bearer token in the Authorization header.
    BearerToken,
    /// HMAC-SHA256 over the canonical query string, signature in a header.
    HmacSha256,
    /// RSA-PSS (SHA-256) over the canonical JSON body with sorted keys and
    /// an `expire_at` timestamp; signature injected into the body and the
    /// API key sent as a header.
    RsaPssSha256,
    /// HMAC-SHA256 with an additionally signed passphrase header.
    PassphraseHmac,
}
