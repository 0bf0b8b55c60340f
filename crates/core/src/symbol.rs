//! Canonical instrument identity and venue-specific rendering.
//!
//! A symbol is a `(base, quote)` pair of uppercase currency codes. The
//! Iranian toman goes by three names across venues (IRT, IRR, TMN); all
//! three are the same currency and are normalised to `IRT` at parse time.
//! Two symbols are arbitrage-compatible iff their bases match and their
//! quote families match — `BTCIRT` and `BTCTMN` are the same market,
//! `BTCIRT` and `BTCUSDT` never are.

use crate::venue::{SymbolStyle, VenueId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Currency codes recognised as bases when splitting separator-free
/// symbols. Longest codes are tried first so `USDTIRT` splits as
/// USDT/IRT rather than USD/TIRT.
const KNOWN_BASES: &[&str] = &[
    "MATIC", "AVAX", "AAVE", "SHIB", "MANA", "SAND", "ATOM", "NEAR", "USDT", "USDC", "DOGE",
    "LINK", "BTC", "ETH", "LTC", "BNB", "ADA", "DOT", "XRP", "BCH", "EOS", "XLM", "ETC", "TRX",
    "UNI", "DAI", "FTM", "GMT", "SOL", "TON", "FIL", "APT", "ARB", "MKR", "AXS",
];

/// Currency codes recognised as quotes.
const KNOWN_QUOTES: &[&str] = &["USDT", "USDC", "IRT", "IRR", "TMN", "BTC", "ETH"];

/// Aliases of the Iranian toman. Canonical spelling is `IRT`.
const TOMAN_ALIASES: &[&str] = &["IRT", "IRR", "TMN"];

// =============================================================================
// Errors
// =============================================================================

/// Errors from symbol parsing and rendering.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SymbolError {
    /// The text could not be split into known base and quote codes.
    #[error("malformed symbol: {0}")]
    Malformed(String),

    /// The symbol's quote currency is not listed on the venue.
    #[error("symbol {symbol} is not supported on {venue}")]
    UnsupportedOnVenue {
        /// The canonical symbol.
        symbol: String,
        /// The venue that lacks the market.
        venue: VenueId,
    },
}

// =============================================================================
// Quote Family
// =============================================================================

/// Quote-equivalence class of a currency code.
///
/// IRT, IRR, and TMN all map to [`QuoteFamily::Toman`]; every other code
/// maps to itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteFamily {
    /// The Iranian toman family (IRT / IRR / TMN).
    Toman,
    /// Any other quote currency, identified by its code.
    Other(String),
}

impl QuoteFamily {
    /// Classifies a currency code into its family.
    #[must_use]
    pub fn of(code: &str) -> Self {
        let upper = code.to_ascii_uppercase();
        if TOMAN_ALIASES.contains(&upper.as_str()) {
            Self::Toman
        } else {
            Self::Other(upper)
        }
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// A canonical trading pair: uppercase base and quote currency codes,
/// with Iranian quote aliases normalised to `IRT`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    /// Creates a symbol from raw codes, uppercasing and normalising the
    /// quote to its canonical spelling.
    ///
    /// # Errors
    /// Returns [`SymbolError::Malformed`] if either code is empty.
    pub fn new(base: &str, quote: &str) -> Result<Self, SymbolError> {
        if base.is_empty() || quote.is_empty() {
            return Err(SymbolError::Malformed(format!("{base}/{quote}")));
        }
        let base = base.to_ascii_uppercase();
        let mut quote = quote.to_ascii_uppercase();
        if TOMAN_ALIASES.contains(&quote.as_str()) {
            quote = "IRT".to_string();
        }
        Ok(Self { base, quote })
    }

    /// Parses any of the forms `BASEQUOTE`, `BASE-QUOTE`, `BASE_QUOTE`
    /// into a canonical symbol.
    ///
    /// Separator-free input is split against the known-currency tables,
    /// trying longer base codes first.
    ///
    /// # Errors
    /// Returns [`SymbolError::Malformed`] if the split is ambiguous, a
    /// code is empty, or no known split exists.
    pub fn parse(text: &str) -> Result<Self, SymbolError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(SymbolError::Malformed(text.to_string()));
        }

        // Explicit separator: trust the split.
        for sep in ['-', '_'] {
            if let Some((base, quote)) = trimmed.split_once(sep) {
                if base.is_empty() || quote.is_empty() || quote.contains(sep) {
                    return Err(SymbolError::Malformed(text.to_string()));
                }
                return Self::new(base, quote);
            }
        }

        let clean = trimmed.to_ascii_uppercase();

        // Longest base prefix whose remainder is a known quote.
        let mut bases: Vec<&str> = KNOWN_BASES.to_vec();
        bases.sort_by_key(|b| std::cmp::Reverse(b.len()));
        for base in &bases {
            if let Some(rest) = clean.strip_prefix(base) {
                if KNOWN_QUOTES.contains(&rest) {
                    return Self::new(base, rest);
                }
            }
        }

        // Fallback: longest known quote suffix with a known base remainder.
        let mut quotes: Vec<&str> = KNOWN_QUOTES.to_vec();
        quotes.sort_by_key(|q| std::cmp::Reverse(q.len()));
        for quote in &quotes {
            if let Some(rest) = clean.strip_suffix(quote) {
                if !rest.is_empty() && KNOWN_BASES.contains(&rest) {
                    return Self::new(rest, quote);
                }
            }
        }

        Err(SymbolError::Malformed(text.to_string()))
    }

    /// Returns the base currency code.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Returns the canonical quote currency code.
    #[must_use]
    pub fn quote_currency(&self) -> &str {
        &self.quote
    }

    /// Returns the quote family of this symbol.
    #[must_use]
    pub fn quote_family(&self) -> QuoteFamily {
        QuoteFamily::of(&self.quote)
    }

    /// Returns true if the two symbols refer to the same market for
    /// arbitrage: identical bases and identical quote families.
    #[must_use]
    pub fn compatible(&self, other: &Self) -> bool {
        self.base == other.base && self.quote_family() == other.quote_family()
    }

    /// Key identifying the market a symbol belongs to across venues.
    #[must_use]
    pub fn market_key(&self) -> (String, QuoteFamily) {
        (self.base.clone(), self.quote_family())
    }

    /// Renders the symbol in the venue's native format, substituting the
    /// venue's preferred toman alias for IRT-family quotes.
    ///
    /// # Errors
    /// Returns [`SymbolError::UnsupportedOnVenue`] when the venue lists no
    /// market with a compatible quote currency.
    pub fn render(&self, venue: VenueId) -> Result<String, SymbolError> {
        let quote = if self.quote_family() == QuoteFamily::Toman {
            venue
                .toman_alias()
                .ok_or_else(|| SymbolError::UnsupportedOnVenue {
                    symbol: self.to_string(),
                    venue,
                })?
        } else {
            let supported = venue
                .supported_quotes()
                .iter()
                .any(|q| *q == self.quote && QuoteFamily::of(q) != QuoteFamily::Toman);
            if !supported {
                return Err(SymbolError::UnsupportedOnVenue {
                    symbol: self.to_string(),
                    venue,
                });
            }
            self.quote.as_str()
        };

        Ok(match venue.symbol_style() {
            SymbolStyle::Plain => format!("{}{}", self.base, quote),
            SymbolStyle::Hyphen => format!("{}-{}", self.base, quote),
            SymbolStyle::Underscore => format!("{}_{}", self.base, quote),
        })
    }

    /// Returns true if the venue lists a market for this symbol.
    #[must_use]
    pub fn supported_on(&self, venue: VenueId) -> bool {
        self.render(venue).is_ok()
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.base, self.quote)
    }
}

impl std::str::FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Parsing Tests ====================

    #[test]
    fn test_parse_plain() {
        let s = Symbol::parse("BTCUSDT").unwrap();
        assert_eq!(s.base(), "BTC");
        assert_eq!(s.quote_currency(), "USDT");
    }

    #[test]
    fn test_parse_hyphen_and_underscore() {
        assert_eq!(Symbol::parse("BTC-USDT").unwrap(), Symbol::parse("BTCUSDT").unwrap());
        assert_eq!(Symbol::parse("BTC_USDT").unwrap(), Symbol::parse("BTCUSDT").unwrap());
    }

    #[test]
    fn test_parse_lowercase() {
        let s = Symbol::parse("ethirt").unwrap();
        assert_eq!(s.base(), "ETH");
        assert_eq!(s.quote_currency(), "IRT");
    }

    #[test]
    fn test_parse_normalises_toman_aliases() {
        for raw in ["BTCIRT", "BTCIRR", "BTCTMN", "BTC-TMN", "BTC_IRR"] {
            let s = Symbol::parse(raw).unwrap();
            assert_eq!(s.quote_currency(), "IRT", "from {raw}");
        }
    }

    #[test]
    fn test_parse_usdt_base_not_shadowed() {
        // USDTIRT must split as USDT/IRT, not USD/TIRT.
        let s = Symbol::parse("USDTIRT").unwrap();
        assert_eq!(s.base(), "USDT");
        assert_eq!(s.quote_currency(), "IRT");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(Symbol::parse(""), Err(SymbolError::Malformed(_))));
        assert!(matches!(Symbol::parse("BTC"), Err(SymbolError::Malformed(_))));
        assert!(matches!(Symbol::parse("-USDT"), Err(SymbolError::Malformed(_))));
        assert!(matches!(Symbol::parse("BTC-"), Err(SymbolError::Malformed(_))));
        assert!(matches!(Symbol::parse("ZZZQQQ"), Err(SymbolError::Malformed(_))));
        assert!(matches!(Symbol::parse("BTC-USDT-X"), Err(SymbolError::Malformed(_))));
    }

    // ==================== Family & Compatibility Tests ====================

    #[test]
    fn test_quote_family() {
        assert_eq!(QuoteFamily::of("IRT"), QuoteFamily::Toman);
        assert_eq!(QuoteFamily::of("irr"), QuoteFamily::Toman);
        assert_eq!(QuoteFamily::of("TMN"), QuoteFamily::Toman);
        assert_eq!(QuoteFamily::of("USDT"), QuoteFamily::Other("USDT".into()));
    }

    #[test]
    fn test_compatible_reflexive_and_symmetric() {
        let a = Symbol::parse("BTCIRT").unwrap();
        let b = Symbol::parse("BTCTMN").unwrap();
        assert!(a.compatible(&a));
        assert!(a.compatible(&b));
        assert!(b.compatible(&a));
    }

    #[test]
    fn test_toman_family_mutually_compatible() {
        let irt = Symbol::parse("BTCIRT").unwrap();
        let irr = Symbol::parse("BTCIRR").unwrap();
        let tmn = Symbol::parse("BTCTMN").unwrap();
        assert!(irt.compatible(&irr));
        assert!(irr.compatible(&tmn));
        assert!(tmn.compatible(&irt));
    }

    #[test]
    fn test_irt_never_compatible_with_usdt() {
        let irt = Symbol::parse("BTCIRT").unwrap();
        let usdt = Symbol::parse("BTCUSDT").unwrap();
        assert!(!irt.compatible(&usdt));
        assert!(!usdt.compatible(&irt));
    }

    #[test]
    fn test_different_bases_incompatible() {
        let btc = Symbol::parse("BTCUSDT").unwrap();
        let eth = Symbol::parse("ETHUSDT").unwrap();
        assert!(!btc.compatible(&eth));
    }

    // ==================== Rendering Tests ====================

    #[test]
    fn test_render_styles() {
        let s = Symbol::parse("BTCUSDT").unwrap();
        assert_eq!(s.render(VenueId::Wallex).unwrap(), "BTCUSDT");
        assert_eq!(s.render(VenueId::Invex).unwrap(), "BTC_USDT");
        assert_eq!(s.render(VenueId::Kucoin).unwrap(), "BTC-USDT");
    }

    #[test]
    fn test_render_toman_substitution() {
        let s = Symbol::parse("BTCIRT").unwrap();
        assert_eq!(s.render(VenueId::Nobitex).unwrap(), "BTCIRT");
        assert_eq!(s.render(VenueId::Wallex).unwrap(), "BTCTMN");
        assert_eq!(s.render(VenueId::Invex).unwrap(), "BTC_IRR");
        assert_eq!(s.render(VenueId::Tabdeal).unwrap(), "BTCIRT");
    }

    #[test]
    fn test_render_unsupported_quote() {
        let irt = Symbol::parse("BTCIRT").unwrap();
        assert!(matches!(
            irt.render(VenueId::Kucoin),
            Err(SymbolError::UnsupportedOnVenue { .. })
        ));
        let usdt = Symbol::parse("BTCUSDT").unwrap();
        assert!(matches!(
            usdt.render(VenueId::Nobitex),
            Err(SymbolError::UnsupportedOnVenue { .. })
        ));
    }

    #[test]
    fn test_render_parse_roundtrip_all_supported_pairs() {
        let symbols = [
            Symbol::parse("BTCUSDT").unwrap(),
            Symbol::parse("ETHUSDT").unwrap(),
            Symbol::parse("BTCIRT").unwrap(),
            Symbol::parse("ETHIRT").unwrap(),
        ];
        for symbol in &symbols {
            for venue in VenueId::ALL {
                if let Ok(rendered) = symbol.render(venue) {
                    let back = Symbol::parse(&rendered).unwrap();
                    assert_eq!(&back, symbol, "round-trip via {venue}: {rendered}");
                }
            }
        }
    }

    #[test]
    fn test_display_is_canonical() {
        assert_eq!(Symbol::parse("BTC_TMN").unwrap().to_string(), "BTCIRT");
    }
}
