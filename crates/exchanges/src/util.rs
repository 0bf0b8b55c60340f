//! Parsing helpers shared by the venue adapters.
//!
//! Venue APIs disagree on whether prices come back as JSON strings or
//! numbers, and some books arrive unsorted or with duplicate levels.
//! Everything is normalised here before it reaches the typed snapshot.

use rust_decimal::Decimal;
use spot_arb_core::{BookLevel, Symbol, VenueError, VenueResult};
use std::str::FromStr;

/// Resolves the canonical symbol of an order from the caller's hint or
/// the venue's response, in that order of preference.
///
/// # Errors
/// Returns [`VenueError::Serialization`] when neither source yields a
/// parseable symbol.
pub fn resolve_symbol(hint: Option<&Symbol>, from_venue: Option<&str>) -> VenueResult<Symbol> {
    if let Some(symbol) = hint {
        return Ok(symbol.clone());
    }
    from_venue
        .and_then(|s| Symbol::parse(s).ok())
        .ok_or_else(|| {
            VenueError::Serialization(format!(
                "order response carries no parseable symbol ({from_venue:?})"
            ))
        })
}

/// Parses a decimal out of a JSON string or number.
#[must_use]
pub fn decimal_from_value(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(|f| Decimal::try_from(f).ok())
            }
        }
        _ => None,
    }
}

/// Parses a `[price, quantity]` array level.
#[must_use]
pub fn level_from_pair(pair: &[serde_json::Value]) -> Option<BookLevel> {
    if pair.len() < 2 {
        return None;
    }
    let price = decimal_from_value(&pair[0])?;
    let quantity = decimal_from_value(&pair[1])?;
    Some(BookLevel::new(price, quantity))
}

/// Drops non-positive entries, sorts (`descending` for bids), and merges
/// duplicate price levels so the snapshot invariants hold.
#[must_use]
pub fn normalize_levels(mut levels: Vec<BookLevel>, descending: bool) -> Vec<BookLevel> {
    levels.retain(|l| l.price > Decimal::ZERO && l.quantity > Decimal::ZERO);
    if descending {
        levels.sort_by(|a, b| b.price.cmp(&a.price));
    } else {
        levels.sort_by(|a, b| a.price.cmp(&b.price));
    }
    let mut merged: Vec<BookLevel> = Vec::with_capacity(levels.len());
    for level in levels {
        match merged.last_mut() {
            Some(last) if last.price == level.price => last.quantity += level.quantity,
            _ => merged.push(level),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_decimal_from_string_and_number() {
        assert_eq!(decimal_from_value(&json!("65000.5")), Some(dec!(65000.5)));
        assert_eq!(decimal_from_value(&json!(65000)), Some(dec!(65000)));
        assert_eq!(decimal_from_value(&json!(0.25)), Some(dec!(0.25)));
        assert_eq!(decimal_from_value(&json!(" 1.5 ")), Some(dec!(1.5)));
        assert_eq!(decimal_from_value(&json!(null)), None);
        assert_eq!(decimal_from_value(&json!("abc")), None);
    }

    #[test]
    fn test_level_from_pair() {
        let pair = [json!("65000"), json!("0.5")];
        let level = level_from_pair(&pair).unwrap();
        assert_eq!(level.price, dec!(65000));
        assert_eq!(level.quantity, dec!(0.5));
        assert!(level_from_pair(&[json!("65000")]).is_none());
    }

    #[test]
    fn test_resolve_symbol_prefers_hint() {
        let hint = Symbol::parse("BTCIRT").unwrap();
        let resolved = resolve_symbol(Some(&hint), Some("ETHUSDT")).unwrap();
        assert_eq!(resolved, hint);

        let from_venue = resolve_symbol(None, Some("BTCTMN")).unwrap();
        assert_eq!(from_venue.quote_currency(), "IRT");

        assert!(resolve_symbol(None, None).is_err());
        assert!(resolve_symbol(None, Some("???")).is_err());
    }

    #[test]
    fn test_normalize_sorts_and_merges() {
        let raw = vec![
            BookLevel::new(dec!(100), dec!(1)),
            BookLevel::new(dec!(102), dec!(2)),
            BookLevel::new(dec!(100), dec!(3)),
            BookLevel::new(dec!(0), dec!(5)),
            BookLevel::new(dec!(101), dec!(-1)),
        ];
        let bids = normalize_levels(raw.clone(), true);
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].price, dec!(102));
        assert_eq!(bids[1].price, dec!(100));
        assert_eq!(bids[1].quantity, dec!(4));

        let asks = normalize_levels(raw, false);
        assert_eq!(asks[0].price, dec!(100));
        assert_eq!(asks[1].price, dec!(102));
    }
}
