//! Symbol utilities and the symbol universe.
//!
//! A symbol is an upper-case trading pair identifier quoted in a single asset
//! (e.g. `BTCUSDT` for the `USDT` quote). Providers disagree on the format:
//! exchanges report pairs (`BTCUSDT`), metadata feeds report base coins
//! (`btc`). Everything is normalized to the pair form before merging.

use std::collections::BTreeSet;

use serde::Deserialize;

/// Trading pair identifier, e.g. `"BTCUSDT"`.
pub type Symbol = String;

/// Normalize a user- or provider-supplied symbol: trim and upper-case.
#[inline]
pub fn normalize_symbol(s: &str) -> Symbol {
    s.trim().to_ascii_uppercase()
}

/// Build the pair symbol for a base coin, e.g. (`"btc"`, `"USDT"`) → `"BTCUSDT"`.
pub fn pair_symbol(base: &str, quote: &str) -> Symbol {
    format!("{}{}", normalize_symbol(base), normalize_symbol(quote))
}

/// Extract the base asset from a pair symbol, e.g. `"BTCUSDT"` → `"BTC"`.
///
/// Returns `None` if the symbol is not quoted in `quote` or the base would
/// be empty.
pub fn base_asset<'a>(symbol: &'a str, quote: &str) -> Option<&'a str> {
    symbol.strip_suffix(quote).filter(|base| !base.is_empty())
}

/// The set of symbols the engine aggregates.
///
/// Either an explicit list or, when no list is configured, every pair
/// quoted in `quote_asset`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SymbolUniverse {
    /// Quote asset all pairs are expressed in (e.g. `"USDT"`).
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Explicit symbol list. `None` (or empty) means "every pair in the quote asset".
    #[serde(default)]
    pub symbols: Option<BTreeSet<Symbol>>,
}

impl SymbolUniverse {
    /// Universe of every pair quoted in `quote_asset`.
    pub fn quoted_in(quote_asset: &str) -> Self {
        Self { quote_asset: normalize_symbol(quote_asset), symbols: None }
    }

    /// Universe restricted to an explicit symbol list.
    pub fn explicit<I, S>(quote_asset: &str, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            quote_asset: normalize_symbol(quote_asset),
            symbols: Some(symbols.into_iter().map(|s| normalize_symbol(s.as_ref())).collect()),
        }
    }

    /// Copy with the quote asset and every listed symbol normalized.
    ///
    /// Deserialized universes keep whatever casing the config file used.
    pub fn normalized(&self) -> Self {
        match &self.symbols {
            Some(symbols) => Self::explicit(&self.quote_asset, symbols),
            None => Self::quoted_in(&self.quote_asset),
        }
    }

    /// Returns the explicit symbol list, if one is configured and non-empty.
    pub fn explicit_symbols(&self) -> Option<&BTreeSet<Symbol>> {
        self.symbols.as_ref().filter(|s| !s.is_empty())
    }

    /// Whether `symbol` (already normalized) belongs to the universe.
    pub fn contains(&self, symbol: &str) -> bool {
        match self.explicit_symbols() {
            Some(set) => set.contains(symbol),
            None => base_asset(symbol, &self.quote_asset).is_some(),
        }
    }

    /// Map a base coin to its pair symbol, if that pair is in the universe.
    ///
    /// A base equal to the quote asset (e.g. `USDT` itself) has no pair.
    pub fn pair_for_base(&self, base: &str) -> Option<Symbol> {
        let base = normalize_symbol(base);
        if base.is_empty() || base == self.quote_asset {
            return None;
        }
        let pair = pair_symbol(&base, &self.quote_asset);
        self.contains(&pair).then_some(pair)
    }
}

impl Default for SymbolUniverse {
    fn default() -> Self {
        Self::quoted_in(&default_quote_asset())
    }
}

fn default_quote_asset() -> String {
    "USDT".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_symbol(" btcusdt "), "BTCUSDT");
        assert_eq!(pair_symbol("eth", "usdt"), "ETHUSDT");
    }

    #[test]
    fn base_asset_extraction() {
        assert_eq!(base_asset("BTCUSDT", "USDT"), Some("BTC"));
        assert_eq!(base_asset("USDT", "USDT"), None);
        assert_eq!(base_asset("BTCUSDC", "USDT"), None);
    }

    #[test]
    fn quote_rule_universe() {
        let u = SymbolUniverse::quoted_in("usdt");
        assert!(u.contains("BTCUSDT"));
        assert!(!u.contains("BTCUSDC"));
        assert!(!u.contains("USDT"));
        assert_eq!(u.pair_for_base("btc").as_deref(), Some("BTCUSDT"));
        assert_eq!(u.pair_for_base("usdt"), None);
    }

    #[test]
    fn explicit_universe() {
        let u = SymbolUniverse::explicit("USDT", ["btcusdt", "ETHUSDT"]);
        assert!(u.contains("BTCUSDT"));
        assert!(!u.contains("SOLUSDT"));
        assert_eq!(u.pair_for_base("sol"), None);
        assert_eq!(u.pair_for_base("eth").as_deref(), Some("ETHUSDT"));
    }

    #[test]
    fn deserialized_universe_is_normalized() {
        let u: SymbolUniverse =
            serde_json::from_str(r#"{"quote_asset": "usdt", "symbols": ["btcusdt"]}"#).unwrap();
        let u = u.normalized();
        assert_eq!(u.quote_asset, "USDT");
        assert!(u.contains("BTCUSDT"));
    }

    #[test]
    fn empty_explicit_list_falls_back_to_quote_rule() {
        let u = SymbolUniverse::explicit("USDT", Vec::<String>::new());
        assert!(u.contains("SOLUSDT"));
    }
}
