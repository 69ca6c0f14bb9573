use crate::domain::asset::AssetType;
use crate::domain::scope::MarketScope;

/// Known crypto quote-currency suffixes used to recognize pairs like
/// `BTC-USD` without a round trip to the provider.
const CRYPTO_QUOTES: &[&str] = &["USD", "USDT", "USDC", "EUR", "BTC", "ETH"];

/// Exchange codes known to this deployment, used to decide whether a
/// suffix the caller already supplied is a real exchange code rather
/// than part of the symbol itself (spec §6 asset-id grammar).
const KNOWN_EXCHANGES: &[&str] = &[
    "US", "LSE", "PA", "XETRA", "AS", "MI", "SW", "JSE", "NG", "EGX", "NSE", "CAI",
];

/// `asset_id := <symbol>.<exchange>`. Crypto kept as-is, FX coerced to
/// pair format, futures kept as their quoted contract (spec §4.3).
pub fn normalize(raw: &str, default_exchange: &str) -> String {
    let raw = raw.trim().to_ascii_uppercase();

    if is_crypto_pair(&raw) {
        return raw;
    }

    if let Some(pair) = as_fx_pair(&raw) {
        return pair;
    }

    if let Some((symbol, exchange)) = raw.rsplit_once('.') {
        if KNOWN_EXCHANGES.contains(&exchange) {
            return format!("{symbol}.{exchange}");
        }
    }

    format!("{raw}.{}", default_exchange.to_ascii_uppercase())
}

fn is_crypto_pair(raw: &str) -> bool {
    if let Some((_base, quote)) = raw.split_once('-') {
        return CRYPTO_QUOTES.contains(&quote);
    }
    false
}

fn as_fx_pair(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| c.is_ascii_alphabetic()).collect();
    if stripped.len() == 6 && raw.chars().all(|c| c.is_ascii_alphabetic() || c == '/' || c == '.') {
        let (base, quote) = stripped.split_at(3);
        if CURRENCY_CODES.contains(&base) && CURRENCY_CODES.contains(&quote) {
            return Some(format!("{base}/{quote}"));
        }
    }
    None
}

const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "NZD", "ZAR", "NGN", "EGP", "KES",
];

/// Classify `asset_type` via suffix patterns (spec §4.11 step 1).
pub fn classify_asset_type(normalized_id: &str) -> AssetType {
    if is_crypto_pair(normalized_id) {
        return AssetType::Crypto;
    }
    if normalized_id.contains('/') {
        return AssetType::Fx;
    }
    AssetType::Equity
}

/// Derive `market_scope` from a suffix→scope table (spec §4.11 step 1).
pub fn scope_for_exchange(exchange_code: &str) -> MarketScope {
    match exchange_code.to_ascii_uppercase().as_str() {
        "JSE" | "NG" | "EGX" | "NSE" | "CAI" => MarketScope::Africa,
        _ => MarketScope::UsEu,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_symbol_with_default_exchange() {
        assert_eq!(normalize("aapl", "US"), "AAPL.US");
    }

    #[test]
    fn keeps_known_exchange_suffix() {
        assert_eq!(normalize("npn.jse", "US"), "NPN.JSE");
    }

    #[test]
    fn keeps_crypto_pairs_as_is() {
        assert_eq!(normalize("btc-usd", "US"), "BTC-USD");
    }

    #[test]
    fn coerces_fx_to_pair_format() {
        assert_eq!(normalize("eurusd", "US"), "EUR/USD");
    }

    #[test]
    fn classifies_crypto_and_fx() {
        assert_eq!(classify_asset_type("BTC-USD"), AssetType::Crypto);
        assert_eq!(classify_asset_type("EUR/USD"), AssetType::Fx);
        assert_eq!(classify_asset_type("AAPL.US"), AssetType::Equity);
    }

    #[test]
    fn scope_table_routes_jse_to_africa() {
        assert_eq!(scope_for_exchange("JSE"), MarketScope::Africa);
        assert_eq!(scope_for_exchange("US"), MarketScope::UsEu);
    }
}
