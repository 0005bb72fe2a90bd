// 🏷️ Symbols - Asset types, built-in table, pattern heuristics
// Every ticker ends up as exactly one AssetType in the combined workbook

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ASSET TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetType {
    Stock,
    Crypto,
    #[serde(rename = "ETF")]
    Etf,
    Bond,
    /// Symbol nobody classified (left empty in the dialog, cancelled, or never asked)
    Missing,
}

impl AssetType {
    /// All choices offered to the user, in dialog order
    pub const ALL: [AssetType; 5] = [
        AssetType::Stock,
        AssetType::Crypto,
        AssetType::Etf,
        AssetType::Bond,
        AssetType::Missing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stock => "Stock",
            AssetType::Crypto => "Crypto",
            AssetType::Etf => "ETF",
            AssetType::Bond => "Bond",
            AssetType::Missing => "Missing",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stock" => Ok(AssetType::Stock),
            "crypto" => Ok(AssetType::Crypto),
            "etf" => Ok(AssetType::Etf),
            "bond" => Ok(AssetType::Bond),
            "missing" => Ok(AssetType::Missing),
            other => Err(anyhow::anyhow!(
                "Unknown asset type '{}' (expected Stock, Crypto, ETF, Bond or Missing)",
                other
            )),
        }
    }
}

/// Canonical form used as the key everywhere: trimmed + uppercase
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

// ============================================================================
// BUILT-IN TABLE
// ============================================================================

/// Symbols known out of the box. Seeded into the store only where absent.
pub const BUILTIN_SYMBOLS: &[(&str, AssetType)] = &[
    // Nasdaq Baltic + LHV statement regulars
    ("APG1L", AssetType::Stock),
    ("ARC1T", AssetType::Stock),
    ("BRKB", AssetType::Stock),
    ("CPA1T", AssetType::Stock),
    ("DGRB100028A", AssetType::Bond),
    ("ECAR", AssetType::Etf),
    ("EGR1T", AssetType::Stock),
    ("ESP0", AssetType::Etf),
    ("EXSA", AssetType::Etf),
    ("EXXT", AssetType::Etf),
    ("GREG100027A", AssetType::Bond),
    ("HAE1T", AssetType::Stock),
    ("HAGEN", AssetType::Stock),
    ("HAGENBHT2", AssetType::Stock),
    ("INRG", AssetType::Etf),
    ("LHV01SR", AssetType::Stock),
    ("LHV1T", AssetType::Stock),
    ("LHVB105033A", AssetType::Bond),
    ("LHVST", AssetType::Stock),
    ("MAGIC", AssetType::Stock),
    ("MRK1T", AssetType::Stock),
    ("NCN1T", AssetType::Stock),
    ("NHCBHFFT", AssetType::Etf),
    ("SABB077034A", AssetType::Bond),
    ("SPYD", AssetType::Etf),
    ("STOH100026A", AssetType::Bond),
    ("SXR8", AssetType::Etf),
    ("TAL11", AssetType::Stock),
    ("TAL1T", AssetType::Stock),
    ("TKM1T", AssetType::Stock),
    ("TSM1T", AssetType::Stock),
    ("TVE1T", AssetType::Stock),
    ("WISE", AssetType::Stock),
    ("XAD5", AssetType::Etf),
    ("XAD6", AssetType::Etf),
    // Crypto
    ("BTC", AssetType::Crypto),
    ("ETH", AssetType::Crypto),
    ("BNB", AssetType::Crypto),
    ("XRP", AssetType::Crypto),
    ("ADA", AssetType::Crypto),
    ("SOL", AssetType::Crypto),
    ("DOGE", AssetType::Crypto),
    ("DOT", AssetType::Crypto),
    ("MATIC", AssetType::Crypto),
    ("SHIB", AssetType::Crypto),
    ("AVAX", AssetType::Crypto),
    ("LINK", AssetType::Crypto),
    ("UNI", AssetType::Crypto),
    ("ATOM", AssetType::Crypto),
    ("LTC", AssetType::Crypto),
    ("BCH", AssetType::Crypto),
    ("XLM", AssetType::Crypto),
    ("VET", AssetType::Crypto),
    ("FIL", AssetType::Crypto),
    ("TRX", AssetType::Crypto),
    ("ETC", AssetType::Crypto),
    ("XMR", AssetType::Crypto),
    ("THETA", AssetType::Crypto),
    ("ICP", AssetType::Crypto),
    ("EOS", AssetType::Crypto),
    // US large caps
    ("AAPL", AssetType::Stock),
    ("MSFT", AssetType::Stock),
    ("GOOGL", AssetType::Stock),
    ("GOOG", AssetType::Stock),
    ("AMZN", AssetType::Stock),
    ("META", AssetType::Stock),
    ("TSLA", AssetType::Stock),
    ("NVDA", AssetType::Stock),
    ("NFLX", AssetType::Stock),
    ("DIS", AssetType::Stock),
    ("ADBE", AssetType::Stock),
    ("CRM", AssetType::Stock),
    ("INTC", AssetType::Stock),
    ("AMD", AssetType::Stock),
    ("CSCO", AssetType::Stock),
    ("PEP", AssetType::Stock),
    ("COST", AssetType::Stock),
    ("AVGO", AssetType::Stock),
    ("TXN", AssetType::Stock),
    ("QCOM", AssetType::Stock),
    ("TMUS", AssetType::Stock),
    ("AMAT", AssetType::Stock),
    ("SBUX", AssetType::Stock),
    ("INTU", AssetType::Stock),
    ("JPM", AssetType::Stock),
    ("BAC", AssetType::Stock),
    ("WFC", AssetType::Stock),
    ("GS", AssetType::Stock),
    ("MS", AssetType::Stock),
    ("C", AssetType::Stock),
    ("AXP", AssetType::Stock),
    ("BLK", AssetType::Stock),
    ("SPGI", AssetType::Stock),
    ("V", AssetType::Stock),
    ("MA", AssetType::Stock),
    ("PLTR", AssetType::Stock),
    ("COIN", AssetType::Stock),
    ("JNJ", AssetType::Stock),
    ("PFE", AssetType::Stock),
    ("UNH", AssetType::Stock),
    ("ABBV", AssetType::Stock),
    ("TMO", AssetType::Stock),
    ("ABT", AssetType::Stock),
    ("MRK", AssetType::Stock),
    ("DHR", AssetType::Stock),
    ("BMY", AssetType::Stock),
    ("AMGN", AssetType::Stock),
    ("GILD", AssetType::Stock),
    ("CVS", AssetType::Stock),
    ("CI", AssetType::Stock),
    ("BIIB", AssetType::Stock),
    ("MRNA", AssetType::Stock),
    ("XOM", AssetType::Stock),
    ("CVX", AssetType::Stock),
    ("COP", AssetType::Stock),
    ("EOG", AssetType::Stock),
    ("SLB", AssetType::Stock),
    ("HAL", AssetType::Stock),
    ("PSX", AssetType::Stock),
    ("VLO", AssetType::Stock),
    ("MPC", AssetType::Stock),
    ("OXY", AssetType::Stock),
    // US-listed funds
    ("SPY", AssetType::Etf),
    ("QQQ", AssetType::Etf),
    ("VTI", AssetType::Etf),
    ("VOO", AssetType::Etf),
    ("IVV", AssetType::Etf),
    ("GLD", AssetType::Etf),
    ("SLV", AssetType::Etf),
    ("HYG", AssetType::Etf),
    ("LQD", AssetType::Etf),
    ("AGG", AssetType::Etf),
    ("BND", AssetType::Etf),
    ("VT", AssetType::Etf),
    ("VEA", AssetType::Etf),
    ("VWO", AssetType::Etf),
    ("IEMG", AssetType::Etf),
    ("EFA", AssetType::Etf),
    ("EEM", AssetType::Etf),
    ("XLF", AssetType::Etf),
    ("XLE", AssetType::Etf),
    ("XLK", AssetType::Etf),
    ("XLI", AssetType::Etf),
    ("XLV", AssetType::Etf),
    ("XLU", AssetType::Etf),
    ("XLP", AssetType::Etf),
    ("XLY", AssetType::Etf),
    ("XLB", AssetType::Etf),
    ("XLC", AssetType::Etf),
    ("XLRE", AssetType::Etf),
    ("GDX", AssetType::Etf),
    ("USO", AssetType::Etf),
    ("DBC", AssetType::Etf),
    ("QQQM", AssetType::Etf),
    ("SPYI", AssetType::Etf),
    ("SCHD", AssetType::Etf),
    ("TLT", AssetType::Bond),
    ("IEF", AssetType::Bond),
    ("SHY", AssetType::Bond),
    ("JNK", AssetType::Bond),
    ("MUB", AssetType::Bond),
    ("VTEB", AssetType::Bond),
    // Everything else
    ("BRK.A", AssetType::Stock),
    ("BRK.B", AssetType::Stock),
    ("WMT", AssetType::Stock),
    ("HD", AssetType::Stock),
    ("KO", AssetType::Stock),
    ("MCD", AssetType::Stock),
    ("NKE", AssetType::Stock),
    ("UBER", AssetType::Stock),
    ("LYFT", AssetType::Stock),
    ("ROKU", AssetType::Stock),
    ("SNAP", AssetType::Stock),
    ("TWTR", AssetType::Stock),
    ("ZM", AssetType::Stock),
    ("DOCU", AssetType::Stock),
    ("SHOP", AssetType::Stock),
    ("TTWO", AssetType::Stock),
    ("EA", AssetType::Stock),
    ("ATVI", AssetType::Stock),
    ("NTDOY", AssetType::Stock),
    ("SONY", AssetType::Stock),
    ("TCEHY", AssetType::Stock),
    ("BABA", AssetType::Stock),
    ("JD", AssetType::Stock),
    ("PDD", AssetType::Stock),
    ("NIO", AssetType::Stock),
    ("XPEV", AssetType::Stock),
    ("LI", AssetType::Stock),
    ("RIVN", AssetType::Stock),
    ("LCID", AssetType::Stock),
];

/// Look up a symbol in the built-in table (case-insensitive)
pub fn builtin_type(symbol: &str) -> Option<AssetType> {
    let key = normalize_symbol(symbol);
    BUILTIN_SYMBOLS
        .iter()
        .find(|(s, _)| *s == key)
        .map(|(_, t)| *t)
}

// ============================================================================
// PATTERN HEURISTICS
// ============================================================================

const KNOWN_CRYPTO: &[&str] = &[
    "BTC", "ETH", "BNB", "XRP", "ADA", "SOL", "DOGE", "DOT", "MATIC", "SHIB", "AVAX", "LINK",
    "UNI", "ATOM", "LTC", "BCH", "XLM", "VET", "FIL", "TRX", "ETC", "XMR", "THETA", "ICP", "EOS",
    "USDT", "USDC", "DAI", "ALGO", "NEAR", "APT", "ARB", "OP", "PEPE", "TON", "SUI",
];

const ETF_NAME_MARKERS: &[&str] = &[
    "etf", "ucits", "etc", "ishares", "xtrackers", "vanguard", "spdr", "amundi", "invesco",
    "wisdomtree", "lyxor", "index fund",
];

const BOND_NAME_MARKERS: &[&str] = &["võlakiri", "volakiri", "bond", "notes", "obligatsioon"];

/// Best-effort guess from the symbol shape and security name.
///
/// Never authoritative: the caller only applies it to symbols that have no
/// explicit classification.
pub fn guess_asset_type(symbol: &str, name: Option<&str>) -> Option<AssetType> {
    let symbol = normalize_symbol(symbol);
    if symbol.is_empty() {
        return None;
    }

    // "BTC-EUR", "ETH/USD" style pairs classify by their base
    let base = symbol
        .split(|c| c == '-' || c == '/')
        .next()
        .unwrap_or(symbol.as_str());
    if KNOWN_CRYPTO.contains(&base) {
        return Some(AssetType::Crypto);
    }

    if looks_like_bond_code(&symbol) {
        return Some(AssetType::Bond);
    }

    if let Some(name) = name {
        let name_lower = name.to_lowercase();
        if BOND_NAME_MARKERS.iter().any(|m| name_lower.contains(m)) {
            return Some(AssetType::Bond);
        }
        if ETF_NAME_MARKERS.iter().any(|m| contains_word(&name_lower, m)) {
            return Some(AssetType::Etf);
        }
    }

    // Nasdaq Baltic share codes: TAL1T, APG1L, ...
    if symbol.len() == 5
        && (symbol.ends_with("1T") || symbol.ends_with("1L") || symbol.ends_with("1R"))
        && symbol[..3].chars().all(|c| c.is_ascii_alphabetic())
    {
        return Some(AssetType::Stock);
    }

    if symbol.len() <= 5 && symbol.chars().all(|c| c.is_ascii_alphabetic() || c == '.') {
        return Some(AssetType::Stock);
    }

    None
}

/// Baltic bond codes: issuer letters, 6 digits (coupon + maturity), series letter.
/// E.g. LHVB105033A, DGRB100028A
fn looks_like_bond_code(symbol: &str) -> bool {
    let chars: Vec<char> = symbol.chars().collect();
    if chars.len() < 9 {
        return false;
    }

    let (head, tail) = chars.split_at(chars.len() - 7);
    let digits = &tail[..6];
    let series = tail[6];

    head.len() >= 2
        && head.iter().all(|c| c.is_ascii_alphabetic())
        && digits.iter().all(|c| c.is_ascii_digit())
        && series.is_ascii_alphabetic()
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w == needle)
        || (needle.contains(' ') && haystack.contains(needle))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol("  aapl "), "AAPL");
        assert_eq!(normalize_symbol("brk.b"), "BRK.B");
        assert_eq!(normalize_symbol(""), "");
    }

    #[test]
    fn test_builtin_lookup_is_case_insensitive() {
        assert_eq!(builtin_type("AAPL"), Some(AssetType::Stock));
        assert_eq!(builtin_type("aapl"), Some(AssetType::Stock));
        assert_eq!(builtin_type(" btc "), Some(AssetType::Crypto));
        assert_eq!(builtin_type("Spy"), Some(AssetType::Etf));
        assert_eq!(builtin_type("tlt"), Some(AssetType::Bond));
        assert_eq!(builtin_type("UNKNOWN123"), None);
    }

    #[test]
    fn test_builtin_table_has_unique_keys() {
        let mut keys: Vec<&str> = BUILTIN_SYMBOLS.iter().map(|(s, _)| *s).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_asset_type_from_str() {
        assert_eq!("etf".parse::<AssetType>().unwrap(), AssetType::Etf);
        assert_eq!(" Stock ".parse::<AssetType>().unwrap(), AssetType::Stock);
        assert_eq!("MISSING".parse::<AssetType>().unwrap(), AssetType::Missing);
        assert!("fund".parse::<AssetType>().is_err());
    }

    #[test]
    fn test_asset_type_serde_names() {
        assert_eq!(serde_json::to_string(&AssetType::Etf).unwrap(), "\"ETF\"");
        let parsed: AssetType = serde_json::from_str("\"Crypto\"").unwrap();
        assert_eq!(parsed, AssetType::Crypto);
    }

    #[test]
    fn test_guess_crypto() {
        assert_eq!(guess_asset_type("eth", None), Some(AssetType::Crypto));
        assert_eq!(guess_asset_type("USDT", None), Some(AssetType::Crypto));
        assert_eq!(guess_asset_type("BTC-EUR", None), Some(AssetType::Crypto));
    }

    #[test]
    fn test_guess_bond_by_code_and_name() {
        assert_eq!(guess_asset_type("XYZB123456A", None), Some(AssetType::Bond));
        assert_eq!(
            guess_asset_type("ABC99", Some("Coop Pank allutatud võlakiri")),
            Some(AssetType::Bond)
        );
    }

    #[test]
    fn test_guess_etf_by_name() {
        assert_eq!(
            guess_asset_type("IWDA", Some("iShares Core MSCI World UCITS ETF")),
            Some(AssetType::Etf)
        );
        assert_eq!(
            guess_asset_type("ABCD", Some("db Physical Gold ETC (EUR)")),
            Some(AssetType::Etf)
        );
    }

    #[test]
    fn test_guess_etf_marker_needs_whole_word() {
        // "Fetch" contains "etc" only as a substring
        assert_eq!(
            guess_asset_type("FTCH", Some("Fetch Holdings")),
            Some(AssetType::Stock)
        );
    }

    #[test]
    fn test_guess_stock_fallbacks() {
        assert_eq!(guess_asset_type("ZZZZ", None), Some(AssetType::Stock));
        assert_eq!(guess_asset_type("ABC1T", None), Some(AssetType::Stock));
        assert_eq!(guess_asset_type("TOOLONGSYM", None), None);
        assert_eq!(guess_asset_type("AB12", None), None);
        assert_eq!(guess_asset_type("   ", None), None);
    }
}
