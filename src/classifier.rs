// 🔎 Symbol Classifier - session mapping + unresolved set
// Resolution order: explicit session mapping, else unresolved (heuristics only ever *suggest*)

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::store::ClassificationStore;
use crate::symbols::{guess_asset_type, normalize_symbol, AssetType};

// ============================================================================
// SYMBOL UNIVERSE
// ============================================================================

/// Distinct symbols seen across every file of a batch, with the first
/// non-empty security name for each
#[derive(Debug, Clone, Default)]
pub struct SymbolUniverse {
    symbols: BTreeMap<String, Option<String>>,
}

impl SymbolUniverse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, symbol: &str, name: Option<&str>) {
        let key = normalize_symbol(symbol);
        if key.is_empty() {
            return;
        }

        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let entry = self.symbols.entry(key).or_insert(None);
        if entry.is_none() {
            *entry = name.map(str::to_string);
        }
    }

    pub fn name_of(&self, symbol: &str) -> Option<&str> {
        self.symbols
            .get(&normalize_symbol(symbol))
            .and_then(|n| n.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.symbols.iter().map(|(s, n)| (s.as_str(), n.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// One symbol the classifier could not place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedSymbol {
    pub symbol: String,
    pub name: Option<String>,
    /// Heuristic guess, only present when the heuristic variant is enabled
    pub suggestion: Option<AssetType>,
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct SymbolClassifier {
    mapping: HashMap<String, AssetType>,
    heuristics: bool,
}

impl SymbolClassifier {
    pub fn new(mapping: HashMap<String, AssetType>, heuristics: bool) -> Self {
        let mapping = mapping
            .into_iter()
            .map(|(symbol, t)| (normalize_symbol(&symbol), t))
            .collect();
        SymbolClassifier { mapping, heuristics }
    }

    /// Session mapping = everything the store knows (built-ins already merged in)
    pub fn from_store(store: &ClassificationStore, heuristics: bool) -> Self {
        SymbolClassifier::new(store.mappings(), heuristics)
    }

    /// Explicit classification, or None when unresolved
    pub fn classify(&self, symbol: &str) -> Option<AssetType> {
        self.mapping.get(&normalize_symbol(symbol)).copied()
    }

    /// Type used for a ledger row: unresolved symbols become Missing
    pub fn type_for(&self, symbol: &str) -> AssetType {
        self.classify(symbol).unwrap_or(AssetType::Missing)
    }

    /// Heuristic guess for an unresolved symbol. Explicit entries are never second-guessed.
    pub fn suggest(&self, symbol: &str, name: Option<&str>) -> Option<AssetType> {
        if !self.heuristics || self.classify(symbol).is_some() {
            return None;
        }
        guess_asset_type(symbol, name)
    }

    /// Every symbol of the universe without an explicit classification, in symbol order
    pub fn unresolved(&self, universe: &SymbolUniverse) -> Vec<UnresolvedSymbol> {
        universe
            .iter()
            .filter(|(symbol, _)| self.classify(symbol).is_none())
            .map(|(symbol, name)| UnresolvedSymbol {
                symbol: symbol.to_string(),
                name: name.map(str::to_string),
                suggestion: self.suggest(symbol, name),
            })
            .collect()
    }

    /// Session-level override (after the user resolved a symbol)
    pub fn apply(&mut self, symbol: &str, asset_type: AssetType) {
        let key = normalize_symbol(symbol);
        if !key.is_empty() {
            self.mapping.insert(key, asset_type);
        }
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SymbolRecord;
    use crate::symbols::BUILTIN_SYMBOLS;

    fn builtin_classifier(heuristics: bool) -> SymbolClassifier {
        let mut store = ClassificationStore::new();
        store.merge(BUILTIN_SYMBOLS);
        SymbolClassifier::from_store(&store, heuristics)
    }

    #[test]
    fn test_every_builtin_classifies_case_insensitively() {
        let classifier = builtin_classifier(false);

        for (symbol, expected) in BUILTIN_SYMBOLS {
            assert_eq!(classifier.classify(symbol), Some(*expected), "{}", symbol);
            assert_eq!(
                classifier.classify(&symbol.to_lowercase()),
                Some(*expected),
                "{}",
                symbol
            );
            assert_eq!(
                classifier.classify(&format!("  {} ", symbol)),
                Some(*expected),
                "{}",
                symbol
            );
        }
    }

    #[test]
    fn test_unknown_is_unresolved_and_missing() {
        let classifier = builtin_classifier(false);
        assert_eq!(classifier.classify("UNKNOWN123"), None);
        assert_eq!(classifier.type_for("UNKNOWN123"), AssetType::Missing);
    }

    #[test]
    fn test_store_override_wins_over_builtin() {
        let mut store = ClassificationStore::new();
        store.upsert(SymbolRecord::new("SPY", AssetType::Stock));
        store.merge(BUILTIN_SYMBOLS);

        let classifier = SymbolClassifier::from_store(&store, false);
        assert_eq!(classifier.classify("spy"), Some(AssetType::Stock));
    }

    #[test]
    fn test_unresolved_lists_only_unknown_symbols() {
        let classifier = builtin_classifier(false);
        let mut universe = SymbolUniverse::new();
        universe.observe("aapl", Some("Apple Inc."));
        universe.observe("ZZTOP", None);
        universe.observe("abc99", Some("Mystery Corp"));

        let unresolved = classifier.unresolved(&universe);
        let symbols: Vec<&str> = unresolved.iter().map(|u| u.symbol.as_str()).collect();

        assert_eq!(symbols, vec!["ABC99", "ZZTOP"]);
        assert_eq!(unresolved[0].name.as_deref(), Some("Mystery Corp"));
        assert!(unresolved.iter().all(|u| u.suggestion.is_none()));
    }

    #[test]
    fn test_heuristic_suggestions_only_when_enabled() {
        let classifier = builtin_classifier(true);
        let mut universe = SymbolUniverse::new();
        universe.observe("IWDA", Some("iShares Core MSCI World UCITS ETF"));

        let unresolved = classifier.unresolved(&universe);
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].suggestion, Some(AssetType::Etf));
    }

    #[test]
    fn test_heuristic_never_overrides_explicit() {
        let classifier = builtin_classifier(true);
        // TLT would guess as Stock, but the table says Bond
        assert_eq!(classifier.suggest("TLT", None), None);
        assert_eq!(classifier.classify("TLT"), Some(AssetType::Bond));
    }

    #[test]
    fn test_apply_session_override() {
        let mut classifier = builtin_classifier(false);
        classifier.apply(" newco ", AssetType::Stock);
        assert_eq!(classifier.classify("NEWCO"), Some(AssetType::Stock));
    }

    #[test]
    fn test_universe_keeps_first_non_empty_name() {
        let mut universe = SymbolUniverse::new();
        universe.observe("XAD5", None);
        universe.observe("xad5", Some("  "));
        universe.observe("XAD5", Some("db Physical Gold ETC"));
        universe.observe("XAD5", Some("Something Else"));
        universe.observe("", Some("ignored"));

        assert_eq!(universe.len(), 1);
        assert_eq!(universe.name_of("xad5"), Some("db Physical Gold ETC"));
    }
}
