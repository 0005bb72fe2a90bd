// 🔍 Deduplication Engine - overlapping exports of the same account
// Exact match only: same account + broker reference + identical trade content

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::normalizer::ProcessedTransaction;

// ============================================================================
// DUPLICATE MATCH RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    /// Index of the occurrence that stays
    pub kept_index: usize,

    /// Index of the occurrence that is dropped
    pub dropped_index: usize,

    pub hash: String,

    /// Human-readable reason
    pub reason: String,
}

/// Idempotency hash for duplicate detection.
/// Rows without a broker reference get None and are never collapsed:
/// two identical fills on the same day are legitimate.
pub fn idempotency_hash(tx: &ProcessedTransaction) -> Option<String> {
    if tx.reference.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}",
        tx.account,
        tx.reference,
        tx.display_date(),
        tx.symbol,
        tx.action,
        tx.amount,
        tx.price,
        tx.cost,
        tx.fee
    ));
    Some(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// DEDUPLICATION ENGINE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct DeduplicationEngine;

impl DeduplicationEngine {
    pub fn new() -> Self {
        DeduplicationEngine
    }

    /// Every later occurrence of an already-seen hash, paired with the first one
    pub fn find_duplicates(&self, transactions: &[ProcessedTransaction]) -> Vec<DuplicateMatch> {
        let mut first_seen: HashMap<String, usize> = HashMap::new();
        let mut matches = Vec::new();

        for (i, tx) in transactions.iter().enumerate() {
            let hash = match idempotency_hash(tx) {
                Some(hash) => hash,
                None => continue,
            };

            match first_seen.get(&hash) {
                Some(&kept) => matches.push(DuplicateMatch {
                    kept_index: kept,
                    dropped_index: i,
                    reason: format!(
                        "{} {} {} ref {} already imported",
                        tx.account,
                        tx.display_date(),
                        tx.symbol,
                        tx.reference
                    ),
                    hash,
                }),
                None => {
                    first_seen.insert(hash, i);
                }
            }
        }

        matches
    }

    /// Drop later duplicates, keeping encounter order of the survivors
    pub fn remove_duplicates(
        &self,
        transactions: Vec<ProcessedTransaction>,
    ) -> (Vec<ProcessedTransaction>, Vec<DuplicateMatch>) {
        let matches = self.find_duplicates(&transactions);
        if matches.is_empty() {
            return (transactions, matches);
        }

        let mut dropped = vec![false; transactions.len()];
        for m in &matches {
            dropped[m.dropped_index] = true;
        }

        let kept = transactions
            .into_iter()
            .zip(dropped)
            .filter_map(|(tx, is_dropped)| if is_dropped { None } else { Some(tx) })
            .collect();

        (kept, matches)
    }
}

// ============================================================================
// TESTS
// ============================================================================
