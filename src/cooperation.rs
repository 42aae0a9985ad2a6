//! Deterministic cycle of one coin per type (spec.md §3, §4.3).

use serde::{Deserialize, Serialize};

use crate::crypto::{WordQueue, h_str, join_ids};
use crate::error::LorError;

/// A cycle of exactly `type_count` coins, one of each type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooperationRing {
    pub id: String,
    pub weight: f64,
    pub next: String,
    pub prev: String,
    pub investor: String,
    pub coin_ids: Vec<String>,
    pub fractal_id: String,
    pub is_valid: bool,
    pub rounds: i32,
    /// Per-type candidate pools the deterministic selection drew from. Carried for
    /// validation by peers, never persisted across the public boundary.
    #[serde(skip)]
    pub unused_coins: Vec<Vec<String>>,
}

impl CooperationRing {
    /// Whether this ring has not yet been bound into any fractal ring.
    pub fn is_solo(&self) -> bool {
        self.next.is_empty() && self.prev.is_empty()
    }

    /// Whether this ring has completed settlement.
    pub fn is_settled(&self) -> bool {
        self.rounds != -1
    }
}

/// Sum of amounts of coins at positions `1..n-1` (position 0, the investor, is excluded).
pub fn weight_of<F>(ring: &[String], amount_of: F) -> f64
where
    F: Fn(&str) -> f64,
{
    ring.iter().skip(1).map(|id| amount_of(id)).sum()
}

/// Deterministic pop-and-fill selection of one coin per type from `unused_coins` (indexed
/// by type). Position 0 is `investor` when supplied, otherwise a uniform random pick from
/// pool 0. For `i >= 1`, the pool is sorted and the next word of a hash stream seeded from
/// the full-length selection-so-far (still-unfilled positions hash as empty strings, not
/// skipped) picks an index modulo the pool's size; the stream is re-seeded whenever
/// exhausted.
///
/// Every pool must be non-empty; callers are expected to have checked this already
/// (`Trader::check_for_cooperation_ring` returns `None` otherwise).
pub fn select_cooperation_ring(unused_coins: &[Vec<String>], investor: Option<&str>) -> Vec<String> {
    let mut selected = vec![String::new(); unused_coins.len()];
    selected[0] = match investor {
        Some(id) => id.to_string(),
        None => {
            let index = rand::random::<usize>() % unused_coins[0].len();
            unused_coins[0][index].clone()
        }
    };

    let mut queue = WordQueue::new();
    for i in 1..unused_coins.len() {
        let mut pool = unused_coins[i].clone();
        pool.sort();
        let word = queue.next(&join_ids(&selected)) as usize;
        selected[i] = pool[word % pool.len()].clone();
    }
    selected
}

/// Validates a cooperation ring another trader constructed, recomputing `id`, `weight`,
/// and the deterministic selection from its `unused_coins` witness.
pub fn validate_cooperation_ring<F>(
    ring: &CooperationRing,
    amount_of: F,
    status_ok: impl Fn(&str) -> Result<(), LorError>,
    type_of: impl Fn(&str) -> Result<u32, LorError>,
) -> Result<(), LorError>
where
    F: Fn(&str) -> f64,
{
    if ring.id != h_str(&join_ids(&ring.coin_ids)) {
        return Err(LorError::InvalidId);
    }
    if ring.weight != weight_of(&ring.coin_ids, &amount_of) {
        return Err(LorError::InvalidWeight);
    }
    if ring.investor != ring.coin_ids[0] {
        return Err(LorError::InvalidInvestor);
    }

    for (position, coin_id) in ring.coin_ids.iter().enumerate() {
        status_ok(coin_id)?;
        let coin_type = type_of(coin_id)?;
        if coin_type as usize != position {
            return Err(LorError::InvalidCoinType);
        }
    }

    let expected = select_cooperation_ring(&ring.unused_coins, Some(&ring.coin_ids[0]));
    if expected != ring.coin_ids {
        return Err(LorError::InvalidCoinSelection);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pools() -> Vec<Vec<String>> {
        vec![
            vec!["a0".into(), "a1".into()],
            vec!["b0".into(), "b1".into(), "b2".into()],
            vec!["c0".into()],
        ]
    }

    #[test]
    fn selection_is_deterministic_given_fixed_investor() {
        let pools = pools();
        let first = select_cooperation_ring(&pools, Some("a1"));
        let second = select_cooperation_ring(&pools, Some("a1"));
        assert_eq!(first, second);
        assert_eq!(first[0], "a1");
    }

    #[test]
    fn selection_has_one_coin_per_type() {
        let pools = pools();
        let selected = select_cooperation_ring(&pools, Some("a0"));
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[2], "c0");
    }

    #[test]
    fn weight_excludes_investor() {
        let ring = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let amounts = |id: &str| match id {
            "a" => 100.0,
            "b" => 5.0,
            "c" => 7.0,
            _ => 0.0,
        };
        assert_eq!(weight_of(&ring, amounts), 12.0);
    }

    #[test]
    fn validate_accepts_a_correctly_constructed_ring() {
        let pools = pools();
        let selected = select_cooperation_ring(&pools, Some("a0"));
        let id = h_str(&join_ids(&selected));
        let amounts = |_: &str| 1.0;
        let weight = weight_of(&selected, amounts);

        let ring = CooperationRing {
            id,
            weight,
            next: String::new(),
            prev: String::new(),
            investor: selected[0].clone(),
            coin_ids: selected,
            fractal_id: String::new(),
            is_valid: true,
            rounds: -1,
            unused_coins: pools,
        };

        let result = validate_cooperation_ring(&ring, amounts, |_| Ok(()), |id| {
            Ok(match id {
                "a0" | "a1" => 0,
                "b0" | "b1" | "b2" => 1,
                "c0" => 2,
                _ => 99,
            })
        });
        assert!(result.is_ok());
    }

    #[test]
    fn validate_rejects_tampered_id() {
        let pools = pools();
        let selected = select_cooperation_ring(&pools, Some("a0"));
        let amounts = |_: &str| 1.0;
        let weight = weight_of(&selected, amounts);

        let ring = CooperationRing {
            id: "not-the-real-id".into(),
            weight,
            next: String::new(),
            prev: String::new(),
            investor: selected[0].clone(),
            coin_ids: selected,
            fractal_id: String::new(),
            is_valid: true,
            rounds: -1,
            unused_coins: pools,
        };

        let result = validate_cooperation_ring(&ring, amounts, |_| Ok(()), |_| Ok(0));
        assert_eq!(result, Err(LorError::InvalidId));
    }

    #[test]
    fn solo_ring_has_no_links() {
        let ring = CooperationRing {
            id: "r".into(),
            weight: 0.0,
            next: String::new(),
            prev: String::new(),
            investor: "a".into(),
            coin_ids: vec!["a".into()],
            fractal_id: String::new(),
            is_valid: true,
            rounds: -1,
            unused_coins: vec![],
        };
        assert!(ring.is_solo());
        assert!(!ring.is_settled());
    }
}
