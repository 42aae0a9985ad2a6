//! Deterministic cycle of cooperation rings plus a verification committee
//! (spec.md §3, §4.4).

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cooperation::CooperationRing;
use crate::crypto::{WordQueue, h_int, h_str, join_ids};
use crate::error::LorError;

pub const FRACTAL_MIN: usize = 50;
pub const FRACTAL_MAX: usize = 200;
pub const FRACTAL_PRIZE: f64 = 5.0;
pub const VERIFICATION_MIN: usize = 21;
pub const VERIFICATION_MAX: usize = 21;

/// A cycle of `k` cooperation rings plus the committee that verified them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractalRing {
    pub id: String,
    pub cooperation_rings: Vec<CooperationRing>,
    pub verification_team: Vec<String>,
    pub is_valid: bool,
    /// Witness of the solo-ring ids the selection was drawn from, not persisted.
    #[serde(skip)]
    pub solo_rings: Vec<String>,
}

/// `k = min + HInt(join_ids(hash_input)) mod (max - min + 1)`. Returns `None` when the
/// candidate pool is too small to hold even `min`, or smaller than the derived `k`.
pub fn derive_k(hash_input: &[String], pool_len: usize, min: usize, max: usize) -> Option<usize> {
    if pool_len < min {
        return None;
    }
    let k = min + (h_int(&join_ids(hash_input)) as usize % (max - min + 1));
    if pool_len < k { None } else { Some(k) }
}

/// Removes `pool[index]` by overwriting it with `pool[0]` and then dropping the front
/// element, reproducing the original's `copiedRings[index] = copiedRings[0];
/// copiedRings = copiedRings[1:]` slice trick bit-for-bit, including the resulting
/// reordering of the remaining pool (which feeds subsequent index draws).
fn swap_pop_front(pool: &mut Vec<String>, index: usize) {
    pool[index] = pool[0].clone();
    pool.remove(0);
}

/// Deterministic pop-and-fill selection of `k` items from `pool` (a solo-ring id list or
/// the full trader id list). Position 0 is `first` when supplied, otherwise a uniform
/// random pick; indices for positions `1..k` come from a hash stream seeded from the
/// full-length result-so-far (unfilled positions hash as empty strings).
fn pop_and_fill(pool: &[String], k: usize, first: Option<&str>) -> Vec<String> {
    let mut result = vec![String::new(); k];
    let mut remaining: Vec<String> = pool.to_vec();
    remaining.sort();

    match first {
        Some(id) => {
            result[0] = id.to_string();
            if let Some(pos) = remaining.iter().position(|candidate| candidate == id) {
                swap_pop_front(&mut remaining, pos);
            }
        }
        None => {
            let index = rand::thread_rng().gen_range(0..pool.len());
            result[0] = remaining[index].clone();
            swap_pop_front(&mut remaining, index);
        }
    }

    let mut queue = WordQueue::new();
    for i in 1..k {
        let word = queue.next(&join_ids(&result)) as usize;
        let index = word % remaining.len();
        result[i] = remaining[index].clone();
        swap_pop_front(&mut remaining, index);
    }
    result
}

/// Deterministic selection of `k` solo cooperation rings into a fractal ring, honest
/// branch. `first_ring` fixes position 0 for validators re-deriving another trader's
/// selection; `None` draws it uniformly at random (the proposer's own construction).
pub fn select_fractal_ring(solo_rings: &[String], first_ring: Option<&str>) -> Option<Vec<String>> {
    let k = derive_k(solo_rings, solo_rings.len(), FRACTAL_MIN, FRACTAL_MAX)?;
    Some(pop_and_fill(solo_rings, k, first_ring))
}

/// Byzantine branch: a uniform random `k`-subset of `solo_rings`, drawn via the shared
/// shrinking-pool index stream rather than the deterministic protocol.
pub fn select_random_fractal(solo_rings: &[String]) -> Option<Vec<String>> {
    if solo_rings.len() < FRACTAL_MIN {
        return None;
    }
    let k = FRACTAL_MIN + (h_int(&join_ids(solo_rings)) as usize % (FRACTAL_MAX - FRACTAL_MIN + 1));
    if solo_rings.len() < k {
        return None;
    }
    Some(
        crate::crypto::random_indexes(solo_rings.len(), k)
            .into_iter()
            .map(|index| solo_rings[index].clone())
            .collect(),
    )
}

/// Deterministic committee selection of `v` traders, honest branch.
pub fn select_verification_team(
    trader_ids: &[String],
    ring_ids: &[String],
    first_member: Option<&str>,
) -> Option<Vec<String>> {
    let k = derive_k(ring_ids, trader_ids.len(), VERIFICATION_MIN, VERIFICATION_MAX)?;
    Some(pop_and_fill(trader_ids, k, first_member))
}

/// Byzantine branch: a uniform random committee.
pub fn select_random_verification(trader_ids: &[String]) -> Option<Vec<String>> {
    if trader_ids.len() < VERIFICATION_MIN {
        return None;
    }
    let upper = VERIFICATION_MAX.min(trader_ids.len());
    let k = rand::thread_rng().gen_range(VERIFICATION_MIN..=upper);
    Some(
        crate::crypto::random_indexes(trader_ids.len(), k)
            .into_iter()
            .map(|index| trader_ids[index].clone())
            .collect(),
    )
}

/// Validates a fractal ring another trader constructed: every constituent CR must
/// individually validate, the fractal id and selection must recompute identically, and the
/// committee must recompute identically from its first member.
pub fn validate_fractal_ring(
    fractal: &FractalRing,
    trader_ids: &[String],
    validate_cr: impl Fn(&CooperationRing) -> Result<(), LorError>,
) -> Result<(), LorError> {
    let mut selected_rings = Vec::with_capacity(fractal.cooperation_rings.len());
    for ring in &fractal.cooperation_rings {
        validate_cr(ring)?;
        selected_rings.push(ring.id.clone());
    }

    if fractal.id != h_str(&join_ids(&selected_rings)) {
        return Err(LorError::InvalidFractalId);
    }

    let expected_selection = select_fractal_ring(&fractal.solo_rings, Some(&selected_rings[0]));
    if expected_selection.as_deref() != Some(selected_rings.as_slice()) {
        return Err(LorError::InvalidFractalSelection);
    }

    let first_member = fractal
        .verification_team
        .first()
        .ok_or(LorError::InvalidCommittee)?;
    let expected_team = select_verification_team(trader_ids, &selected_rings, Some(first_member));
    if expected_team.as_deref() != Some(fractal.verification_team.as_slice()) {
        return Err(LorError::InvalidCommittee);
    }
    Ok(())
}
