//! Per-actor replicated state, ring-construction triggers, and voting policy
//! (spec.md §3, §4.2, §4.3, §4.4, §4.6).

use std::collections::BTreeMap;

use bech32::Bech32m;
use rand::Rng;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::coin::{Coin, Status};
use crate::config::Config;
use crate::cooperation::{self, CooperationRing};
use crate::crypto;
use crate::error::LorError;
use crate::fractal::{self, FractalRing};

/// A trader's voting/construction disposition. `RandomVote` acts maliciously with
/// probability `Config::bad_behavior` on any single decision; `BadVote` always does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehaviorType {
    Normal,
    RandomVote,
    BadVote,
}

/// The public projection of a trader, as replicated across every peer and persisted in
/// the System snapshot (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderRecord {
    pub id: String,
    pub account: f64,
    pub wallet: String,
    pub public_key: Option<RsaPublicKey>,
}

/// Full, privately-held trader state: replicated tables plus local secrets. Not
/// serialized directly; `System` persists only the `TraderRecord` projection.
pub struct Trader {
    pub id: String,
    pub account: f64,
    pub wallet: String,
    pub public_key: RsaPublicKey,
    pub behavior: BehaviorType,
    private_key: RsaPrivateKey,
    type_count: u32,
    bad_behavior: f64,
    pub ban_until: i64,
    pub traders: BTreeMap<String, TraderRecord>,
    pub coins: BTreeMap<String, Coin>,
    pub cooperations: BTreeMap<String, CooperationRing>,
}

impl Trader {
    /// Generates a fresh RSA keypair and derives `id = H("<wallet>-<type_count>")`. The
    /// wallet address itself is a bech32m-encoded uuid7, matching the "human-readable
    /// prefix over a randomly generated id" shape used for addresses throughout this
    /// crate's reference material.
    pub fn new(behavior: BehaviorType, account: f64, config: &Config) -> Result<Self, LorError> {
        let private_key = crypto::generate_private_key(config.key_size)?;
        let public_key = private_key.to_public_key();
        let wallet = bech32::encode::<Bech32m>(
            bech32::Hrp::parse("wallet").expect("static hrp"),
            uuid7::uuid7().as_bytes(),
        )
        .expect("bech32 encoding of a fixed-size uuid cannot fail");

        let id = crypto::h_str(&format!("{wallet}-{}", config.type_count));
        Ok(Self {
            id,
            account,
            wallet,
            public_key,
            behavior,
            private_key,
            type_count: config.type_count,
            bad_behavior: config.bad_behavior,
            ban_until: 0,
            traders: BTreeMap::new(),
            coins: BTreeMap::new(),
            cooperations: BTreeMap::new(),
        })
    }

    pub fn record(&self) -> TraderRecord {
        TraderRecord {
            id: self.id.clone(),
            account: self.account,
            wallet: self.wallet.clone(),
            public_key: Some(self.public_key.clone()),
        }
    }

    /// Registers another trader's public record in this trader's replica. Fails if the
    /// id is already known, or doesn't match the recomputed `H("<wallet>-<type_count>")`.
    pub fn save_trader(&mut self, trader: TraderRecord) -> Result<(), LorError> {
        if self.traders.contains_key(&trader.id) {
            return Err(LorError::Duplicate);
        }
        let expected_id = crypto::h_str(&format!("{}-{}", trader.wallet, self.type_count));
        if trader.id != expected_id {
            return Err(LorError::InvalidId);
        }
        self.traders.insert(trader.id.clone(), trader);
        Ok(())
    }

    fn acts_maliciously(&self) -> bool {
        match self.behavior {
            BehaviorType::BadVote => true,
            BehaviorType::RandomVote => rand::thread_rng().gen_bool(self.bad_behavior),
            BehaviorType::Normal => false,
        }
    }

    /// Mints a new coin of `coin_type` and `amount`, signed over `"<id>-<type>"`. Returns
    /// `None` when the account balance is insufficient (spec.md §4.2).
    pub fn create_coin(&self, amount: f64, coin_type: u32) -> Option<Coin> {
        if self.account < amount {
            return None;
        }
        let payload = format!("{}-{}", self.id, coin_type);
        let id = crypto::sign(&payload, &self.private_key).ok()?;
        Some(Coin {
            id,
            amount,
            status: Status::Run,
            coin_type,
            next: String::new(),
            prev: String::new(),
            owner: self.id.clone(),
            cooperation_id: String::new(),
        })
    }

    /// Validates and stores a coin broadcast by the System, debiting the owner's
    /// replicated balance on success (spec.md §4.2).
    pub fn save_coin(&mut self, coin: Coin) -> Result<(), LorError> {
        if coin.status != Status::Run {
            return Err(LorError::InvalidStatus);
        }
        if coin.coin_type >= self.type_count {
            return Err(LorError::InvalidType);
        }
        let owner = self.traders.get(&coin.owner).ok_or(LorError::UnknownTrader)?;
        if owner.account < coin.amount {
            return Err(LorError::InsufficientAccount);
        }
        let public_key = owner.public_key.clone().ok_or(LorError::UnknownTrader)?;
        let payload = format!("{}-{}", coin.owner, coin.coin_type);
        crypto::verify(&payload, &coin.id, &public_key)?;
        if !coin.next.is_empty() || !coin.prev.is_empty() {
            return Err(LorError::AlreadyInRing);
        }
        if self.coins.contains_key(&coin.id) {
            return Err(LorError::Duplicate);
        }

        if let Some(owner_record) = self.traders.get_mut(&coin.owner) {
            owner_record.account -= coin.amount;
        }
        self.coins.insert(coin.id.clone(), coin);
        Ok(())
    }

    /// Triggered on every coin broadcast: attempts to bind a new cooperation ring from
    /// unused coins, then (when not currently banned) attempts to form a fractal ring
    /// from solo cooperation rings (spec.md §4.3, §4.4).
    pub fn check_for_rings(&mut self, fractal_counter: i64) -> Option<FractalRing> {
        if let Some(ring) = self.check_for_cooperation_ring() {
            self.cooperations.insert(ring.id.clone(), ring);
            if self.ban_until <= fractal_counter {
                return self.check_for_fractal_ring();
            }
        }
        None
    }

    fn check_for_cooperation_ring(&mut self) -> Option<CooperationRing> {
        let mut unused_coins: Vec<Vec<String>> = vec![Vec::new(); self.type_count as usize];
        for coin in self.coins.values() {
            if coin.is_unused() {
                unused_coins[coin.coin_type as usize].push(coin.id.clone());
            }
        }
        if unused_coins.iter().any(Vec::is_empty) {
            return None;
        }

        let selected = cooperation::select_cooperation_ring(&unused_coins, None);
        let id = crypto::h_str(&crypto::join_ids(&selected));
        let weight = cooperation::weight_of(&selected, |coin_id| {
            self.coins.get(coin_id).map(|c| c.amount).unwrap_or(0.0)
        });

        let n = selected.len();
        for (i, coin_id) in selected.iter().enumerate() {
            if let Some(coin) = self.coins.get_mut(coin_id) {
                coin.cooperation_id = id.clone();
                coin.next = selected[(i + 1) % n].clone();
                coin.prev = selected[(i + n - 1) % n].clone();
            }
        }

        Some(CooperationRing {
            id,
            weight,
            next: String::new(),
            prev: String::new(),
            investor: selected[0].clone(),
            coin_ids: selected,
            fractal_id: String::new(),
            is_valid: true,
            rounds: -1,
            unused_coins,
        })
    }

    /// Validates a cooperation ring constructed by another trader against this trader's
    /// own replica.
    pub fn validate_cooperation_ring(&self, ring: &CooperationRing) -> Result<(), LorError> {
        cooperation::validate_cooperation_ring(
            ring,
            |coin_id| self.coins.get(coin_id).map(|c| c.amount).unwrap_or(0.0),
            |coin_id| {
                let coin = self.coins.get(coin_id).ok_or(LorError::CoinNotFound)?;
                if coin.status != Status::Run {
                    return Err(LorError::InvalidStatus);
                }
                Ok(())
            },
            |coin_id| {
                self.coins
                    .get(coin_id)
                    .map(|c| c.coin_type)
                    .ok_or(LorError::CoinNotFound)
            },
        )
    }

    fn solo_rings(&self) -> Vec<String> {
        self.cooperations
            .values()
            .filter(|ring| ring.is_solo())
            .map(|ring| ring.id.clone())
            .collect()
    }

    fn check_for_fractal_ring(&mut self) -> Option<FractalRing> {
        let solo_rings = self.solo_rings();
        let malicious = self.acts_maliciously();

        let (selected, fractal_valid) = if malicious {
            (fractal::select_random_fractal(&solo_rings)?, false)
        } else {
            (fractal::select_fractal_ring(&solo_rings, None)?, true)
        };

        let trader_ids: Vec<String> = self.traders.keys().cloned().collect();
        let committee_malicious = self.acts_maliciously();
        let team = if committee_malicious {
            fractal::select_random_verification(&trader_ids)?
        } else {
            fractal::select_verification_team(&trader_ids, &selected, None)?
        };

        let fractal_id = crypto::h_str(&crypto::join_ids(&selected));
        let n = selected.len();
        let mut is_valid = fractal_valid && !committee_malicious;
        let mut rings = Vec::with_capacity(n);
        for (i, ring_id) in selected.iter().enumerate() {
            let ring = self.cooperations.get_mut(ring_id)?;
            if !ring.is_valid {
                is_valid = false;
            }
            ring.fractal_id = fractal_id.clone();
            ring.next = selected[(i + 1) % n].clone();
            ring.prev = selected[(i + n - 1) % n].clone();
            rings.push(ring.clone());
        }

        Some(FractalRing {
            id: fractal_id,
            cooperation_rings: rings,
            verification_team: team,
            is_valid,
            solo_rings,
        })
    }

    /// Validates a fractal ring constructed by another trader against this trader's own
    /// replica.
    pub fn validate_fractal_ring(&self, fractal: &FractalRing) -> Result<(), LorError> {
        let trader_ids: Vec<String> = self.traders.keys().cloned().collect();
        fractal::validate_fractal_ring(fractal, &trader_ids, |ring| {
            self.validate_cooperation_ring(ring)
        })
    }

    /// A committee member's verdict on a freshly-proposed fractal ring. The three
    /// construction-selection errors are suppressed to an honest reject for a Normal
    /// voter, and may be opportunistically falsified into acceptance by a Bad/Random
    /// voter (spec.md §7).
    pub fn submit_ring(&self, fractal: &FractalRing) -> Result<(), LorError> {
        match self.validate_fractal_ring(fractal) {
            Ok(()) => self.vote(),
            Err(err) if err.is_suppressible_during_verification() => {
                if self.acts_maliciously() {
                    Ok(())
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// A settlement-round vote: Normal always accepts; BadVote always rejects;
    /// RandomVote rejects with probability `bad_behavior`.
    pub fn vote(&self) -> Result<(), LorError> {
        if self.acts_maliciously() {
            Err(LorError::BadBehavior)
        } else {
            Ok(())
        }
    }

    /// Unwinds any coin binding that conflicts with the incoming fractal ring, then binds
    /// it locally (spec.md §4.5).
    pub fn inform_fractal_ring(&mut self, fractal: &FractalRing) -> Result<(), LorError> {
        for ring in &fractal.cooperation_rings {
            for coin_id in &ring.coin_ids {
                let coin = self.coins.get(coin_id).ok_or(LorError::CoinNotFound)?;
                if coin.status != Status::Run {
                    return Err(LorError::CoinNotRunning);
                }
                if !coin.cooperation_id.is_empty() && coin.cooperation_id != ring.id {
                    let prior_id = coin.cooperation_id.clone();
                    let prior = self
                        .cooperations
                        .get(&prior_id)
                        .ok_or(LorError::CooperationNotFound)?;
                    if !prior.fractal_id.is_empty() {
                        let fractal_id = prior.fractal_id.clone();
                        self.remove_fractal_ring(&fractal_id);
                    } else {
                        self.remove_cooperation_ring(&prior_id);
                    }
                }
            }
        }
        self.save_fractal_ring(fractal);
        Ok(())
    }

    fn save_fractal_ring(&mut self, fractal: &FractalRing) {
        for ring in &fractal.cooperation_rings {
            self.cooperations.insert(ring.id.clone(), ring.clone());
            let n = ring.coin_ids.len();
            for (i, coin_id) in ring.coin_ids.iter().enumerate() {
                if let Some(coin) = self.coins.get_mut(coin_id) {
                    coin.status = Status::Blocked;
                    coin.cooperation_id = ring.id.clone();
                    coin.next = ring.coin_ids[(i + 1) % n].clone();
                    coin.prev = ring.coin_ids[(i + n - 1) % n].clone();
                }
            }
        }
    }

    /// Unbinds every cooperation ring belonging to `fractal_id`, returning their coins to
    /// `Run` with empty links.
    pub fn remove_fractal_ring(&mut self, fractal_id: &str) {
        let affected: Vec<String> = self
            .cooperations
            .values()
            .filter(|ring| ring.fractal_id == fractal_id)
            .map(|ring| ring.id.clone())
            .collect();
        for ring_id in affected {
            self.remove_cooperation_ring(&ring_id);
        }
    }

    fn remove_cooperation_ring(&mut self, cooperation_id: &str) {
        if let Some(ring) = self.cooperations.remove(cooperation_id) {
            for coin_id in &ring.coin_ids {
                if let Some(coin) = self.coins.get_mut(coin_id) {
                    coin.next = String::new();
                    coin.prev = String::new();
                    coin.status = Status::Run;
                    coin.cooperation_id = String::new();
                }
            }
        }
    }

    /// Marks every coin in a settled-and-expired ring as `Expired`.
    pub fn expire_ring(&mut self, ring: &CooperationRing) {
        for coin_id in &ring.coin_ids {
            if let Some(coin) = self.coins.get_mut(coin_id) {
                coin.status = Status::Expired;
            }
        }
    }

    /// Marks every coin in a fully-settled ring as `Paid`.
    pub fn pay_ring(&mut self, ring: &CooperationRing) {
        for coin_id in &ring.coin_ids {
            if let Some(coin) = self.coins.get_mut(coin_id) {
                coin.status = Status::Paid;
            }
        }
    }

    /// Applies a payout/debit to `trader_id`'s replicated balance. Fails if the resulting
    /// balance would go negative.
    pub fn update_balance(&mut self, trader_id: &str, amount: f64) -> Result<(), LorError> {
        let record = self.traders.get_mut(trader_id).ok_or(LorError::UnknownTrader)?;
        if record.account + amount < 0.0 {
            return Err(LorError::InsufficientAccount);
        }
        record.account += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            key_size: 512,
            type_count: 3,
            ..Config::default()
        }
    }

    #[test]
    fn create_coin_rejects_insufficient_balance() {
        let trader = Trader::new(BehaviorType::Normal, 1.0, &config()).unwrap();
        assert!(trader.create_coin(2.0, 0).is_none());
    }

    #[test]
    fn create_coin_succeeds_within_balance() {
        let trader = Trader::new(BehaviorType::Normal, 10.0, &config()).unwrap();
        let coin = trader.create_coin(5.0, 1).unwrap();
        assert_eq!(coin.owner, trader.id);
        assert_eq!(coin.status, Status::Run);
        assert_eq!(coin.coin_type, 1);
    }

    #[test]
    fn save_coin_debits_owner_balance() {
        let owner = Trader::new(BehaviorType::Normal, 10.0, &config()).unwrap();
        let mut watcher = Trader::new(BehaviorType::Normal, 10.0, &config()).unwrap();
        watcher.save_trader(owner.record()).unwrap();

        let coin = owner.create_coin(3.0, 0).unwrap();
        watcher.save_coin(coin).unwrap();
        assert_eq!(watcher.traders.get(&owner.id).unwrap().account, 7.0);
    }

    #[test]
    fn save_coin_rejects_unknown_owner() {
        let owner = Trader::new(BehaviorType::Normal, 10.0, &config()).unwrap();
        let mut watcher = Trader::new(BehaviorType::Normal, 10.0, &config()).unwrap();
        let coin = owner.create_coin(3.0, 0).unwrap();
        assert_eq!(watcher.save_coin(coin), Err(LorError::UnknownTrader));
    }

    #[test]
    fn save_coin_rejects_duplicate() {
        let owner = Trader::new(BehaviorType::Normal, 10.0, &config()).unwrap();
        let mut watcher = Trader::new(BehaviorType::Normal, 10.0, &config()).unwrap();
        watcher.save_trader(owner.record()).unwrap();

        let coin = owner.create_coin(3.0, 0).unwrap();
        watcher.save_coin(coin.clone()).unwrap();
        assert_eq!(watcher.save_coin(coin), Err(LorError::Duplicate));
    }

    #[test]
    fn check_for_cooperation_ring_requires_every_type_populated() {
        let mut trader = Trader::new(BehaviorType::Normal, 100.0, &config()).unwrap();
        trader.traders.insert(trader.id.clone(), trader.record());
        let coin = trader.create_coin(1.0, 0).unwrap();
        trader.save_coin(coin).unwrap();
        assert!(trader.check_for_cooperation_ring().is_none());
    }

    #[test]
    fn check_for_cooperation_ring_binds_one_coin_per_type() {
        let mut trader = Trader::new(BehaviorType::Normal, 100.0, &config()).unwrap();
        trader.traders.insert(trader.id.clone(), trader.record());
        for t in 0..3u32 {
            let coin = trader.create_coin(1.0, t).unwrap();
            trader.save_coin(coin).unwrap();
        }
        let ring = trader.check_for_cooperation_ring().unwrap();
        assert_eq!(ring.coin_ids.len(), 3);
        assert!(ring.is_solo());
    }

    #[test]
    fn vote_policy_bad_always_rejects() {
        let mut trader = Trader::new(BehaviorType::BadVote, 10.0, &config()).unwrap();
        trader.bad_behavior = 0.0;
        assert_eq!(trader.vote(), Err(LorError::BadBehavior));
    }

    #[test]
    fn vote_policy_normal_always_accepts() {
        let trader = Trader::new(BehaviorType::Normal, 10.0, &config()).unwrap();
        assert!(trader.vote().is_ok());
    }

    #[test]
    fn update_balance_rejects_negative_result() {
        let mut trader = Trader::new(BehaviorType::Normal, 10.0, &config()).unwrap();
        let other = Trader::new(BehaviorType::Normal, 1.0, &config()).unwrap();
        trader.traders.insert(other.id.clone(), other.record());
        assert_eq!(
            trader.update_balance(&other.id, -10.0),
            Err(LorError::InsufficientAccount)
        );
    }

    #[test]
    fn remove_fractal_ring_returns_coins_to_run() {
        let mut trader = Trader::new(BehaviorType::Normal, 100.0, &config()).unwrap();
        trader.traders.insert(trader.id.clone(), trader.record());
        for t in 0..3u32 {
            let coin = trader.create_coin(1.0, t).unwrap();
            trader.save_coin(coin).unwrap();
        }
        let ring = trader.check_for_cooperation_ring().unwrap();
        trader.cooperations.insert(ring.id.clone(), ring.clone());
        let fractal = FractalRing {
            id: "f1".into(),
            cooperation_rings: vec![ring.clone()],
            verification_team: vec![trader.id.clone()],
            is_valid: true,
            solo_rings: vec![ring.id.clone()],
        };
        trader.inform_fractal_ring(&fractal).unwrap();
        trader.remove_fractal_ring("f1");
        for coin_id in &ring.coin_ids {
            let coin = trader.coins.get(coin_id).unwrap();
            assert_eq!(coin.status, Status::Run);
            assert!(coin.next.is_empty());
        }
    }
}
