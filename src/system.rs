//! Process-wide coordinator: coin broadcast, ring construction polling, committee
//! verification, ban application, and the settlement rounds engine (spec.md §4.5, §4.6).

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coin::{Coin, Status};
use crate::config::{BAN_COUNT, ROUNDS_COUNT};
use crate::cooperation::CooperationRing;
use crate::error::LorError;
use crate::fractal::{FRACTAL_PRIZE, FractalRing};
use crate::trader::{Trader, TraderRecord};

/// The public, persisted projection of `System` (spec.md §4.7). `Trader`s themselves are
/// not `Clone`able owners of secrets, so the snapshot stores only their public records.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub bad_accept_count: u64,
    pub bad_reject_count: u64,
    pub fractal_counter: i64,
    pub submit_count: BTreeMap<String, u64>,
    pub accepted_count: BTreeMap<String, u64>,
    pub traders: BTreeMap<String, TraderRecord>,
    pub coins: BTreeMap<String, Coin>,
    pub fractals: BTreeMap<String, FractalRing>,
}

/// Process-wide authoritative coordinator. Every trader's replica is kept consistent by
/// routing every coin through `process_coin`, the sole mutating entry point (spec.md §4.5).
pub struct System {
    pub bad_accept_count: u64,
    pub bad_reject_count: u64,
    pub fractal_counter: i64,
    pub submit_count: BTreeMap<String, u64>,
    pub accepted_count: BTreeMap<String, u64>,
    pub traders: BTreeMap<String, Trader>,
    pub coins: BTreeMap<String, Coin>,
    pub fractals: BTreeMap<String, FractalRing>,
}

impl System {
    pub fn new() -> Self {
        Self {
            bad_accept_count: 0,
            bad_reject_count: 0,
            fractal_counter: 0,
            submit_count: BTreeMap::new(),
            accepted_count: BTreeMap::new(),
            traders: BTreeMap::new(),
            coins: BTreeMap::new(),
            fractals: BTreeMap::new(),
        }
    }

    /// Registers a freshly-created trader and cross-saves its public record into every
    /// other trader's replica (and vice versa), matching the original's `saveTraders`
    /// all-pairs pass.
    pub fn add_trader(&mut self, trader: Trader) -> Result<(), LorError> {
        let record = trader.record();
        for other in self.traders.values_mut() {
            other.save_trader(record.clone())?;
        }
        let mut trader = trader;
        for other in self.traders.values() {
            trader.save_trader(other.record())?;
        }
        self.traders.insert(trader.id.clone(), trader);
        Ok(())
    }

    /// Entry point for a freshly-minted coin: stores it, replicates it to every trader,
    /// then polls traders (owner excluded) for a cooperation/fractal ring (spec.md §4.5).
    pub fn process_coin(&mut self, coin: Coin) -> Result<(), LorError> {
        self.coins.insert(coin.id.clone(), coin.clone());
        self.save_coin_to_traders(&coin)?;
        self.process_traders_for_coin(&coin)
    }

    fn save_coin_to_traders(&mut self, coin: &Coin) -> Result<(), LorError> {
        for trader in self.traders.values_mut() {
            trader.save_coin(coin.clone())?;
        }
        Ok(())
    }

    fn process_traders_for_coin(&mut self, coin: &Coin) -> Result<(), LorError> {
        for trader_id in self.shuffled_trader_ids(&coin.owner) {
            let fractal = {
                let trader = self.traders.get_mut(&trader_id).ok_or(LorError::UnknownTrader)?;
                trader.check_for_rings(self.fractal_counter)
            };
            if let Some(fractal) = fractal {
                self.fractal_counter += 1;
                *self.submit_count.entry(trader_id.clone()).or_insert(0) += 1;
                self.handle_fractal(&trader_id, fractal)?;
                return Ok(());
            }
        }
        Ok(())
    }

    /// Every trader id except `exclude`, in random order, matching the original's
    /// `getShuffledTraderIDs`.
    fn shuffled_trader_ids(&self, exclude: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .traders
            .keys()
            .filter(|id| id.as_str() != exclude)
            .cloned()
            .collect();
        ids.shuffle(&mut rand::thread_rng());
        ids
    }

    fn handle_fractal(&mut self, proposer_id: &str, mut fractal: FractalRing) -> Result<(), LorError> {
        match self.process_fractal(proposer_id, &mut fractal) {
            Err(err) => {
                if fractal.is_valid {
                    self.bad_reject_count += 1;
                    warn!(fractal_id = %fractal.id, "valid fractal ring rejected");
                }
                Err(err)
            }
            Ok(()) => {
                if !fractal.is_valid {
                    self.bad_accept_count += 1;
                    warn!(fractal_id = %fractal.id, "invalid fractal ring accepted");
                }
                info!(
                    fractal_id = %fractal.id,
                    rings = fractal.cooperation_rings.len(),
                    team = fractal.verification_team.len(),
                    "fractal ring accepted"
                );
                self.run_fractal(&mut fractal)
            }
        }
    }

    fn process_fractal(&mut self, proposer_id: &str, fractal: &mut FractalRing) -> Result<(), LorError> {
        if let Err(err) = self.verify_fractal(fractal) {
            if let Some(trader) = self.traders.get_mut(proposer_id) {
                trader.remove_fractal_ring(&fractal.id);
            }
            return Err(err);
        }
        self.check_coins(fractal)?;
        self.inform_others(fractal)?;
        self.fractals.insert(fractal.id.clone(), fractal.clone());
        *self.accepted_count.entry(proposer_id.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn verify_fractal(&mut self, fractal: &FractalRing) -> Result<(), LorError> {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for trader_id in &fractal.verification_team {
            let trader = self.traders.get(trader_id).ok_or(LorError::UnknownTrader)?;
            match trader.submit_ring(fractal) {
                Ok(()) => accepted.push(trader_id.clone()),
                Err(_) => rejected.push(trader_id.clone()),
            }
        }
        self.ban_traders(&accepted, &rejected);
        if rejected.len() > accepted.len() {
            return Err(LorError::BadBehavior);
        }
        Ok(())
    }

    fn check_coins(&self, fractal: &FractalRing) -> Result<(), LorError> {
        for ring in &fractal.cooperation_rings {
            for coin_id in &ring.coin_ids {
                let coin = self.coins.get(coin_id).ok_or(LorError::CoinNotFound)?;
                if coin.status != Status::Run {
                    return Err(LorError::CoinNotRunning);
                }
            }
        }
        Ok(())
    }

    fn inform_others(&mut self, fractal: &FractalRing) -> Result<(), LorError> {
        for ring in &fractal.cooperation_rings {
            for coin_id in &ring.coin_ids {
                if let Some(coin) = self.coins.get_mut(coin_id) {
                    coin.status = Status::Blocked;
                }
            }
        }
        for trader in self.traders.values_mut() {
            trader.inform_fractal_ring(fractal)?;
        }
        Ok(())
    }

    /// Multi-round re-vote on every constituent cooperation ring: each round every
    /// still-pending ring is re-voted by the committee; a majority-reject round settles
    /// that ring at a proportional partial payout. Anything still pending after
    /// `ROUNDS_COUNT` rounds settles at full payout plus `FRACTAL_PRIZE` (spec.md §4.6).
    fn run_fractal(&mut self, fractal: &mut FractalRing) -> Result<(), LorError> {
        for round in 0..ROUNDS_COUNT {
            for index in 0..fractal.cooperation_rings.len() {
                if fractal.cooperation_rings[index].rounds != -1 {
                    continue;
                }
                let mut accepted = Vec::new();
                let mut rejected = Vec::new();
                for trader_id in &fractal.verification_team {
                    let trader = self.traders.get(trader_id).ok_or(LorError::UnknownTrader)?;
                    match trader.vote() {
                        Ok(()) => accepted.push(trader_id.clone()),
                        Err(LorError::BadBehavior) => rejected.push(trader_id.clone()),
                        Err(err) => return Err(err),
                    }
                }
                self.ban_traders(&accepted, &rejected);
                if rejected.len() > accepted.len() {
                    fractal.cooperation_rings[index].rounds = round as i32;
                    let ring = fractal.cooperation_rings[index].clone();
                    let first_coin_amount = self
                        .coins
                        .get(&ring.coin_ids[0])
                        .ok_or(LorError::CoinNotFound)?
                        .amount;
                    let money = first_coin_amount * (round as f64) / (ROUNDS_COUNT as f64);
                    self.apply_ring(&ring, money)?;
                }
            }
        }

        for index in 0..fractal.cooperation_rings.len() {
            if fractal.cooperation_rings[index].rounds == -1 {
                fractal.cooperation_rings[index].rounds = ROUNDS_COUNT as i32;
                let ring = fractal.cooperation_rings[index].clone();
                let first_coin_amount = self
                    .coins
                    .get(&ring.coin_ids[0])
                    .ok_or(LorError::CoinNotFound)?
                    .amount;
                self.apply_ring(&ring, first_coin_amount)?;
            }
        }
        Ok(())
    }

    fn apply_ring(&mut self, ring: &CooperationRing, money: f64) -> Result<(), LorError> {
        let settled = ring.rounds >= 0 && (ring.rounds as u32) >= ROUNDS_COUNT;
        for coin_id in &ring.coin_ids {
            let coin = self.coins.get(coin_id).ok_or(LorError::CoinNotFound)?.clone();
            let mut amount = money * coin.amount / ring.weight;
            let status = if settled {
                amount += FRACTAL_PRIZE;
                Status::Paid
            } else {
                Status::Expired
            };
            if let Some(stored) = self.coins.get_mut(coin_id) {
                stored.status = status;
            }
            for trader in self.traders.values_mut() {
                trader.update_balance(&coin.owner, amount)?;
            }
        }

        for trader in self.traders.values_mut() {
            if settled {
                trader.pay_ring(ring);
            } else {
                trader.expire_ring(ring);
            }
        }
        debug!(ring_id = %ring.id, settled, "cooperation ring settled");
        Ok(())
    }

    /// Bans the minority side of a vote for `BAN_COUNT` fractal ticks, matching the
    /// original's "whoever was outvoted was probably lying" heuristic.
    fn ban_traders(&mut self, accepted: &[String], rejected: &[String]) {
        let minority = if accepted.len() > rejected.len() { rejected } else { accepted };
        for trader_id in minority {
            if let Some(trader) = self.traders.get_mut(trader_id) {
                trader.ban_until = self.fractal_counter + BAN_COUNT;
            }
        }
    }

    /// The persisted public snapshot of this system (spec.md §4.7).
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot {
            bad_accept_count: self.bad_accept_count,
            bad_reject_count: self.bad_reject_count,
            fractal_counter: self.fractal_counter,
            submit_count: self.submit_count.clone(),
            accepted_count: self.accepted_count.clone(),
            traders: self.traders.iter().map(|(id, t)| (id.clone(), t.record())).collect(),
            coins: self.coins.clone(),
            fractals: self.fractals.clone(),
        }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}
