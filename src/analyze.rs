//! Post-run statistical report over a finished `SystemSnapshot` (spec.md §4.8).

use std::collections::BTreeMap;

use crate::coin::Status;
use crate::config::ROUNDS_COUNT;
use crate::system::SystemSnapshot;

/// Prints the same report as the original's `AnalyzeSystem`, in the same order.
pub fn analyze(snapshot: &SystemSnapshot) {
    println!("Number of coins: {}", snapshot.coins.len());
    println!("Number of fractal rings: {}", snapshot.fractals.len());

    let run_coins = snapshot.coins.values().filter(|c| c.status == Status::Run).count();
    println!("Number of run coins: {run_coins}");

    let mut num_submitted = 0u64;
    let mut total_submitted = 0u64;
    let mut accept_rate = 0.0;
    for trader_id in snapshot.traders.keys() {
        let submitted = *snapshot.submit_count.get(trader_id).unwrap_or(&0);
        if submitted > 0 {
            num_submitted += 1;
            total_submitted += submitted;
            let accepted = *snapshot.accepted_count.get(trader_id).unwrap_or(&0);
            accept_rate += accepted as f64 / submitted as f64;
        }
    }
    println!(
        "Average number of submitted fractal rings per trader: {:.2}",
        total_submitted as f64 / num_submitted as f64
    );
    println!(
        "Average fractal ring acceptance rate per trader: {:.2}%",
        accept_rate / num_submitted as f64 * 100.0
    );

    println!("Number of invalid accepted fractal rings: {}", snapshot.bad_accept_count);
    println!("Number of valid rejected fractal rings: {}", snapshot.bad_reject_count);

    analyze_settlement(snapshot);
}

fn analyze_settlement(snapshot: &SystemSnapshot) {
    let mut coins_count = 0u64;
    let mut coins_total = 0.0;
    let mut coin_satisfaction: BTreeMap<String, f64> = BTreeMap::new();

    for fractal in snapshot.fractals.values() {
        for ring in &fractal.cooperation_rings {
            if ring.rounds == -1 {
                continue;
            }
            let mut satisfaction = ring.rounds as f64 / ROUNDS_COUNT as f64;
            if !ring.is_valid {
                satisfaction *= -1.0;
            }
            coins_count += ring.coin_ids.len() as u64;
            coins_total += satisfaction * ring.coin_ids.len() as f64;
            for coin_id in &ring.coin_ids {
                coin_satisfaction.insert(coin_id.clone(), satisfaction);
            }
        }
    }
    println!(
        "Average satisfaction per coin: {:.2}%",
        coins_total / coins_count as f64 * 100.0
    );

    let mut trader_satisfaction: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (coin_id, satisfaction) in &coin_satisfaction {
        if let Some(coin) = snapshot.coins.get(coin_id) {
            trader_satisfaction.entry(coin.owner.clone()).or_default().push(*satisfaction);
        }
    }
    let mut traders_total = 0.0;
    for satisfactions in trader_satisfaction.values() {
        let total: f64 = satisfactions.iter().sum();
        traders_total += total / satisfactions.len() as f64;
    }
    println!(
        "Average satisfaction per trader: {:.2}%",
        traders_total / trader_satisfaction.len() as f64 * 100.0
    );

    let mut communication_count: BTreeMap<String, u64> = snapshot.traders.keys().map(|id| (id.clone(), 0)).collect();
    for fractal in snapshot.fractals.values() {
        for ring in &fractal.cooperation_rings {
            for coin_id in &ring.coin_ids {
                if let Some(coin) = snapshot.coins.get(coin_id) {
                    *communication_count.entry(coin.owner.clone()).or_insert(0) +=
                        ring.coin_ids.len() as u64 + fractal.verification_team.len() as u64;
                }
            }
            for trader_id in &fractal.verification_team {
                *communication_count.entry(trader_id.clone()).or_insert(0) += ring.coin_ids.len() as u64;
            }
        }
    }

    let mut traders_count = 0u64;
    let mut total_adjacency = 0u64;
    let mut maximum_adjacency = 0u64;
    for count in communication_count.values() {
        if *count > 0 {
            traders_count += 1;
            total_adjacency += count;
            maximum_adjacency = maximum_adjacency.max(*count);
        }
    }
    println!(
        "Average adjacency per trader: {:.2}",
        total_adjacency as f64 / traders_count as f64
    );
    println!("Maximum adjacency per trader: {maximum_adjacency}");

    let mut ring_count: BTreeMap<String, u64> = snapshot.traders.keys().map(|id| (id.clone(), 0)).collect();
    for fractal in snapshot.fractals.values() {
        for ring in &fractal.cooperation_rings {
            for coin_id in &ring.coin_ids {
                if let Some(coin) = snapshot.coins.get(coin_id) {
                    *ring_count.entry(coin.owner.clone()).or_insert(0) += 1;
                }
            }
        }
    }
    let max_rings = ring_count.values().copied().max().unwrap_or(0);
    println!("Maximum cooperation ring count: {max_rings}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::Coin;
    use crate::cooperation::CooperationRing;
    use crate::fractal::FractalRing;
    use crate::trader::TraderRecord;

    fn snapshot_with_one_settled_ring() -> SystemSnapshot {
        let mut snapshot = SystemSnapshot::default();
        snapshot.traders.insert(
            "t1".into(),
            TraderRecord { id: "t1".into(), account: 100.0, wallet: "w1".into(), public_key: None },
        );
        snapshot.coins.insert(
            "c1".into(),
            Coin {
                id: "c1".into(),
                amount: 2.0,
                status: Status::Paid,
                coin_type: 0,
                next: String::new(),
                prev: String::new(),
                owner: "t1".into(),
                cooperation_id: String::new(),
            },
        );
        let ring = CooperationRing {
            id: "r1".into(),
            weight: 2.0,
            next: String::new(),
            prev: String::new(),
            investor: "c1".into(),
            coin_ids: vec!["c1".into()],
            fractal_id: "f1".into(),
            is_valid: true,
            rounds: ROUNDS_COUNT as i32,
            unused_coins: vec![],
        };
        snapshot.fractals.insert(
            "f1".into(),
            FractalRing {
                id: "f1".into(),
                cooperation_rings: vec![ring],
                verification_team: vec!["t1".into()],
                is_valid: true,
                solo_rings: vec![],
            },
        );
        snapshot.submit_count.insert("t1".into(), 1);
        snapshot.accepted_count.insert("t1".into(), 1);
        snapshot
    }

    #[test]
    fn analyze_does_not_panic_on_a_small_snapshot() {
        analyze(&snapshot_with_one_settled_ring());
    }

    #[test]
    fn analyze_does_not_panic_on_an_empty_snapshot() {
        analyze(&SystemSnapshot::default());
    }
}
