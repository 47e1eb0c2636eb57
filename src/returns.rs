// Portfolio return and ranking computation from two snapshots
use crate::models::{Participant, PriceSnapshot, ReturnResult, SettlementRank};

/// Prize split for the top three finishers, in basis points of the pool.
pub const PRIZE_SPLIT_BPS: [u64; 3] = [5_000, 3_000, 2_000];

/// Per-asset percent changes between two snapshots. Assets present in only
/// one snapshot have no computable return and are excluded. Output is sorted
/// by asset id so identical inputs yield identical output.
pub fn compute_returns(start: &PriceSnapshot, end: &PriceSnapshot) -> Vec<ReturnResult> {
    let mut results: Vec<ReturnResult> = start
        .prices
        .iter()
        .filter_map(|(asset_id, &start_price)| {
            let end_price = end.price_of(asset_id)?;
            let percent_change =
                (end_price as f64 - start_price as f64) / start_price as f64 * 100.0;
            Some(ReturnResult {
                asset_id: asset_id.clone(),
                start_price_micros: start_price,
                end_price_micros: end_price,
                percent_change,
            })
        })
        .collect();

    results.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));
    results
}

/// Arithmetic mean of the computable returns among `holdings`. A holder with
/// no computable asset aggregates to 0.0, never NaN.
pub fn aggregate_return(holdings: &[String], returns: &[ReturnResult]) -> f64 {
    let changes: Vec<f64> = holdings
        .iter()
        .filter_map(|held| {
            returns
                .iter()
                .find(|r| r.asset_id == *held)
                .map(|r| r.percent_change)
        })
        .collect();

    if changes.is_empty() {
        return 0.0;
    }
    changes.iter().sum::<f64>() / changes.len() as f64
}

/// Leaderboard: descending by aggregate return, ties broken by earliest
/// submission. Deterministic for identical inputs.
pub fn rank(participants: &[Participant], returns: &[ReturnResult]) -> Vec<SettlementRank> {
    let mut scored: Vec<(&Participant, f64)> = participants
        .iter()
        .map(|p| (p, aggregate_return(&p.holdings, returns)))
        .collect();

    scored.sort_by(|(a, a_return), (b, b_return)| {
        b_return
            .total_cmp(a_return)
            .then(a.submitted_at_ms.cmp(&b.submitted_at_ms))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (p, aggregate))| SettlementRank {
            participant: p.account.clone(),
            aggregate_return: aggregate,
            rank: (i + 1) as u32,
        })
        .collect()
}

/// Payouts for the first `n_participants` ranks out of `total_pool_micros`.
/// Ranks past the prize table get nothing.
pub fn prize_splits(total_pool_micros: u64, n_participants: usize) -> Vec<u64> {
    (0..n_participants)
        .map(|i| match PRIZE_SPLIT_BPS.get(i) {
            Some(bps) => total_pool_micros * bps / 10_000,
            None => 0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(timestamp_ms: i64, prices: &[(&str, u64)]) -> PriceSnapshot {
        let mut s = PriceSnapshot::new(timestamp_ms);
        for (asset_id, price) in prices {
            s.prices.insert(asset_id.to_string(), *price);
        }
        s
    }

    fn participant(account: &str, holdings: &[&str], submitted_at_ms: i64) -> Participant {
        Participant {
            account: account.to_string(),
            holdings: holdings.iter().map(|h| h.to_string()).collect(),
            submitted_at_ms,
        }
    }

    #[test]
    fn test_compute_returns_example() {
        let start = snapshot(
            0,
            &[("bitcoin", 90_000_000_000), ("ethereum", 3_000_000_000)],
        );
        let end = snapshot(
            3_600_000,
            &[("bitcoin", 85_500_000_000), ("ethereum", 3_150_000_000)],
        );

        let returns = compute_returns(&start, &end);

        assert_eq!(returns.len(), 2);
        assert_eq!(returns[0].asset_id, "bitcoin");
        assert!((returns[0].percent_change - (-5.0)).abs() < 0.01);
        assert_eq!(returns[1].asset_id, "ethereum");
        assert!((returns[1].percent_change - 5.0).abs() < 0.01);
    }

    #[test]
    fn test_asset_in_one_snapshot_is_excluded() {
        let start = snapshot(0, &[("bitcoin", 90_000_000_000), ("solana", 150_000_000)]);
        let end = snapshot(3_600_000, &[("bitcoin", 91_000_000_000)]);

        let returns = compute_returns(&start, &end);

        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].asset_id, "bitcoin");
    }

    #[test]
    fn test_aggregate_return_mean_of_computable() {
        let returns = vec![
            ReturnResult {
                asset_id: "bitcoin".to_string(),
                start_price_micros: 90_000_000_000,
                end_price_micros: 85_500_000_000,
                percent_change: -5.0,
            },
            ReturnResult {
                asset_id: "ethereum".to_string(),
                start_price_micros: 3_000_000_000,
                end_price_micros: 3_150_000_000,
                percent_change: 5.0,
            },
        ];

        let holdings = vec!["bitcoin".to_string(), "ethereum".to_string()];
        assert_eq!(aggregate_return(&holdings, &returns), 0.0);

        // Holding with no computable return contributes nothing to the mean
        let holdings = vec!["ethereum".to_string(), "dogecoin".to_string()];
        assert_eq!(aggregate_return(&holdings, &returns), 5.0);
    }

    #[test]
    fn test_aggregate_return_no_computable_is_zero() {
        let holdings = vec!["dogecoin".to_string()];
        let agg = aggregate_return(&holdings, &[]);
        assert_eq!(agg, 0.0);
        assert!(!agg.is_nan());
    }

    #[test]
    fn test_rank_descending_with_timestamp_tiebreak() {
        let returns = vec![
            ReturnResult {
                asset_id: "bitcoin".to_string(),
                start_price_micros: 100,
                end_price_micros: 110,
                percent_change: 10.0,
            },
            ReturnResult {
                asset_id: "ethereum".to_string(),
                start_price_micros: 100,
                end_price_micros: 90,
                percent_change: -10.0,
            },
        ];

        let participants = vec![
            participant("late-winner", &["bitcoin"], 2_000),
            participant("loser", &["ethereum"], 500),
            participant("early-winner", &["bitcoin"], 1_000),
        ];

        let ranks = rank(&participants, &returns);

        assert_eq!(ranks[0].participant, "early-winner");
        assert_eq!(ranks[0].rank, 1);
        assert_eq!(ranks[1].participant, "late-winner");
        assert_eq!(ranks[1].rank, 2);
        assert_eq!(ranks[2].participant, "loser");
        assert_eq!(ranks[2].rank, 3);
    }

    #[test]
    fn test_rank_is_reproducible() {
        let returns = vec![ReturnResult {
            asset_id: "bitcoin".to_string(),
            start_price_micros: 100,
            end_price_micros: 105,
            percent_change: 5.0,
        }];
        let participants = vec![
            participant("a", &["bitcoin"], 3),
            participant("b", &["bitcoin"], 1),
            participant("c", &["bitcoin"], 2),
        ];

        let first = rank(&participants, &returns);
        let second = rank(&participants, &returns);
        for (x, y) in first.iter().zip(second.iter()) {
            assert_eq!(x.participant, y.participant);
            assert_eq!(x.rank, y.rank);
        }
        assert_eq!(first[0].participant, "b");
    }

    #[test]
    fn test_prize_splits() {
        let splits = prize_splits(10_000_000, 5);
        assert_eq!(splits, vec![5_000_000, 3_000_000, 2_000_000, 0, 0]);

        let splits = prize_splits(10_000_000, 2);
        assert_eq!(splits, vec![5_000_000, 3_000_000]);
    }
}
