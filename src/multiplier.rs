// Reward multiplier for range predictions and prediction settlement
use crate::error::EngineError;
use crate::models::{validate_range, Prediction, PredictionOutcome, MICROS_PER_USD};

/// Ordered tier table on the range width in currency units; the first entry
/// whose upper bound is not exceeded wins. Tighter ranges pay more.
pub const RANGE_TIERS: [(f64, f64); 5] = [
    (1.0, 20.0),
    (5.0, 10.0),
    (10.0, 5.0),
    (20.0, 2.5),
    (50.0, 1.5),
];

/// Multiplier for ranges wider than every tier bound.
pub const DEFAULT_RANGE_MULTIPLIER: f64 = 1.0;

/// Applied when the prediction was AI-assisted.
pub const AI_ASSIST_PENALTY: f64 = 0.8;

/// Tier lookup on the range width, boundary inclusive on the lower tier.
pub fn range_multiplier(range_width_usd: f64) -> f64 {
    for (upper_bound, multiplier) in RANGE_TIERS {
        if range_width_usd <= upper_bound {
            return multiplier;
        }
    }
    DEFAULT_RANGE_MULTIPLIER
}

/// Reward multiplier for a range prediction. Pure; this is the single
/// implementation used by settlement and by any preview shown to a player,
/// so the two can never disagree.
pub fn compute_multiplier(
    min_price_micros: u64,
    max_price_micros: u64,
    confidence: u8,
    ai_assisted: bool,
) -> Result<f64, EngineError> {
    validate_range(min_price_micros, max_price_micros)?;

    let range_width_usd = (max_price_micros - min_price_micros) as f64 / MICROS_PER_USD as f64;
    let confidence = confidence.min(100);

    let confidence_multiplier = 1.0 + (confidence as f64 / 100.0) * 0.5;
    let ai_penalty = if ai_assisted { AI_ASSIST_PENALTY } else { 1.0 };

    Ok(range_multiplier(range_width_usd) * confidence_multiplier * ai_penalty)
}

/// Settle range predictions against the final price. A prediction whose
/// range contains the final price earns `entry_fee × multiplier`; the rest
/// earn nothing. Predictions with an invalid range settle as out-of-range
/// (they should have been rejected at submission).
pub fn settle_predictions(
    final_price_micros: u64,
    entry_fee_micros: u64,
    predictions: &[Prediction],
) -> Vec<PredictionOutcome> {
    predictions
        .iter()
        .map(|prediction| {
            let in_range = prediction.validate().is_ok()
                && final_price_micros >= prediction.min_price_micros
                && final_price_micros <= prediction.max_price_micros;

            if !in_range {
                return PredictionOutcome {
                    player: prediction.player.clone(),
                    in_range: false,
                    multiplier: None,
                    reward_micros: None,
                };
            }

            let multiplier = compute_multiplier(
                prediction.min_price_micros,
                prediction.max_price_micros,
                prediction.confidence,
                prediction.ai_assisted,
            )
            .expect("validated range");

            PredictionOutcome {
                player: prediction.player.clone(),
                in_range: true,
                multiplier: Some(multiplier),
                reward_micros: Some((entry_fee_micros as f64 * multiplier) as u64),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(units: f64) -> u64 {
        (units * MICROS_PER_USD as f64) as u64
    }

    #[test]
    fn test_tier_boundaries() {
        let widths = [0.5, 1.0, 3.0, 5.0, 8.0, 10.0, 15.0, 20.0, 30.0, 50.0, 80.0];
        let expected = [20.0, 20.0, 10.0, 10.0, 5.0, 5.0, 2.5, 2.5, 1.5, 1.5, 1.0];
        for (width, want) in widths.iter().zip(expected.iter()) {
            assert_eq!(range_multiplier(*width), *want, "width {}", width);
        }
    }

    #[test]
    fn test_ai_penalty_never_increases_multiplier() {
        let ranges = [
            (usd(100.0), usd(100.5)),
            (usd(100.0), usd(104.0)),
            (usd(100.0), usd(118.0)),
            (usd(100.0), usd(190.0)),
        ];
        for (min, max) in ranges {
            for confidence in [0u8, 25, 50, 75, 100] {
                let assisted = compute_multiplier(min, max, confidence, true).unwrap();
                let unassisted = compute_multiplier(min, max, confidence, false).unwrap();
                assert!(assisted <= unassisted);
            }
        }
    }

    #[test]
    fn test_multiplier_composition() {
        // width 4 USD → tier 10.0; confidence 80 → 1.4; AI → 0.8
        let m = compute_multiplier(usd(96.0), usd(100.0), 80, true).unwrap();
        assert!((m - 10.0 * 1.4 * 0.8).abs() < 1e-9);

        let m = compute_multiplier(usd(96.0), usd(100.0), 80, false).unwrap();
        assert!((m - 10.0 * 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(matches!(
            compute_multiplier(usd(100.0), usd(100.0), 50, false),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(matches!(
            compute_multiplier(usd(101.0), usd(100.0), 50, false),
            Err(EngineError::InvalidRange { .. })
        ));
        assert!(matches!(
            compute_multiplier(0, usd(100.0), 50, false),
            Err(EngineError::InvalidRange { .. })
        ));
    }

    fn prediction(player: &str, min: u64, max: u64, confidence: u8, ai: bool) -> Prediction {
        Prediction {
            player: player.to_string(),
            min_price_micros: min,
            max_price_micros: max,
            confidence,
            ai_assisted: ai,
            submitted_at_ms: 0,
        }
    }

    #[test]
    fn test_settle_predictions() {
        let predictions = vec![
            prediction("in-range", usd(84_000.0), usd(85_000.0), 100, false),
            prediction("out-of-range", usd(90_000.0), usd(95_000.0), 100, false),
        ];

        let outcomes = settle_predictions(usd(84_714.0), usd(10.0), &predictions);

        assert!(outcomes[0].in_range);
        // width 1000 USD → tier 1.0; confidence 100 → 1.5
        assert_eq!(outcomes[0].multiplier, Some(1.5));
        assert_eq!(outcomes[0].reward_micros, Some(usd(15.0)));

        assert!(!outcomes[1].in_range);
        assert_eq!(outcomes[1].multiplier, None);
        assert_eq!(outcomes[1].reward_micros, None);
    }

    #[test]
    fn test_settlement_and_preview_agree() {
        let p = prediction("player", usd(84_000.0), usd(84_004.0), 60, true);
        let outcomes = settle_predictions(usd(84_002.0), usd(10.0), &[p.clone()]);
        let preview =
            compute_multiplier(p.min_price_micros, p.max_price_micros, p.confidence, true).unwrap();
        assert_eq!(outcomes[0].multiplier, Some(preview));
    }
}
