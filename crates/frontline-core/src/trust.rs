//! Reputation arithmetic: trust score and running average rating.

use serde::{Deserialize, Serialize};

pub const POST_WEIGHT: f64 = 2.0;
pub const COMMUNITY_WEIGHT: f64 = 3.0;
pub const RATING_WEIGHT: f64 = 10.0;
pub const TRUST_SCORE_CAP: u32 = 99;

/// Counts a trust score is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustInputs {
    pub post_count: i64,
    pub community_count: i64,
    pub average_rating: f64,
}

/// Weighted sum of activity and rating, rounded and capped at [`TRUST_SCORE_CAP`].
pub fn trust_score(inputs: TrustInputs) -> u32 {
    let rating = if inputs.average_rating.is_finite() {
        inputs.average_rating.clamp(0.0, 5.0)
    } else {
        0.0
    };
    let raw = inputs.post_count.max(0) as f64 * POST_WEIGHT
        + inputs.community_count.max(0) as f64 * COMMUNITY_WEIGHT
        + rating * RATING_WEIGHT;

    (raw.round() as u32).min(TRUST_SCORE_CAP)
}

/// Fold one more rating into an existing average.
pub fn next_average(current_avg: f64, current_count: i64, new_rating: u8) -> f64 {
    if current_count <= 0 {
        return f64::from(new_rating);
    }
    let count = current_count as f64;
    (current_avg * count + f64::from(new_rating)) / (count + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_score_weights() {
        let score = trust_score(TrustInputs {
            post_count: 3,
            community_count: 2,
            average_rating: 4.5,
        });
        // 6 + 6 + 45
        assert_eq!(score, 57);
    }

    #[test]
    fn test_trust_score_caps_at_99() {
        let score = trust_score(TrustInputs {
            post_count: 500,
            community_count: 20,
            average_rating: 5.0,
        });
        assert_eq!(score, TRUST_SCORE_CAP);
    }

    #[test]
    fn test_trust_score_new_user_is_zero() {
        assert_eq!(trust_score(TrustInputs::default()), 0);
    }

    #[test]
    fn test_trust_score_ignores_bad_rating() {
        let score = trust_score(TrustInputs {
            post_count: 1,
            community_count: 0,
            average_rating: f64::NAN,
        });
        assert_eq!(score, 2);
    }

    #[test]
    fn test_next_average_first_rating() {
        assert_eq!(next_average(0.0, 0, 4), 4.0);
    }

    #[test]
    fn test_next_average_running() {
        let mut avg = 0.0;
        let mut count = 0;
        for r in [5u8, 3, 4] {
            avg = next_average(avg, count, r);
            count += 1;
        }
        assert!((avg - 4.0).abs() < 1e-9);
    }
}
