use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationTier {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl RecommendationTier {
    /// 由总分推导推荐档位
    pub fn from_score(score: f64) -> Self {
        if score >= 85.0 {
            RecommendationTier::Excellent
        } else if score >= 70.0 {
            RecommendationTier::Good
        } else if score >= 50.0 {
            RecommendationTier::Acceptable
        } else {
            RecommendationTier::Poor
        }
    }
}

/// 六个维度的子分，均在 [0, 100]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchScores {
    pub geographic: f64,
    pub temporal: f64,
    pub capacity: f64,
    pub price: f64,
    pub reputation: f64,
    pub preference: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub shipment_id: Uuid,
    pub courier_id: Uuid,
    pub scores: MatchScores,
    pub total_score: f64,
    pub estimated_distance_km: f64,
    pub estimated_duration_minutes: f64,
    pub estimated_price: f64,
    pub tier: RecommendationTier,
    /// 可解释性：兼容原因，如 ROUTE_COMPATIBLE
    pub compatibility_reasons: Vec<String>,
    /// 可解释性：风险因素，如 WEIGHT_EXCEEDED
    pub risk_factors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(
            RecommendationTier::from_score(85.0),
            RecommendationTier::Excellent
        );
        assert_eq!(
            RecommendationTier::from_score(84.9),
            RecommendationTier::Good
        );
        assert_eq!(
            RecommendationTier::from_score(70.0),
            RecommendationTier::Good
        );
        assert_eq!(
            RecommendationTier::from_score(50.0),
            RecommendationTier::Acceptable
        );
        assert_eq!(
            RecommendationTier::from_score(49.9),
            RecommendationTier::Poor
        );
    }
}
