use courier_domain::{DispatchError, DispatchResult};
use serde::{Deserialize, Serialize};

/// 版本化的评分权重配置。权重以百分比表示，总和必须为 100，
/// 便于审计和线上调参
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchWeights {
    pub version: u32,
    pub geographic: f64,
    pub temporal: f64,
    pub capacity: f64,
    pub price: f64,
    pub reputation: f64,
    pub preference: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            version: 1,
            geographic: 25.0,
            temporal: 20.0,
            capacity: 20.0,
            price: 15.0,
            reputation: 15.0,
            preference: 5.0,
        }
    }
}

impl MatchWeights {
    pub fn validate(&self) -> DispatchResult<()> {
        let sum = self.geographic
            + self.temporal
            + self.capacity
            + self.price
            + self.reputation
            + self.preference;
        if (sum - 100.0).abs() > 1e-6 {
            return Err(DispatchError::config_error(format!(
                "评分权重总和必须为 100，当前为 {sum}（版本 {}）",
                self.version
            )));
        }
        Ok(())
    }
}

/// 单次匹配请求的筛选条件
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchCriteria {
    pub max_distance_km: f64,
    pub max_detour_percentage: f64,
    pub time_flexibility_hours: f64,
    pub min_courier_rating: f64,
    pub price_flexibility_percentage: f64,
    pub prioritize_experience: bool,
    pub prioritize_speed: bool,
    pub prioritize_price: bool,
}

impl Default for MatchCriteria {
    fn default() -> Self {
        Self {
            max_distance_km: 50.0,
            max_detour_percentage: 30.0,
            time_flexibility_hours: 24.0,
            min_courier_rating: 3.0,
            price_flexibility_percentage: 20.0,
            prioritize_experience: false,
            prioritize_speed: false,
            prioritize_price: false,
        }
    }
}

impl MatchCriteria {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.max_distance_km <= 0.0 {
            return Err(DispatchError::validation("最大距离必须为正"));
        }
        if self.max_detour_percentage <= 0.0 {
            return Err(DispatchError::validation("最大绕路比例必须为正"));
        }
        if !(0.0..=5.0).contains(&self.min_courier_rating) {
            return Err(DispatchError::validation("评分下限必须在 0-5 之间"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub weights: MatchWeights,
    /// 总分低于该阈值的候选不进入结果
    pub score_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            weights: MatchWeights::default(),
            score_threshold: 50.0,
        }
    }
}

impl MatchingConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        self.weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_100() {
        assert!(MatchWeights::default().validate().is_ok());
    }

    #[test]
    fn test_unbalanced_weights_rejected() {
        let mut w = MatchWeights::default();
        w.preference = 10.0;
        assert!(w.validate().is_err());
    }

    #[test]
    fn test_criteria_validation() {
        assert!(MatchCriteria::default().validate().is_ok());
        let mut c = MatchCriteria::default();
        c.max_distance_km = 0.0;
        assert!(c.validate().is_err());
    }
}
