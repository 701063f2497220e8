//! 流量估算
//!
//! 优先使用同时段（小时 ±1、同星期几）的历史配送延迟均值；
//! 样本不足时回退到静态时段分桶

use chrono::{DateTime, Datelike, Timelike, Utc};
use courier_domain::DelaySample;
use serde::{Deserialize, Serialize};

use crate::config::GeoConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficLevel {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficEstimate {
    pub level: TrafficLevel,
    pub expected_speed_kmh: f64,
    /// 历史路径命中时为参与计算的样本数，回退时为 0
    pub sample_count: usize,
}

/// 过滤出与目标时刻同小时（±1）且同星期几的样本
pub fn matching_samples(samples: &[DelaySample], at: DateTime<Utc>) -> Vec<f64> {
    let hour = at.hour() as i64;
    let weekday = at.weekday();
    samples
        .iter()
        .filter(|s| {
            let sh = s.recorded_at.hour() as i64;
            let hour_diff = (sh - hour).rem_euclid(24).min((hour - sh).rem_euclid(24));
            hour_diff <= 1 && s.recorded_at.weekday() == weekday
        })
        .map(|s| s.delay_minutes)
        .collect()
}

pub fn estimate(config: &GeoConfig, samples: &[DelaySample], at: DateTime<Utc>) -> TrafficEstimate {
    let relevant = matching_samples(samples, at);
    if relevant.len() >= config.min_traffic_samples {
        let avg = relevant.iter().sum::<f64>() / relevant.len() as f64;
        let level = if avg >= config.delay_high_minutes {
            TrafficLevel::High
        } else if avg >= config.delay_moderate_minutes {
            TrafficLevel::Moderate
        } else {
            TrafficLevel::Low
        };
        return TrafficEstimate {
            level,
            expected_speed_kmh: speed_for(config, level),
            sample_count: relevant.len(),
        };
    }
    let level = static_bucket(config, at);
    TrafficEstimate {
        level,
        expected_speed_kmh: speed_for(config, level),
        sample_count: 0,
    }
}

fn static_bucket(config: &GeoConfig, at: DateTime<Utc>) -> TrafficLevel {
    let hour = at.hour() as u8;
    if config.buckets.peak_hours.contains(&hour) {
        TrafficLevel::High
    } else if config.buckets.moderate_hours.contains(&hour) {
        TrafficLevel::Moderate
    } else {
        TrafficLevel::Low
    }
}

pub fn speed_for(config: &GeoConfig, level: TrafficLevel) -> f64 {
    match level {
        TrafficLevel::Low => config.speed_low_kmh,
        TrafficLevel::Moderate => config.speed_moderate_kmh,
        TrafficLevel::High => config.speed_high_kmh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample_at(at: DateTime<Utc>, delay: f64) -> DelaySample {
        DelaySample {
            delay_minutes: delay,
            recorded_at: at,
        }
    }

    #[test]
    fn test_fallback_buckets() {
        let config = GeoConfig::default();
        // 周日 08:00，高峰小时
        let peak = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        assert_eq!(estimate(&config, &[], peak).level, TrafficLevel::High);
        // 12:00，中等
        let noon = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(estimate(&config, &[], noon).level, TrafficLevel::Moderate);
        // 03:00，空闲
        let night = Utc.with_ymd_and_hms(2025, 6, 1, 3, 0, 0).unwrap();
        let est = estimate(&config, &[], night);
        assert_eq!(est.level, TrafficLevel::Low);
        assert_eq!(est.sample_count, 0);
        assert_eq!(est.expected_speed_kmh, config.speed_low_kmh);
    }

    #[test]
    fn test_historical_overrides_bucket() {
        let config = GeoConfig::default();
        // 03:00 静态分桶是 Low，但历史样本显示严重延迟
        let at = Utc.with_ymd_and_hms(2025, 6, 8, 3, 0, 0).unwrap();
        let samples: Vec<DelaySample> = (0..5)
            .map(|w| sample_at(at - Duration::weeks(w + 1), 20.0))
            .collect();
        let est = estimate(&config, &samples, at);
        assert_eq!(est.level, TrafficLevel::High);
        assert_eq!(est.sample_count, 5);
    }

    #[test]
    fn test_insufficient_samples_fall_back() {
        let config = GeoConfig::default();
        let at = Utc.with_ymd_and_hms(2025, 6, 8, 3, 0, 0).unwrap();
        // 只有 2 个样本，低于阈值
        let samples = vec![
            sample_at(at - Duration::weeks(1), 20.0),
            sample_at(at - Duration::weeks(2), 20.0),
        ];
        let est = estimate(&config, &samples, at);
        assert_eq!(est.level, TrafficLevel::Low);
        assert_eq!(est.sample_count, 0);
    }

    #[test]
    fn test_hour_and_weekday_filter() {
        let at = Utc.with_ymd_and_hms(2025, 6, 8, 12, 0, 0).unwrap(); // 周日
        let same_slot = sample_at(Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap(), 3.0);
        let wrong_hour = sample_at(Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap(), 3.0);
        let wrong_day = sample_at(Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap(), 3.0);
        let matched = matching_samples(&[same_slot, wrong_hour, wrong_day], at);
        assert_eq!(matched.len(), 1);
    }
}
