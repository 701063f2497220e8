use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, DispatchResult};

/// WGS84 坐标点，十进制度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn validate(&self) -> DispatchResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DispatchError::validation(format!(
                "纬度超出范围: {}",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DispatchError::validation(format!(
                "经度超出范围: {}",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// 时间窗口，用于取件时间和区域高峰时段
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> DispatchResult<Self> {
        if end <= start {
            return Err(DispatchError::validation("时间窗口结束必须晚于开始"));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// 与另一窗口的最小间隔（分钟）；重叠时为 0
    pub fn gap_minutes(&self, other: &TimeWindow) -> i64 {
        if self.end < other.start {
            (other.start - self.end).num_minutes()
        } else if other.end < self.start {
            (self.start - other.end).num_minutes()
        } else {
            0
        }
    }
}

/// 配送员特殊能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    FragileHandling,
    TemperatureControl,
    HeavyPackages,
    ExpressDelivery,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::FragileHandling => "FRAGILE_HANDLING",
            Capability::TemperatureControl => "TEMPERATURE_CONTROL",
            Capability::HeavyPackages => "HEAVY_PACKAGES",
            Capability::ExpressDelivery => "EXPRESS_DELIVERY",
        }
    }
}

/// 中转点营业时段（按小时，本地时间近似为 UTC）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub open_hour: u8,
    pub close_hour: u8,
}

impl OpeningHours {
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        let h = at.hour() as u8;
        if self.open_hour <= self.close_hour {
            h >= self.open_hour && h < self.close_hour
        } else {
            // 跨午夜时段
            h >= self.open_hour || h < self.close_hour
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(48.8566, 2.3522).validate().is_ok());
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, -181.0).validate().is_err());
    }

    #[test]
    fn test_time_window_ordering() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let w = TimeWindow::new(start, end).unwrap();
        assert_eq!(w.duration_minutes(), 120);
        assert!(TimeWindow::new(end, start).is_err());

        let later = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 1, 14, 0, 0).unwrap(),
        )
        .unwrap();
        assert_eq!(w.gap_minutes(&later), 60);
        assert_eq!(later.gap_minutes(&w), 60);
    }

    #[test]
    fn test_opening_hours_across_midnight() {
        let hours = OpeningHours {
            open_hour: 22,
            close_hour: 6,
        };
        let night = Utc.with_ymd_and_hms(2025, 6, 1, 23, 0, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert!(hours.is_open_at(night));
        assert!(!hours.is_open_at(noon));
    }
}
