//! 匹配子分计算
//!
//! 六个维度的纯函数评分，均输出 [0, 100]。
//! 硬性约束不满足时置 0 并标记 hard_fail，由引擎整体排除

use chrono::{DateTime, Utc};
use courier_domain::{Capability, Courier, GeoPoint, Route, ShipmentRequest};
use courier_geo::haversine_km;

use crate::config::{MatchCriteria, MatchWeights};

#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub score: f64,
    pub reasons: Vec<String>,
    pub risks: Vec<String>,
    /// 硬性约束失败：整体匹配必须被排除
    pub hard_fail: bool,
}

impl Evaluation {
    fn clamp(mut self) -> Self {
        self.score = self.score.clamp(0.0, 100.0);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GeographicEvaluation {
    pub eval: Evaluation,
    pub distance_km: f64,
    pub detour_percentage: f64,
    pub duration_minutes: f64,
}

/// 地理评分。有活动路线时按绕路比例评估，否则按点距离
pub fn geographic(
    shipment: &ShipmentRequest,
    courier_position: Option<GeoPoint>,
    active_route: Option<&Route>,
    criteria: &MatchCriteria,
) -> GeographicEvaluation {
    let direct_km = haversine_km(shipment.pickup_location, shipment.delivery_location);
    let mut out = GeographicEvaluation {
        distance_km: direct_km,
        ..Default::default()
    };

    if let Some(route) = active_route.filter(|r| r.stops.len() >= 2) {
        let departure = route.stops[0].location;
        let arrival = route.stops[route.stops.len() - 1].location;
        let original = haversine_km(departure, arrival).max(0.1);
        let with_detour = haversine_km(departure, shipment.pickup_location)
            + direct_km
            + haversine_km(shipment.delivery_location, arrival);
        let detour_pct = (with_detour - original) / original * 100.0;
        out.detour_percentage = detour_pct;

        if detour_pct > criteria.max_detour_percentage {
            out.eval.risks.push("SIGNIFICANT_DETOUR".to_string());
            return out;
        }
        out.eval.score =
            (50.0 - (detour_pct / criteria.max_detour_percentage) * 50.0).max(0.0);
        out.duration_minutes = estimate_duration_minutes(with_detour);
        out.eval.reasons.push("ROUTE_COMPATIBLE".to_string());
        if detour_pct <= 10.0 {
            out.eval.reasons.push("MINIMAL_DETOUR".to_string());
        }
        if direct_km <= 20.0 {
            out.eval.reasons.push("SHORT_DISTANCE".to_string());
        }
        return out;
    }

    match courier_position {
        Some(position) => {
            let to_pickup = haversine_km(position, shipment.pickup_location);
            if to_pickup <= criteria.max_distance_km {
                out.eval.score =
                    (50.0 - (to_pickup / criteria.max_distance_km) * 50.0).max(0.0);
                out.duration_minutes = estimate_duration_minutes(to_pickup + direct_km);
                out.eval.reasons.push("PROXIMITY_COMPATIBLE".to_string());
                if to_pickup <= 10.0 {
                    out.eval.reasons.push("VERY_CLOSE".to_string());
                }
            } else {
                out.eval.risks.push("DISTANCE_TOO_FAR".to_string());
            }
        }
        None => {
            out.eval.risks.push("NO_KNOWN_POSITION".to_string());
        }
    }
    out
}

/// 时间评分。过期的取件时间直接判 0
pub fn temporal(shipment: &ShipmentRequest, now: DateTime<Utc>, criteria: &MatchCriteria) -> Evaluation {
    let mut eval = Evaluation {
        score: 50.0,
        ..Default::default()
    };

    match shipment.pickup_window {
        Some(window) => {
            let hours_until = (window.start - now).num_minutes() as f64 / 60.0;
            if hours_until < 0.0 && !window.contains(now) {
                eval.score = 0.0;
                eval.risks.push("PICKUP_DATE_PAST".to_string());
                return eval;
            }
            if hours_until <= criteria.time_flexibility_hours {
                eval.score += 20.0;
                eval.reasons.push("TIMING_FLEXIBLE".to_string());
            } else if hours_until <= criteria.time_flexibility_hours * 2.0 {
                eval.score += 10.0;
                eval.reasons.push("TIMING_ACCEPTABLE".to_string());
            } else {
                eval.score -= 10.0;
                eval.risks.push("PICKUP_DATE_FAR".to_string());
            }
        }
        None => {
            eval.score += 15.0;
            eval.reasons.push("FLEXIBLE_TIMING".to_string());
        }
    }

    if shipment.priority >= 5 {
        eval.score += 10.0;
        eval.reasons.push("URGENT_PRIORITY".to_string());
    } else if shipment.priority == 4 {
        eval.score += 5.0;
        eval.reasons.push("HIGH_PRIORITY".to_string());
    }

    eval.clamp()
}

/// 载量评分。重量/体积超限、缺冷藏、缺易碎处理都是硬性失败
pub fn capacity(shipment: &ShipmentRequest, courier: &Courier) -> Evaluation {
    let mut eval = Evaluation {
        score: 50.0,
        ..Default::default()
    };

    if shipment.weight_kg > courier.vehicle.max_weight_kg {
        eval.risks.push("WEIGHT_EXCEEDED".to_string());
        eval.score = 0.0;
        eval.hard_fail = true;
    } else {
        let ratio = shipment.weight_kg / courier.vehicle.max_weight_kg;
        if ratio <= 0.5 {
            eval.score += 20.0;
            eval.reasons.push("WEIGHT_COMFORTABLE".to_string());
        } else if ratio <= 0.8 {
            eval.score += 10.0;
            eval.reasons.push("WEIGHT_ACCEPTABLE".to_string());
        } else {
            eval.reasons.push("WEIGHT_LIMIT_CLOSE".to_string());
        }
    }

    if shipment.volume_m3 > courier.vehicle.max_volume_m3 {
        eval.risks.push("VOLUME_EXCEEDED".to_string());
        eval.score = 0.0;
        eval.hard_fail = true;
    } else if !eval.hard_fail {
        eval.score += 15.0;
        eval.reasons.push("VOLUME_COMPATIBLE".to_string());
    }

    if shipment.fragile {
        if courier.vehicle.careful_handling || courier.has_capability(Capability::FragileHandling)
        {
            eval.score += 10.0;
            eval.reasons.push("FRAGILE_HANDLING_AVAILABLE".to_string());
        } else {
            eval.risks.push("NO_FRAGILE_HANDLING".to_string());
            eval.score = 0.0;
            eval.hard_fail = true;
        }
    }

    if shipment.needs_refrigeration {
        if courier.vehicle.refrigerated
            || courier.has_capability(Capability::TemperatureControl)
        {
            eval.score += 15.0;
            eval.reasons.push("REFRIGERATION_AVAILABLE".to_string());
        } else {
            eval.risks.push("NO_REFRIGERATION".to_string());
            eval.score = 0.0;
            eval.hard_fail = true;
        }
    }

    if eval.hard_fail {
        eval.score = 0.0;
        return eval;
    }
    eval.clamp()
}

/// 价格评分：估算价与建议价的贴合程度
pub fn price(estimated_price: f64, shipment: &ShipmentRequest, criteria: &MatchCriteria) -> Evaluation {
    let mut eval = Evaluation {
        score: 50.0,
        ..Default::default()
    };

    if shipment.suggested_price > 0.0 {
        let ceiling =
            shipment.suggested_price * (1.0 + criteria.price_flexibility_percentage / 100.0);
        if estimated_price <= shipment.suggested_price {
            eval.score += 25.0;
            eval.reasons.push("PRICE_UNDER_BUDGET".to_string());
        } else if estimated_price <= ceiling {
            eval.score += 15.0;
            eval.reasons.push("PRICE_WITHIN_FLEXIBILITY".to_string());
        } else {
            eval.score -= 20.0;
            eval.risks.push("PRICE_OVER_BUDGET".to_string());
        }
    }

    if shipment.price_negotiable {
        eval.score += 10.0;
        eval.reasons.push("PRICE_NEGOTIABLE".to_string());
    }

    eval.clamp()
}

/// 信誉评分：评分占 40 分，经验封顶 30 分，近期评价封顶 15 分
pub fn reputation(courier: &Courier, recent_review_average: Option<f64>) -> Evaluation {
    let mut eval = Evaluation {
        score: (courier.rating / 5.0) * 40.0,
        ..Default::default()
    };
    if courier.rating >= 4.5 {
        eval.reasons.push("EXCELLENT_RATING".to_string());
    } else if courier.rating >= 4.0 {
        eval.reasons.push("GOOD_RATING".to_string());
    } else if courier.rating >= 3.5 {
        eval.reasons.push("AVERAGE_RATING".to_string());
    } else {
        eval.risks.push("LOW_RATING".to_string());
    }

    let experience = courier.experience_bonus();
    eval.score += experience;
    if courier.completed_deliveries >= 100 {
        eval.reasons.push("VERY_EXPERIENCED".to_string());
    } else if courier.completed_deliveries >= 50 {
        eval.reasons.push("EXPERIENCED".to_string());
    } else if courier.completed_deliveries >= 20 {
        eval.reasons.push("MODERATE_EXPERIENCE".to_string());
    } else if courier.completed_deliveries >= 5 {
        eval.reasons.push("SOME_EXPERIENCE".to_string());
    } else {
        eval.risks.push("LIMITED_EXPERIENCE".to_string());
    }

    if let Some(avg) = recent_review_average {
        if avg >= 4.5 {
            eval.score += 15.0;
            eval.reasons.push("EXCELLENT_RECENT_REVIEWS".to_string());
        } else if avg >= 4.0 {
            eval.score += 10.0;
            eval.reasons.push("GOOD_RECENT_REVIEWS".to_string());
        }
    }

    eval.clamp()
}

/// 偏好评分：历史合作加成，黑名单一票否决
pub fn preference(completed_together: u32, blacklisted: bool) -> Evaluation {
    let mut eval = Evaluation {
        score: 50.0,
        ..Default::default()
    };

    if blacklisted {
        eval.score = 0.0;
        eval.hard_fail = true;
        eval.risks.push("BLACKLISTED_DELIVERER".to_string());
        return eval;
    }

    if completed_together >= 3 {
        eval.score += 20.0;
        eval.reasons.push("PREFERRED_DELIVERER".to_string());
    } else if completed_together >= 1 {
        eval.score += 10.0;
        eval.reasons.push("KNOWN_DELIVERER".to_string());
    }

    eval.clamp()
}

/// 加权总分
pub fn weighted_total(
    weights: &MatchWeights,
    geographic: f64,
    temporal: f64,
    capacity: f64,
    price: f64,
    reputation: f64,
    preference: f64,
) -> f64 {
    ((geographic * weights.geographic
        + temporal * weights.temporal
        + capacity * weights.capacity
        + price * weights.price
        + reputation * weights.reputation
        + preference * weights.preference)
        / 100.0)
        .round()
}

/// 平均速度随距离分档：短途 25，中途 45，长途 70 km/h
pub fn estimate_duration_minutes(distance_km: f64) -> f64 {
    let speed = if distance_km < 10.0 {
        25.0
    } else if distance_km < 50.0 {
        45.0
    } else {
        70.0
    };
    (distance_km / speed * 60.0).round()
}

/// 基础定价：1.20 €/km，按重量、易碎、冷藏、紧急度上浮
pub fn base_price(shipment: &ShipmentRequest, distance_km: f64) -> f64 {
    let mut price = distance_km * 1.2;
    if shipment.weight_kg > 10.0 {
        price *= 1.2;
    }
    if shipment.fragile {
        price *= 1.15;
    }
    if shipment.needs_refrigeration {
        price *= 1.25;
    }
    if shipment.priority >= 5 {
        price *= 1.5;
    }
    (price * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use courier_domain::TimeWindow;
    use uuid::Uuid;

    fn shipment() -> ShipmentRequest {
        ShipmentRequest::new(
            GeoPoint::new(48.85, 2.35),
            "pickup",
            GeoPoint::new(48.90, 2.40),
            "delivery",
            5.0,
            0.05,
            Uuid::new_v4(),
        )
    }

    fn courier() -> Courier {
        let mut c = Courier::new("test");
        c.rating = 4.2;
        c.completed_deliveries = 60;
        c
    }

    #[test]
    fn test_capacity_hard_fail_on_weight() {
        let mut s = shipment();
        s.weight_kg = 40.0;
        let eval = capacity(&s, &courier());
        assert_eq!(eval.score, 0.0);
        assert!(eval.hard_fail);
        assert!(eval.risks.contains(&"WEIGHT_EXCEEDED".to_string()));
    }

    #[test]
    fn test_capacity_hard_fail_on_refrigeration() {
        let mut s = shipment();
        s.needs_refrigeration = true;
        let eval = capacity(&s, &courier());
        assert_eq!(eval.score, 0.0);
        assert!(eval.hard_fail);
        assert!(eval.risks.contains(&"NO_REFRIGERATION".to_string()));

        let mut cold = courier();
        cold.vehicle.refrigerated = true;
        let ok = capacity(&s, &cold);
        assert!(!ok.hard_fail);
        assert!(ok.reasons.contains(&"REFRIGERATION_AVAILABLE".to_string()));
    }

    #[test]
    fn test_capacity_comfortable_margin_bonus() {
        let s = shipment(); // 5kg / 30kg max
        let eval = capacity(&s, &courier());
        assert!(eval.reasons.contains(&"WEIGHT_COMFORTABLE".to_string()));
        assert!(eval.reasons.contains(&"VOLUME_COMPATIBLE".to_string()));
        assert_eq!(eval.score, 85.0);
    }

    #[test]
    fn test_temporal_rejects_past_pickup() {
        let now = Utc::now();
        let mut s = shipment();
        s.pickup_window = Some(
            TimeWindow::new(now - Duration::hours(5), now - Duration::hours(2)).unwrap(),
        );
        let eval = temporal(&s, now, &MatchCriteria::default());
        assert_eq!(eval.score, 0.0);
        assert!(eval.risks.contains(&"PICKUP_DATE_PAST".to_string()));
    }

    #[test]
    fn test_temporal_urgency_bonus() {
        let mut s = shipment();
        s.priority = 5;
        let eval = temporal(&s, Utc::now(), &MatchCriteria::default());
        assert!(eval.reasons.contains(&"URGENT_PRIORITY".to_string()));
        // 50 基础 + 15 灵活时间 + 10 紧急
        assert_eq!(eval.score, 75.0);
    }

    #[test]
    fn test_geographic_point_distance() {
        let s = shipment();
        let near = GeoPoint::new(48.86, 2.35);
        let eval = geographic(&s, Some(near), None, &MatchCriteria::default());
        assert!(eval.eval.score > 45.0);
        assert!(eval.eval.reasons.contains(&"VERY_CLOSE".to_string()));

        let far = GeoPoint::new(50.0, 3.0);
        let eval = geographic(&s, Some(far), None, &MatchCriteria::default());
        assert_eq!(eval.eval.score, 0.0);
        assert!(eval.eval.risks.contains(&"DISTANCE_TOO_FAR".to_string()));
    }

    #[test]
    fn test_geographic_no_position() {
        let s = shipment();
        let eval = geographic(&s, None, None, &MatchCriteria::default());
        assert_eq!(eval.eval.score, 0.0);
        assert!(eval.eval.risks.contains(&"NO_KNOWN_POSITION".to_string()));
    }

    #[test]
    fn test_preference_blacklist_veto() {
        let eval = preference(5, true);
        assert_eq!(eval.score, 0.0);
        assert!(eval.hard_fail);
        assert!(eval.risks.contains(&"BLACKLISTED_DELIVERER".to_string()));
    }

    #[test]
    fn test_preference_affinity() {
        assert_eq!(preference(0, false).score, 50.0);
        assert_eq!(preference(1, false).score, 60.0);
        assert_eq!(preference(3, false).score, 70.0);
    }

    #[test]
    fn test_reputation_components() {
        let mut c = courier();
        c.rating = 5.0;
        c.completed_deliveries = 150;
        let eval = reputation(&c, Some(4.8));
        // 40 + 30 + 15
        assert_eq!(eval.score, 85.0);
        assert!(eval.reasons.contains(&"EXCELLENT_RATING".to_string()));
        assert!(eval.reasons.contains(&"VERY_EXPERIENCED".to_string()));
    }

    #[test]
    fn test_weighted_total_range() {
        let w = MatchWeights::default();
        assert_eq!(
            weighted_total(&w, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0),
            100.0
        );
        assert_eq!(weighted_total(&w, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0), 0.0);
        let mid = weighted_total(&w, 50.0, 60.0, 85.0, 75.0, 70.0, 50.0);
        assert!((0.0..=100.0).contains(&mid));
    }

    #[test]
    fn test_base_price_multipliers() {
        let mut s = shipment();
        let flat = base_price(&s, 10.0);
        assert!((flat - 12.0).abs() < 1e-9);
        s.needs_refrigeration = true;
        assert!(base_price(&s, 10.0) > flat);
    }
}
