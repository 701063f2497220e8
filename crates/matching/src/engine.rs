//! 匹配引擎
//!
//! 预筛选 → 六维评分 → 加权汇总 → 阈值截断。
//! 对输入快照是纯读操作，可跨请求并行调用

use std::sync::Arc;

use chrono::Utc;
use courier_domain::{
    Courier, CourierHistoryRepository, CourierRepository, DispatchResult, MatchResult,
    MatchScores, RecommendationTier, Route, RouteRepository, ShipmentRequest,
};
use courier_geo::{bounding_box, GeoZoneService};
use tracing::{debug, info, instrument};

use crate::config::{MatchCriteria, MatchingConfig};
use crate::scoring;

pub struct MatchingEngine {
    config: MatchingConfig,
    geo: Arc<GeoZoneService>,
    couriers: Arc<dyn CourierRepository>,
    routes: Arc<dyn RouteRepository>,
    history: Arc<dyn CourierHistoryRepository>,
}

impl MatchingEngine {
    pub fn new(
        config: MatchingConfig,
        geo: Arc<GeoZoneService>,
        couriers: Arc<dyn CourierRepository>,
        routes: Arc<dyn RouteRepository>,
        history: Arc<dyn CourierHistoryRepository>,
    ) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            geo,
            couriers,
            routes,
            history,
        })
    }

    /// 为运单找出最优配送员。
    /// 空候选池和全部低于阈值都返回空列表，不是错误
    #[instrument(skip(self, shipment, criteria), fields(shipment_id = %shipment.id))]
    pub async fn find_matches(
        &self,
        shipment: &ShipmentRequest,
        criteria: &MatchCriteria,
        max_results: usize,
    ) -> DispatchResult<Vec<MatchResult>> {
        criteria.validate()?;
        shipment.pickup_location.validate()?;
        shipment.delivery_location.validate()?;

        let candidates = self.prefilter_candidates(criteria).await?;
        debug!(count = candidates.len(), "预筛选完成");

        let mut matches = Vec::new();
        for courier in &candidates {
            if let Some(result) = self.evaluate(shipment, courier, criteria).await? {
                if result.total_score >= self.config.score_threshold {
                    matches.push(result);
                }
            }
        }

        self.sort_by_priority(&mut matches, criteria);
        matches.truncate(max_results);
        info!(matched = matches.len(), "匹配完成");
        Ok(matches)
    }

    /// 预筛选：在线、已验证、评分达标
    async fn prefilter_candidates(
        &self,
        criteria: &MatchCriteria,
    ) -> DispatchResult<Vec<Courier>> {
        let online = self.couriers.list_online().await?;
        Ok(online
            .into_iter()
            .filter(|c| c.verified && c.rating >= criteria.min_courier_rating)
            .collect())
    }

    /// 单个候选的完整评估。硬性约束失败返回 None（排除）
    async fn evaluate(
        &self,
        shipment: &ShipmentRequest,
        courier: &Courier,
        criteria: &MatchCriteria,
    ) -> DispatchResult<Option<MatchResult>> {
        let position = self.geo.position_of(courier.id).await;
        let active_route: Option<Route> = self.routes.active_route_for(courier.id).await?;

        // 粗包围盒筛除：有位置、无活动路线、且明显在范围外的直接跳过
        if let (Some(p), None) = (&position, &active_route) {
            let bb = bounding_box(shipment.pickup_location, criteria.max_distance_km);
            if !bb.contains(p.location) {
                return Ok(None);
            }
        }

        let geo_eval = scoring::geographic(
            shipment,
            position.map(|p| p.location),
            active_route.as_ref(),
            criteria,
        );
        let mut geographic = geo_eval.eval;

        // 同区域加成
        if let (Some(p), Some(zone)) = (&position, self.geo.zone_of(shipment.pickup_location)) {
            if self.geo.zone_of(p.location).map(|z| z.id) == Some(zone.id) {
                geographic.score = (geographic.score + 10.0).min(100.0);
                geographic.reasons.push("SAME_ZONE".to_string());
            }
        }

        let temporal = scoring::temporal(shipment, Utc::now(), criteria);

        let capacity = scoring::capacity(shipment, courier);

        let mut estimated_price = scoring::base_price(shipment, geo_eval.distance_km);
        if let Some(zone) = self.geo.zone_of(shipment.pickup_location) {
            let factor = self.geo.zone_stats(zone).suggested_price_factor;
            estimated_price = (estimated_price * factor * 100.0).round() / 100.0;
        }
        let price = scoring::price(estimated_price, shipment, criteria);

        let review_avg = self
            .history
            .recent_review_average(courier.id, 5)
            .await?;
        let reputation = scoring::reputation(courier, review_avg);

        let completed = self
            .history
            .completed_between(shipment.customer_id, courier.id)
            .await?;
        let blacklisted = self
            .history
            .is_blacklisted(shipment.customer_id, courier.id)
            .await?;
        let preference = scoring::preference(completed, blacklisted);

        // 任何硬性失败都强制总分 0 并排除
        if capacity.hard_fail || preference.hard_fail {
            debug!(courier_id = %courier.id, "候选因硬性约束被排除");
            return Ok(None);
        }

        let scores = MatchScores {
            geographic: geographic.score,
            temporal: temporal.score,
            capacity: capacity.score,
            price: price.score,
            reputation: reputation.score,
            preference: preference.score,
        };
        let total_score = scoring::weighted_total(
            &self.config.weights,
            scores.geographic,
            scores.temporal,
            scores.capacity,
            scores.price,
            scores.reputation,
            scores.preference,
        );

        let mut compatibility_reasons = geographic.reasons;
        let mut risk_factors = geographic.risks;
        for eval in [&temporal, &capacity, &price, &reputation, &preference] {
            compatibility_reasons.extend(eval.reasons.iter().cloned());
            risk_factors.extend(eval.risks.iter().cloned());
        }

        Ok(Some(MatchResult {
            shipment_id: shipment.id,
            courier_id: courier.id,
            scores,
            total_score,
            estimated_distance_km: geo_eval.distance_km,
            estimated_duration_minutes: geo_eval.duration_minutes,
            estimated_price,
            tier: RecommendationTier::from_score(total_score),
            compatibility_reasons,
            risk_factors,
        }))
    }

    /// 默认按总分降序；单一优先维度开启时先按该维度排
    fn sort_by_priority(&self, matches: &mut [MatchResult], criteria: &MatchCriteria) {
        matches.sort_by(|a, b| {
            if criteria.prioritize_experience {
                let cmp = b.scores.reputation.total_cmp(&a.scores.reputation);
                if cmp != std::cmp::Ordering::Equal {
                    return cmp;
                }
            }
            if criteria.prioritize_speed {
                let cmp = a
                    .estimated_duration_minutes
                    .total_cmp(&b.estimated_duration_minutes);
                if cmp != std::cmp::Ordering::Equal {
                    return cmp;
                }
            }
            if criteria.prioritize_price {
                let cmp = a.estimated_price.total_cmp(&b.estimated_price);
                if cmp != std::cmp::Ordering::Equal {
                    return cmp;
                }
            }
            b.total_score.total_cmp(&a.total_score)
        });
    }
}
