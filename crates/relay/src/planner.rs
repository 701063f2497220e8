//! 长途运单的分段配送规划
//!
//! 直线距离超过阈值时，在中转点目录里选出一条链路，
//! 把运单拆成多个可独立指派的子段；找不到链路是合法的否定结果

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use courier_domain::{
    Capability, CourierRepository, DeliverySegment, DispatchError, DispatchResult,
    GeoPoint, PartialDeliveryPlan, PartialDeliveryPlanRepository, RelayPoint,
    RelayPointRepository, RelayPointType, SegmentStatus, ShipmentRequest,
};
use courier_geo::haversine_km;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::RelayConfig;

pub struct PartialDeliveryPlanner {
    config: RelayConfig,
    relay_points: Arc<dyn RelayPointRepository>,
    plans: Arc<dyn PartialDeliveryPlanRepository>,
    couriers: Arc<dyn CourierRepository>,
}

impl PartialDeliveryPlanner {
    pub fn new(
        config: RelayConfig,
        relay_points: Arc<dyn RelayPointRepository>,
        plans: Arc<dyn PartialDeliveryPlanRepository>,
        couriers: Arc<dyn CourierRepository>,
    ) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            relay_points,
            plans,
            couriers,
        })
    }

    /// 运单对每个子段配送员的能力要求
    pub fn required_capabilities(shipment: &ShipmentRequest) -> Vec<Capability> {
        let mut capabilities = Vec::new();
        if shipment.fragile {
            capabilities.push(Capability::FragileHandling);
        }
        if shipment.needs_refrigeration {
            capabilities.push(Capability::TemperatureControl);
        }
        if shipment.is_heavy() {
            capabilities.push(Capability::HeavyPackages);
        }
        if shipment.is_urgent() {
            capabilities.push(Capability::ExpressDelivery);
        }
        capabilities
    }

    /// 为运单规划分段配送。距离不足阈值或找不到链路时返回 Ok(None)，
    /// 由调用方回退到单段直送
    #[instrument(skip(self, shipment), fields(shipment_id = %shipment.id))]
    pub async fn plan_for_shipment(
        &self,
        shipment: &ShipmentRequest,
    ) -> DispatchResult<Option<PartialDeliveryPlan>> {
        shipment.pickup_location.validate()?;
        shipment.delivery_location.validate()?;

        let direct = haversine_km(shipment.pickup_location, shipment.delivery_location);
        if direct <= self.config.trigger_distance_km {
            debug!(direct_km = direct, "距离未达分段阈值");
            return Ok(None);
        }

        // 首选筛选：类型白名单 + 标准单段上限
        if let Some(plan) = self
            .try_plan(shipment, &self.config.primary_types, self.config.max_leg_km, false)
            .await?
        {
            return Ok(Some(plan));
        }

        // 回退：放宽单段上限并接受所有中转点类型
        let relaxed = self.config.max_leg_km * self.config.fallback_leg_multiplier;
        if let Some(plan) = self
            .try_plan(shipment, &RelayPointType::all(), relaxed, true)
            .await?
        {
            warn!(shipment_id = %shipment.id, "首选筛选无链路，使用回退方案");
            return Ok(Some(plan));
        }

        info!(direct_km = direct, "无可用中转链路");
        Ok(None)
    }

    async fn try_plan(
        &self,
        shipment: &ShipmentRequest,
        types: &[RelayPointType],
        max_leg_km: f64,
        is_fallback: bool,
    ) -> DispatchResult<Option<PartialDeliveryPlan>> {
        let now = Utc::now();
        let candidates: Vec<RelayPoint> = self
            .relay_points
            .list_by_types(types)
            .await?
            .into_iter()
            .filter(|p| p.is_open_at(now) && p.has_free_slot())
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let Some(chain) = self.build_chain(
            shipment.pickup_location,
            shipment.delivery_location,
            &candidates,
            max_leg_km,
        ) else {
            return Ok(None);
        };

        // 预占每个中转点的一个货位；任何一个失败则整体回滚
        let mut reserved: Vec<Uuid> = Vec::with_capacity(chain.len());
        for point in &chain {
            if self.relay_points.reserve_slot(point.id).await? {
                reserved.push(point.id);
            } else {
                for id in &reserved {
                    self.relay_points.release_slot(*id).await?;
                }
                debug!(relay_point = %point.id, "货位预占失败，放弃该链路");
                return Ok(None);
            }
        }

        let plan = self.build_plan(shipment, &chain, is_fallback);
        self.plans.save(&plan).await?;
        info!(
            plan_id = %plan.id,
            segments = plan.segments.len(),
            total_km = plan.total_distance_km,
            is_fallback,
            "分段配送方案已生成"
        );
        Ok(Some(plan))
    }

    /// 贪心构链：每步在单段上限内选一个更接近目的地、
    /// 且绕行总量最小的中转点，直到目的地进入单段范围
    fn build_chain(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
        candidates: &[RelayPoint],
        max_leg_km: f64,
    ) -> Option<Vec<RelayPoint>> {
        let mut chain: Vec<RelayPoint> = Vec::new();
        let mut used: HashSet<Uuid> = HashSet::new();
        let mut current = origin;

        while haversine_km(current, destination) > max_leg_km {
            if chain.len() >= self.config.max_relay_points {
                return None;
            }
            let remaining = haversine_km(current, destination);
            let next = candidates
                .iter()
                .filter(|p| !used.contains(&p.id))
                .filter(|p| haversine_km(current, p.location) <= max_leg_km)
                .filter(|p| haversine_km(p.location, destination) < remaining)
                .min_by(|a, b| {
                    let cost_a = haversine_km(current, a.location)
                        + haversine_km(a.location, destination);
                    let cost_b = haversine_km(current, b.location)
                        + haversine_km(b.location, destination);
                    cost_a.total_cmp(&cost_b)
                })?;
            used.insert(next.id);
            current = next.location;
            chain.push(next.clone());
        }

        if chain.is_empty() {
            None
        } else {
            Some(chain)
        }
    }

    /// N 个中转点产生 N+1 个子段
    fn build_plan(
        &self,
        shipment: &ShipmentRequest,
        chain: &[RelayPoint],
        is_fallback: bool,
    ) -> PartialDeliveryPlan {
        let capabilities = Self::required_capabilities(shipment);
        let multiplier = if capabilities.len() >= 2 {
            self.config.complex_segment_multiplier
        } else {
            self.config.simple_segment_multiplier
        };

        let mut waypoints: Vec<(GeoPoint, String)> =
            vec![(shipment.pickup_location, shipment.pickup_address.clone())];
        for point in chain {
            waypoints.push((point.location, point.name.clone()));
        }
        waypoints.push((shipment.delivery_location, shipment.delivery_address.clone()));

        let mut segments = Vec::with_capacity(waypoints.len() - 1);
        let mut total_distance = 0.0;
        let mut total_duration = 0.0;
        let mut raw_price = 0.0;
        for (index, pair) in waypoints.windows(2).enumerate() {
            let (from, from_label) = &pair[0];
            let (to, to_label) = &pair[1];
            let distance = haversine_km(*from, *to);
            let duration = segment_duration_minutes(distance);
            let price = round_cents(distance * self.config.base_rate_per_km * multiplier);
            total_distance += distance;
            total_duration += duration;
            raw_price += price;
            segments.push(DeliverySegment {
                index,
                from_location: *from,
                from_label: from_label.clone(),
                to_location: *to,
                to_label: to_label.clone(),
                distance_km: distance,
                duration_minutes: duration,
                price,
                required_capabilities: capabilities.clone(),
                assigned_courier: None,
                status: SegmentStatus::Pending,
            });
        }

        PartialDeliveryPlan {
            id: Uuid::new_v4(),
            shipment_id: shipment.id,
            segments,
            relay_point_ids: chain.iter().map(|p| p.id).collect(),
            total_distance_km: total_distance,
            total_duration_minutes: total_duration,
            total_price: round_cents(raw_price * self.config.coordination_markup),
            is_fallback,
            created_at: Utc::now(),
        }
    }

    /// 指派子段配送员。配送员必须具备该子段要求的全部能力
    #[instrument(skip(self))]
    pub async fn assign_segment(
        &self,
        plan_id: Uuid,
        segment_index: usize,
        courier_id: Uuid,
    ) -> DispatchResult<PartialDeliveryPlan> {
        let mut plan = self.load_plan(plan_id).await?;
        let courier = self
            .couriers
            .find_by_id(courier_id)
            .await?
            .ok_or(DispatchError::courier_not_found(courier_id))?;

        let segment = segment_mut(&mut plan, segment_index)?;
        if segment.status != SegmentStatus::Pending {
            return Err(DispatchError::conflict(format!(
                "子段 {segment_index} 已被指派或已开始"
            )));
        }
        for capability in &segment.required_capabilities {
            if !courier.has_capability(*capability) {
                return Err(DispatchError::validation(format!(
                    "配送员缺少能力 {}",
                    capability.as_str()
                )));
            }
        }

        segment.assigned_courier = Some(courier_id);
        segment.status = SegmentStatus::Assigned;
        self.plans.update(&plan).await?;
        Ok(plan)
    }

    /// 子段开始执行。子段 i+1 必须等子段 i 完成；
    /// 从中转点取件的同时释放其货位
    #[instrument(skip(self))]
    pub async fn start_segment(
        &self,
        plan_id: Uuid,
        segment_index: usize,
    ) -> DispatchResult<PartialDeliveryPlan> {
        let mut plan = self.load_plan(plan_id).await?;
        if segment_index > 0 {
            let previous = segment_mut(&mut plan, segment_index - 1)?;
            if previous.status != SegmentStatus::Completed {
                return Err(DispatchError::conflict(format!(
                    "子段 {} 尚未完成，无法开始子段 {segment_index}",
                    segment_index - 1
                )));
            }
        }
        let segment = segment_mut(&mut plan, segment_index)?;
        if segment.status != SegmentStatus::Assigned {
            return Err(DispatchError::conflict(format!(
                "子段 {segment_index} 未处于已指派状态"
            )));
        }
        segment.status = SegmentStatus::InProgress;

        if segment_index > 0 {
            let relay_id = plan.relay_point_ids[segment_index - 1];
            self.relay_points.release_slot(relay_id).await?;
        }
        self.plans.update(&plan).await?;
        Ok(plan)
    }

    #[instrument(skip(self))]
    pub async fn complete_segment(
        &self,
        plan_id: Uuid,
        segment_index: usize,
    ) -> DispatchResult<PartialDeliveryPlan> {
        let mut plan = self.load_plan(plan_id).await?;
        let segment = segment_mut(&mut plan, segment_index)?;
        if segment.status != SegmentStatus::InProgress {
            return Err(DispatchError::conflict(format!(
                "子段 {segment_index} 未在执行中"
            )));
        }
        segment.status = SegmentStatus::Completed;
        self.plans.update(&plan).await?;
        if plan.is_complete() {
            info!(plan_id = %plan.id, shipment_id = %plan.shipment_id, "分段配送全部完成");
        }
        Ok(plan)
    }

    /// 取消方案：未开始的子段标记失败，尚未释放的货位归还
    #[instrument(skip(self))]
    pub async fn cancel_plan(&self, plan_id: Uuid) -> DispatchResult<PartialDeliveryPlan> {
        let mut plan = self.load_plan(plan_id).await?;
        for (i, relay_id) in plan.relay_point_ids.clone().iter().enumerate() {
            // 货位在子段 i+1 开始取件时释放；还没走到那一步就归还
            let downstream = &plan.segments[i + 1];
            if matches!(
                downstream.status,
                SegmentStatus::Pending | SegmentStatus::Assigned
            ) {
                self.relay_points.release_slot(*relay_id).await?;
            }
        }
        for segment in &mut plan.segments {
            if segment.status != SegmentStatus::Completed {
                segment.status = SegmentStatus::Failed;
            }
        }
        self.plans.update(&plan).await?;
        Ok(plan)
    }

    async fn load_plan(&self, plan_id: Uuid) -> DispatchResult<PartialDeliveryPlan> {
        self.plans
            .find_by_id(plan_id)
            .await?
            .ok_or_else(|| DispatchError::validation(format!("配送方案不存在: {plan_id}")))
    }
}

fn segment_mut(
    plan: &mut PartialDeliveryPlan,
    index: usize,
) -> DispatchResult<&mut DeliverySegment> {
    let count = plan.segments.len();
    plan.segments
        .get_mut(index)
        .ok_or_else(|| DispatchError::validation(format!("子段下标越界: {index} / {count}")))
}

/// 按距离档位估算子段耗时：市内/城郊/长途平均速度不同
fn segment_duration_minutes(distance_km: f64) -> f64 {
    let speed_kmh = if distance_km <= 10.0 {
        25.0
    } else if distance_km <= 50.0 {
        45.0
    } else {
        70.0
    };
    distance_km / speed_kmh * 60.0
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use courier_domain::OpeningHours;
    use courier_testing_utils::{
        CourierBuilder, MockCourierRepository, MockPlanRepository, MockRelayPointRepository,
        RelayPointBuilder, ShipmentBuilder,
    };

    // 赤道附近纬度差 0.42° 约 46.7km，便于构造段距
    fn long_haul_shipment() -> ShipmentRequest {
        ShipmentBuilder::new()
            .with_pickup(GeoPoint::new(0.0, 0.0))
            .with_delivery(GeoPoint::new(1.26, 0.0))
            .build()
    }

    fn planner_with(
        relay_points: MockRelayPointRepository,
        couriers: MockCourierRepository,
    ) -> (PartialDeliveryPlanner, MockPlanRepository) {
        let plans = MockPlanRepository::new();
        let planner = PartialDeliveryPlanner::new(
            RelayConfig::default(),
            Arc::new(relay_points),
            Arc::new(plans.clone()),
            Arc::new(couriers),
        )
        .unwrap();
        (planner, plans)
    }

    fn two_relay_points() -> Vec<RelayPoint> {
        vec![
            RelayPointBuilder::new()
                .named("entrepot_nord")
                .with_location(GeoPoint::new(0.42, 0.0))
                .build(),
            RelayPointBuilder::new()
                .named("boutique_centre")
                .with_kind(RelayPointType::PartnerShop)
                .with_location(GeoPoint::new(0.84, 0.0))
                .build(),
        ]
    }

    #[tokio::test]
    async fn test_under_threshold_returns_none() {
        let repo = MockRelayPointRepository::with_points(two_relay_points());
        let (planner, _) = planner_with(repo, MockCourierRepository::new());
        let shipment = ShipmentBuilder::new()
            .with_pickup(GeoPoint::new(0.0, 0.0))
            .with_delivery(GeoPoint::new(0.7, 0.0)) // ~78km
            .build();
        let plan = planner.plan_for_shipment(&shipment).await.unwrap();
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn test_two_relays_yield_three_segments() {
        let points = two_relay_points();
        let ids: Vec<Uuid> = points.iter().map(|p| p.id).collect();
        let repo = MockRelayPointRepository::with_points(points);
        let (planner, _) = planner_with(repo.clone(), MockCourierRepository::new());

        let plan = planner
            .plan_for_shipment(&long_haul_shipment())
            .await
            .unwrap()
            .expect("应返回分段方案");

        assert_eq!(plan.segments.len(), 3);
        assert_eq!(plan.relay_point_ids.len(), 2);
        assert!(!plan.is_fallback);
        // 分段总距离不小于直线距离
        assert!(plan.total_distance_km >= 140.0);
        for segment in &plan.segments {
            assert!(segment.distance_km <= 50.0);
            assert_eq!(segment.status, SegmentStatus::Pending);
        }
        // 每个中转点被预占一个货位
        for id in ids {
            assert_eq!(repo.slots_of(id), Some(49));
        }
    }

    #[tokio::test]
    async fn test_total_price_includes_coordination_markup() {
        let repo = MockRelayPointRepository::with_points(two_relay_points());
        let (planner, _) = planner_with(repo, MockCourierRepository::new());

        let plan = planner
            .plan_for_shipment(&long_haul_shipment())
            .await
            .unwrap()
            .unwrap();

        let raw: f64 = plan.segments.iter().map(|s| s.price).sum();
        assert!((plan.total_price - raw * 1.15).abs() < 0.05);
        // 无特殊能力要求时用普通加价系数
        let first = &plan.segments[0];
        assert!(first.required_capabilities.is_empty());
        assert!((first.price - first.distance_km * 0.8 * 1.1).abs() < 0.05);
    }

    #[tokio::test]
    async fn test_capability_derivation_raises_multiplier() {
        let repo = MockRelayPointRepository::with_points(two_relay_points());
        let (planner, _) = planner_with(repo, MockCourierRepository::new());
        let shipment = ShipmentBuilder::new()
            .with_pickup(GeoPoint::new(0.0, 0.0))
            .with_delivery(GeoPoint::new(1.26, 0.0))
            .fragile()
            .refrigerated()
            .with_weight(25.0)
            .with_priority(5)
            .build();

        let capabilities = PartialDeliveryPlanner::required_capabilities(&shipment);
        assert_eq!(capabilities.len(), 4);

        let plan = planner.plan_for_shipment(&shipment).await.unwrap().unwrap();
        let first = &plan.segments[0];
        assert_eq!(first.required_capabilities.len(), 4);
        assert!((first.price - first.distance_km * 0.8 * 1.3).abs() < 0.05);
    }

    #[tokio::test]
    async fn test_no_relay_points_returns_none() {
        let repo = MockRelayPointRepository::new();
        let (planner, _) = planner_with(repo, MockCourierRepository::new());
        let plan = planner
            .plan_for_shipment(&long_haul_shipment())
            .await
            .unwrap();
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn test_fallback_broadens_types_and_ceiling() {
        // 只有储物柜类型可用，且段距超过标准上限：首选失败、回退成功
        let locker = RelayPointBuilder::new()
            .named("consigne_gare")
            .with_kind(RelayPointType::Locker)
            .with_location(GeoPoint::new(0.6, 0.0)) // 两段各约 67/73km
            .build();
        let repo = MockRelayPointRepository::with_points(vec![locker]);
        let (planner, _) = planner_with(repo, MockCourierRepository::new());

        let plan = planner
            .plan_for_shipment(&long_haul_shipment())
            .await
            .unwrap()
            .expect("回退筛选应找到链路");
        assert!(plan.is_fallback);
        assert_eq!(plan.segments.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_relay_point_skipped() {
        let hour = Utc::now().hour() as u8;
        let mut point = RelayPointBuilder::new()
            .with_location(GeoPoint::new(0.42, 0.0))
            .build();
        point.opening_hours = Some(OpeningHours {
            open_hour: (hour + 2) % 24,
            close_hour: (hour + 3) % 24,
        });
        let repo = MockRelayPointRepository::with_points(vec![point]);
        let (planner, _) = planner_with(repo, MockCourierRepository::new());

        let plan = planner
            .plan_for_shipment(&long_haul_shipment())
            .await
            .unwrap();
        assert!(plan.is_none());
    }

    #[tokio::test]
    async fn test_full_relay_point_skipped() {
        let full = RelayPointBuilder::new()
            .with_location(GeoPoint::new(0.42, 0.0))
            .with_slots(0)
            .build();
        let open = RelayPointBuilder::new()
            .with_location(GeoPoint::new(0.44, 0.0))
            .build();
        let second = RelayPointBuilder::new()
            .with_location(GeoPoint::new(0.88, 0.0))
            .build();
        let open_id = open.id;
        let full_id = full.id;
        let repo = MockRelayPointRepository::with_points(vec![full, open, second]);
        let (planner, _) = planner_with(repo.clone(), MockCourierRepository::new());

        let plan = planner
            .plan_for_shipment(&long_haul_shipment())
            .await
            .unwrap()
            .unwrap();
        assert!(!plan.relay_point_ids.contains(&full_id));
        assert!(plan.relay_point_ids.contains(&open_id));
        assert_eq!(repo.slots_of(full_id), Some(0));
    }

    #[tokio::test]
    async fn test_segment_ordering_enforced() {
        let points = two_relay_points();
        let first_relay = points[0].id;
        let repo = MockRelayPointRepository::with_points(points);
        let courier = CourierBuilder::new().build();
        let couriers = MockCourierRepository::with_couriers(vec![courier.clone()]);
        let (planner, _) = planner_with(repo.clone(), couriers);

        let plan = planner
            .plan_for_shipment(&long_haul_shipment())
            .await
            .unwrap()
            .unwrap();

        planner.assign_segment(plan.id, 0, courier.id).await.unwrap();
        planner.assign_segment(plan.id, 1, courier.id).await.unwrap();

        // 子段 0 未完成时不能开始子段 1
        let err = planner.start_segment(plan.id, 1).await.unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));

        planner.start_segment(plan.id, 0).await.unwrap();
        planner.complete_segment(plan.id, 0).await.unwrap();

        // 完成后可以开始，且中转点货位被释放
        assert_eq!(repo.slots_of(first_relay), Some(49));
        planner.start_segment(plan.id, 1).await.unwrap();
        assert_eq!(repo.slots_of(first_relay), Some(50));
    }

    #[tokio::test]
    async fn test_assignment_requires_capabilities() {
        let repo = MockRelayPointRepository::with_points(two_relay_points());
        let plain = CourierBuilder::new().build();
        let capable = CourierBuilder::new()
            .with_capability(Capability::TemperatureControl)
            .build();
        let couriers =
            MockCourierRepository::with_couriers(vec![plain.clone(), capable.clone()]);
        let (planner, _) = planner_with(repo, couriers);

        let shipment = ShipmentBuilder::new()
            .with_pickup(GeoPoint::new(0.0, 0.0))
            .with_delivery(GeoPoint::new(1.26, 0.0))
            .refrigerated()
            .build();
        let plan = planner.plan_for_shipment(&shipment).await.unwrap().unwrap();

        let err = planner
            .assign_segment(plan.id, 0, plain.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));

        let updated = planner.assign_segment(plan.id, 0, capable.id).await.unwrap();
        assert_eq!(updated.segments[0].status, SegmentStatus::Assigned);
        assert_eq!(updated.segments[0].assigned_courier, Some(capable.id));
    }

    #[tokio::test]
    async fn test_cancel_releases_unclaimed_slots() {
        let points = two_relay_points();
        let ids: Vec<Uuid> = points.iter().map(|p| p.id).collect();
        let repo = MockRelayPointRepository::with_points(points);
        let (planner, _) = planner_with(repo.clone(), MockCourierRepository::new());

        let plan = planner
            .plan_for_shipment(&long_haul_shipment())
            .await
            .unwrap()
            .unwrap();
        for id in &ids {
            assert_eq!(repo.slots_of(*id), Some(49));
        }

        let cancelled = planner.cancel_plan(plan.id).await.unwrap();
        assert!(cancelled
            .segments
            .iter()
            .all(|s| s.status == SegmentStatus::Failed));
        for id in &ids {
            assert_eq!(repo.slots_of(*id), Some(50));
        }
    }

    #[tokio::test]
    async fn test_plan_completion() {
        let repo = MockRelayPointRepository::with_points(two_relay_points());
        let courier = CourierBuilder::new().build();
        let couriers = MockCourierRepository::with_couriers(vec![courier.clone()]);
        let (planner, plans) = planner_with(repo, couriers);

        let plan = planner
            .plan_for_shipment(&long_haul_shipment())
            .await
            .unwrap()
            .unwrap();
        for i in 0..plan.segments.len() {
            planner.assign_segment(plan.id, i, courier.id).await.unwrap();
            planner.start_segment(plan.id, i).await.unwrap();
            planner.complete_segment(plan.id, i).await.unwrap();
        }
        let stored = plans.find_by_id(plan.id).await.unwrap().unwrap();
        assert!(stored.is_complete());
    }
}
