//! 路线规划
//!
//! 可行性检查先行，通过后交给优化策略排序，
//! 最后为每个站点标注顺序、预计到达/离开时间和分段距离

use std::sync::Arc;

use chrono::{Duration, Utc};
use courier_domain::{
    DispatchResult, GeoPoint, Route, RouteFeasibility, RouteStop, StopKind, VehicleProfile,
};
use courier_geo::haversine_km;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{RouteConstraints, RoutingConfig};
use crate::strategy::OptimizationStrategy;

/// 规划结果。不可行是合法的否定结果而非错误
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Planned(Route),
    Infeasible(RouteFeasibility),
}

impl PlanOutcome {
    pub fn route(self) -> Option<Route> {
        match self {
            PlanOutcome::Planned(route) => Some(route),
            PlanOutcome::Infeasible(_) => None,
        }
    }
}

/// 实时调整请求
#[derive(Debug, Clone, Default)]
pub struct RouteAdjustments {
    pub urgent_stop: Option<RouteStop>,
    pub cancelled_stop_ids: Vec<Uuid>,
    /// 需要避开的区域（中心 + 半径公里），落在其中的途经点被移除
    pub avoid_areas: Vec<(GeoPoint, f64)>,
    /// 外部提供的拥堵延迟，按站点叠加到下游 ETA
    pub traffic_delays: Vec<(Uuid, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteMetrics {
    pub pickup_count: usize,
    pub delivery_count: usize,
    pub waypoint_count: usize,
    pub average_leg_km: f64,
}

pub struct RoutePlanner {
    config: RoutingConfig,
    strategy: Arc<dyn OptimizationStrategy>,
}

impl RoutePlanner {
    pub fn new(config: RoutingConfig, strategy: Arc<dyn OptimizationStrategy>) -> Self {
        Self { config, strategy }
    }

    /// 可行性检查：容量、距离/时长上限、时间窗冲突。
    /// 扣分制，存在问题且低于下限即判不可行
    pub fn check_feasibility(
        &self,
        start: GeoPoint,
        stops: &[RouteStop],
        constraints: &RouteConstraints,
        vehicle: Option<&VehicleProfile>,
    ) -> RouteFeasibility {
        let mut issues = Vec::new();
        let mut score: f64 = 100.0;

        let total_demand: f64 = stops.iter().map(|s| s.demand_kg).sum();
        let max_weight = constraints
            .max_weight_kg
            .or(vehicle.map(|v| v.max_weight_kg));
        if let Some(limit) = max_weight {
            if total_demand > limit {
                issues.push(format!("总载重 {total_demand:.1}kg 超出上限 {limit:.1}kg"));
                score -= 30.0;
            }
        }

        let estimated = self.estimate_total_distance(start, stops);
        if let Some(limit) = constraints.max_distance_km {
            if estimated > limit {
                issues.push(format!("预估距离 {estimated:.1}km 超出上限 {limit:.1}km"));
                score -= 25.0;
            }
        }
        if let Some(limit) = constraints.max_duration_minutes {
            let speed = self.speed_kmh(vehicle);
            let service: f64 = stops.iter().map(|s| s.service_minutes).sum();
            let duration = estimated / speed * 60.0 + service;
            if duration > limit {
                issues.push(format!(
                    "预估耗时 {duration:.0}min 超出上限 {limit:.0}min"
                ));
                score -= 25.0;
            }
        }

        let conflicts = self.count_time_window_conflicts(stops, vehicle);
        if conflicts > 0 {
            issues.push(format!("{conflicts} 个时间窗冲突"));
            score -= conflicts as f64 * 10.0;
        }

        let score = score.max(0.0);
        if issues.is_empty() || score >= self.config.feasibility_floor {
            RouteFeasibility {
                feasible: true,
                score,
                issues,
            }
        } else {
            RouteFeasibility::infeasible(score, issues)
        }
    }

    /// 完整规划：可行性门禁 → 策略优化 → 标注
    #[instrument(skip(self, stops, constraints, vehicle), fields(courier_id = %courier_id, stop_count = stops.len()))]
    pub fn plan_route(
        &self,
        courier_id: Uuid,
        start: GeoPoint,
        mut stops: Vec<RouteStop>,
        constraints: &RouteConstraints,
        vehicle: Option<&VehicleProfile>,
    ) -> DispatchResult<PlanOutcome> {
        start.validate()?;
        for stop in &stops {
            stop.location.validate()?;
        }

        let feasibility = self.check_feasibility(start, &stops, constraints, vehicle);
        if !feasibility.feasible {
            warn!(score = feasibility.score, "路线不可行，放弃优化");
            return Ok(PlanOutcome::Infeasible(feasibility));
        }

        if constraints.return_to_start {
            let mut depot = RouteStop::new(StopKind::Depot, start, "depot");
            depot.service_minutes = 0.0;
            stops.push(depot);
        }

        let order = self.strategy.optimize(start, &stops);
        debug!(strategy = self.strategy.name(), "优化完成");

        let route = self.annotate(courier_id, start, stops, &order, constraints, vehicle);
        info!(
            total_km = route.total_distance_km,
            efficiency = route.efficiency_ratio,
            "路线规划完成"
        );
        Ok(PlanOutcome::Planned(Route {
            feasibility_score: feasibility.score,
            ..route
        }))
    }

    /// 实时调整：插入紧急站点、剔除取消站点、避开区域，
    /// 从当前位置重排，再叠加外部拥堵延迟
    #[instrument(skip(self, route, adjustments, vehicle), fields(route_id = %route.id))]
    pub fn adjust_route(
        &self,
        route: &Route,
        current_position: GeoPoint,
        adjustments: &RouteAdjustments,
        constraints: &RouteConstraints,
        vehicle: Option<&VehicleProfile>,
    ) -> DispatchResult<PlanOutcome> {
        let mut stops: Vec<RouteStop> = route
            .stops
            .iter()
            .filter(|s| !adjustments.cancelled_stop_ids.contains(&s.id))
            .filter(|s| {
                !adjustments
                    .avoid_areas
                    .iter()
                    .any(|(center, radius)| {
                        s.kind == StopKind::Waypoint
                            && haversine_km(s.location, *center) <= *radius
                    })
            })
            .cloned()
            .collect();

        if let Some(urgent) = &adjustments.urgent_stop {
            let mut urgent = urgent.clone();
            urgent.priority = urgent.priority.max(4);
            stops.push(urgent);
        }

        let outcome =
            self.plan_route(route.courier_id, current_position, stops, constraints, vehicle)?;

        match outcome {
            PlanOutcome::Planned(mut replanned) => {
                self.apply_traffic_delays(&mut replanned, &adjustments.traffic_delays);
                Ok(PlanOutcome::Planned(replanned))
            }
            infeasible => Ok(infeasible),
        }
    }

    /// 将外部拥堵延迟加到对应站点及其下游所有 ETA 上
    pub fn apply_traffic_delays(&self, route: &mut Route, delays: &[(Uuid, f64)]) {
        for (stop_id, delay_minutes) in delays {
            let Some(hit) = route
                .stops
                .iter()
                .position(|s| s.id == *stop_id)
            else {
                continue;
            };
            let shift = Duration::seconds((*delay_minutes * 60.0) as i64);
            route.stops[hit].duration_from_previous_minutes += delay_minutes;
            let affected = route.stops[hit].order_index;
            for stop in &mut route.stops {
                if stop.order_index >= affected {
                    if let Some(arrival) = stop.estimated_arrival {
                        stop.estimated_arrival = Some(arrival + shift);
                    }
                    if let Some(departure) = stop.estimated_departure {
                        stop.estimated_departure = Some(departure + shift);
                    }
                }
            }
            route.total_duration_minutes += delay_minutes;
        }
    }

    pub fn route_metrics(&self, route: &Route) -> RouteMetrics {
        let legs = route.stops.len().max(1);
        RouteMetrics {
            pickup_count: route
                .stops
                .iter()
                .filter(|s| s.kind == StopKind::Pickup)
                .count(),
            delivery_count: route
                .stops
                .iter()
                .filter(|s| s.kind == StopKind::Delivery)
                .count(),
            waypoint_count: route
                .stops
                .iter()
                .filter(|s| s.kind == StopKind::Waypoint)
                .count(),
            average_leg_km: route.total_distance_km / legs as f64,
        }
    }

    fn annotate(
        &self,
        courier_id: Uuid,
        start: GeoPoint,
        mut stops: Vec<RouteStop>,
        order: &[usize],
        constraints: &RouteConstraints,
        vehicle: Option<&VehicleProfile>,
    ) -> Route {
        let speed = self.speed_kmh(vehicle);
        let mut current_time = constraints.start_time.unwrap_or_else(Utc::now);
        let mut current_position = start;
        let mut total_distance = 0.0;
        let mut total_duration = 0.0;
        let mut total_service = 0.0;
        let mut last_location = start;

        for (rank, &idx) in order.iter().enumerate() {
            let stop = &mut stops[idx];
            let distance = haversine_km(current_position, stop.location);
            let duration = distance / speed * 60.0;

            stop.order_index = rank;
            stop.distance_from_previous_km = distance;
            stop.duration_from_previous_minutes = duration;

            current_time += Duration::seconds((duration * 60.0) as i64);
            stop.estimated_arrival = Some(current_time);
            current_time += Duration::seconds((stop.service_minutes * 60.0) as i64);
            stop.estimated_departure = Some(current_time);

            total_distance += distance;
            total_duration += duration + stop.service_minutes;
            total_service += stop.service_minutes;
            current_position = stop.location;
            last_location = stop.location;
        }

        let direct = haversine_km(start, last_location);
        let efficiency_ratio = if total_distance > 0.0 {
            (direct / total_distance).min(1.0)
        } else {
            1.0
        };

        Route {
            id: Uuid::new_v4(),
            courier_id,
            stops,
            total_distance_km: total_distance,
            total_duration_minutes: total_duration,
            total_service_minutes: total_service,
            feasibility_score: 100.0,
            efficiency_ratio,
            planned_at: Utc::now(),
        }
    }

    fn estimate_total_distance(&self, start: GeoPoint, stops: &[RouteStop]) -> f64 {
        let mut current = start;
        let mut total = 0.0;
        for stop in stops {
            total += haversine_km(current, stop.location);
            current = stop.location;
        }
        total
    }

    /// 两个带时间窗的站点，若窗口间隔不足以走完两点间路程则视为冲突
    fn count_time_window_conflicts(
        &self,
        stops: &[RouteStop],
        vehicle: Option<&VehicleProfile>,
    ) -> u32 {
        let speed = self.speed_kmh(vehicle);
        let windowed: Vec<&RouteStop> = stops.iter().filter(|s| s.time_window.is_some()).collect();
        let mut conflicts = 0;
        for i in 0..windowed.len() {
            for j in (i + 1)..windowed.len() {
                let (a, b) = (windowed[i], windowed[j]);
                let (wa, wb) = (a.time_window.unwrap(), b.time_window.unwrap());
                let travel_minutes =
                    haversine_km(a.location, b.location) / speed * 60.0 + a.service_minutes;
                let gap = wa.gap_minutes(&wb) as f64;
                // 窗口互不重叠且间隔小于行程时间，两边都赶不上
                let slack = gap + wa.duration_minutes() as f64 + wb.duration_minutes() as f64;
                if gap > 0.0 && slack < travel_minutes {
                    conflicts += 1;
                }
            }
        }
        conflicts
    }

    fn speed_kmh(&self, vehicle: Option<&VehicleProfile>) -> f64 {
        vehicle
            .map(|v| (v.max_speed_kmh * 0.6).max(10.0))
            .unwrap_or(self.config.default_speed_kmh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{GeneticStrategy, NearestNeighborStrategy};

    fn planner() -> RoutePlanner {
        let config = RoutingConfig {
            seed: Some(11),
            ..Default::default()
        };
        RoutePlanner::new(config.clone(), Arc::new(GeneticStrategy::new(config)))
    }

    fn stop(lat: f64, lon: f64, kind: StopKind) -> RouteStop {
        RouteStop::new(kind, GeoPoint::new(lat, lon), "stop")
    }

    fn paris_stops() -> Vec<RouteStop> {
        vec![
            stop(48.86, 2.35, StopKind::Pickup),
            stop(48.88, 2.37, StopKind::Delivery),
            stop(48.87, 2.33, StopKind::Delivery),
            stop(48.90, 2.40, StopKind::Delivery),
        ]
    }

    #[test]
    fn test_plan_annotates_order_and_totals() {
        let p = planner();
        let start = GeoPoint::new(48.85, 2.35);
        let outcome = p
            .plan_route(
                Uuid::new_v4(),
                start,
                paris_stops(),
                &RouteConstraints::default(),
                None,
            )
            .unwrap();
        let route = outcome.route().expect("feasible");

        assert!(route.has_valid_ordering());
        // 分段距离之和等于总距离
        let leg_sum: f64 = route
            .stops
            .iter()
            .map(|s| s.distance_from_previous_km)
            .sum();
        assert!((leg_sum - route.total_distance_km).abs() < 1e-9);
        assert!(route.efficiency_ratio > 0.0 && route.efficiency_ratio <= 1.0);
        for s in &route.stops {
            assert!(s.estimated_arrival.is_some());
            assert!(s.estimated_departure.is_some());
        }
    }

    #[test]
    fn test_infeasible_on_distance_ceiling() {
        let p = planner();
        let start = GeoPoint::new(48.85, 2.35);
        let constraints = RouteConstraints {
            max_distance_km: Some(1.0),
            max_duration_minutes: Some(10.0),
            max_weight_kg: Some(10.0),
            ..Default::default()
        };
        let mut stops = paris_stops();
        stops[1].demand_kg = 25.0;
        // 加上时间窗冲突把分数压到下限以下
        let base = Utc::now();
        stops[0].time_window = Some(
            courier_domain::TimeWindow::new(base, base + Duration::minutes(5)).unwrap(),
        );
        stops[3].time_window = Some(
            courier_domain::TimeWindow::new(
                base + Duration::minutes(6),
                base + Duration::minutes(10),
            )
            .unwrap(),
        );
        let outcome = p
            .plan_route(Uuid::new_v4(), start, stops, &constraints, None)
            .unwrap();
        match outcome {
            PlanOutcome::Infeasible(f) => {
                assert!(!f.issues.is_empty());
                assert!(f.score < 40.0);
            }
            PlanOutcome::Planned(_) => panic!("应判不可行"),
        }
    }

    #[test]
    fn test_time_window_conflict_counts_window_durations_as_slack() {
        let p = planner();
        let base = Utc::now();
        // 两点相距约 5.7km，缺省 30km/h 下行程约 11 分钟
        let mut near = stop(48.86, 2.35, StopKind::Pickup);
        let mut far = stop(48.90, 2.40, StopKind::Delivery);
        near.time_window =
            Some(courier_domain::TimeWindow::new(base, base + Duration::minutes(5)).unwrap());
        far.time_window = Some(
            courier_domain::TimeWindow::new(
                base + Duration::minutes(6),
                base + Duration::minutes(10),
            )
            .unwrap(),
        );
        let conflicts = p.count_time_window_conflicts(&[near.clone(), far.clone()], None);
        assert_eq!(conflicts, 1, "间隔加窗口时长不足以走完行程应计为冲突");

        // 拉长第二个窗口后松弛量超过行程时间，不再冲突
        far.time_window = Some(
            courier_domain::TimeWindow::new(
                base + Duration::minutes(6),
                base + Duration::minutes(60),
            )
            .unwrap(),
        );
        assert_eq!(p.count_time_window_conflicts(&[near, far], None), 0);
    }

    #[test]
    fn test_capacity_issue_alone_stays_feasible() {
        // 单个扣 30 分的问题仍在下限之上：报告问题但不阻塞
        let p = planner();
        let start = GeoPoint::new(48.85, 2.35);
        let mut stops = paris_stops();
        stops[0].demand_kg = 100.0;
        let vehicle = VehicleProfile::default(); // 30kg
        let feasibility =
            p.check_feasibility(start, &stops, &RouteConstraints::default(), Some(&vehicle));
        assert!(feasibility.feasible);
        assert_eq!(feasibility.score, 70.0);
        assert_eq!(feasibility.issues.len(), 1);
    }

    #[test]
    fn test_return_to_start_appends_depot() {
        let p = planner();
        let start = GeoPoint::new(48.85, 2.35);
        let constraints = RouteConstraints {
            return_to_start: true,
            ..Default::default()
        };
        let route = p
            .plan_route(Uuid::new_v4(), start, paris_stops(), &constraints, None)
            .unwrap()
            .route()
            .unwrap();
        assert_eq!(
            route
                .stops
                .iter()
                .filter(|s| s.kind == StopKind::Depot)
                .count(),
            1
        );
    }

    #[test]
    fn test_adjust_inserts_urgent_and_drops_cancelled() {
        let p = planner();
        let start = GeoPoint::new(48.85, 2.35);
        let route = p
            .plan_route(
                Uuid::new_v4(),
                start,
                paris_stops(),
                &RouteConstraints::default(),
                None,
            )
            .unwrap()
            .route()
            .unwrap();

        let cancelled = route.stops[0].id;
        let urgent = stop(48.89, 2.36, StopKind::Delivery);
        let urgent_id = urgent.id;
        let adjustments = RouteAdjustments {
            urgent_stop: Some(urgent),
            cancelled_stop_ids: vec![cancelled],
            ..Default::default()
        };

        let adjusted = p
            .adjust_route(
                &route,
                GeoPoint::new(48.86, 2.35),
                &adjustments,
                &RouteConstraints::default(),
                None,
            )
            .unwrap()
            .route()
            .unwrap();

        assert!(adjusted.stops.iter().all(|s| s.id != cancelled));
        assert!(adjusted.stops.iter().any(|s| s.id == urgent_id));
        assert!(adjusted.has_valid_ordering());
    }

    #[test]
    fn test_traffic_delays_shift_downstream_etas() {
        let p = RoutePlanner::new(RoutingConfig::default(), Arc::new(NearestNeighborStrategy));
        let start = GeoPoint::new(48.85, 2.35);
        let mut route = p
            .plan_route(
                Uuid::new_v4(),
                start,
                paris_stops(),
                &RouteConstraints::default(),
                None,
            )
            .unwrap()
            .route()
            .unwrap();

        let second = route
            .stops
            .iter()
            .find(|s| s.order_index == 1)
            .unwrap()
            .clone();
        let first_arrival_before = route
            .stops
            .iter()
            .find(|s| s.order_index == 0)
            .unwrap()
            .estimated_arrival
            .unwrap();
        let last_arrival_before = route
            .stops
            .iter()
            .find(|s| s.order_index == route.stops.len() - 1)
            .unwrap()
            .estimated_arrival
            .unwrap();
        let total_before = route.total_duration_minutes;

        p.apply_traffic_delays(&mut route, &[(second.id, 12.0)]);

        let first_after = route
            .stops
            .iter()
            .find(|s| s.order_index == 0)
            .unwrap()
            .estimated_arrival
            .unwrap();
        let last_after = route
            .stops
            .iter()
            .find(|s| s.order_index == route.stops.len() - 1)
            .unwrap()
            .estimated_arrival
            .unwrap();

        // 上游不受影响，下游整体顺延
        assert_eq!(first_after, first_arrival_before);
        assert_eq!(last_after, last_arrival_before + Duration::minutes(12));
        assert!((route.total_duration_minutes - total_before - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_avoid_areas_removes_waypoints_only() {
        let p = planner();
        let start = GeoPoint::new(48.85, 2.35);
        let mut stops = paris_stops();
        stops.push(stop(48.92, 2.42, StopKind::Waypoint));
        let route = p
            .plan_route(Uuid::new_v4(), start, stops, &RouteConstraints::default(), None)
            .unwrap()
            .route()
            .unwrap();

        let adjustments = RouteAdjustments {
            // 覆盖途经点与附近的配送点
            avoid_areas: vec![(GeoPoint::new(48.92, 2.42), 3.0)],
            ..Default::default()
        };
        let adjusted = p
            .adjust_route(&route, start, &adjustments, &RouteConstraints::default(), None)
            .unwrap()
            .route()
            .unwrap();

        // 途经点被移除，配送点保留
        assert!(adjusted.stops.iter().all(|s| s.kind != StopKind::Waypoint));
        assert_eq!(
            adjusted
                .stops
                .iter()
                .filter(|s| s.kind == StopKind::Delivery)
                .count(),
            3
        );
    }
}
