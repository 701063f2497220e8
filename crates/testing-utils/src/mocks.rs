//! 全部仓库 trait 的内存实现
//!
//! 行为与 SQLite 实现保持一致（包括受保护更新和原子认领），
//! 供单元测试在无数据库环境下使用

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_domain::{
    Courier, CourierHistoryRepository, CourierRepository, DelaySample, DeliveryStatsRepository,
    DispatchOrder, DispatchResult, GeoPoint, OrderRepository, OrderStatus, PartialDeliveryPlan,
    PartialDeliveryPlanRepository, RelayPoint, RelayPointRepository, RelayPointType, Route,
    RouteRepository, ScheduledTask, ScheduledTaskRepository, ShipmentRepository, ShipmentRequest,
    TaskType, WorkflowEvent, WorkflowEventRepository,
};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct MockShipmentRepository {
    shipments: Arc<Mutex<HashMap<Uuid, ShipmentRequest>>>,
}

impl MockShipmentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShipmentRepository for MockShipmentRepository {
    async fn save(&self, shipment: &ShipmentRequest) -> DispatchResult<()> {
        self.shipments
            .lock()
            .unwrap()
            .insert(shipment.id, shipment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<ShipmentRequest>> {
        Ok(self.shipments.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, shipment: &ShipmentRequest) -> DispatchResult<()> {
        self.shipments
            .lock()
            .unwrap()
            .insert(shipment.id, shipment.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockCourierRepository {
    couriers: Arc<Mutex<HashMap<Uuid, Courier>>>,
}

impl MockCourierRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_couriers(couriers: Vec<Courier>) -> Self {
        let map = couriers.into_iter().map(|c| (c.id, c)).collect();
        Self {
            couriers: Arc::new(Mutex::new(map)),
        }
    }
}

#[async_trait]
impl CourierRepository for MockCourierRepository {
    async fn save(&self, courier: &Courier) -> DispatchResult<()> {
        self.couriers
            .lock()
            .unwrap()
            .insert(courier.id, courier.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<Courier>> {
        Ok(self.couriers.lock().unwrap().get(&id).cloned())
    }

    async fn list_online(&self) -> DispatchResult<Vec<Courier>> {
        Ok(self
            .couriers
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.is_online)
            .cloned()
            .collect())
    }

    async fn update(&self, courier: &Courier) -> DispatchResult<()> {
        self.couriers
            .lock()
            .unwrap()
            .insert(courier.id, courier.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockRouteRepository {
    routes: Arc<Mutex<HashMap<Uuid, Route>>>,
}

impl MockRouteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RouteRepository for MockRouteRepository {
    async fn save(&self, route: &Route) -> DispatchResult<()> {
        self.routes.lock().unwrap().insert(route.id, route.clone());
        Ok(())
    }

    async fn active_route_for(&self, courier_id: Uuid) -> DispatchResult<Option<Route>> {
        Ok(self
            .routes
            .lock()
            .unwrap()
            .values()
            .find(|r| r.courier_id == courier_id)
            .cloned())
    }
}

#[derive(Clone, Default)]
pub struct MockRelayPointRepository {
    points: Arc<Mutex<HashMap<Uuid, RelayPoint>>>,
}

impl MockRelayPointRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_points(points: Vec<RelayPoint>) -> Self {
        let map = points.into_iter().map(|p| (p.id, p)).collect();
        Self {
            points: Arc::new(Mutex::new(map)),
        }
    }

    pub fn slots_of(&self, id: Uuid) -> Option<u32> {
        self.points
            .lock()
            .unwrap()
            .get(&id)
            .map(|p| p.available_slots)
    }
}

#[async_trait]
impl RelayPointRepository for MockRelayPointRepository {
    async fn save(&self, point: &RelayPoint) -> DispatchResult<()> {
        self.points.lock().unwrap().insert(point.id, point.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<RelayPoint>> {
        Ok(self.points.lock().unwrap().get(&id).cloned())
    }

    async fn list_by_types(&self, types: &[RelayPointType]) -> DispatchResult<Vec<RelayPoint>> {
        let wanted: HashSet<_> = types.iter().collect();
        Ok(self
            .points
            .lock()
            .unwrap()
            .values()
            .filter(|p| wanted.contains(&p.kind))
            .cloned()
            .collect())
    }

    async fn reserve_slot(&self, id: Uuid) -> DispatchResult<bool> {
        let mut points = self.points.lock().unwrap();
        match points.get_mut(&id) {
            Some(p) if p.available_slots > 0 => {
                p.available_slots -= 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(courier_domain::DispatchError::relay_point_not_found(id)),
        }
    }

    async fn release_slot(&self, id: Uuid) -> DispatchResult<()> {
        let mut points = self.points.lock().unwrap();
        if let Some(p) = points.get_mut(&id) {
            p.available_slots = (p.available_slots + 1).min(p.capacity);
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockPlanRepository {
    plans: Arc<Mutex<HashMap<Uuid, PartialDeliveryPlan>>>,
}

impl MockPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PartialDeliveryPlanRepository for MockPlanRepository {
    async fn save(&self, plan: &PartialDeliveryPlan) -> DispatchResult<()> {
        self.plans.lock().unwrap().insert(plan.id, plan.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<PartialDeliveryPlan>> {
        Ok(self.plans.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, plan: &PartialDeliveryPlan) -> DispatchResult<()> {
        self.plans.lock().unwrap().insert(plan.id, plan.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockOrderRepository {
    orders: Arc<Mutex<HashMap<Uuid, DispatchOrder>>>,
}

impl MockOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for MockOrderRepository {
    async fn save(&self, order: &DispatchOrder) -> DispatchResult<()> {
        self.orders.lock().unwrap().insert(order.id, order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<DispatchOrder>> {
        Ok(self.orders.lock().unwrap().get(&id).cloned())
    }

    async fn update_guarded(
        &self,
        order: &DispatchOrder,
        expected: OrderStatus,
    ) -> DispatchResult<bool> {
        let mut orders = self.orders.lock().unwrap();
        match orders.get(&order.id) {
            Some(stored) if stored.status == expected => {
                orders.insert(order.id, order.clone());
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(courier_domain::DispatchError::order_not_found(order.id)),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockEventRepository {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl MockEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkflowEventRepository for MockEventRepository {
    async fn append(&self, event: &WorkflowEvent) -> DispatchResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn list_for_order(&self, order_id: Uuid) -> DispatchResult<Vec<WorkflowEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn latest_for_order(&self, order_id: Uuid) -> DispatchResult<Option<WorkflowEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| e.order_id == order_id)
            .cloned())
    }
}

#[derive(Clone, Default)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<Uuid, ScheduledTask>>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ScheduledTask> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<ScheduledTask> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl ScheduledTaskRepository for MockTaskRepository {
    async fn save(&self, task: &ScheduledTask) -> DispatchResult<()> {
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> DispatchResult<Option<ScheduledTask>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn claim_due_batch(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> DispatchResult<Vec<ScheduledTask>> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut due: Vec<Uuid> = tasks
            .values()
            .filter(|t| t.is_due(now))
            .map(|t| t.id)
            .collect();
        due.sort_by_key(|id| tasks[id].execute_at);
        due.truncate(limit as usize);

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            // 认领即下线，与 SQLite 条件更新语义一致
            if let Some(t) = tasks.get_mut(&id) {
                t.active = false;
                claimed.push(t.clone());
            }
        }
        Ok(claimed)
    }

    async fn reschedule(
        &self,
        task_id: Uuid,
        execute_at: DateTime<Utc>,
        retry_count: u32,
    ) -> DispatchResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(t) = tasks.get_mut(&task_id) {
            t.execute_at = execute_at;
            t.retry_count = retry_count;
            t.active = true;
        }
        Ok(())
    }

    async fn mark_completed(&self, task_id: Uuid, result: &str) -> DispatchResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(t) = tasks.get_mut(&task_id) {
            t.active = false;
            t.completed = true;
            t.result = Some(result.to_string());
        }
        Ok(())
    }

    async fn mark_failed_permanent(&self, task_id: Uuid, result: &str) -> DispatchResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(t) = tasks.get_mut(&task_id) {
            t.active = false;
            t.completed = true;
            t.result = Some(result.to_string());
        }
        Ok(())
    }

    async fn find_active(
        &self,
        order_id: Uuid,
        task_type: TaskType,
    ) -> DispatchResult<Option<ScheduledTask>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .find(|t| t.order_id == order_id && t.task_type == task_type && t.active)
            .cloned())
    }

    async fn cancel_for_order(&self, order_id: Uuid) -> DispatchResult<u32> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut cancelled = 0;
        for t in tasks.values_mut() {
            if t.order_id == order_id && t.active {
                t.active = false;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn cancel_by_type(&self, order_id: Uuid, task_type: TaskType) -> DispatchResult<u32> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut cancelled = 0;
        for t in tasks.values_mut() {
            if t.order_id == order_id && t.task_type == task_type && t.active {
                t.active = false;
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}

#[derive(Clone, Default)]
pub struct MockStatsRepository {
    samples: Arc<Mutex<Vec<(GeoPoint, DelaySample)>>>,
}

impl MockStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_samples(samples: Vec<(GeoPoint, DelaySample)>) -> Self {
        Self {
            samples: Arc::new(Mutex::new(samples)),
        }
    }
}

#[async_trait]
impl DeliveryStatsRepository for MockStatsRepository {
    async fn delay_samples_near(
        &self,
        _point: GeoPoint,
        _radius_km: f64,
        _window_days: u32,
    ) -> DispatchResult<Vec<DelaySample>> {
        Ok(self
            .samples
            .lock()
            .unwrap()
            .iter()
            .map(|(_, s)| *s)
            .collect())
    }

    async fn record_delay(
        &self,
        point: GeoPoint,
        delay_minutes: f64,
        recorded_at: DateTime<Utc>,
    ) -> DispatchResult<()> {
        self.samples.lock().unwrap().push((
            point,
            DelaySample {
                delay_minutes,
                recorded_at,
            },
        ));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MockHistoryRepository {
    completed: Arc<Mutex<HashMap<(Uuid, Uuid), u32>>>,
    reviews: Arc<Mutex<HashMap<Uuid, f64>>>,
    blacklist: Arc<Mutex<HashSet<(Uuid, Uuid)>>>,
}

impl MockHistoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_completed(&self, customer_id: Uuid, courier_id: Uuid, count: u32) {
        self.completed
            .lock()
            .unwrap()
            .insert((customer_id, courier_id), count);
    }

    pub fn set_review_average(&self, courier_id: Uuid, average: f64) {
        self.reviews.lock().unwrap().insert(courier_id, average);
    }

    pub fn blacklist(&self, customer_id: Uuid, courier_id: Uuid) {
        self.blacklist
            .lock()
            .unwrap()
            .insert((customer_id, courier_id));
    }
}

#[async_trait]
impl CourierHistoryRepository for MockHistoryRepository {
    async fn completed_between(
        &self,
        customer_id: Uuid,
        courier_id: Uuid,
    ) -> DispatchResult<u32> {
        Ok(*self
            .completed
            .lock()
            .unwrap()
            .get(&(customer_id, courier_id))
            .unwrap_or(&0))
    }

    async fn recent_review_average(
        &self,
        courier_id: Uuid,
        _limit: u32,
    ) -> DispatchResult<Option<f64>> {
        Ok(self.reviews.lock().unwrap().get(&courier_id).copied())
    }

    async fn is_blacklisted(&self, customer_id: Uuid, courier_id: Uuid) -> DispatchResult<bool> {
        Ok(self
            .blacklist
            .lock()
            .unwrap()
            .contains(&(customer_id, courier_id)))
    }
}
