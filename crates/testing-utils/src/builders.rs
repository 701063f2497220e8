//! 测试数据构造器，带合理默认值，便于按需定制

use chrono::Utc;
use courier_domain::{
    Capability, Courier, DispatchOrder, GeoPoint, GeoZone, RelayPoint, RelayPointType,
    ScheduledTask, ShipmentRequest, TaskType, TimeWindow,
};
use uuid::Uuid;

pub struct ShipmentBuilder {
    shipment: ShipmentRequest,
}

impl ShipmentBuilder {
    pub fn new() -> Self {
        Self {
            shipment: ShipmentRequest::new(
                GeoPoint::new(48.8566, 2.3522),
                "1 rue de Rivoli, 75001 Paris",
                GeoPoint::new(48.8649, 2.3800),
                "20 rue Oberkampf, 75011 Paris",
                5.0,
                0.05,
                Uuid::new_v4(),
            ),
        }
    }

    pub fn with_pickup(mut self, point: GeoPoint) -> Self {
        self.shipment.pickup_location = point;
        self
    }

    pub fn with_delivery(mut self, point: GeoPoint) -> Self {
        self.shipment.delivery_location = point;
        self
    }

    pub fn with_weight(mut self, weight_kg: f64) -> Self {
        self.shipment.weight_kg = weight_kg;
        self
    }

    pub fn with_volume(mut self, volume_m3: f64) -> Self {
        self.shipment.volume_m3 = volume_m3;
        self
    }

    pub fn fragile(mut self) -> Self {
        self.shipment.fragile = true;
        self
    }

    pub fn refrigerated(mut self) -> Self {
        self.shipment.needs_refrigeration = true;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.shipment.priority = priority;
        self
    }

    pub fn with_suggested_price(mut self, price: f64) -> Self {
        self.shipment.suggested_price = price;
        self
    }

    pub fn with_pickup_window(mut self, window: TimeWindow) -> Self {
        self.shipment.pickup_window = Some(window);
        self
    }

    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.shipment.customer_id = customer_id;
        self
    }

    pub fn build(self) -> ShipmentRequest {
        self.shipment
    }
}

impl Default for ShipmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CourierBuilder {
    courier: Courier,
}

impl CourierBuilder {
    /// 默认构造一个已验证、在线、评分 4.2 的配送员
    pub fn new() -> Self {
        let mut courier = Courier::new("test_courier");
        courier.verified = true;
        courier.is_online = true;
        courier.rating = 4.2;
        courier.completed_deliveries = 60;
        Self { courier }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.courier.id = id;
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.courier.rating = rating;
        self
    }

    pub fn with_completed(mut self, count: u32) -> Self {
        self.courier.completed_deliveries = count;
        self
    }

    pub fn offline(mut self) -> Self {
        self.courier.is_online = false;
        self
    }

    pub fn unverified(mut self) -> Self {
        self.courier.verified = false;
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.courier.capabilities.insert(capability);
        self
    }

    pub fn refrigerated(mut self) -> Self {
        self.courier.vehicle.refrigerated = true;
        self
    }

    pub fn careful_handling(mut self) -> Self {
        self.courier.vehicle.careful_handling = true;
        self
    }

    pub fn with_max_weight(mut self, max_weight_kg: f64) -> Self {
        self.courier.vehicle.max_weight_kg = max_weight_kg;
        self
    }

    pub fn build(self) -> Courier {
        self.courier
    }
}

impl Default for CourierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RelayPointBuilder {
    point: RelayPoint,
}

impl RelayPointBuilder {
    pub fn new() -> Self {
        Self {
            point: RelayPoint {
                id: Uuid::new_v4(),
                name: "entrepot_test".to_string(),
                location: GeoPoint::new(48.90, 2.40),
                kind: RelayPointType::Warehouse,
                capacity: 50,
                available_slots: 50,
                opening_hours: None,
            },
        }
    }

    pub fn with_location(mut self, point: GeoPoint) -> Self {
        self.point.location = point;
        self
    }

    pub fn with_kind(mut self, kind: RelayPointType) -> Self {
        self.point.kind = kind;
        self
    }

    pub fn with_slots(mut self, slots: u32) -> Self {
        self.point.available_slots = slots;
        self
    }

    pub fn named(mut self, name: &str) -> Self {
        self.point.name = name.to_string();
        self
    }

    pub fn build(self) -> RelayPoint {
        self.point
    }
}

impl Default for RelayPointBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OrderBuilder {
    order: DispatchOrder,
}

impl OrderBuilder {
    pub fn new() -> Self {
        Self {
            order: DispatchOrder::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                GeoPoint::new(48.8649, 2.3800),
                "20 rue Oberkampf, 75011 Paris",
                42.0,
            ),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.order.id = id;
        self
    }

    pub fn with_status(mut self, status: courier_domain::OrderStatus) -> Self {
        self.order.status = status;
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.order.amount = amount;
        self
    }

    pub fn build(self) -> DispatchOrder {
        self.order
    }
}

impl Default for OrderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TaskBuilder {
    task: ScheduledTask,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: ScheduledTask::new(Uuid::new_v4(), TaskType::PaymentTimeout, Utc::now()),
        }
    }

    pub fn with_order(mut self, order_id: Uuid) -> Self {
        self.task.order_id = order_id;
        self
    }

    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task.task_type = task_type;
        self
    }

    pub fn due_at(mut self, at: chrono::DateTime<Utc>) -> Self {
        self.task.execute_at = at;
        self
    }

    pub fn with_retries(mut self, count: u32, max: u32) -> Self {
        self.task.retry_count = count;
        self.task.max_retries = max;
        self
    }

    pub fn build(self) -> ScheduledTask {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 常用测试区域
pub fn test_zone(name: &str, center: GeoPoint, radius_km: f64) -> GeoZone {
    GeoZone {
        id: Uuid::new_v4(),
        name: name.to_string(),
        center,
        radius_km,
        delivery_density: 100.0,
        avg_delivery_minutes: 30.0,
        popular_windows: vec![],
    }
}
