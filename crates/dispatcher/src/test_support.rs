//! 外部协作方的记录型替身

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use courier_domain::{Actor, DispatchError, DispatchResult};
use uuid::Uuid;

use crate::collaborators::{Notifier, PaymentGateway};

#[derive(Default)]
pub struct RecordingPayments {
    charges: Mutex<Vec<(Uuid, f64)>>,
    refunds: Mutex<Vec<(Uuid, f64)>>,
    refunds_fail: AtomicBool,
}

impl RecordingPayments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.refunds_fail.store(fail, Ordering::SeqCst);
    }

    pub fn charge_count(&self) -> usize {
        self.charges.lock().unwrap().len()
    }

    pub fn refund_count(&self) -> usize {
        self.refunds.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for RecordingPayments {
    async fn charge(&self, order_id: Uuid, amount: f64) -> DispatchResult<()> {
        self.charges.lock().unwrap().push((order_id, amount));
        Ok(())
    }

    async fn refund(&self, order_id: Uuid, amount: f64) -> DispatchResult<()> {
        if self.refunds_fail.load(Ordering::SeqCst) {
            return Err(DispatchError::unavailable("payment", "退款接口 503"));
        }
        self.refunds.lock().unwrap().push((order_id, amount));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Actor, Uuid, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_to(&self, recipient: Actor) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _, _)| *r == recipient)
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: Actor, order_id: Uuid, message: &str) -> DispatchResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient, order_id, message.to_string()));
        Ok(())
    }
}
