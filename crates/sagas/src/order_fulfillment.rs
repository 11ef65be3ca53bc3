//! Order fulfillment saga.
//!
//! A command-dispatching pipeline: reserve inventory, process payment,
//! create shipment. Each incoming event confirms one step and dispatches
//! the next step's command through the injected command bus. When a step
//! fails, previously completed steps are compensated in reverse order with
//! release/refund/cancel commands, and the saga ends in `compensated`.

use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use saga_engine::{Command, CommandBus, Result, Saga, SagaError, SagaEvent, SagaState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The saga type identifier for order fulfillment.
pub const SAGA_TYPE: &str = "order_fulfillment";

/// Step name: reserve inventory for the order.
pub const STEP_RESERVE_INVENTORY: &str = "reserve_inventory";
/// Step name: process payment for the order.
pub const STEP_PROCESS_PAYMENT: &str = "process_payment";
/// Step name: create shipment for the order.
pub const STEP_CREATE_SHIPMENT: &str = "create_shipment";

/// No order received yet.
pub const STATUS_PENDING: &str = "pending";
/// Inventory reservation requested.
pub const STATUS_RESERVING: &str = "reserving";
/// Payment requested.
pub const STATUS_PAYING: &str = "paying";
/// Shipment requested.
pub const STATUS_SHIPPING: &str = "shipping";
/// Terminal: all steps succeeded.
pub const STATUS_COMPLETED: &str = "completed";
/// A step failed; prior steps are being unwound.
pub const STATUS_COMPENSATING: &str = "compensating";
/// Terminal: prior steps unwound.
pub const STATUS_COMPENSATED: &str = "compensated";

#[derive(Debug, Default, Serialize, Deserialize)]
struct FulfillmentPayload {
    order_id: Option<String>,
    completed_steps: Vec<String>,
    compensated_steps: Vec<String>,
    reservation_id: Option<String>,
    payment_id: Option<String>,
    tracking_number: Option<String>,
    failure_reason: Option<String>,
}

/// Saga driving the three-step fulfillment pipeline over a command bus.
pub struct OrderFulfillmentSaga {
    saga_id: SagaId,
    status: String,
    payload: FulfillmentPayload,
    bus: Option<Arc<dyn CommandBus>>,
}

impl OrderFulfillmentSaga {
    /// Creates a fresh instance with no command bus attached.
    pub fn new(saga_id: SagaId) -> Self {
        Self {
            saga_id,
            status: STATUS_PENDING.to_string(),
            payload: FulfillmentPayload::default(),
            bus: None,
        }
    }

    /// Creates a fresh instance wired to a command bus.
    ///
    /// Intended for registry closures:
    /// `manager.register_saga(SAGA_TYPE, move |id| Box::new(OrderFulfillmentSaga::with_bus(id, bus.clone())))`.
    pub fn with_bus(saga_id: SagaId, bus: Arc<dyn CommandBus>) -> Self {
        let mut saga = Self::new(saga_id);
        saga.bus = Some(bus);
        saga
    }

    /// Returns the steps completed so far, in completion order.
    pub fn completed_steps(&self) -> &[String] {
        &self.payload.completed_steps
    }

    /// Returns the steps compensated so far, in compensation order.
    pub fn compensated_steps(&self) -> &[String] {
        &self.payload.compensated_steps
    }

    async fn dispatch(&self, command: Command) -> Result<()> {
        match &self.bus {
            Some(bus) => bus.dispatch(command).await,
            None => Err(SagaError::CommandDispatch(
                "no command bus attached".to_string(),
            )),
        }
    }

    fn order_command(&self, command_type: &str) -> Command {
        let mut command = Command::new(command_type).with("saga_id", Value::from(self.saga_id.as_str()));
        if let Some(order_id) = &self.payload.order_id {
            command = command.with("order_id", Value::from(order_id.clone()));
        }
        command
    }

    fn required_field(event: &SagaEvent, key: &str) -> Result<String> {
        event
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                SagaError::InvalidEvent(format!("{} requires '{key}'", event.event_type()))
            })
    }

    async fn fail_step(&mut self, step: &str, event: &SagaEvent) -> Result<()> {
        let reason = event
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("step failed")
            .to_string();
        self.payload.failure_reason = Some(reason.clone());
        self.status = STATUS_COMPENSATING.to_string();
        self.compensate().await?;
        self.status = STATUS_COMPENSATED.to_string();
        tracing::warn!(saga_id = %self.saga_id, step, %reason, "fulfillment failed, compensated");
        Err(SagaError::StepFailed {
            step: step.to_string(),
            reason,
        })
    }
}

#[async_trait]
impl Saga for OrderFulfillmentSaga {
    async fn handle_event(&mut self, event: &SagaEvent) -> Result<()> {
        match event.event_type() {
            "OrderPlaced" => {
                self.payload.order_id = Some(Self::required_field(event, "order_id")?);
                self.dispatch(self.order_command("ReserveInventory")).await?;
                self.status = STATUS_RESERVING.to_string();
                Ok(())
            }
            "InventoryReserved" => {
                self.payload.reservation_id =
                    Some(Self::required_field(event, "reservation_id")?);
                self.payload
                    .completed_steps
                    .push(STEP_RESERVE_INVENTORY.to_string());
                self.dispatch(self.order_command("ProcessPayment")).await?;
                self.status = STATUS_PAYING.to_string();
                Ok(())
            }
            "PaymentProcessed" => {
                self.payload.payment_id = Some(Self::required_field(event, "payment_id")?);
                self.payload
                    .completed_steps
                    .push(STEP_PROCESS_PAYMENT.to_string());
                self.dispatch(self.order_command("CreateShipment")).await?;
                self.status = STATUS_SHIPPING.to_string();
                Ok(())
            }
            "ShipmentCreated" => {
                self.payload.tracking_number =
                    Some(Self::required_field(event, "tracking_number")?);
                self.payload
                    .completed_steps
                    .push(STEP_CREATE_SHIPMENT.to_string());
                self.status = STATUS_COMPLETED.to_string();
                tracing::info!(saga_id = %self.saga_id, "order fulfilled");
                Ok(())
            }
            "InventoryFailed" => self.fail_step(STEP_RESERVE_INVENTORY, event).await,
            "PaymentFailed" => self.fail_step(STEP_PROCESS_PAYMENT, event).await,
            "ShipmentFailed" => self.fail_step(STEP_CREATE_SHIPMENT, event).await,
            other => Err(SagaError::UnexpectedEvent {
                event_type: other.to_string(),
                status: self.status.clone(),
            }),
        }
    }

    /// Dispatches compensating commands for completed steps in reverse
    /// order. Steps are moved to the compensated list as their command goes
    /// out, so a repeated call only unwinds what is still outstanding.
    async fn compensate(&mut self) -> Result<()> {
        while let Some(step) = self.payload.completed_steps.pop() {
            let command = match step.as_str() {
                STEP_CREATE_SHIPMENT => {
                    let mut c = self.order_command("CancelShipment");
                    if let Some(tracking) = &self.payload.tracking_number {
                        c = c.with("tracking_number", Value::from(tracking.clone()));
                    }
                    c
                }
                STEP_PROCESS_PAYMENT => {
                    let mut c = self.order_command("RefundPayment");
                    if let Some(payment_id) = &self.payload.payment_id {
                        c = c.with("payment_id", Value::from(payment_id.clone()));
                    }
                    c
                }
                STEP_RESERVE_INVENTORY => {
                    let mut c = self.order_command("ReleaseInventory");
                    if let Some(reservation_id) = &self.payload.reservation_id {
                        c = c.with("reservation_id", Value::from(reservation_id.clone()));
                    }
                    c
                }
                unknown => {
                    tracing::warn!(saga_id = %self.saga_id, step = unknown, "unknown step, skipping");
                    self.payload.compensated_steps.push(step);
                    continue;
                }
            };
            self.dispatch(command).await?;
            self.payload.compensated_steps.push(step);
        }
        Ok(())
    }

    fn is_completed(&self) -> bool {
        matches!(self.status.as_str(), STATUS_COMPLETED | STATUS_COMPENSATED)
    }

    fn state(&self) -> SagaState {
        let mut data = serde_json::Map::new();
        data.insert(
            "order_id".to_string(),
            self.payload.order_id.clone().map_or(Value::Null, Value::from),
        );
        data.insert(
            "completed_steps".to_string(),
            Value::from(self.payload.completed_steps.clone()),
        );
        data.insert(
            "compensated_steps".to_string(),
            Value::from(self.payload.compensated_steps.clone()),
        );
        data.insert(
            "reservation_id".to_string(),
            self.payload
                .reservation_id
                .clone()
                .map_or(Value::Null, Value::from),
        );
        data.insert(
            "payment_id".to_string(),
            self.payload.payment_id.clone().map_or(Value::Null, Value::from),
        );
        data.insert(
            "tracking_number".to_string(),
            self.payload
                .tracking_number
                .clone()
                .map_or(Value::Null, Value::from),
        );
        data.insert(
            "failure_reason".to_string(),
            self.payload
                .failure_reason
                .clone()
                .map_or(Value::Null, Value::from),
        );
        SagaState::new(self.saga_id.clone(), self.status.clone(), data)
    }

    fn set_state(&mut self, state: SagaState) -> Result<()> {
        let (saga_id, status, data) = state.into_parts();
        self.saga_id = saga_id;
        self.status = status;
        self.payload = serde_json::from_value(Value::Object(data))?;
        Ok(())
    }

    fn set_command_bus(&mut self, bus: Arc<dyn CommandBus>) {
        self.bus = Some(bus);
    }
}
