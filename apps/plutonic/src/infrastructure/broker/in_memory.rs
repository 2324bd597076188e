//! In-memory broker.
//!
//! Keeps orders, positions and balances in process and lets callers script
//! fills, status changes, latency and failures. Used for paper runs without
//! network access and throughout the test suite.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::ports::{
    AccountSnapshot, BrokerClient, BrokerError, BrokerOrder, BrokerPosition,
};
use crate::domain::order_execution::{OrderStatus, OrderUpdate, TradeIntent};
use crate::domain::position::Position;
use crate::domain::shared::{BrokerId, OrderId, Symbol};

/// Broker operations, for scripting failures and counting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerCall {
    /// `submit_order`
    Submit,
    /// `cancel_order`
    Cancel,
    /// `get_position`
    GetPosition,
    /// `get_account`
    GetAccount,
    /// `get_order`
    GetOrder,
    /// `list_positions`
    ListPositions,
    /// `list_open_orders`
    ListOpenOrders,
    /// `find_order`
    FindOrder,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    orders: HashMap<BrokerId, BrokerOrder>,
    positions: BTreeMap<Symbol, Position>,
    account: Option<AccountSnapshot>,
    failures: HashMap<BrokerCall, VecDeque<BrokerError>>,
    calls: HashMap<BrokerCall, usize>,
    latency: Option<Duration>,
    accept_stalls: VecDeque<Duration>,
}

/// Scriptable in-process broker.
///
/// Order ids are assigned as `X1`, `X2`, ... in submission order.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
}

impl InMemoryBroker {
    /// Empty broker with no positions and zero balances.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next calls of `call` with `errors`, in order.
    pub fn fail_next(&self, call: BrokerCall, errors: impl IntoIterator<Item = BrokerError>) {
        self.state
            .lock()
            .failures
            .entry(call)
            .or_default()
            .extend(errors);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().latency = latency;
    }

    /// Accept the next submission, then hold the response for `delay`.
    ///
    /// The order is live at the broker even if the caller gives up waiting.
    pub fn stall_next_accept(&self, delay: Duration) {
        self.state.lock().accept_stalls.push_back(delay);
    }

    /// Number of times `call` was invoked, failures included.
    pub fn calls(&self, call: BrokerCall) -> usize {
        self.state.lock().calls.get(&call).copied().unwrap_or(0)
    }

    /// Overwrite the broker's position in `symbol`.
    pub fn set_position(&self, symbol: impl AsRef<str>, quantity: Decimal, avg_entry_price: Decimal) {
        let symbol = Symbol::new(symbol);
        let mut state = self.state.lock();
        if quantity.is_zero() {
            state.positions.remove(&symbol);
            return;
        }
        let mut position = Position::flat(symbol.clone());
        position.quantity = quantity;
        position.avg_cost = avg_entry_price;
        state.positions.insert(symbol, position);
    }

    /// Overwrite account balances.
    pub fn set_account(&self, cash: Decimal, buying_power: Decimal) {
        self.state.lock().account = Some(AccountSnapshot { cash, buying_power });
    }

    /// Current broker-side record of an order.
    pub fn order(&self, broker_order_id: &BrokerId) -> Option<BrokerOrder> {
        self.state.lock().orders.get(broker_order_id).cloned()
    }

    /// Place an order directly at the broker, bypassing `submit_order`.
    pub fn seed_order(&self, intent: TradeIntent) -> BrokerId {
        let mut state = self.state.lock();
        Self::open_order(&mut state, intent)
    }

    /// Execute `quantity` at `price` against a working order.
    ///
    /// Moves the broker's position and returns the resulting update.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids, `Validation` if the order is closed,
    /// `quantity` exceeds what remains, or the notional is out of range.
    pub fn fill(
        &self,
        broker_order_id: &BrokerId,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<OrderUpdate, BrokerError> {
        let mut guard = self.state.lock();
        let State {
            orders, positions, ..
        } = &mut *guard;
        let order = orders
            .get_mut(broker_order_id)
            .ok_or_else(|| not_found(broker_order_id))?;

        if order.update.status.is_terminal() {
            return Err(BrokerError::Validation {
                message: format!("order {broker_order_id} is {}", order.update.status),
            });
        }
        let filled = order.update.filled_quantity + quantity;
        if quantity <= Decimal::ZERO || filled > order.intent.quantity {
            return Err(BrokerError::Validation {
                message: format!(
                    "fill of {quantity} exceeds remaining {}",
                    order.intent.quantity - order.update.filled_quantity
                ),
            });
        }

        let out_of_range = || BrokerError::Validation {
            message: format!("fill of {quantity} at {price} is out of range"),
        };
        let avg_fill_price = order
            .update
            .avg_fill_price
            .unwrap_or_default()
            .checked_mul(order.update.filled_quantity)
            .zip(price.checked_mul(quantity))
            .and_then(|(before, added)| before.checked_add(added))
            .and_then(|notional| notional.checked_div(filled))
            .ok_or_else(out_of_range)?;

        let symbol = order.intent.symbol.clone();
        let mut position = positions
            .get(&symbol)
            .cloned()
            .unwrap_or_else(|| Position::flat(symbol.clone()));
        position
            .apply_fill(order.intent.side.signed(quantity), price)
            .map_err(|_| out_of_range())?;

        order.update.avg_fill_price = Some(avg_fill_price);
        order.update.filled_quantity = filled;
        order.update.status = if filled == order.intent.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        bump(&mut order.update);
        let update = order.update.clone();

        if position.is_flat() {
            positions.remove(&symbol);
        } else {
            positions.insert(symbol, position);
        }

        Ok(update)
    }

    /// Force an order into `status` (e.g. `Expired` or `Rejected`).
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown ids.
    pub fn set_status(
        &self,
        broker_order_id: &BrokerId,
        status: OrderStatus,
    ) -> Result<OrderUpdate, BrokerError> {
        let mut state = self.state.lock();
        let order = state
            .orders
            .get_mut(broker_order_id)
            .ok_or_else(|| not_found(broker_order_id))?;
        order.update.status = status;
        bump(&mut order.update);
        Ok(order.update.clone())
    }

    fn open_order(state: &mut State, intent: TradeIntent) -> BrokerId {
        state.next_id += 1;
        let broker_order_id = BrokerId::new(format!("X{}", state.next_id));
        let update = OrderUpdate {
            client_order_id: intent.client_order_id.clone(),
            broker_order_id: broker_order_id.clone(),
            status: OrderStatus::Submitted,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            sequence: 1,
            occurred_at: Utc::now(),
        };
        state
            .orders
            .insert(broker_order_id.clone(), BrokerOrder { intent, update });
        broker_order_id
    }

    /// Count the call, honour latency, and pop any scripted failure.
    async fn enter(&self, call: BrokerCall) -> Result<(), BrokerError> {
        let (latency, failure) = {
            let mut state = self.state.lock();
            *state.calls.entry(call).or_default() += 1;
            let failure = state.failures.get_mut(&call).and_then(VecDeque::pop_front);
            (state.latency, failure)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        failure.map_or(Ok(()), Err)
    }
}

fn bump(update: &mut OrderUpdate) {
    update.sequence += 1;
    update.occurred_at = Utc::now();
}

fn not_found(broker_order_id: &BrokerId) -> BrokerError {
    BrokerError::NotFound {
        resource: format!("order {broker_order_id}"),
    }
}

fn to_broker_position(position: &Position) -> BrokerPosition {
    BrokerPosition {
        symbol: position.symbol.clone(),
        quantity: position.quantity,
        avg_entry_price: position.avg_cost,
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn submit_order(&self, intent: &TradeIntent) -> Result<BrokerId, BrokerError> {
        self.enter(BrokerCall::Submit).await?;
        let (broker_order_id, stall) = {
            let mut state = self.state.lock();
            if state
                .orders
                .values()
                .any(|o| o.intent.client_order_id == intent.client_order_id)
            {
                return Err(BrokerError::Validation {
                    message: format!("client_order_id {} must be unique", intent.client_order_id),
                });
            }
            let id = Self::open_order(&mut state, intent.clone());
            (id, state.accept_stalls.pop_front())
        };
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        Ok(broker_order_id)
    }

    async fn find_order(
        &self,
        client_order_id: &OrderId,
    ) -> Result<Option<OrderUpdate>, BrokerError> {
        self.enter(BrokerCall::FindOrder).await?;
        Ok(self
            .state
            .lock()
            .orders
            .values()
            .find(|o| &o.intent.client_order_id == client_order_id)
            .map(|o| o.update.clone()))
    }

    async fn cancel_order(&self, broker_order_id: &BrokerId) -> Result<(), BrokerError> {
        self.enter(BrokerCall::Cancel).await?;
        let mut state = self.state.lock();
        let order = state
            .orders
            .get_mut(broker_order_id)
            .ok_or_else(|| not_found(broker_order_id))?;
        if order.update.status.is_terminal() {
            return Err(BrokerError::Validation {
                message: format!("order {broker_order_id} is not cancelable"),
            });
        }
        order.update.status = OrderStatus::Canceled;
        bump(&mut order.update);
        Ok(())
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<BrokerPosition>, BrokerError> {
        self.enter(BrokerCall::GetPosition).await?;
        Ok(self.state.lock().positions.get(symbol).map(to_broker_position))
    }

    async fn get_account(&self) -> Result<AccountSnapshot, BrokerError> {
        self.enter(BrokerCall::GetAccount).await?;
        Ok(self.state.lock().account.clone().unwrap_or(AccountSnapshot {
            cash: Decimal::ZERO,
            buying_power: Decimal::ZERO,
        }))
    }

    async fn get_order(&self, broker_order_id: &BrokerId) -> Result<OrderUpdate, BrokerError> {
        self.enter(BrokerCall::GetOrder).await?;
        self.state
            .lock()
            .orders
            .get(broker_order_id)
            .map(|o| o.update.clone())
            .ok_or_else(|| not_found(broker_order_id))
    }

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        self.enter(BrokerCall::ListPositions).await?;
        Ok(self
            .state
            .lock()
            .positions
            .values()
            .map(to_broker_position)
            .collect())
    }

    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        self.enter(BrokerCall::ListOpenOrders).await?;
        let state = self.state.lock();
        let mut open: Vec<BrokerOrder> = state
            .orders
            .values()
            .filter(|o| !o.update.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.update.broker_order_id.cmp(&b.update.broker_order_id));
        Ok(open)
    }
}
