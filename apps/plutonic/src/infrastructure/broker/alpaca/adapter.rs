//! Alpaca broker adapter implementing `BrokerClient`.

use async_trait::async_trait;

use crate::application::ports::{
    AccountSnapshot, BrokerClient, BrokerError, BrokerOrder, BrokerPosition,
};
use crate::domain::order_execution::{OrderUpdate, TradeIntent};
use crate::domain::shared::{BrokerId, OrderId, Symbol};

use super::api_types::{
    AlpacaAccountResponse, AlpacaOrderRequest, AlpacaOrderResponse, AlpacaPositionResponse,
};
use super::config::{AlpacaConfig, AlpacaEnvironment};
use super::error::AlpacaError;
use super::http_client::AlpacaHttpClient;

/// Alpaca's maximum page size for order listings.
const OPEN_ORDERS_LIMIT: u32 = 500;

/// Alpaca Markets broker adapter.
#[derive(Debug, Clone)]
pub struct AlpacaBrokerAdapter {
    client: AlpacaHttpClient,
    environment: AlpacaEnvironment,
}

impl AlpacaBrokerAdapter {
    /// Create a new Alpaca broker adapter.
    pub fn new(config: &AlpacaConfig) -> Result<Self, AlpacaError> {
        let client = AlpacaHttpClient::new(config)?;
        Ok(Self {
            client,
            environment: config.environment,
        })
    }

    /// Check if we're in live trading mode.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.environment.is_live()
    }
}

#[async_trait]
impl BrokerClient for AlpacaBrokerAdapter {
    async fn submit_order(&self, intent: &TradeIntent) -> Result<BrokerId, BrokerError> {
        if self.is_live() {
            tracing::warn!(
                client_order_id = %intent.client_order_id,
                symbol = %intent.symbol,
                "Submitting LIVE order - this will execute real trades"
            );
        }

        let request = AlpacaOrderRequest::from(intent);

        tracing::debug!(
            client_order_id = %request.client_order_id,
            symbol = %request.symbol,
            side = %request.side,
            order_type = %request.order_type,
            qty = %request.qty,
            limit_price = ?request.limit_price,
            "Submitting order to Alpaca"
        );

        let response: AlpacaOrderResponse = self.client.post("/v2/orders", &request).await?;

        tracing::debug!(
            client_order_id = %response.client_order_id,
            broker_order_id = %response.id,
            status = %response.status,
            "Alpaca accepted order"
        );

        Ok(BrokerId::new(response.id))
    }

    async fn cancel_order(&self, broker_order_id: &BrokerId) -> Result<(), BrokerError> {
        self.client
            .delete(&format!("/v2/orders/{broker_order_id}"))
            .await
            .map_err(BrokerError::from)
    }

    async fn get_position(&self, symbol: &Symbol) -> Result<Option<BrokerPosition>, BrokerError> {
        let result: Result<AlpacaPositionResponse, AlpacaError> =
            self.client.get(&format!("/v2/positions/{symbol}")).await;

        match result {
            Ok(position) => Ok(Some(position.to_broker_position()?)),
            Err(AlpacaError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_account(&self) -> Result<AccountSnapshot, BrokerError> {
        let account: AlpacaAccountResponse = self.client.get("/v2/account").await?;
        Ok(account.to_snapshot()?)
    }

    async fn get_order(&self, broker_order_id: &BrokerId) -> Result<OrderUpdate, BrokerError> {
        let response: AlpacaOrderResponse = self
            .client
            .get(&format!("/v2/orders/{broker_order_id}"))
            .await?;
        Ok(response.to_order_update()?)
    }

    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        let positions: Vec<AlpacaPositionResponse> = self.client.get("/v2/positions").await?;
        positions
            .iter()
            .map(|p| p.to_broker_position().map_err(BrokerError::from))
            .collect()
    }

    async fn find_order(
        &self,
        client_order_id: &OrderId,
    ) -> Result<Option<OrderUpdate>, BrokerError> {
        let result: Result<AlpacaOrderResponse, AlpacaError> = self
            .client
            .get(&format!(
                "/v2/orders:by_client_order_id?client_order_id={client_order_id}"
            ))
            .await;

        match result {
            Ok(response) => Ok(Some(response.to_order_update()?)),
            Err(AlpacaError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        let orders: Vec<AlpacaOrderResponse> = self
            .client
            .get(&format!("/v2/orders?status=open&limit={OPEN_ORDERS_LIMIT}"))
            .await?;

        let mut open = Vec::with_capacity(orders.len());
        for order in &orders {
            match order.to_broker_order() {
                Ok(order) => open.push(order),
                Err(err) => tracing::warn!(
                    broker_order_id = %order.id,
                    order_type = %order.order_type,
                    error = %err,
                    "Skipping open order that cannot be tracked"
                ),
            }
        }
        Ok(open)
    }
}
