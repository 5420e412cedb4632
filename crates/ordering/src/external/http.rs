use std::time::Duration;

use async_trait::async_trait;
use common::{CustomerId, MenuId, Money, OrderId};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

use super::{CustomerDirectory, ExternalError, MenuPriceLookup, PointsLedger};

/// Base URLs and timeouts of the peer services.
#[derive(Debug, Clone)]
pub struct ExternalConfig {
    pub store_service_url: String,
    pub customer_service_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl ExternalConfig {
    /// Builds the shared HTTP client.
    pub fn build_client(&self) -> Result<Client, ExternalError> {
        Ok(Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.read_timeout)
            .build()?)
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

async fn check_status(response: Response) -> Result<Response, ExternalError> {
    let status = response.status();
    let url = response.url().to_string();
    match status {
        s if s.is_success() => Ok(response),
        StatusCode::NOT_FOUND => Err(ExternalError::NotFound(url)),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            let body = response.text().await.unwrap_or_default();
            Err(ExternalError::Rejected(if body.is_empty() {
                format!("{url} answered {}", status.as_u16())
            } else {
                body
            }))
        }
        _ => Err(ExternalError::Status {
            url,
            status: status.as_u16(),
        }),
    }
}

/// Store service client for menu prices.
#[derive(Clone)]
pub struct HttpMenuPriceClient {
    client: Client,
    base_url: String,
}

impl HttpMenuPriceClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl MenuPriceLookup for HttpMenuPriceClient {
    #[tracing::instrument(skip(self))]
    async fn menu_price(&self, menu_id: MenuId) -> Result<Money, ExternalError> {
        let url = format!("{}/stores/menus/{}/price", self.base_url, menu_id);
        let response = check_status(self.client.get(&url).send().await?).await?;
        let price: Option<i64> = response.json().await?;
        let price = price.ok_or_else(|| ExternalError::NotFound(format!("price of {menu_id}")))?;

        debug!(%menu_id, price, "Menu price retrieved");
        Ok(Money::new(price))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReservePointsBody {
    order_id: OrderId,
    points: i64,
}

/// Customer service client: existence checks, cart invalidation and points.
#[derive(Clone)]
pub struct HttpCustomerClient {
    client: Client,
    base_url: String,
}

impl HttpCustomerClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl CustomerDirectory for HttpCustomerClient {
    #[tracing::instrument(skip(self))]
    async fn customer_exists(&self, customer_id: CustomerId) -> Result<bool, ExternalError> {
        let url = format!("{}/customers/{}/exists", self.base_url, customer_id);
        let response = match check_status(self.client.get(&url).send().await?).await {
            Ok(response) => response,
            Err(ExternalError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let exists: Option<bool> = response.json().await?;
        Ok(exists.unwrap_or(false))
    }

    async fn invalidate_cart(&self, customer_id: CustomerId) -> Result<(), ExternalError> {
        let url = format!("{}/customers/{}/cart/invalidate", self.base_url, customer_id);
        check_status(self.client.get(&url).send().await?).await?;
        info!(%customer_id, "Customer cart invalidated");
        Ok(())
    }
}

#[async_trait]
impl PointsLedger for HttpCustomerClient {
    #[tracing::instrument(skip(self), fields(points = points.amount()))]
    async fn reserve(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
        points: Money,
    ) -> Result<(), ExternalError> {
        let url = format!("{}/customers/{}/points/reservations", self.base_url, customer_id);
        let body = ReservePointsBody {
            order_id,
            points: points.amount(),
        };
        check_status(self.client.post(&url).json(&body).send().await?).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn release(
        &self,
        customer_id: CustomerId,
        order_id: OrderId,
    ) -> Result<(), ExternalError> {
        let url = format!(
            "{}/customers/{}/points/reservations/{}",
            self.base_url, customer_id, order_id
        );
        match check_status(self.client.delete(&url).send().await?).await {
            Ok(_) | Err(ExternalError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
