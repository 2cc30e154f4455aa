//! PayHero STK push client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::error::GatewayError;
use crate::services::payment::{
    PaymentGateway, PaymentStatusReport, ProviderPaymentState, StkPushAccepted, StkPushRequest,
};

/// Default PayHero payments endpoint.
pub const DEFAULT_BASE_URL: &str = "https://backend.payhero.co.ke/api/v2/payments";

/// Default PayHero channel.
pub const DEFAULT_CHANNEL_ID: u32 = 1114;

/// Connection settings for PayHero.
#[derive(Clone)]
pub struct PayHeroConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub channel_id: u32,
    /// URL PayHero posts payment results to.
    pub callback_url: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for PayHeroConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayHeroConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("channel_id", &self.channel_id)
            .field("callback_url", &self.callback_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct StkPushBody<'a> {
    amount: i64,
    phone_number: &'a str,
    channel_id: u32,
    provider: &'static str,
    external_reference: String,
    callback_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_name: Option<&'a str>,
}

/// [`PaymentGateway`] backed by the PayHero REST API.
#[derive(Debug, Clone)]
pub struct PayHeroGateway {
    config: PayHeroConfig,
    client: Client,
}

impl PayHeroGateway {
    /// Creates a client with the configured request timeout.
    pub fn new(config: PayHeroConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    fn body<'a>(&'a self, request: &'a StkPushRequest) -> StkPushBody<'a> {
        StkPushBody {
            amount: request.amount_kes,
            phone_number: &request.phone,
            channel_id: self.config.channel_id,
            provider: "m-pesa",
            external_reference: request.order_id.to_string(),
            callback_url: &self.config.callback_url,
            customer_name: request.customer_name.as_deref(),
        }
    }

    fn status_url(&self, reference: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), reference)
    }

    /// Sends a request and returns the decoded body of a successful response.
    ///
    /// Failures are classified by HTTP status; their bodies are read only for
    /// a message and may be anything, including empty.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<serde_json::Value, GatewayError> {
        let response = request
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transient(format!("unreadable response ({status}): {e}")))?;

        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
            return Err(classify_status(status, &body));
        }

        serde_json::from_str(&text)
            .map_err(|e| GatewayError::Transient(format!("malformed response ({status}): {e}")))
    }
}

#[async_trait]
impl PaymentGateway for PayHeroGateway {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id, amount_kes = request.amount_kes))]
    async fn initiate(&self, request: StkPushRequest) -> Result<StkPushAccepted, GatewayError> {
        let body = self.body(&request);
        let response = self
            .send(self.client.post(&self.config.base_url).json(&body))
            .await?;

        if response.get("success").and_then(|v| v.as_bool()) == Some(false) {
            return Err(GatewayError::Declined(provider_message(&response)));
        }

        let reference = response
            .get("reference")
            .or_else(|| response.get("CheckoutRequestID"))
            .and_then(|v| v.as_str())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| GatewayError::Declined("provider returned no reference".to_string()))?;

        tracing::debug!(reference, "stk push accepted");
        Ok(StkPushAccepted {
            reference: reference.to_string(),
            message: response
                .get("message")
                .and_then(|v| v.as_str())
                .map(String::from),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn check_status(&self, reference: &str) -> Result<PaymentStatusReport, GatewayError> {
        let raw = self
            .send(self.client.get(self.status_url(reference)))
            .await?;

        let state = raw
            .get("status")
            .and_then(|v| v.as_str())
            .map(ProviderPaymentState::from_provider_status)
            .unwrap_or(ProviderPaymentState::Pending);

        Ok(PaymentStatusReport { state, raw })
    }
}

fn classify_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Transient(format!("request timed out: {err}"))
    } else {
        GatewayError::Transient(format!("request failed: {err}"))
    }
}

/// Maps a non-success HTTP status to a gateway error.
fn classify_status(status: StatusCode, body: &serde_json::Value) -> GatewayError {
    let message = provider_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            GatewayError::Transient(message)
        }
        s if s.is_server_error() => GatewayError::Transient(message),
        _ => GatewayError::Declined(message),
    }
}

fn provider_message(body: &serde_json::Value) -> String {
    ["message", "error_message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .unwrap_or("Payment initiation failed")
        .to_string()
}
