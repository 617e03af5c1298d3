//! HTTP adapter for the bKash tokenized checkout API.

use crate::application::token::TokenLifecycleManager;
use crate::config::GatewayConfig;
use crate::domain::payment::Amount;
use crate::domain::ports::{PaymentGateway, TokenIssuer};
use crate::domain::provider::{
    CreatedPayment, ExecutedPayment, ProviderOutcome, RefundedPayment,
};
use crate::domain::token::TokenGrant;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

const GRANT_PATH: &str = "token/grant";
const REFRESH_PATH: &str = "token/refresh";
const CREATE_PATH: &str = "create";
const EXECUTE_PATH: &str = "execute";
const REFUND_PATH: &str = "payment/refund";

const X_APP_KEY: &str = "x-app-key";
const USERNAME: &str = "username";
const PASSWORD: &str = "password";

#[derive(Serialize)]
struct GrantBody<'a> {
    app_key: &'a str,
    app_secret: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct CreateBody<'a> {
    mode: &'a str,
    #[serde(rename = "payerReference")]
    payer_reference: &'a str,
    #[serde(rename = "callbackURL")]
    callback_url: &'a str,
    amount: String,
    currency: &'a str,
    intent: &'a str,
    #[serde(rename = "agreementID")]
    agreement_id: &'a str,
    #[serde(rename = "merchantInvoiceNumber")]
    merchant_invoice_number: &'a str,
}

#[derive(Serialize)]
struct ExecuteBody<'a> {
    #[serde(rename = "paymentID")]
    payment_id: &'a str,
}

#[derive(Serialize)]
struct RefundBody<'a> {
    #[serde(rename = "paymentID")]
    payment_id: &'a str,
    #[serde(rename = "trxID")]
    trx_id: &'a str,
    amount: String,
    reason: &'a str,
}

/// Low-level client: posts fixed-shape JSON bodies and classifies the replies.
///
/// The transport status is not consulted: the provider reports logical
/// failures in the body and [`ProviderOutcome::from_body`] decides.
#[derive(Clone)]
pub struct BkashClient {
    http: reqwest::Client,
    config: Arc<GatewayConfig>,
}

impl BkashClient {
    pub fn new(config: Arc<GatewayConfig>) -> Self {
        Self::with_http(reqwest::Client::new(), config)
    }

    pub fn with_http(http: reqwest::Client, config: Arc<GatewayConfig>) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn credential_headers(&self) -> Result<HeaderMap> {
        let credentials = &self.config.credentials;
        let mut headers = Self::json_headers();
        headers.insert(USERNAME, header_value(&credentials.username)?);
        headers.insert(PASSWORD, header_value(&credentials.password)?);
        Ok(headers)
    }

    fn authorized_headers(&self, id_token: &str) -> Result<HeaderMap> {
        let mut headers = Self::json_headers();
        headers.insert(AUTHORIZATION, header_value(id_token)?);
        headers.insert(X_APP_KEY, header_value(&self.config.credentials.app_key)?);
        Ok(headers)
    }

    async fn post<B, T>(&self, path: &str, headers: HeaderMap, body: &B) -> Result<ProviderOutcome<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.endpoint(path)?;
        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(body)
            .send()
            .await?;
        let transport_status = response.status();
        let body: Value = response.json().await?;

        let outcome = ProviderOutcome::from_body(body)?;
        if let ProviderOutcome::Rejected(rejection) = &outcome {
            tracing::warn!(
                path,
                %transport_status,
                status_code = %rejection.status_code,
                status_message = %rejection.status_message,
                "provider rejected request"
            );
        }
        Ok(outcome)
    }
}

fn header_value(raw: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(raw).map_err(|_| {
        PaymentError::ValidationError(
            "credential contains characters not allowed in a header".to_string(),
        )
    })
}

#[async_trait]
impl TokenIssuer for BkashClient {
    #[tracing::instrument(name = "Grant Token", skip(self))]
    async fn grant(&self) -> Result<ProviderOutcome<TokenGrant>> {
        let credentials = &self.config.credentials;
        let body = GrantBody {
            app_key: &credentials.app_key,
            app_secret: &credentials.app_secret,
        };
        self.post(GRANT_PATH, self.credential_headers()?, &body).await
    }

    #[tracing::instrument(name = "Refresh Token", skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<ProviderOutcome<TokenGrant>> {
        let body = RefreshBody { refresh_token };
        self.post(REFRESH_PATH, self.credential_headers()?, &body).await
    }
}

/// Payment gateway backed by the provider API, authorizing every call with a
/// token from the lifecycle manager.
#[derive(Clone)]
pub struct BkashGateway {
    client: BkashClient,
    tokens: Arc<TokenLifecycleManager>,
}

impl BkashGateway {
    pub fn new(client: BkashClient, tokens: Arc<TokenLifecycleManager>) -> Self {
        Self { client, tokens }
    }
}

#[async_trait]
impl PaymentGateway for BkashGateway {
    #[tracing::instrument(
        name = "Create Payment",
        skip(self, amount, callback_url),
        fields(amount = %amount)
    )]
    async fn create_payment(
        &self,
        amount: Amount,
        invoice_number: &str,
        callback_url: &str,
    ) -> Result<ProviderOutcome<CreatedPayment>> {
        let token = self.tokens.get_valid_token().await?;
        let config = self.client.config();
        let body = CreateBody {
            mode: &config.mode,
            payer_reference: &config.payer_reference,
            callback_url,
            amount: amount.to_string(),
            currency: &config.currency,
            intent: &config.intent,
            agreement_id: &config.agreement_id,
            merchant_invoice_number: invoice_number,
        };
        let headers = self.client.authorized_headers(&token.id_token)?;
        self.client.post(CREATE_PATH, headers, &body).await
    }

    #[tracing::instrument(name = "Execute Payment", skip(self))]
    async fn execute_payment(&self, payment_id: &str) -> Result<ProviderOutcome<ExecutedPayment>> {
        let token = self.tokens.get_valid_token().await?;
        let body = ExecuteBody { payment_id };
        let headers = self.client.authorized_headers(&token.id_token)?;
        self.client.post(EXECUTE_PATH, headers, &body).await
    }

    #[tracing::instrument(name = "Refund Payment", skip(self, amount, reason), fields(amount = %amount))]
    async fn refund_payment(
        &self,
        payment_id: &str,
        trx_id: &str,
        amount: Amount,
        reason: &str,
    ) -> Result<ProviderOutcome<RefundedPayment>> {
        let token = self.tokens.get_valid_token().await?;
        let body = RefundBody {
            payment_id,
            trx_id,
            amount: amount.to_string(),
            reason,
        };
        let headers = self.client.authorized_headers(&token.id_token)?;
        self.client.post(REFUND_PATH, headers, &body).await
    }
}
