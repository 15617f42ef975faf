use anyhow::{anyhow, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq)]
pub struct CustomerDetails {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentIntent {
    #[serde(rename = "id")]
    pub intent_id: String,
    pub client_secret: String,
}

/// Hosted payment platform. Card handling and retries live on its side.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Returns the provider's customer reference.
    async fn create_customer(&self, customer: &CustomerDetails) -> Result<String>;

    /// `amount_minor` is in the smallest currency unit.
    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        customer_ref: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<PaymentIntent>;
}

pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    currency: String,
}

#[derive(Deserialize)]
struct CustomerResponse {
    id: String,
}

impl StripeClient {
    pub fn new(api_base: &str, secret_key: String, currency: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key,
            currency,
        })
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(&self, path: &str, form: &[(String, String)]) -> Result<T> {
        let response = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Stripe {} returned {}: {}", path, status, body));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_customer(&self, customer: &CustomerDetails) -> Result<String> {
        let mut form = vec![("email".to_string(), customer.email.clone())];
        if let Some(name) = &customer.name {
            form.push(("name".to_string(), name.clone()));
        }
        if let Some(phone) = &customer.phone {
            form.push(("phone".to_string(), phone.clone()));
        }

        let created: CustomerResponse = self.post_form("/v1/customers", &form).await?;
        Ok(created.id)
    }

    async fn create_payment_intent(
        &self,
        amount_minor: i64,
        customer_ref: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<PaymentIntent> {
        let mut form = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), self.currency.clone()),
            ("customer".to_string(), customer_ref.to_string()),
            ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ];
        form.extend(
            metadata
                .iter()
                .map(|(key, value)| (format!("metadata[{}]", key), value.clone())),
        );

        self.post_form("/v1/payment_intents", &form).await
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp outside the tolerance window")]
    Expired,
    #[error("no signature matches the payload")]
    Mismatch,
}

/// Checks the `Stripe-Signature` header of a webhook delivery:
/// `t=<unix seconds>,v1=<hex hmac-sha256 of "<t>.<body>">`, possibly with
/// several `v1` entries while a secret is being rolled.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: String, tolerance: Duration) -> Self {
        Self { secret, tolerance }
    }

    pub fn verify(&self, payload: &[u8], header: Option<&str>, now: i64) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::MalformedHeader)?)
                }
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if signatures.is_empty() {
            return Err(SignatureError::MalformedHeader);
        }
        if now.abs_diff(timestamp) > self.tolerance.as_secs() {
            return Err(SignatureError::Expired);
        }

        for signature in signatures {
            let Ok(expected) = hex::decode(signature) else {
                continue;
            };
            let mac = self.mac_for(timestamp, payload).ok_or(SignatureError::Mismatch)?;
            if mac.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }
        Err(SignatureError::Mismatch)
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Some(mac)
    }

    #[cfg(test)]
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let mac = self.mac_for(timestamp, payload).unwrap();
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }
}

/// The parts of a provider event the reconciler needs.
#[derive(Debug, Deserialize)]
pub struct ProviderEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: ProviderEventData,
}

#[derive(Debug, Deserialize)]
pub struct ProviderEventData {
    pub object: ProviderObject,
}

#[derive(Debug, Deserialize)]
pub struct ProviderObject {
    pub id: String,
}
