//! MoMo capture-wallet gateway.

use crate::{signature, unique_ms, Checkout, Error, Method, Order, PaymentGateway, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_aux::prelude::deserialize_string_from_number;
use serde_json::Value;
use std::{fmt, time::Duration};
use tracing::{debug, warn};

pub const REQUEST_TYPE: &str = "captureWallet";
pub const LANG: &str = "vi";

/// wallet limits, VND
pub const MIN_AMOUNT: u64 = 1_000;
pub const MAX_AMOUNT: u64 = 50_000_000;

#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    /// create endpoint, e.g. https://test-payment.momo.vn/v2/gateway/api/create
    pub endpoint: String,
    pub redirect_url: String,
    pub ipn_url: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("partner_code", &self.partner_code)
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("endpoint", &self.endpoint)
            .field("redirect_url", &self.redirect_url)
            .field("ipn_url", &self.ipn_url)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub partner_code: String,
    pub access_key: String,
    pub request_id: String,
    pub amount: u64,
    pub order_id: String,
    pub order_info: String,
    pub redirect_url: String,
    pub ipn_url: String,
    pub request_type: String,
    pub extra_data: String,
    pub lang: String,
    pub signature: String,
}

impl CreateRequest {
    pub fn signing_fields(&self) -> [(&'static str, String); 10] {
        [
            ("accessKey", self.access_key.clone()),
            ("amount", self.amount.to_string()),
            ("extraData", self.extra_data.clone()),
            ("ipnUrl", self.ipn_url.clone()),
            ("orderId", self.order_id.clone()),
            ("orderInfo", self.order_info.clone()),
            ("partnerCode", self.partner_code.clone()),
            ("redirectUrl", self.redirect_url.clone()),
            ("requestId", self.request_id.clone()),
            ("requestType", self.request_type.clone()),
        ]
    }
}

/// IPN body. Numbers are kept in their textual form so the signature is
/// computed over exactly what was received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Notification {
    pub partner_code: String,
    pub access_key: String,
    pub request_id: String,
    #[serde(deserialize_with = "deserialize_string_from_number")]
    pub amount: String,
    pub order_id: String,
    pub order_info: String,
    pub order_type: String,
    #[serde(deserialize_with = "deserialize_string_from_number")]
    pub trans_id: String,
    #[serde(deserialize_with = "deserialize_string_from_number")]
    pub result_code: String,
    pub message: String,
    pub pay_type: String,
    #[serde(deserialize_with = "deserialize_string_from_number")]
    pub response_time: String,
    pub extra_data: String,
    pub signature: String,
}

impl Notification {
    pub fn parse(payload: &Value) -> Result<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|e| Error::MalformedNotification(e.to_string()))
    }

    /// Required fields must be present before any signature work.
    pub fn validate(&self) -> Result<()> {
        let missing = [
            ("partnerCode", &self.partner_code),
            ("orderId", &self.order_id),
            ("requestId", &self.request_id),
            ("amount", &self.amount),
            ("transId", &self.trans_id),
            ("resultCode", &self.result_code),
            ("signature", &self.signature),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect::<Vec<_>>();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MalformedNotification(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }

    pub fn signing_fields(&self, access_key: &str) -> [(&'static str, String); 13] {
        [
            ("accessKey", access_key.to_owned()),
            ("amount", self.amount.clone()),
            ("extraData", self.extra_data.clone()),
            ("message", self.message.clone()),
            ("orderId", self.order_id.clone()),
            ("orderInfo", self.order_info.clone()),
            ("orderType", self.order_type.clone()),
            ("partnerCode", self.partner_code.clone()),
            ("payType", self.pay_type.clone()),
            ("requestId", self.request_id.clone()),
            ("responseTime", self.response_time.clone()),
            ("resultCode", self.result_code.clone()),
            ("transId", self.trans_id.clone()),
        ]
    }

    pub fn amount_value(&self) -> Result<u64> {
        self.amount
            .trim()
            .parse()
            .map_err(|_| Error::MalformedNotification(format!("invalid amount `{}`", self.amount)))
    }

    /// responseTime in seconds
    pub fn response_time_secs(&self) -> Option<i64> {
        self.response_time.trim().parse::<i64>().ok().map(|ms| ms / 1000)
    }

    /// Ledger status for the MoMo result code.
    pub fn status(&self) -> &'static str {
        result_status(&self.result_code)
    }
}

pub fn result_status(result_code: &str) -> &'static str {
    match result_code.trim() {
        "0" => "paid",
        // initiated, processing, authorized awaiting capture
        "1000" | "7000" | "7002" | "9000" => "pending",
        _ => "failed",
    }
}

#[derive(Debug, Clone)]
pub struct Momo {
    credentials: Credentials,
    client: Client,
}

impl Momo {
    pub fn new(credentials: Credentials, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(Self {
            credentials,
            client,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Build and sign a creation request. Every call gets a new request id.
    pub fn build_request(&self, order: &Order) -> Result<CreateRequest> {
        if order.amount < MIN_AMOUNT || order.amount > MAX_AMOUNT {
            return Err(Error::Invalid(format!(
                "amount must be between {} and {} VND",
                MIN_AMOUNT, MAX_AMOUNT
            )));
        }
        let c = &self.credentials;
        let mut req = CreateRequest {
            partner_code: c.partner_code.clone(),
            access_key: c.access_key.clone(),
            request_id: format!("{}-{}", c.partner_code, unique_ms()),
            amount: order.amount,
            order_id: order.order_id.clone(),
            order_info: order.order_info.clone(),
            redirect_url: c.redirect_url.clone(),
            ipn_url: c.ipn_url.clone(),
            request_type: REQUEST_TYPE.to_owned(),
            extra_data: String::new(),
            lang: LANG.to_owned(),
            signature: String::new(),
        };
        req.signature = signature::sign(&req.signing_fields(), &c.secret_key);
        Ok(req)
    }

    /// POST a signed request and return the parsed response body.
    pub async fn send(&self, req: &CreateRequest) -> Result<Value> {
        debug!(
            order_id = req.order_id.as_str(),
            request_id = req.request_id.as_str(),
            "create momo payment"
        );
        let res = self
            .client
            .post(&self.credentials.endpoint)
            .json(req)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                order_id = req.order_id.as_str(),
                "momo create failed"
            );
            return Err(Error::GatewayUnavailable(format!("http status {}", status)));
        }
        Ok(res.json::<Value>().await?)
    }

    pub fn verify_notification(&self, n: &Notification) -> bool {
        let access_key = if n.access_key.is_empty() {
            self.credentials.access_key.as_str()
        } else {
            n.access_key.as_str()
        };
        signature::verify(
            &n.signing_fields(access_key),
            &self.credentials.secret_key,
            &n.signature,
        )
    }
}

#[async_trait::async_trait]
impl PaymentGateway for Momo {
    fn method(&self) -> Method {
        Method::Momo
    }

    async fn create(&self, order: &Order) -> Result<Checkout> {
        let req = self.build_request(order)?;
        let response = self.send(&req).await?;
        let result_code = response["resultCode"].as_i64().unwrap_or(-1);
        let message = response["message"].as_str().unwrap_or_default().to_owned();
        if result_code != 0 {
            return Err(Error::Rejected {
                code: result_code,
                message,
            });
        }
        Ok(Checkout::Redirect {
            pay_url: response["payUrl"].as_str().map(ToOwned::to_owned),
            request_id: req.request_id,
            result_code,
            message,
            response,
        })
    }

    fn verify_callback(&self, payload: &Value) -> Result<bool> {
        let n = Notification::parse(payload)?;
        n.validate()?;
        Ok(self.verify_notification(&n))
    }
}
