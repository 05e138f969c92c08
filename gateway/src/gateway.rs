use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

/// Payment method configured on a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Momo,
    #[serde(rename = "vietqr")]
    VietQr,
    CustomQr,
}

impl Method {
    pub fn code(&self) -> &'static str {
        match self {
            Method::Momo => "momo",
            Method::VietQr => "vietqr",
            Method::CustomQr => "custom_qr",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Method {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "momo" => Ok(Method::Momo),
            "vietqr" | "bank" => Ok(Method::VietQr),
            "custom_qr" | "custom" | "image" => Ok(Method::CustomQr),
            other => Err(Error::InvalidConfig(format!("unknown payment method `{}`", other))),
        }
    }
}

/// Per campaign `payment` object.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PaymentConfig {
    pub method: String,
    pub bank: Option<String>,
    pub account: Option<String>,
    pub name: Option<String>,
    pub memo: Option<String>,
    pub qr_url: Option<String>,
}

impl PaymentConfig {
    pub fn method(&self) -> Result<Method> {
        self.method.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_id: String,
    /// VND
    pub amount: u64,
    pub order_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Checkout {
    /// wallet payment page
    Redirect {
        pay_url: Option<String>,
        request_id: String,
        result_code: i64,
        message: String,
        response: Value,
    },
    /// static transfer image, settled out of band
    Qr { qr_url: String },
}

impl Checkout {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Checkout::Redirect { request_id, .. } => Some(request_id),
            Checkout::Qr { .. } => None,
        }
    }
}

/// the payment trait for multiple gateways
#[async_trait::async_trait]
pub trait PaymentGateway {
    fn method(&self) -> Method;

    async fn create(&self, order: &Order) -> Result<Checkout>;

    /// Check an inbound notification. Never mutates anything.
    fn verify_callback(&self, _payload: &Value) -> Result<bool> {
        Err(Error::Unsupported(self.method().code(), "callbacks"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_method() -> Result<()> {
        assert_eq!("MoMo".parse::<Method>()?, Method::Momo);
        assert_eq!(" vietqr ".parse::<Method>()?, Method::VietQr);
        assert_eq!("bank".parse::<Method>()?, Method::VietQr);
        assert_eq!("custom_qr".parse::<Method>()?, Method::CustomQr);
        assert!("paypal".parse::<Method>().is_err());
        assert_eq!(Method::CustomQr.to_string(), "custom_qr");
        Ok(())
    }

    #[test]
    fn payment_config_from_json() -> Result<()> {
        let cfg: PaymentConfig = serde_json::from_str(
            r#"{"method":"vietqr","bank":"970436","account":"0011","name":"QUY"}"#,
        )?;
        assert_eq!(cfg.method()?, Method::VietQr);
        assert_eq!(cfg.memo, None);
        Ok(())
    }
}
