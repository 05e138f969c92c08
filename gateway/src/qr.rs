//! Static transfer QR codes. Neither variant has a notification channel,
//! donations made through them are settled by reconciliation.

use crate::{Checkout, Error, Method, Order, PaymentConfig, PaymentGateway, Result};
use url::form_urlencoded::byte_serialize;

pub const DEFAULT_HOST: &str = "img.vietqr.io";
pub const DEFAULT_TEMPLATE: &str = "qr_only";

fn encode(s: &str) -> String {
    // form encoding writes spaces as `+`, a literal `+` is already `%2B`
    byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Image url of a bank transfer QR. `None` without bank or account.
pub fn build(
    host: &str,
    bank: Option<&str>,
    account: Option<&str>,
    account_name: Option<&str>,
    amount: Option<u64>,
    memo: Option<&str>,
    template: Option<&str>,
) -> Option<String> {
    let bank = non_blank(bank)?;
    let account = non_blank(account)?;
    let template = non_blank(template).unwrap_or(DEFAULT_TEMPLATE);

    let mut query = vec![];
    if let Some(name) = non_blank(account_name) {
        query.push(format!("accountName={}", encode(name)));
    }
    if let Some(amount) = amount.filter(|a| *a > 0) {
        query.push(format!("amount={}", amount));
    }
    if let Some(memo) = non_blank(memo) {
        query.push(format!("addInfo={}", encode(memo)));
    }

    let mut url = format!(
        "https://{}/image/{}-{}-{}.png",
        host,
        encode(bank),
        encode(account),
        encode(template)
    );
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }
    Some(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VietQr {
    host: String,
    template: String,
    bank: Option<String>,
    account: Option<String>,
    account_name: Option<String>,
    memo: Option<String>,
}

impl VietQr {
    pub fn new(
        host: impl Into<String>,
        template: impl Into<String>,
        payment: &PaymentConfig,
    ) -> Self {
        Self {
            host: host.into(),
            template: template.into(),
            bank: payment.bank.clone(),
            account: payment.account.clone(),
            account_name: payment.name.clone(),
            memo: payment.memo.clone(),
        }
    }

    pub fn url(&self, amount: Option<u64>, memo: Option<&str>) -> Option<String> {
        build(
            &self.host,
            self.bank.as_deref(),
            self.account.as_deref(),
            self.account_name.as_deref(),
            amount,
            memo,
            Some(&self.template),
        )
    }
}

#[async_trait::async_trait]
impl PaymentGateway for VietQr {
    fn method(&self) -> Method {
        Method::VietQr
    }

    async fn create(&self, order: &Order) -> Result<Checkout> {
        // the order id in the memo lets statement imports find the donation
        let memo = non_blank(self.memo.as_deref()).unwrap_or(&order.order_id);
        self.url(Some(order.amount), Some(memo))
            .map(|qr_url| Checkout::Qr { qr_url })
            .ok_or_else(|| Error::InvalidConfig("vietqr needs bank and account".to_owned()))
    }
}

/// Operator uploaded QR image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomQr {
    qr_url: Option<String>,
}

impl CustomQr {
    pub fn new(payment: &PaymentConfig) -> Self {
        Self {
            qr_url: payment.qr_url.clone(),
        }
    }
}

#[async_trait::async_trait]
impl PaymentGateway for CustomQr {
    fn method(&self) -> Method {
        Method::CustomQr
    }

    async fn create(&self, _order: &Order) -> Result<Checkout> {
        non_blank(self.qr_url.as_deref())
            .map(|url| Checkout::Qr {
                qr_url: url.to_owned(),
            })
            .ok_or_else(|| Error::InvalidConfig("custom qr needs qr_url".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_url() {
        assert_eq!(
            build(
                DEFAULT_HOST,
                Some("970436"),
                Some("0011001234567"),
                Some("QUY TU THIEN"),
                Some(200_000),
                Some("Ung ho mien Trung"),
                None,
            )
            .unwrap(),
            "https://img.vietqr.io/image/970436-0011001234567-qr_only.png\
             ?accountName=QUY%20TU%20THIEN&amount=200000&addInfo=Ung%20ho%20mien%20Trung"
        );
    }

    #[test]
    fn build_url_optional_parts() {
        assert_eq!(
            build(
                DEFAULT_HOST,
                Some("VCB"),
                Some("123"),
                None,
                Some(0),
                None,
                Some("compact2"),
            )
            .unwrap(),
            "https://img.vietqr.io/image/VCB-123-compact2.png"
        );
        let url = build(
            DEFAULT_HOST,
            Some("VCB"),
            Some("123"),
            Some("Đức & Co"),
            None,
            Some("a+b"),
            None,
        )
        .unwrap();
        assert!(url.ends_with("?accountName=%C4%90%E1%BB%A9c%20%26%20Co&addInfo=a%2Bb"));
    }

    #[test]
    fn build_requires_bank_and_account() {
        assert!(build(DEFAULT_HOST, None, Some("1"), None, None, None, None).is_none());
        assert!(build(DEFAULT_HOST, Some("VCB"), Some("  "), None, None, None, None).is_none());
    }

    #[tokio::test]
    async fn vietqr_create() -> Result<()> {
        let payment: PaymentConfig = serde_json::from_value(json!({
            "method": "vietqr",
            "bank": "970436",
            "account": "0011",
            "name": "QUY",
        }))?;
        let gateway = VietQr::new(DEFAULT_HOST, DEFAULT_TEMPLATE, &payment);
        let order = Order {
            order_id: "DN1".to_owned(),
            amount: 10_000,
            order_info: "info".to_owned(),
        };
        let checkout = gateway.create(&order).await?;
        assert_eq!(
            checkout,
            Checkout::Qr {
                qr_url: "https://img.vietqr.io/image/970436-0011-qr_only.png\
                         ?accountName=QUY&amount=10000&addInfo=DN1"
                    .to_owned()
            }
        );
        assert!(matches!(
            gateway.verify_callback(&json!({})),
            Err(Error::Unsupported("vietqr", _))
        ));

        let gateway = VietQr::new(DEFAULT_HOST, DEFAULT_TEMPLATE, &PaymentConfig::default());
        assert!(matches!(gateway.create(&order).await, Err(Error::InvalidConfig(_))));
        Ok(())
    }

    #[tokio::test]
    async fn custom_qr_create() -> Result<()> {
        let order = Order {
            order_id: "DN1".to_owned(),
            amount: 10_000,
            order_info: "info".to_owned(),
        };
        let mut payment = PaymentConfig {
            method: "custom_qr".to_owned(),
            ..Default::default()
        };
        assert!(CustomQr::new(&payment).create(&order).await.is_err());
        payment.qr_url = Some("https://cdn.example/qr.png".to_owned());
        assert_eq!(
            CustomQr::new(&payment).create(&order).await?,
            Checkout::Qr {
                qr_url: "https://cdn.example/qr.png".to_owned()
            }
        );
        Ok(())
    }
}
