use crate::{
    aggregator::Aggregator,
    ledger::{gateway_code, Ledger, NewDonation, Recorded, Transaction},
    setting::Qr,
    Error, Result,
};
use chrono::FixedOffset;
use entity::{campaign, donation};
use payment_gateway::{
    momo::Notification, Checkout, CustomQr, Error as GatewayError, Method, Momo, Order,
    PaymentConfig, PaymentGateway, VietQr,
};
use rand::RngCore;
use sea_orm::{DbConn, EntityTrait};
use serde::{Deserialize, Serialize};
use serde_aux::prelude::deserialize_number_from_string;
use serde_json::Value;
use tracing::{info, warn};

/// `DN` + unique millisecond + random suffix, also the MoMo orderId
pub fn new_order_id() -> String {
    let mut suffix = [0u8; 3];
    rand::thread_rng().fill_bytes(&mut suffix);
    format!("DN{}{}", payment_gateway::unique_ms(), hex::encode(suffix))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DonateReq {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub amount: i64,
    #[serde(default)]
    pub payer_id: Option<String>,
    #[serde(default)]
    pub order_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Donated {
    pub donation: donation::Model,
    pub checkout: Checkout,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcileReq {
    /// bank reference, the recorded transaction or `manual-{order_id}` if empty
    pub transaction_id: Option<String>,
    /// default paid
    pub status: Option<String>,
    pub paid_at: Option<i64>,
    pub message: Option<String>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

/// Donation service
pub struct Service {
    conn: DbConn,
    ledger: Ledger,
    aggregator: Aggregator,
    momo: Option<Momo>,
    qr: Qr,
}

impl Service {
    pub fn new(conn: DbConn, momo: Option<Momo>, qr: Qr, offset: FixedOffset) -> Self {
        Self {
            ledger: Ledger::new(conn.clone()),
            aggregator: Aggregator::new(conn.clone(), offset),
            conn,
            momo,
            qr,
        }
    }

    pub fn db(&self) -> &DbConn {
        &self.conn
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn momo(&self) -> Option<&Momo> {
        self.momo.as_ref()
    }

    pub async fn get_campaign(&self, id: i32) -> Result<campaign::Model> {
        campaign::Entity::find_by_id(id)
            .one(self.db())
            .await?
            .ok_or(Error::NotFound("campaign"))
    }

    /// Payment gateway for the campaign's configured method, MoMo if unset.
    pub fn gateway_for(
        &self,
        campaign: &campaign::Model,
    ) -> Result<Box<dyn PaymentGateway + Send + Sync>> {
        let payment = match &campaign.payment {
            Some(v) => serde_json::from_value::<PaymentConfig>(v.clone())?,
            None => PaymentConfig::default(),
        };
        let method = if payment.method.trim().is_empty() {
            Method::Momo
        } else {
            payment.method()?
        };
        let gateway: Box<dyn PaymentGateway + Send + Sync> = match method {
            Method::Momo => Box::new(self.momo.clone().ok_or_else(|| {
                GatewayError::InvalidConfig("momo is not configured".to_owned())
            })?),
            Method::VietQr => Box::new(VietQr::new(&self.qr.host, &self.qr.template, &payment)),
            Method::CustomQr => Box::new(CustomQr::new(&payment)),
        };
        Ok(gateway)
    }

    /// Ask the gateway for a checkout, then open a pending ledger record.
    pub async fn donate(&self, campaign_id: i32, req: DonateReq) -> Result<Donated> {
        if req.amount <= 0 {
            return Err(Error::InvalidParam("amount must be positive".to_owned()));
        }
        let campaign = self.get_campaign(campaign_id).await?;
        let gateway = self.gateway_for(&campaign)?;
        let order = Order {
            order_id: new_order_id(),
            amount: req.amount as u64,
            order_info: non_blank(req.order_info)
                .unwrap_or_else(|| format!("Donate to {}", campaign.title)),
        };

        // no lock or transaction is held across the gateway call
        let checkout = gateway.create(&order).await?;

        let donation = self
            .ledger
            .open(NewDonation {
                order_id: order.order_id.clone(),
                campaign_id: campaign.id,
                payer_id: non_blank(req.payer_id),
                amount: req.amount,
                gateway: gateway_code(gateway.method()),
                request_id: checkout.request_id().map(ToOwned::to_owned),
                message: order.order_info.clone(),
            })
            .await?;
        info!(
            order_id = donation.order_id.as_str(),
            campaign_id = campaign.id,
            amount = donation.amount,
            method = gateway.method().code(),
            "donation opened"
        );
        Ok(Donated { donation, checkout })
    }

    /// Verify and apply a MoMo IPN. The ledger is untouched unless the
    /// signature matches.
    pub async fn handle_momo_ipn(&self, payload: &Value) -> Result<Recorded> {
        let momo = self.momo.as_ref().ok_or_else(|| {
            Error::Gateway(GatewayError::InvalidConfig(
                "momo is not configured".to_owned(),
            ))
        })?;
        let n = Notification::parse(payload)?;
        n.validate()?;
        if !momo.verify_notification(&n) {
            warn!(
                order_id = n.order_id.as_str(),
                partner_code = n.partner_code.as_str(),
                request_id = n.request_id.as_str(),
                "suspicious momo ipn, signature mismatch"
            );
            return Err(GatewayError::InvalidSignature.into());
        }
        if n.partner_code != momo.credentials().partner_code {
            warn!(
                order_id = n.order_id.as_str(),
                partner_code = n.partner_code.as_str(),
                "momo ipn for another partner"
            );
            return Err(Error::InvalidPayment("partner code mismatch".to_owned()));
        }

        let amount = i64::try_from(n.amount_value()?)
            .map_err(|_| Error::InvalidPayment("amount out of range".to_owned()))?;
        let recorded = self
            .ledger
            .record(Transaction {
                gateway: gateway_code(Method::Momo),
                gateway_transaction_id: Some(n.trans_id.clone()),
                order_id: n.order_id.clone(),
                campaign_id: None,
                payer_id: None,
                amount,
                status: n.status().to_owned(),
                provider_status: n.result_code.clone(),
                message: n.message.clone(),
                paid_at: n.response_time_secs(),
            })
            .await?;
        info!(
            order_id = n.order_id.as_str(),
            trans_id = n.trans_id.as_str(),
            result_code = n.result_code.as_str(),
            duplicate = recorded.is_duplicate(),
            "momo ipn"
        );
        Ok(recorded)
    }

    /// Operator settlement of a donation, the only path for QR methods.
    pub async fn reconcile(&self, order_id: &str, req: ReconcileReq) -> Result<Recorded> {
        let donation = self
            .ledger
            .find_by_order(order_id)
            .await?
            .ok_or(Error::NotFound("donation"))?;
        let transaction_id = non_blank(req.transaction_id)
            .or_else(|| donation.gateway_transaction_id.clone())
            .unwrap_or_else(|| format!("manual-{}", order_id));
        let status = non_blank(req.status).unwrap_or_else(|| "paid".to_owned());

        let recorded = self
            .ledger
            .record(Transaction {
                gateway: donation.gateway_code,
                gateway_transaction_id: Some(transaction_id),
                order_id: donation.order_id.clone(),
                campaign_id: Some(donation.campaign_id),
                payer_id: donation.payer_id.clone(),
                amount: donation.amount,
                provider_status: status.clone(),
                status,
                message: non_blank(req.message).unwrap_or_else(|| "reconciled".to_owned()),
                paid_at: req.paid_at,
            })
            .await?;
        info!(
            order_id,
            status = recorded.model().status.as_str(),
            duplicate = recorded.is_duplicate(),
            "donation reconciled"
        );
        Ok(recorded)
    }
}
