//! Donation ledger. Every funding number is derived from these rows, so
//! writes are conditional and replayed notifications are absorbed.

use crate::{now, Error, Result};
use entity::donation::{self, Gateway};
use payment_gateway::Method;
use sea_orm::{
    sea_query::OnConflict, ActiveEnum, ActiveModelTrait, ActiveValue, ColumnTrait, DbConn, DbErr,
    EntityTrait, NotSet, QueryFilter, Set,
};
use std::fmt;
use tracing::{debug, info};

/// statuses counted as settled money
pub const PAID_STATUSES: [&str; 5] = ["paid", "succeeded", "success", "completed", "confirmed"];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Initiated,
    Pending,
    Paid,
    Succeeded,
    Success,
    Completed,
    Confirmed,
    Failed,
    Refunded,
    Cancelled,
    /// unknown provider status, kept verbatim
    Other(String),
}

impl Status {
    pub fn normalize(raw: &str) -> Self {
        let s = raw.trim().to_lowercase();
        match s.as_str() {
            "" | "pending" | "processing" | "waiting" => Status::Pending,
            "initiated" | "created" | "new" => Status::Initiated,
            "paid" => Status::Paid,
            "succeeded" => Status::Succeeded,
            "success" | "successful" => Status::Success,
            "completed" | "complete" => Status::Completed,
            "confirmed" => Status::Confirmed,
            "failed" | "fail" | "error" => Status::Failed,
            "refunded" | "refund" => Status::Refunded,
            "cancelled" | "canceled" | "cancel" => Status::Cancelled,
            _ => Status::Other(raw.trim().to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Initiated => "initiated",
            Status::Pending => "pending",
            Status::Paid => "paid",
            Status::Succeeded => "succeeded",
            Status::Success => "success",
            Status::Completed => "completed",
            Status::Confirmed => "confirmed",
            Status::Failed => "failed",
            Status::Refunded => "refunded",
            Status::Cancelled => "cancelled",
            Status::Other(s) => s,
        }
    }

    pub fn is_paid(&self) -> bool {
        PAID_STATUSES.contains(&self.as_str())
    }

    fn is_open(&self) -> bool {
        matches!(self, Status::Initiated | Status::Pending | Status::Other(_))
    }

    /// Paid money only leaves through a refund, a refund is final and an
    /// open state never follows a closed one.
    pub fn can_transition_to(&self, next: &Status) -> bool {
        if self == next {
            return false;
        }
        match self {
            Status::Refunded => false,
            s if s.is_paid() => *next == Status::Refunded,
            Status::Failed | Status::Cancelled => !next.is_open(),
            _ => true,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn gateway_code(method: Method) -> Gateway {
    match method {
        Method::Momo => Gateway::Momo,
        Method::VietQr => Gateway::VietQr,
        Method::CustomQr => Gateway::CustomQr,
    }
}

/// A payment attempt about to be handed to the donor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDonation {
    pub order_id: String,
    pub campaign_id: i32,
    pub payer_id: Option<String>,
    pub amount: i64,
    pub gateway: Gateway,
    pub request_id: Option<String>,
    pub message: String,
}

/// A settlement fact reported by a gateway or an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub gateway: Gateway,
    pub gateway_transaction_id: Option<String>,
    pub order_id: String,
    /// required only when the order is not in the ledger yet
    pub campaign_id: Option<i32>,
    pub payer_id: Option<String>,
    pub amount: i64,
    /// raw status, normalized on write
    pub status: String,
    pub provider_status: String,
    pub message: String,
    pub paid_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Inserted(donation::Model),
    Updated(donation::Model),
    /// already applied, nothing changed
    Duplicate(donation::Model),
}

impl Recorded {
    pub fn model(&self) -> &donation::Model {
        match self {
            Recorded::Inserted(m) | Recorded::Updated(m) | Recorded::Duplicate(m) => m,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Recorded::Duplicate(_))
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    conn: DbConn,
}

impl Ledger {
    pub fn new(conn: DbConn) -> Self {
        Self { conn }
    }

    pub fn db(&self) -> &DbConn {
        &self.conn
    }

    pub async fn get(&self, id: i32) -> Result<Option<donation::Model>> {
        Ok(donation::Entity::find_by_id(id).one(self.db()).await?)
    }

    pub async fn find_by_order(&self, order_id: &str) -> Result<Option<donation::Model>> {
        Ok(donation::Entity::find()
            .filter(donation::Column::OrderId.eq(order_id))
            .one(self.db())
            .await?)
    }

    pub async fn find_by_transaction(
        &self,
        gateway: Gateway,
        transaction_id: &str,
    ) -> Result<Option<donation::Model>> {
        Ok(donation::Entity::find()
            .filter(donation::Column::GatewayCode.eq(gateway))
            .filter(donation::Column::GatewayTransactionId.eq(transaction_id))
            .one(self.db())
            .await?)
    }

    /// Insert a pending record for a payment request.
    pub async fn open(&self, d: NewDonation) -> Result<donation::Model> {
        if d.amount <= 0 {
            return Err(Error::InvalidPayment("amount must be positive".to_owned()));
        }
        let time = now() as i64;
        let model = donation::ActiveModel {
            id: NotSet,
            order_id: Set(d.order_id),
            campaign_id: Set(d.campaign_id),
            payer_id: Set(d.payer_id),
            amount: Set(d.amount),
            gateway_code: Set(d.gateway),
            gateway_transaction_id: Set(None),
            request_id: Set(d.request_id),
            status: Set(Status::Pending.to_string()),
            provider_status: Set("".to_owned()),
            message: Set(d.message),
            created_at: Set(time),
            updated_at: Set(time),
            paid_at: Set(None),
        };
        Ok(model.insert(self.db()).await?)
    }

    /// Apply a settlement fact. Replays of the same fact are `Duplicate`.
    /// Without a transaction id only a pending record is opened.
    pub async fn record(&self, tx: Transaction) -> Result<Recorded> {
        if tx.amount < 0 {
            return Err(Error::InvalidPayment("negative amount".to_owned()));
        }
        let Some(txn_id) = tx.gateway_transaction_id.clone() else {
            // nothing to deduplicate on, it can only open a pending record
            return self.insert(&tx, &Status::Pending).await;
        };
        let status = Status::normalize(&tx.status);

        if let Some(existing) = self.find_by_transaction(tx.gateway, &txn_id).await? {
            return self.transition(existing, &tx, &status).await;
        }

        if let Some(existing) = self.find_by_order(&tx.order_id).await? {
            if existing.gateway_code != tx.gateway || existing.amount != tx.amount {
                return Err(Error::InvalidPayment(format!(
                    "order {} does not match the recorded {} {} VND",
                    tx.order_id,
                    existing.gateway_code.to_value(),
                    existing.amount
                )));
            }
            if existing.gateway_transaction_id.is_some() {
                return Err(Error::InvalidPayment(format!(
                    "order {} is settled by another transaction",
                    tx.order_id
                )));
            }
            let res = donation::Entity::update_many()
                .set(settle_model(&tx, &status, Set(Some(txn_id.clone()))))
                .filter(donation::Column::OrderId.eq(tx.order_id.as_str()))
                .filter(donation::Column::GatewayTransactionId.is_null())
                .exec(self.db())
                .await?;
            if res.rows_affected == 1 {
                info!(
                    order_id = tx.order_id.as_str(),
                    transaction_id = txn_id.as_str(),
                    status = status.as_str(),
                    "donation settled"
                );
                return Ok(Recorded::Updated(self.reload(existing.id).await?));
            }
            // a concurrent writer settled it first
            return match self.find_by_transaction(tx.gateway, &txn_id).await? {
                Some(m) if Status::normalize(&m.status) == status => Ok(Recorded::Duplicate(m)),
                Some(m) => self.transition(m, &tx, &status).await,
                None => Err(Error::InvalidPayment(format!(
                    "order {} is settled by another transaction",
                    tx.order_id
                ))),
            };
        }

        self.insert(&tx, &status).await
    }

    async fn transition(
        &self,
        existing: donation::Model,
        tx: &Transaction,
        status: &Status,
    ) -> Result<Recorded> {
        let old = Status::normalize(&existing.status);
        if !old.can_transition_to(status) {
            debug!(
                order_id = existing.order_id.as_str(),
                from = old.as_str(),
                to = status.as_str(),
                "ignore replayed or stale status"
            );
            return Ok(Recorded::Duplicate(existing));
        }
        let res = donation::Entity::update_many()
            .set(settle_model(tx, status, NotSet))
            .filter(donation::Column::Id.eq(existing.id))
            .filter(donation::Column::Status.eq(existing.status.as_str()))
            .exec(self.db())
            .await?;
        let model = self.reload(existing.id).await?;
        if res.rows_affected == 1 {
            info!(
                order_id = model.order_id.as_str(),
                from = old.as_str(),
                to = status.as_str(),
                "donation status changed"
            );
            Ok(Recorded::Updated(model))
        } else {
            Ok(Recorded::Duplicate(model))
        }
    }

    async fn insert(&self, tx: &Transaction, status: &Status) -> Result<Recorded> {
        let campaign_id = tx.campaign_id.ok_or_else(|| {
            Error::InvalidPayment(format!("unknown order {}", tx.order_id))
        })?;
        let time = now() as i64;
        let model = donation::ActiveModel {
            id: NotSet,
            order_id: Set(tx.order_id.clone()),
            campaign_id: Set(campaign_id),
            payer_id: Set(tx.payer_id.clone()),
            amount: Set(tx.amount),
            gateway_code: Set(tx.gateway),
            gateway_transaction_id: Set(tx.gateway_transaction_id.clone()),
            request_id: Set(None),
            status: Set(status.to_string()),
            provider_status: Set(tx.provider_status.clone()),
            message: Set(tx.message.clone()),
            created_at: Set(time),
            updated_at: Set(time),
            paid_at: Set(paid_at(tx, status)),
        };
        let res = donation::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    donation::Column::GatewayCode,
                    donation::Column::GatewayTransactionId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec(self.db())
            .await;
        match res {
            Ok(res) => Ok(Recorded::Inserted(self.reload(res.last_insert_id).await?)),
            Err(err) => {
                // lost an insert race, on the transaction id or on the order id
                if let Some(id) = &tx.gateway_transaction_id {
                    if let Some(m) = self.find_by_transaction(tx.gateway, id).await? {
                        return Ok(Recorded::Duplicate(m));
                    }
                }
                if let Some(m) = self.find_by_order(&tx.order_id).await? {
                    if m.gateway_transaction_id == tx.gateway_transaction_id {
                        return Ok(Recorded::Duplicate(m));
                    }
                    return Err(Error::InvalidPayment(format!(
                        "order {} is already recorded",
                        tx.order_id
                    )));
                }
                Err(match err {
                    DbErr::RecordNotInserted => Error::Str("donation not inserted"),
                    e => e.into(),
                })
            }
        }
    }

    async fn reload(&self, id: i32) -> Result<donation::Model> {
        self.get(id).await?.ok_or(Error::NotFound("donation"))
    }
}

fn paid_at(tx: &Transaction, status: &Status) -> Option<i64> {
    status
        .is_paid()
        .then(|| tx.paid_at.unwrap_or_else(|| now() as i64))
}

fn settle_model(
    tx: &Transaction,
    status: &Status,
    transaction_id: ActiveValue<Option<String>>,
) -> donation::ActiveModel {
    let paid_at = match paid_at(tx, status) {
        Some(t) => Set(Some(t)),
        None => NotSet,
    };
    donation::ActiveModel {
        gateway_transaction_id: transaction_id,
        status: Set(status.to_string()),
        provider_status: Set(tx.provider_status.clone()),
        message: Set(tx.message.clone()),
        updated_at: Set(now() as i64),
        paid_at,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        assert_eq!(Status::normalize(" PAID "), Status::Paid);
        assert_eq!(Status::normalize("Canceled"), Status::Cancelled);
        assert_eq!(Status::normalize("processing"), Status::Pending);
        assert_eq!(Status::normalize("refund"), Status::Refunded);
        assert_eq!(Status::normalize("error"), Status::Failed);
        assert_eq!(Status::normalize(""), Status::Pending);
        assert_eq!(
            Status::normalize(" On-Hold "),
            Status::Other("On-Hold".to_owned())
        );
        assert_eq!(Status::Other("On-Hold".to_owned()).as_str(), "On-Hold");
    }

    #[test]
    fn paid_statuses() {
        for s in PAID_STATUSES {
            assert!(Status::normalize(s).is_paid(), "{}", s);
            assert!(Status::normalize(&s.to_uppercase()).is_paid(), "{}", s);
        }
        assert!(Status::normalize("successful").is_paid());
        assert!(!Status::Pending.is_paid());
        assert!(!Status::Refunded.is_paid());
        assert!(!Status::Other("paid-ish".to_owned()).is_paid());
    }

    #[test]
    fn transitions() {
        assert!(Status::Pending.can_transition_to(&Status::Paid));
        assert!(Status::Pending.can_transition_to(&Status::Failed));
        assert!(Status::Paid.can_transition_to(&Status::Refunded));
        assert!(Status::Failed.can_transition_to(&Status::Paid));

        assert!(!Status::Paid.can_transition_to(&Status::Paid));
        assert!(!Status::Paid.can_transition_to(&Status::Pending));
        assert!(!Status::Success.can_transition_to(&Status::Failed));
        assert!(!Status::Refunded.can_transition_to(&Status::Paid));
        assert!(!Status::Failed.can_transition_to(&Status::Pending));
    }

    #[test]
    fn gateway_codes() {
        assert_eq!(gateway_code(Method::Momo), Gateway::Momo);
        assert_eq!(gateway_code(Method::VietQr), Gateway::VietQr);
        assert_eq!(gateway_code(Method::CustomQr), Gateway::CustomQr);
    }
}
