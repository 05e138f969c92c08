//! http api

use crate::{
    aggregator::{Filter, Sort},
    auth, AppState, DonateReq, Error, ReconcileReq, Result,
};
use actix_web::{get, post, web, HttpResponse, Responder};
use payment_gateway::Error as GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_campaigns)
        .service(get_campaign)
        .service(campaign_report)
        .service(donate)
        .service(momo_ipn)
        .service(reconcile);
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ListReq {
    q: Option<String>,
    status: Option<String>,
    page: Option<i64>,
    #[serde(rename = "pageSize")]
    page_size: Option<i64>,
    sort: Option<String>,
}

#[get("/campaigns")]
pub async fn list_campaigns(
    state: web::Data<AppState>,
    query: web::Query<ListReq>,
) -> Result<impl Responder, Error> {
    let query = query.into_inner();
    let sort = Sort::from(query.sort.as_deref().unwrap_or_default());
    let filter = Filter {
        q: query.q,
        status: query.status,
        page: query.page,
        page_size: query.page_size,
    };
    let page = state
        .service
        .aggregator()
        .list_campaigns(&filter, sort)
        .await?;
    Ok(web::Json(page))
}

#[get("/campaigns/{id}")]
pub async fn get_campaign(
    state: web::Data<AppState>,
    id: web::Path<i32>,
) -> Result<impl Responder, Error> {
    let item = state
        .service
        .aggregator()
        .campaign(id.into_inner())
        .await?
        .ok_or(Error::NotFound("campaign"))?;
    Ok(web::Json(json!({ "item": item })))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReportReq {
    continuous: Option<bool>,
}

#[get("/campaigns/{id}/report")]
pub async fn campaign_report(
    state: web::Data<AppState>,
    id: web::Path<i32>,
    query: web::Query<ReportReq>,
) -> Result<impl Responder, Error> {
    let report = state
        .service
        .aggregator()
        .campaign_report(id.into_inner(), query.continuous.unwrap_or_default())
        .await?
        .ok_or(Error::NotFound("campaign"))?;
    Ok(web::Json(report))
}

#[post("/campaigns/{id}/donations")]
pub async fn donate(
    state: web::Data<AppState>,
    id: web::Path<i32>,
    data: web::Json<DonateReq>,
) -> Result<HttpResponse, Error> {
    let donated = state
        .service
        .donate(id.into_inner(), data.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(donated))
}

/// MoMo IPN. Applied, replayed and forged notifications are all answered
/// with 204, forged ones never touch the ledger.
#[post("/momo/ipn")]
pub async fn momo_ipn(
    state: web::Data<AppState>,
    payload: web::Json<Value>,
) -> Result<HttpResponse, Error> {
    match state.service.handle_momo_ipn(&payload).await {
        Ok(recorded) => {
            debug!(id = recorded.model().id, "ipn applied");
            Ok(HttpResponse::NoContent().finish())
        }
        Err(Error::Gateway(GatewayError::InvalidSignature)) => {
            Ok(HttpResponse::NoContent().finish())
        }
        Err(e) => Err(e),
    }
}

#[post("/donations/{order_id}/reconcile")]
pub async fn reconcile(
    state: web::Data<AppState>,
    _admin: auth::AdminAuth,
    order_id: web::Path<String>,
    data: Option<web::Json<ReconcileReq>>,
) -> Result<impl Responder, Error> {
    let req = data.map(|d| d.into_inner()).unwrap_or_default();
    let recorded = state.service.reconcile(&order_id, req).await?;
    Ok(web::Json(json!({
        "donation": recorded.model(),
        "duplicate": recorded.is_duplicate(),
    })))
}
