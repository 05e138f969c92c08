#![allow(unused)]

use actix_http::Request;
use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::{header::AUTHORIZATION, Method},
    test::{call_service, read_body, TestRequest},
    web, App, HttpResponse, HttpServer,
};
use anyhow::Result;
use entity::{campaign, donation::Gateway};
use fundbox::{
    ledger::{Recorded, Transaction},
    new_order_id,
    setting::{Momo, Setting},
    AppState,
};
use migration::{Migrator, MigratorTrait};
use payment_gateway::{momo::CreateRequest, momo::Notification, signature};
use sea_orm::{ActiveModelTrait, NotSet, Set};
use serde_json::{json, Value};

pub const ADMIN_TOKEN: &str = "fundbox-admin";
pub const PARTNER: &str = "FUNDBOX";
pub const ACCESS_KEY: &str = "FUNDBOXACCESS";
pub const SECRET: &str = "fundbox-test-secret";

pub fn test_setting() -> Setting {
    let mut setting = Setting::default();
    setting.admin.token = Some(ADMIN_TOKEN.to_owned());
    setting.momo = Some(Momo {
        partner_code: PARTNER.to_owned(),
        access_key: ACCESS_KEY.to_owned(),
        secret_key: SECRET.to_owned(),
        // nothing listens on port 1
        endpoint: "http://127.0.0.1:1/v2/gateway/api/create".to_owned(),
        redirect_url: "https://fundbox.example/thanks".to_owned(),
        ipn_url: "https://fundbox.example/momo/ipn".to_owned(),
        timeout: 2,
    });
    setting
}

pub async fn create_state(setting: Setting) -> Result<AppState> {
    let state = AppState::from_setting(setting).await?;
    Migrator::fresh(state.service.db()).await?;
    Ok(state)
}

pub async fn create_test_state() -> Result<AppState> {
    create_state(test_setting()).await
}

pub async fn insert_campaign(
    state: &AppState,
    model: campaign::ActiveModel,
) -> Result<campaign::Model> {
    Ok(model.insert(state.service.db()).await?)
}

pub async fn seed_campaign(
    state: &AppState,
    title: &str,
    goal: i64,
    created_at: i64,
) -> Result<campaign::Model> {
    insert_campaign(
        state,
        campaign::ActiveModel {
            id: NotSet,
            title: Set(title.to_owned()),
            location: Set("Hue".to_owned()),
            description: Set(format!("Relief for {}", title)),
            status: Set("active".to_owned()),
            goal: Set(goal),
            payment: Set(None),
            created_at: Set(created_at),
        },
    )
    .await
}

/// A settled donation recorded the way reconciliation does it.
pub async fn seed_paid(
    state: &AppState,
    campaign_id: i32,
    amount: i64,
    payer_id: Option<&str>,
    paid_at: i64,
) -> Result<Recorded> {
    seed_status(state, campaign_id, amount, payer_id, paid_at, "paid").await
}

pub async fn seed_status(
    state: &AppState,
    campaign_id: i32,
    amount: i64,
    payer_id: Option<&str>,
    paid_at: i64,
    status: &str,
) -> Result<Recorded> {
    let order_id = new_order_id();
    Ok(state
        .service
        .ledger()
        .record(Transaction {
            gateway: Gateway::VietQr,
            gateway_transaction_id: Some(format!("bank-{}", order_id)),
            order_id,
            campaign_id: Some(campaign_id),
            payer_id: payer_id.map(ToOwned::to_owned),
            amount,
            status: status.to_owned(),
            provider_status: status.to_owned(),
            message: "".to_owned(),
            paid_at: Some(paid_at),
        })
        .await?)
}

/// IPN body signed with the test secret.
pub fn signed_ipn(
    order_id: &str,
    request_id: &str,
    amount: i64,
    trans_id: u64,
    result_code: i64,
) -> Value {
    let message = if result_code == 0 {
        "Successful."
    } else {
        "Transaction denied by user."
    };
    let mut payload = json!({
        "partnerCode": PARTNER,
        "orderId": order_id,
        "requestId": request_id,
        "amount": amount,
        "orderInfo": "Donate",
        "orderType": "momo_wallet",
        "transId": trans_id,
        "resultCode": result_code,
        "message": message,
        "payType": "qr",
        "responseTime": 1_700_000_123_456u64,
        "extraData": "",
    });
    let n = Notification::parse(&payload).unwrap();
    payload["signature"] = json!(signature::sign(&n.signing_fields(ACCESS_KEY), SECRET));
    payload
}

async fn mock_create(req: web::Json<CreateRequest>) -> HttpResponse {
    if !signature::verify(&req.signing_fields(), SECRET, &req.signature) {
        return HttpResponse::Ok().json(json!({
            "resultCode": 11007,
            "message": "Invalid signature.",
        }));
    }
    HttpResponse::Ok().json(json!({
        "partnerCode": req.partner_code,
        "orderId": req.order_id,
        "requestId": req.request_id,
        "amount": req.amount,
        "resultCode": 0,
        "message": "Successful.",
        "payUrl": format!("https://pay.example/{}", req.order_id),
    }))
}

/// Local stand in for the MoMo create endpoint, returns its url.
pub async fn start_momo_mock() -> Result<String> {
    let server = HttpServer::new(|| {
        App::new().route("/v2/gateway/api/create", web::post().to(mock_create))
    })
    .workers(1)
        .bind(("127.0.0.1", 0))?;
    let addr = server.addrs()[0];
    actix_rt::spawn(server.run());
    Ok(format!("http://{}/v2/gateway/api/create", addr))
}

pub async fn call<S, B>(app: &S, req: TestRequest) -> Result<(Value, u16)>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let res = call_service(app, req.to_request()).await;
    let status = res.status().as_u16();
    let body = read_body(res).await;
    let val = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)?
    };
    Ok((val, status))
}

pub async fn get<S, B>(app: &S, path: &str) -> Result<(Value, u16)>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    call(app, TestRequest::with_uri(path)).await
}

pub fn post_req(path: &str, data: Value) -> TestRequest {
    TestRequest::with_uri(path)
        .method(Method::POST)
        .set_json(data)
}

pub async fn post<S, B>(app: &S, path: &str, data: Value) -> Result<(Value, u16)>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    call(app, post_req(path, data)).await
}

pub async fn auth_post<S, B>(app: &S, path: &str, token: &str, data: Value) -> Result<(Value, u16)>
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    call(
        app,
        post_req(path, data).insert_header((AUTHORIZATION, format!("Bearer {}", token))),
    )
    .await
}
