use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;
pub mod aggregator;
mod api;
mod app;
mod auth;
pub mod ledger;
mod service;
pub mod setting;

pub use {app::*, service::*};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Gateway(#[from] payment_gateway::Error),
    #[error(transparent)]
    DbErr(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("aggregation query failed")]
    AggregationQuery(#[source] sea_orm::DbErr),
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Str(&'static str),
    #[error("{0}")]
    InvalidParam(String),
    #[error("{0}")]
    InvalidPayment(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Unauthorized")]
    Unauthorized,
}

impl Error {
    /// Store and environment failures never leak into responses.
    fn is_internal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::DbErr(_)
                | Error::Config(_)
                | Error::AggregationQuery(_)
                | Error::Message(_)
                | Error::Str(_)
        )
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        use payment_gateway::Error as G;
        match self {
            Error::Gateway(G::GatewayUnavailable(_) | G::Rejected { .. }) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Gateway(_)
            | Error::Json(_)
            | Error::InvalidParam(_)
            | Error::InvalidPayment(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Creates full response for error.
    fn error_response(&self) -> HttpResponse {
        let message = if self.is_internal() {
            error!(error = self.to_string(), "internal error");
            "internal server error".to_owned()
        } else {
            self.to_string()
        };
        HttpResponse::build(self.status_code()).json(json!({
            "error": true,
            "status_code": self.status_code().as_u16(),
            "message": message
        }))
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            Error::Gateway(payment_gateway::Error::GatewayUnavailable("timeout".to_owned()))
                .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Gateway(payment_gateway::Error::MalformedNotification("x".to_owned()))
                .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::NotFound("campaign").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::AggregationQuery(sea_orm::DbErr::Custom("select ...".to_owned())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_are_opaque() {
        let res = Error::AggregationQuery(sea_orm::DbErr::Custom("select secret".to_owned()))
            .error_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!Error::AggregationQuery(sea_orm::DbErr::Custom("select secret".to_owned()))
            .to_string()
            .contains("secret"));
    }
}
