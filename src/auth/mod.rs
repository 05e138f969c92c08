use crate::{AppState, Error, Result};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use payment_gateway::signature::constant_time_eq;
use std::future::{ready, Ready};

/// Operator authenticated by `Authorization: Bearer <admin.token>`.
/// Always rejects when no token is configured.
#[derive(Debug)]
pub struct AdminAuth;

fn bearer(req: &HttpRequest) -> Option<&str> {
    let auth = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    if auth.len() > 6 && auth[..6].eq_ignore_ascii_case("bearer") {
        Some(auth[6..].trim())
    } else {
        None
    }
}

impl AdminAuth {
    fn check(req: &HttpRequest) -> Result<Self> {
        let state = req
            .app_data::<web::Data<AppState>>()
            .ok_or(Error::Unauthorized)?;
        let expected = state
            .setting
            .admin
            .token
            .as_deref()
            .ok_or(Error::Unauthorized)?;
        let token = bearer(req).ok_or(Error::Unauthorized)?;
        if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            Ok(AdminAuth)
        } else {
            Err(Error::Unauthorized)
        }
    }
}

impl FromRequest for AdminAuth {
    type Error = Error;
    type Future = Ready<Result<AdminAuth>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        ready(Self::check(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn bearer_token() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer abc "))
            .to_http_request();
        assert_eq!(bearer(&req), Some("abc"));
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "bearer xyz"))
            .to_http_request();
        assert_eq!(bearer(&req), Some("xyz"));
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert_eq!(bearer(&req), None);
        assert_eq!(bearer(&TestRequest::default().to_http_request()), None);
    }
}
