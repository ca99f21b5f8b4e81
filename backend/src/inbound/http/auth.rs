//! Shared-token authentication for protected routes.
//!
//! Handlers opt in by taking an [`Authorized`] argument; extraction fails
//! with `401` unless the raw `Authorization` header equals the configured
//! token.

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, web};
use futures_util::future::{Ready, ready};
use tracing::{error, warn};

use super::state::HttpState;
use crate::domain::Error;

const UNAUTHORIZED_MESSAGE: &str = "Unauthorized.";

/// Proof that the request carried the API token.
#[derive(Debug, Clone, Copy)]
pub struct Authorized;

fn authorize(req: &HttpRequest) -> Result<Authorized, Error> {
    let Some(state) = req.app_data::<web::Data<HttpState>>() else {
        error!("HTTP state missing from application data");
        return Err(Error::internal("HTTP state not configured"));
    };
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    match presented {
        Some(token) if state.accepts_token(token) => Ok(Authorized),
        _ => {
            warn!(path = req.path(), "rejected request with missing or wrong token");
            Err(Error::unauthorized(UNAUTHORIZED_MESSAGE))
        }
    }
}

impl FromRequest for Authorized {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authorize(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use crate::inbound::http::test_utils::http_state;
    use actix_web::test::TestRequest;
    use rstest::rstest;

    fn request(header: Option<&str>) -> HttpRequest {
        let mut builder = TestRequest::default().app_data(web::Data::new(http_state("s3cret").0));
        if let Some(value) = header {
            builder = builder.insert_header((AUTHORIZATION, value));
        }
        builder.to_http_request()
    }

    #[rstest]
    fn exact_token_is_accepted() {
        assert!(authorize(&request(Some("s3cret"))).is_ok());
    }

    #[rstest]
    #[case::missing(None)]
    #[case::wrong(Some("guess"))]
    #[case::bearer_prefixed(Some("Bearer s3cret"))]
    #[case::case_differs(Some("S3CRET"))]
    fn anything_else_is_unauthorized(#[case] header: Option<&str>) {
        let error = authorize(&request(header)).expect_err("rejected");
        assert_eq!(error.code(), ErrorCode::Unauthorized);
    }

    #[rstest]
    fn missing_state_is_an_internal_error() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "s3cret"))
            .to_http_request();
        let error = authorize(&req).expect_err("no state");
        assert_eq!(error.code(), ErrorCode::InternalError);
    }
}
