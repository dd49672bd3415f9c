use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use validator::Validate;

use crate::error::{status_code_name, AppError, OptionExt};

use super::body_json;

#[derive(Debug, Deserialize, Validate)]
struct Signup {
    #[validate(email(message = "must be an email"))]
    email: String,
}

#[test]
fn test_app_error_display() {
    let error = AppError::BadRequest("Invalid input".to_string());
    assert_eq!(format!("{}", error), "Bad request: Invalid input");

    let error = AppError::NotFound("Resource not found".to_string());
    assert_eq!(format!("{}", error), "Not found: Resource not found");
}

#[test]
fn test_app_error_into_response() {
    let cases = [
        (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
        (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
        (AppError::Conflict("x".into()), StatusCode::CONFLICT),
        (AppError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
        (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
        (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
        (AppError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
        (AppError::UnsupportedMediaType("x".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
        (AppError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        (AppError::Internal(anyhow::anyhow!("x")), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (error, status) in cases {
        assert_eq!(error.into_response().status(), status);
    }
}

#[tokio::test]
async fn test_error_body_shape() {
    let body = body_json(AppError::NotFound("Scan not found".into()).into_response()).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(body["error"]["message"], "Scan not found");
    assert_eq!(body["status"], 404);
    assert!(body["timestamp"].is_string());
    assert!(body["error"].get("details").is_none());
}

#[tokio::test]
async fn test_internal_error_hides_cause() {
    let body = body_json(AppError::Internal(anyhow::anyhow!("disk on fire")).into_response()).await;
    assert_eq!(body["error"]["message"], "An internal server error occurred");
    assert!(body["error"]["details"]["error_id"].is_string());
    assert!(!body.to_string().contains("disk on fire"));
}

#[tokio::test]
async fn test_validation_error_details() {
    let errors = Signup { email: "nope".into() }.validate().unwrap_err();
    let res = AppError::from(errors).into_response();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = body_json(res).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"]["fields"]["email"][0], "must be an email");
}

#[test]
fn test_from_sqlx_error() {
    assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::NotFound(_)));
    assert!(matches!(AppError::from(sqlx::Error::PoolTimedOut), AppError::ServiceUnavailable(_)));
    assert!(matches!(AppError::from(sqlx::Error::PoolClosed), AppError::Database(_)));
}

#[test]
fn test_option_ext() {
    let found: Option<u8> = Some(1);
    assert_eq!(found.ok_or_not_found("Record").unwrap(), 1);

    let missing: Option<u8> = None;
    match missing.ok_or_not_found("Record") {
        Err(AppError::NotFound(msg)) => assert_eq!(msg, "Record not found"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_status_code_name() {
    assert_eq!(status_code_name(StatusCode::PAYLOAD_TOO_LARGE), "PAYLOAD_TOO_LARGE");
    assert_eq!(status_code_name(StatusCode::METHOD_NOT_ALLOWED), "METHOD_NOT_ALLOWED");
    assert_eq!(status_code_name(StatusCode::IM_A_TEAPOT), "IM_A_TEAPOT");
    assert_eq!(status_code_name(StatusCode::from_u16(599).unwrap()), "HTTP_599");
}
