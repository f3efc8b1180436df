//! Integration tests for the `error` and `halt` entry points and the runner
//! envelope.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use chrono::{DateTime, Utc};
use role_grant::errors::{ErrorKind, ErrorReport};
use role_grant::models::{InvokeResponse, JobEnvelope, JobStatus};
use role_grant_test_utils::*;

#[tokio::test]
async fn test_error_with_503_requests_retry() {
    let report = ErrorReport::from_message(
        "Failed to create role assignment for user 'a@b.c' with role 'r': 503 Service Unavailable",
    );

    let response = graph_handler()
        .error(report.clone(), &job_params("a@b.c", "r"))
        .await
        .unwrap();

    assert_eq!(response.status, JobStatus::RetryRequested);
    assert_eq!(response.reason, report.message);
}

#[tokio::test]
async fn test_error_with_401_is_fatal_and_unchanged() {
    let report = ErrorReport::from_message("Failed to resolve user 'a@b.c': 401 Unauthorized");

    let err = graph_handler()
        .error(report.clone(), &job_params("a@b.c", "r"))
        .await
        .unwrap_err();

    assert_eq!(err, report);
    assert_eq!(err.to_string(), report.message);
}

#[tokio::test]
async fn test_error_with_digits_in_subject_keeps_auth_failures_fatal() {
    let handler = graph_handler();

    for message in [
        "Failed to resolve user 'jdoe503@contoso.com': 401 Unauthorized",
        "Failed to create role assignment for user 'alice@contoso.com' with role \
         'fe930be7-5e62-47db-91af-98c3a49a429c': 403 Forbidden",
    ] {
        let report = ErrorReport::from_message(message);
        let err = handler
            .error(report.clone(), &job_params("jdoe503@contoso.com", "r"))
            .await
            .unwrap_err();

        assert_eq!(err, report);
        assert_eq!(err.classify(), ErrorKind::Authorization);
    }
}

#[tokio::test]
async fn test_error_with_unclassified_failure_is_fatal() {
    let report = ErrorReport::from_message("Failed to resolve user 'a@b.c': 500 Internal Server Error");

    let err = graph_handler()
        .error(report.clone(), &job_params("a@b.c", "r"))
        .await
        .unwrap_err();

    assert_eq!(err.classify(), ErrorKind::Unknown);
}

#[tokio::test]
async fn test_raised_invoke_error_round_trips_through_error_handler() {
    let directory = MockDirectory::start().await;
    directory.with_user("alice@contoso.com", "user-1").await;
    directory
        .with_schedule_request_error(503, "ServiceUnavailable", "Try later")
        .await;
    let handler = graph_handler();

    let err = handler
        .invoke(
            job_params("alice@contoso.com", "role-1"),
            &job_context(&directory.uri()),
        )
        .await
        .unwrap_err();

    let report = ErrorReport::from(&err);
    assert_eq!(report.status_code, Some(503));

    let response = handler
        .error(report, &job_params("alice@contoso.com", "role-1"))
        .await
        .unwrap();
    assert_eq!(response.status, JobStatus::RetryRequested);
}

#[tokio::test]
async fn test_halt_returns_reason_and_timestamp_without_calls() {
    let directory = MockDirectory::start().await;
    let before = Utc::now();

    let response = graph_handler().halt(&halt_params(Some("timeout")));

    assert_eq!(response.status, JobStatus::Halted);
    assert_eq!(response.reason, "timeout");
    assert!(response.halted_at >= before);

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "halted");
    DateTime::parse_from_rfc3339(json["halted_at"].as_str().unwrap()).unwrap();

    assert_eq!(directory.total_requests().await, 0);
}

#[tokio::test]
async fn test_halt_before_invoke_stops_assignment() {
    let directory = MockDirectory::start().await;
    directory.with_user("alice@contoso.com", "user-1").await;
    directory.with_schedule_request("req-1").await;
    let handler = graph_handler();

    handler.halt(&halt_params(Some("maintenance window")));
    let response = handler
        .invoke(
            job_params("alice@contoso.com", "role-1"),
            &job_context(&directory.uri()),
        )
        .await
        .unwrap();

    match response {
        InvokeResponse::Halted(halted) => {
            assert_eq!(halted.status, JobStatus::Halted);
            assert_eq!(halted.reason, "maintenance window");
        }
        InvokeResponse::Success(_) => unreachable!("halted job must not grant"),
    }
    assert_eq!(directory.total_requests().await, 0);
}

#[tokio::test]
async fn test_dispatch_invoke_envelope() -> anyhow::Result<()> {
    let directory = MockDirectory::start().await;
    directory.with_user("alice@contoso.com", "user-1").await;
    directory.with_schedule_request("req-1").await;

    let envelope: JobEnvelope = serde_json::from_value(serde_json::json!({
        "operation": "invoke",
        "params": { "userPrincipalName": "alice@contoso.com", "roleId": "role-1" },
        "context": {
            "secrets": { "BEARER_AUTH_TOKEN": "test-token" },
            "config": { "address": directory.uri() }
        }
    }))?;

    let value = graph_handler().dispatch(envelope).await?;

    assert_eq!(value["status"], "success");
    assert_eq!(value["userId"], "user-1");
    assert_eq!(value["requestId"], "req-1");
    Ok(())
}

#[tokio::test]
async fn test_dispatch_invoke_failure_carries_classification() {
    let directory = MockDirectory::start().await;
    directory
        .with_user_error("alice@contoso.com", 403, "Authorization_RequestDenied", "Denied")
        .await;

    let envelope: JobEnvelope = serde_json::from_value(serde_json::json!({
        "operation": "invoke",
        "params": { "userPrincipalName": "alice@contoso.com", "roleId": "role-1" },
        "context": {
            "secrets": { "BEARER_AUTH_TOKEN": "test-token" },
            "config": { "address": directory.uri() }
        }
    }))
    .unwrap();

    let report = graph_handler().dispatch(envelope).await.unwrap_err();

    assert_eq!(report.status_code, Some(403));
    assert_eq!(report.kind, Some(ErrorKind::Authorization));
    assert!(report.message.contains("403"));
}
