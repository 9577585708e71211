// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP remotes against a mock server.

use cmdb_replicator::config::RemoteConfig;
use cmdb_replicator::model::{DataType, RunVersion};
use cmdb_replicator::remote::{
    ClearStaleDataRequest, PushItem, PushOperation, PushRequest, ReadRequest,
};
use cmdb_replicator::{HttpSource, HttpTarget, SourceRef, TargetRef};
use serde_json::{json, Map};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> RemoteConfig {
    RemoteConfig {
        source_url: server.uri(),
        target_url: server.uri(),
        ..Default::default()
    }
}

fn read_request(classify: &str) -> ReadRequest {
    ReadRequest {
        data_type: DataType::Instance,
        classify: classify.to_string(),
        condition: Map::new(),
        supplier_accounts: vec![],
        start: 0,
        limit: 100,
    }
}

fn push_request() -> PushRequest {
    PushRequest {
        operate: PushOperation::Replace,
        data_type: DataType::Instance,
        classify: "host".to_string(),
        version: RunVersion(1_700_000_000),
        synchronize_flag: "east".to_string(),
        items: vec![PushItem {
            id: Some(1),
            info: json!({"bk_host_id": 1}).as_object().cloned().unwrap(),
        }],
    }
}

#[tokio::test]
async fn source_read_returns_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synchronize/read"))
        .and(body_partial_json(json!({"classify": "host", "start": 0, "limit": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": true,
            "code": 0,
            "message": "",
            "data": {"info": [{"bk_host_id": 1}, {"bk_host_id": 2}], "count": 250}
        })))
        .mount(&server)
        .await;

    let source = HttpSource::new(&config(&server)).unwrap();
    let page = source.read(read_request("host")).await.unwrap();
    assert_eq!(page.count, 250);
    assert_eq!(page.info.len(), 2);
}

#[tokio::test]
async fn source_read_refusal_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synchronize/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": false,
            "code": 1_199_000,
            "message": "no permission"
        })))
        .mount(&server)
        .await;

    let source = HttpSource::new(&config(&server)).unwrap();
    let err = source.read(read_request("host")).await.unwrap_err();
    assert!(err.to_string().contains("no permission"));
}

#[tokio::test]
async fn source_server_error_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synchronize/read"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let source = HttpSource::new(&config(&server)).unwrap();
    let err = source.read(read_request("host")).await.unwrap_err();
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn target_push_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synchronize/instance"))
        .and(body_partial_json(json!({
            "operate": "replace",
            "synchronize_flag": "east",
            "version": 1_700_000_000
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": true,
            "code": 0,
            "message": "",
            "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let target = HttpTarget::new(&config(&server)).unwrap();
    let response = target.push(push_request()).await.unwrap();
    assert!(response.accepted);
    assert!(response.exceptions.is_empty());
}

#[tokio::test]
async fn target_push_rejection_carries_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synchronize/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": false,
            "code": 1_101_000,
            "message": "partial failure",
            "data": {"exceptions": [
                {"code": 1_101_001, "message": "duplicate", "data": {"bk_host_id": 1}, "position": 0}
            ]}
        })))
        .mount(&server)
        .await;

    let target = HttpTarget::new(&config(&server)).unwrap();
    let response = target.push(push_request()).await.unwrap();
    assert!(!response.accepted);
    assert_eq!(response.code, 1_101_000);
    assert_eq!(response.message, "partial failure");
    assert_eq!(response.exceptions.len(), 1);
    assert_eq!(response.exceptions[0].code, 1_101_001);
}

#[tokio::test]
async fn target_clear_sends_valid_sign() {
    let server = MockServer::start().await;
    let request = ClearStaleDataRequest::signed(RunVersion(1_700_000_000), "east", 1_700_000_123);
    Mock::given(method("POST"))
        .and(path("/synchronize/clear"))
        .and(body_partial_json(json!({
            "synchronize_flag": "east",
            "version": 1_700_000_000,
            "timestamp": 1_700_000_123,
            "sign": request.sign.clone()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
        .expect(1)
        .mount(&server)
        .await;

    let target = HttpTarget::new(&config(&server)).unwrap();
    let response = target.clear_stale_data(request).await.unwrap();
    assert!(response.accepted);
}

#[tokio::test]
async fn target_clear_refusal_is_not_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/synchronize/clear"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": false,
            "code": 1_199_002,
            "message": "sign mismatch"
        })))
        .mount(&server)
        .await;

    let target = HttpTarget::new(&config(&server)).unwrap();
    let request = ClearStaleDataRequest::signed(RunVersion(1), "east", 2);
    let response = target.clear_stale_data(request).await.unwrap();
    assert!(!response.accepted);
    assert_eq!(response.code, 1_199_002);
}
