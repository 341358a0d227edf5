#![allow(clippy::unwrap_used)]
// Integration tests for `OmadaClient` using wiremock.

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use omabus_api::models::{DeviceRecord, PoeModeRequest, SwitchDetail};
use omabus_api::{ClientCredentials, Error, Method, OmadaClient, paths};

const OMADAC: &str = "omadac-123";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, OmadaClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = OmadaClient::with_client(reqwest::Client::new(), base_url, OMADAC.into());
    (server, client)
}

fn api_path(suffix: &str) -> String {
    format!("/openapi/v1/{OMADAC}/{suffix}")
}

fn credentials() -> ClientCredentials {
    ClientCredentials {
        client_id: "app-id".into(),
        client_secret: SecretString::from("app-secret".to_string()),
    }
}

fn token() -> SecretString {
    SecretString::from("at-1".to_string())
}

// ── Authorization tests ─────────────────────────────────────────────

#[tokio::test]
async fn test_client_credentials_grant() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/openapi/authorize/token"))
        .and(query_param("grant_type", "client_credentials"))
        .and(body_json(json!({
            "omadacId": OMADAC,
            "client_id": "app-id",
            "client_secret": "app-secret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "msg": "Open API Get Access Token successfully.",
            "result": {
                "accessToken": "AT-abc",
                "tokenType": "bearer",
                "expiresIn": 7200,
                "refreshToken": "RT-xyz"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = client.client_credentials_grant(&credentials()).await.unwrap();

    assert_eq!(tokens.access_token.expose_secret(), "AT-abc");
    assert_eq!(tokens.refresh_token.expose_secret(), "RT-xyz");
    assert_eq!(tokens.expires_in, Some(7200));
}

#[tokio::test]
async fn test_client_credentials_grant_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/openapi/authorize/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": -44106,
            "msg": "The client id or client secret is invalid."
        })))
        .mount(&server)
        .await;

    let result = client.client_credentials_grant(&credentials()).await;

    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_grant_without_access_token_is_auth_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/openapi/authorize/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "result": { "expiresIn": 7200 }
        })))
        .mount(&server)
        .await;

    let result = client.client_credentials_grant(&credentials()).await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

#[tokio::test]
async fn test_refresh_token_grant_uses_query_parameters() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/openapi/authorize/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(query_param("client_id", "app-id"))
        .and(query_param("client_secret", "app-secret"))
        .and(query_param("refresh_token", "RT-old"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "result": {
                "accessToken": "AT-new",
                "refreshToken": "RT-new",
                "expiresIn": 3600
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let refresh = SecretString::from("RT-old".to_string());
    let tokens = client
        .refresh_token_grant(&credentials(), &refresh)
        .await
        .unwrap();

    assert_eq!(tokens.access_token.expose_secret(), "AT-new");
    assert_eq!(tokens.refresh_token.expose_secret(), "RT-new");
}

#[tokio::test]
async fn test_refresh_grant_http_failure_is_auth_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/openapi/authorize/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let refresh = SecretString::from("RT-old".to_string());
    let result = client.refresh_token_grant(&credentials(), &refresh).await;
    assert!(matches!(result, Err(Error::Authentication { .. })));
}

// ── Envelope tests ──────────────────────────────────────────────────

#[tokio::test]
async fn test_access_token_header_is_sent() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(api_path("sites/s1/switches/AA-BB-CC-DD-EE-01")))
        .and(header("Authorization", "AccessToken=at-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "result": {
                "portList": [
                    { "port": 1, "name": "Port1", "profileName": "All",
                      "profileOverrideEnable": false, "poeMode": 1 }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let detail: SwitchDetail = client
        .fetch::<_, ()>(
            Method::GET,
            &paths::switch("s1", "AA-BB-CC-DD-EE-01"),
            &[],
            None,
            &token(),
        )
        .await
        .unwrap();

    let ports = detail.port_list.unwrap();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].port, 1);
    assert_eq!(ports[0].profile_name.as_deref(), Some("All"));
    assert_eq!(ports[0].poe_mode, Some(1));
}

#[tokio::test]
async fn test_nonzero_error_code_is_api_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(api_path("sites/s1/switches/AA")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": -44112,
            "msg": "The access token has expired."
        })))
        .mount(&server)
        .await;

    let result = client
        .fetch::<SwitchDetail, ()>(Method::GET, &paths::switch("s1", "AA"), &[], None, &token())
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Api { code: -44112, .. }), "got: {err:?}");
    assert!(err.is_auth_expired());
}

#[tokio::test]
async fn test_success_without_result_is_missing_result() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(api_path("sites/s1/switches/AA")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errorCode": 0 })))
        .mount(&server)
        .await;

    let result = client
        .fetch::<SwitchDetail, ()>(Method::GET, &paths::switch("s1", "AA"), &[], None, &token())
        .await;
    assert!(matches!(result, Err(Error::MissingResult { .. })));
}

#[tokio::test]
async fn test_non_json_error_page_is_http_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(api_path("sites/s1/switches/AA")))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let result = client
        .fetch::<SwitchDetail, ()>(Method::GET, &paths::switch("s1", "AA"), &[], None, &token())
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Http { status: 502, .. }), "got: {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_execute_sends_json_body() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path(api_path("sites/s1/switches/AA/ports/3/poe-mode")))
        .and(body_json(json!({ "poeMode": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errorCode": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    client
        .execute(
            Method::PUT,
            &paths::port_poe_mode("s1", "AA", 3),
            &[],
            Some(&PoeModeRequest { poe_mode: 0 }),
            &token(),
        )
        .await
        .unwrap();
}

// ── Pagination tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_paginate_all_follows_pages() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(api_path("sites/s1/devices")))
        .and(query_param("page", "1"))
        .and(query_param("pageSize", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "result": {
                "totalRows": 3,
                "currentPage": 1,
                "currentSize": 2,
                "data": [
                    { "mac": "AA-00", "name": "Core Switch", "type": "switch" },
                    { "mac": "AA-01", "name": "Lobby AP", "type": "ap" }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(api_path("sites/s1/devices")))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "result": {
                "totalRows": 3,
                "currentPage": 2,
                "currentSize": 2,
                "data": [
                    { "mac": "AA-02", "name": "Edge", "type": "gateway" }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let devices: Vec<DeviceRecord> = client
        .paginate_all(&paths::devices("s1"), 2, &token())
        .await
        .unwrap();

    let names: Vec<_> = devices.iter().filter_map(|d| d.name.as_deref()).collect();
    assert_eq!(names, vec!["Core Switch", "Lobby AP", "Edge"]);
}

#[tokio::test]
async fn test_list_sites() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(api_path("sites")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "result": {
                "totalRows": 2,
                "currentPage": 1,
                "currentSize": 100,
                "data": [
                    { "siteId": "s-home", "name": "Home" },
                    { "siteId": "s-lab", "name": "Lab" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let sites = client.list_sites(&token()).await.unwrap();
    assert_eq!(sites.len(), 2);
    assert_eq!(sites[1].site_id, "s-lab");
    assert_eq!(sites[1].name, "Lab");
}
