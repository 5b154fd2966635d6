//! HTTP surface tests: operator routes, bearer check, public validation.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, Rgba, RgbaImage};
use tower::ServiceExt;

use credcard_core::api::{self, AppState};
use credcard_core::{
    AppConfig, CardRenderer, CardService, CardTemplate, Credential, CredentialId, CredentialStatus,
    CredentialStore, MemoryPhotoSource, MemoryStore, ValidationResolver, ValidationToken,
};

const OPERATOR_TOKEN: &str = "operator-secret";

fn test_app(credentials: Vec<Credential>) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for credential in credentials {
        store.insert(credential).unwrap();
    }
    let background =
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(1063, 591, Rgba([236, 240, 245, 255])));
    let template = CardTemplate::from_image(background);
    let renderer = Arc::new(CardRenderer::new(template, "cards.example.org").unwrap());
    let cards = CardService::new(store.clone(), renderer, Arc::new(MemoryPhotoSource::new()));
    let resolver = ValidationResolver::new(store.clone());

    let mut config = AppConfig::development("cards.example.org");
    config.auth_token = Some(OPERATOR_TOKEN.to_string());
    (api::app(AppState::new(config, cards, resolver)), store)
}

fn ana(status: CredentialStatus) -> Credential {
    Credential::new("c1", "Ana Lima", status)
}

fn operator(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {OPERATOR_TOKEN}"))
        .body(Body::empty())
        .unwrap()
}

fn public(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn issue(app: &Router) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(operator("POST", "/v1/credentials/c1/issue"))
        .await
        .unwrap();
    body_json(response).await
}

#[tokio::test]
async fn test_liveness() {
    let (app, _) = test_app(vec![]);
    let response = app.oneshot(public("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"ok");
}

#[tokio::test]
async fn test_card_download_headers() {
    let (app, _) = test_app(vec![ana(CredentialStatus::AutoApproved)]);
    let response = app.oneshot(operator("GET", "/v1/credentials/c1/card.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=\"cartao-MAF-"));
    assert!(disposition.ends_with(".png\""));

    let png = body_bytes(response).await;
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn test_card_download_print_format() {
    let (app, _) = test_app(vec![ana(CredentialStatus::ManuallyApproved)]);
    let response = app
        .oneshot(operator("GET", "/v1/credentials/c1/card.png?format=print&dpi=300&cpf=full"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let png = body_bytes(response).await;
    let image = image::load_from_memory(&png).unwrap();
    assert_eq!((image.width(), image.height()), (1013, 638));
}

#[tokio::test]
async fn test_card_download_rejects_bad_dpi() {
    let (app, _) = test_app(vec![ana(CredentialStatus::AutoApproved)]);
    let response = app
        .oneshot(operator("GET", "/v1/credentials/c1/card.png?format=print&dpi=20"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_card_download_pending_is_forbidden() {
    let (app, store) = test_app(vec![ana(CredentialStatus::PendingReview)]);
    let response = app.oneshot(operator("GET", "/v1/credentials/c1/card.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "RECORD_NOT_APPROVED");

    let record = store.get(&CredentialId::new("c1")).unwrap().unwrap();
    assert!(record.identifiers.is_none());
}

#[tokio::test]
async fn test_card_download_unknown_is_404() {
    let (app, _) = test_app(vec![]);
    let response = app.oneshot(operator("GET", "/v1/credentials/nope/card.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_operator_routes_require_token() {
    let (app, _) = test_app(vec![ana(CredentialStatus::AutoApproved)]);

    let missing = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/credentials/c1/issue")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .oneshot(
            Request::builder()
                .uri("/v1/credentials/c1/card.png")
                .header(header::AUTHORIZATION, "Bearer guess")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_issue_then_validate() {
    let (app, _) = test_app(vec![ana(CredentialStatus::AutoApproved).with_cpf("123.456.789-01")]);

    let first = issue(&app).await;
    let second = issue(&app).await;
    assert_eq!(first, second);

    let token = first["validation_token"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(public(&format!("/v1/validations/{token}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["verdict"], "valid");
    assert_eq!(json["name"], "Ana Lima");
    assert_eq!(json["cpf"], "***.***.***-01");
    assert_eq!(json["card_number"], first["card_number"]);

    let page = app.oneshot(public(&format!("/validar/{token}"))).await.unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let html = String::from_utf8(body_bytes(page).await).unwrap();
    assert!(html.contains("Valid credential"));
    assert!(html.contains("Ana Lima"));
    assert!(!html.contains("123.456"));
}

#[tokio::test]
async fn test_revoked_validation_discloses_nothing() {
    let (app, store) = test_app(vec![ana(CredentialStatus::AutoApproved)]);
    let issued = issue(&app).await;
    store
        .set_status(&CredentialId::new("c1"), CredentialStatus::Revoked)
        .unwrap();

    let token = issued["validation_token"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(public(&format!("/v1/validations/{token}")))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json, serde_json::json!({ "verdict": "revoked" }));

    let page = app.oneshot(public(&format!("/validar/{token}"))).await.unwrap();
    let html = String::from_utf8(body_bytes(page).await).unwrap();
    assert!(html.contains("Revoked credential"));
    assert!(!html.contains("Ana Lima"));
}

#[tokio::test]
async fn test_unknown_token_page_is_200() {
    let (app, _) = test_app(vec![]);
    let unknown = ValidationToken::from_bytes(&[9u8; 32]);

    for uri in [format!("/validar/{unknown}"), "/validar/garbage".to_string()] {
        let response = app.clone().oneshot(public(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("Invalid credential"));
    }

    let json = body_json(app.oneshot(public("/v1/validations/garbage")).await.unwrap()).await;
    assert_eq!(json, serde_json::json!({ "verdict": "invalid" }));
}

#[tokio::test]
async fn test_issued_identifiers_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let seed = vec![ana(CredentialStatus::AutoApproved)];
    std::fs::write(&path, serde_json::to_vec(&seed).unwrap()).unwrap();

    let mut config = AppConfig::development("cards.example.org");
    config.credentials_path = Some(path.clone());
    config.auth_token = Some(OPERATOR_TOKEN.to_string());

    let boot = |config: AppConfig| {
        let store = config.open_store().unwrap();
        let background =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(1063, 591, Rgba([236, 240, 245, 255])));
        let template = CardTemplate::from_image(background);
        let renderer = Arc::new(CardRenderer::new(template, "cards.example.org").unwrap());
        let cards = CardService::new(store.clone(), renderer, Arc::new(MemoryPhotoSource::new()));
        api::app(AppState::new(config, cards, ValidationResolver::new(store)))
    };

    let first = issue(&boot(config.clone())).await;
    let second = issue(&boot(config)).await;
    assert_eq!(first, second);

    let on_disk: Vec<Credential> =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let ids = on_disk[0].identifiers.as_ref().unwrap();
    assert_eq!(serde_json::json!(ids.card_number), first["card_number"]);
}
