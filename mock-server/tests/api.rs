use axum::http::{Request, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use mock_server::{app, DEFAULT_KEY, DEFAULT_USER};
use sha1::Sha1;
use tower::ServiceExt;

fn mock() -> Router {
    app("http://mock", DEFAULT_USER, DEFAULT_KEY)
}

async fn authenticate(app: &Router) -> String {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("X-Auth-User", DEFAULT_USER)
                .header("X-Auth-Key", DEFAULT_KEY)
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    resp.headers()
        .get("x-storage-token")
        .expect("token header")
        .to_str()
        .unwrap()
        .to_string()
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: &str,
    body: &str,
) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if !token.is_empty() {
        builder = builder.header("X-Auth-Token", token);
    }
    app.clone()
        .oneshot(builder.body(body.to_string()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

// --- auth ---

#[tokio::test]
async fn auth_returns_storage_url_and_token() {
    let app = mock();
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("X-Auth-User", DEFAULT_USER)
                .header("X-Auth-Key", DEFAULT_KEY)
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers().get("x-storage-url").unwrap(),
        "http://mock/v1/demo/"
    );
    assert!(resp.headers().contains_key("x-storage-token"));
}

#[tokio::test]
async fn auth_with_wrong_key_is_forbidden() {
    let app = mock();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/")
                .header("X-Auth-User", DEFAULT_USER)
                .header("X-Auth-Key", "nope")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = mock();
    authenticate(&app).await;
    let resp = send(&app, "GET", "/v1/demo/", "", "").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// --- containers ---

#[tokio::test]
async fn container_create_head_delete() {
    let app = mock();
    let token = authenticate(&app).await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/v1/demo/photos")
                .header("X-Auth-Token", &token)
                .header("X-Container-Meta-Color", "blue")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(&app, "PUT", "/v1/demo/photos", &token, "").await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let resp = send(&app, "HEAD", "/v1/demo/photos", &token, "").await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(resp.headers().get("x-container-meta-color").unwrap(), "blue");
    assert_eq!(resp.headers().get("x-container-object-count").unwrap(), "0");

    let resp = send(&app, "DELETE", "/v1/demo/photos", &token, "").await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = send(&app, "HEAD", "/v1/demo/photos", &token, "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_non_empty_container_conflicts() {
    let app = mock();
    let token = authenticate(&app).await;
    send(&app, "PUT", "/v1/demo/c", &token, "").await;
    send(&app, "PUT", "/v1/demo/c/o.txt", &token, "data").await;

    let resp = send(&app, "DELETE", "/v1/demo/c", &token, "").await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn container_listing_plain_and_json() {
    let app = mock();
    let token = authenticate(&app).await;
    send(&app, "PUT", "/v1/demo/c", &token, "").await;
    send(&app, "PUT", "/v1/demo/c/a.txt", &token, "aa").await;
    send(&app, "PUT", "/v1/demo/c/b.txt", &token, "bb").await;

    let resp = send(&app, "GET", "/v1/demo/c", &token, "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert_eq!(&body[..], b"a.txt\nb.txt\n");

    let resp = send(&app, "GET", "/v1/demo/c?format=json", &token, "").await;
    let body = body_bytes(resp).await;
    let records: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["name"], "a.txt");
    assert_eq!(records[0]["bytes"], 2);
}

// --- objects ---

#[tokio::test]
async fn object_put_get_delete() {
    let app = mock();
    let token = authenticate(&app).await;
    send(&app, "PUT", "/v1/demo/c", &token, "").await;

    let resp = send(&app, "PUT", "/v1/demo/c/hello.txt", &token, "hello").await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(resp.headers().contains_key("etag"));

    let resp = send(&app, "GET", "/v1/demo/c/hello.txt", &token, "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert_eq!(&body[..], b"hello");

    let resp = send(&app, "DELETE", "/v1/demo/c/hello.txt", &token, "").await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = send(&app, "GET", "/v1/demo/c/hello.txt", &token, "").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn object_metadata_post_keeps_only_object_meta_headers() {
    let app = mock();
    let token = authenticate(&app).await;
    send(&app, "PUT", "/v1/demo/c", &token, "").await;
    send(&app, "PUT", "/v1/demo/c/o", &token, "x").await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/demo/c/o")
                .header("X-Auth-Token", &token)
                .header("X-Object-Meta-Owner", "me")
                .header("X-Ignored", "dropped")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = send(&app, "GET", "/v1/demo/c/o", &token, "").await;
    assert_eq!(resp.headers().get("x-object-meta-owner").unwrap(), "me");
    assert!(!resp.headers().contains_key("x-ignored"));
}

#[tokio::test]
async fn copy_duplicates_an_object() {
    let app = mock();
    let token = authenticate(&app).await;
    send(&app, "PUT", "/v1/demo/c", &token, "").await;
    send(&app, "PUT", "/v1/demo/c/src.txt", &token, "payload").await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("COPY")
                .uri("/v1/demo/c/src.txt")
                .header("X-Auth-Token", &token)
                .header("Destination", "/v1/demo/c/dst.txt")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(&app, "GET", "/v1/demo/c/dst.txt", &token, "").await;
    let body = body_bytes(resp).await;
    assert_eq!(&body[..], b"payload");
}

// --- temp urls ---

#[tokio::test]
async fn temp_url_signature_grants_and_denies_access() {
    let app = mock();
    let token = authenticate(&app).await;
    send(&app, "PUT", "/v1/demo/c", &token, "").await;
    send(&app, "PUT", "/v1/demo/c/o", &token, "secret body").await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/demo")
                .header("X-Auth-Token", &token)
                .header("X-Account-Meta-Temp-URL-Key", "tempkey")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let expires = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 600;
    let mut mac = Hmac::<Sha1>::new_from_slice(b"tempkey").unwrap();
    mac.update(format!("GET\n{expires}\n/v1/demo/c/o").as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let uri = format!("/v1/demo/c/o?temp_url_sig={signature}&temp_url_expires={expires}");
    let resp = send(&app, "GET", &uri, "", "").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_bytes(resp).await;
    assert_eq!(&body[..], b"secret body");

    let uri = format!("/v1/demo/c/o?temp_url_sig=deadbeef&temp_url_expires={expires}");
    let resp = send(&app, "GET", &uri, "", "").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
