//! In-memory Swift-like object-storage server for integration tests.
//!
//! Speaks the subset of the protocol the client exercises: the auth
//! handshake on `/`, account/container/object operations under
//! `/v1/{account}/...` (including the `COPY` verb, `X-*-Meta-*` metadata,
//! symlink resolution, conditional GETs and `?extract-archive=tar`), and
//! temp-URL signature verification against the stored account key. Requests
//! without the issued token are rejected unless they carry a valid
//! signature.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_USER: &str = "demo";
pub const DEFAULT_KEY: &str = "secret";

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
    pub etag: String,
    pub meta: HashMap<String, String>,
    pub last_modified: String,
}

#[derive(Default)]
struct Container {
    meta: HashMap<String, String>,
    objects: BTreeMap<String, StoredObject>,
}

pub struct Store {
    base_url: String,
    user: String,
    key: String,
    token: Option<String>,
    account_meta: HashMap<String, String>,
    containers: BTreeMap<String, Container>,
}

pub type Db = Arc<RwLock<Store>>;

pub fn app(base_url: &str, user: &str, key: &str) -> Router {
    let db: Db = Arc::new(RwLock::new(Store {
        base_url: base_url.trim_end_matches('/').to_string(),
        user: user.to_string(),
        key: key.to_string(),
        token: None,
        account_meta: HashMap::new(),
        containers: BTreeMap::new(),
    }));
    Router::new()
        .route("/", get(auth))
        .fallback(dispatch)
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    let base_url = format!("http://{}", listener.local_addr()?);
    axum::serve(listener, app(&base_url, DEFAULT_USER, DEFAULT_KEY)).await
}

async fn auth(State(db): State<Db>, headers: HeaderMap) -> Response {
    let mut store = db.write().await;
    let user = header_str(&headers, "x-auth-user");
    let key = header_str(&headers, "x-auth-key");
    if user != Some(store.user.as_str()) || key != Some(store.key.as_str()) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let token = Uuid::new_v4().to_string();
    store.token = Some(token.clone());
    let storage_url = format!("{}/v1/{}/", store.base_url, store.user);
    respond(
        StatusCode::NO_CONTENT,
        &[
            ("X-Storage-Url".into(), storage_url),
            ("X-Storage-Token".into(), token),
        ],
        Vec::new(),
    )
}

async fn dispatch(State(db): State<Db>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = match axum::body::to_bytes(body, 64 * 1024 * 1024).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let path = parts.uri.path().to_string();
    let query = parse_query(parts.uri.query());
    let method = parts.method.as_str().to_string();

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.first() != Some(&"v1") || segments.len() < 2 {
        return StatusCode::NOT_FOUND.into_response();
    }
    let account = segments[1].to_string();

    let mut store = db.write().await;
    if account != store.user {
        return StatusCode::NOT_FOUND.into_response();
    }

    let token_ok = match (&store.token, header_str(&parts.headers, "x-auth-token")) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    };
    let temp_ok = matches!(method.as_str(), "GET" | "HEAD")
        && temp_url_ok(&store, &path, &method, &query);
    if !token_ok && !temp_ok {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match segments.len() {
        2 => account_scope(&mut store, &method, &parts.headers, &query),
        3 => container_scope(&mut store, segments[2], &method, &parts.headers, &query, &body),
        _ => {
            let container = segments[2].to_string();
            let object = segments[3..].join("/");
            object_scope(
                &mut store,
                &account,
                &container,
                &object,
                &method,
                &parts.headers,
                &query,
                &body,
            )
        }
    }
}

// --- account scope ---

fn account_scope(
    store: &mut Store,
    method: &str,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Response {
    match method {
        "HEAD" => {
            let bytes: usize = store
                .containers
                .values()
                .flat_map(|c| c.objects.values())
                .map(|o| o.data.len())
                .sum();
            let mut out = vec![
                (
                    "X-Account-Container-Count".to_string(),
                    store.containers.len().to_string(),
                ),
                ("X-Account-Bytes-Used".to_string(), bytes.to_string()),
            ];
            out.extend(store.account_meta.iter().map(|(k, v)| (k.clone(), v.clone())));
            respond(StatusCode::NO_CONTENT, &out, Vec::new())
        }
        "GET" => container_listing(store, query),
        "POST" => {
            for (name, value) in meta_headers(headers, "x-account-meta-") {
                store.account_meta.insert(name, value);
            }
            StatusCode::ACCEPTED.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn container_listing(store: &Store, query: &HashMap<String, String>) -> Response {
    let limit = limit_of(query);
    let marker = query.get("marker").map(String::as_str).unwrap_or("");
    let names: Vec<&String> = store
        .containers
        .keys()
        .filter(|name| name.as_str() > marker)
        .take(limit)
        .collect();

    match query.get("format").map(String::as_str).unwrap_or("") {
        "json" => {
            let records: Vec<serde_json::Value> = names
                .iter()
                .map(|name| {
                    let container = &store.containers[*name];
                    serde_json::json!({
                        "name": name,
                        "count": container.objects.len(),
                        "bytes": container.objects.values().map(|o| o.data.len()).sum::<usize>(),
                    })
                })
                .collect();
            json_response(StatusCode::OK, &serde_json::Value::Array(records))
        }
        "xml" => xml_listing("account", names.iter().map(|n| n.as_str())),
        _ => plain_listing(names.iter().map(|n| n.as_str())),
    }
}

// --- container scope ---

fn container_scope(
    store: &mut Store,
    name: &str,
    method: &str,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Response {
    match method {
        "PUT" if query.contains_key("extract-archive") => {
            extract_archive(store, name, "", body, header_str(headers, "accept").unwrap_or(""))
        }
        "PUT" => {
            let meta: HashMap<String, String> =
                meta_headers(headers, "x-container-meta-").into_iter().collect();
            let status = if let Some(container) = store.containers.get_mut(name) {
                container.meta.extend(meta);
                StatusCode::ACCEPTED
            } else {
                store.containers.insert(
                    name.to_string(),
                    Container {
                        meta,
                        objects: BTreeMap::new(),
                    },
                );
                StatusCode::CREATED
            };
            status.into_response()
        }
        "HEAD" => match store.containers.get(name) {
            None => StatusCode::NOT_FOUND.into_response(),
            Some(container) => {
                let bytes: usize = container.objects.values().map(|o| o.data.len()).sum();
                let mut out = vec![
                    (
                        "X-Container-Object-Count".to_string(),
                        container.objects.len().to_string(),
                    ),
                    ("X-Container-Bytes-Used".to_string(), bytes.to_string()),
                ];
                out.extend(container.meta.iter().map(|(k, v)| (k.clone(), v.clone())));
                respond(StatusCode::NO_CONTENT, &out, Vec::new())
            }
        },
        "GET" => match store.containers.get(name) {
            None => StatusCode::NOT_FOUND.into_response(),
            Some(container) => object_listing(container, query),
        },
        "DELETE" => match store.containers.get(name) {
            None => StatusCode::NOT_FOUND.into_response(),
            Some(container) if !container.objects.is_empty() => {
                StatusCode::CONFLICT.into_response()
            }
            Some(_) => {
                store.containers.remove(name);
                StatusCode::NO_CONTENT.into_response()
            }
        },
        "POST" => match store.containers.get_mut(name) {
            None => StatusCode::NOT_FOUND.into_response(),
            Some(container) => {
                for (k, v) in meta_headers(headers, "x-container-meta-") {
                    container.meta.insert(k, v);
                }
                StatusCode::NO_CONTENT.into_response()
            }
        },
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

fn object_listing(container: &Container, query: &HashMap<String, String>) -> Response {
    let limit = limit_of(query);
    let marker = query.get("marker").map(String::as_str).unwrap_or("");
    let prefix = query.get("prefix").map(String::as_str).unwrap_or("");
    let path = query.get("path").map(String::as_str);
    let delimiter = query.get("delimiter").and_then(|d| d.chars().next());

    let mut names: Vec<String> = Vec::new();
    let mut seen_dirs: BTreeSet<String> = BTreeSet::new();
    for name in container.objects.keys() {
        if name.as_str() <= marker || !name.starts_with(prefix) {
            continue;
        }
        if let Some(path) = path {
            // `path` lists direct children of one pseudo-directory.
            let rest = match name.strip_prefix(path).and_then(|r| r.strip_prefix('/')) {
                Some(rest) => rest,
                None => continue,
            };
            if rest.is_empty() || rest.contains('/') {
                continue;
            }
        }
        if let Some(delimiter) = delimiter {
            if let Some(pos) = name[prefix.len()..].find(delimiter) {
                let dir = format!("{}{}", &name[..prefix.len() + pos], delimiter);
                if seen_dirs.insert(dir.clone()) {
                    names.push(dir);
                }
                continue;
            }
        }
        names.push(name.clone());
    }
    names.truncate(limit);

    match query.get("format").map(String::as_str).unwrap_or("") {
        "json" => {
            let records: Vec<serde_json::Value> = names
                .iter()
                .map(|name| match container.objects.get(name) {
                    Some(object) => serde_json::json!({
                        "bytes": object.data.len(),
                        "content_type": object.content_type,
                        "hash": object.etag,
                        "last_modified": object.last_modified,
                        "name": name,
                    }),
                    None => serde_json::json!({ "subdir": name }),
                })
                .collect();
            json_response(StatusCode::OK, &serde_json::Value::Array(records))
        }
        "xml" => xml_listing("container", names.iter().map(|n| n.as_str())),
        _ => plain_listing(names.iter().map(|n| n.as_str())),
    }
}

// --- object scope ---

#[allow(clippy::too_many_arguments)]
fn object_scope(
    store: &mut Store,
    account: &str,
    container: &str,
    object: &str,
    method: &str,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Response {
    match method {
        "PUT" if query.contains_key("extract-archive") => {
            let prefix = format!("{object}/");
            extract_archive(
                store,
                container,
                &prefix,
                body,
                header_str(headers, "accept").unwrap_or(""),
            )
        }
        "PUT" => {
            let Some(entry) = store.containers.get_mut(container) else {
                return StatusCode::NOT_FOUND.into_response();
            };
            let content_type = header_str(headers, "content-type")
                .unwrap_or("application/octet-stream")
                .to_string();
            let meta = meta_headers(headers, "x-object-meta-").into_iter().collect();
            let object_record = stored_object(body.to_vec(), content_type, meta);
            let etag = object_record.etag.clone();
            entry.objects.insert(object.to_string(), object_record);
            respond(
                StatusCode::CREATED,
                &[("Etag".to_string(), etag)],
                Vec::new(),
            )
        }
        "GET" | "HEAD" => {
            let Some(resolved) = resolve(store, account, container, object) else {
                return StatusCode::NOT_FOUND.into_response();
            };
            if let Some(expected) = header_str(headers, "if-match") {
                if expected != resolved.etag {
                    return StatusCode::PRECONDITION_FAILED.into_response();
                }
            }
            if header_str(headers, "if-none-match") == Some(resolved.etag.as_str()) {
                return StatusCode::NOT_MODIFIED.into_response();
            }
            let mut out = vec![
                ("Content-Type".to_string(), resolved.content_type.clone()),
                ("Etag".to_string(), resolved.etag.clone()),
            ];
            out.extend(resolved.meta.iter().map(|(k, v)| (k.clone(), v.clone())));
            let body = if method == "GET" {
                resolved.data.clone()
            } else {
                Vec::new()
            };
            respond(StatusCode::OK, &out, body)
        }
        "DELETE" => {
            let Some(entry) = store.containers.get_mut(container) else {
                return StatusCode::NOT_FOUND.into_response();
            };
            match entry.objects.remove(object) {
                Some(_) => StatusCode::NO_CONTENT.into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }
        "POST" => {
            let Some(record) = store
                .containers
                .get_mut(container)
                .and_then(|c| c.objects.get_mut(object))
            else {
                return StatusCode::NOT_FOUND.into_response();
            };
            record.meta = meta_headers(headers, "x-object-meta-").into_iter().collect();
            StatusCode::NO_CONTENT.into_response()
        }
        "COPY" => {
            let Some(destination) = header_str(headers, "destination") else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            let Some((dest_container, dest_object)) = destination
                .strip_prefix(&format!("/v1/{account}/"))
                .and_then(|rest| rest.split_once('/'))
                .map(|(c, o)| (c.to_string(), o.to_string()))
            else {
                return StatusCode::BAD_REQUEST.into_response();
            };
            let Some(source) = store
                .containers
                .get(container)
                .and_then(|c| c.objects.get(object))
                .cloned()
            else {
                return StatusCode::NOT_FOUND.into_response();
            };
            let Some(target) = store.containers.get_mut(&dest_container) else {
                return StatusCode::NOT_FOUND.into_response();
            };
            target.objects.insert(dest_object, source);
            StatusCode::CREATED.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// Follow one symlink hop (`x-storage/symlink` + `X-Object-Meta-Location`).
fn resolve<'a>(
    store: &'a Store,
    account: &str,
    container: &str,
    object: &str,
) -> Option<&'a StoredObject> {
    let record = store.containers.get(container)?.objects.get(object)?;
    if record.content_type == "x-storage/symlink" {
        let location = record.meta.get("x-object-meta-location")?;
        let rest = location.strip_prefix(&format!("/v1/{account}/"))?;
        let (target_container, target_object) = rest.split_once('/')?;
        return store
            .containers
            .get(target_container)?
            .objects
            .get(target_object);
    }
    Some(record)
}

fn extract_archive(
    store: &mut Store,
    container: &str,
    prefix: &str,
    data: &[u8],
    accept: &str,
) -> Response {
    let mut archive = tar::Archive::new(data);
    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };

    let mut created = Vec::new();
    for entry in entries {
        let Ok(mut entry) = entry else {
            return StatusCode::BAD_REQUEST.into_response();
        };
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let name = match entry.path() {
            Ok(path) => format!("{prefix}{}", path.display()),
            Err(_) => return StatusCode::BAD_REQUEST.into_response(),
        };
        let mut contents = Vec::new();
        if entry.read_to_end(&mut contents).is_err() {
            return StatusCode::BAD_REQUEST.into_response();
        }
        let record = stored_object(contents, "application/octet-stream".to_string(), HashMap::new());
        store
            .containers
            .entry(container.to_string())
            .or_default()
            .objects
            .insert(name.clone(), record);
        created.push(format!("{container}/{name}"));
    }

    if accept.contains("json") {
        json_response(
            StatusCode::CREATED,
            &serde_json::json!({ "Number Files Created": created.len(), "Errors": [] }),
        )
    } else if accept.contains("xml") {
        let items: String = created
            .iter()
            .map(|name| format!("<name>{name}</name>"))
            .collect();
        respond(
            StatusCode::CREATED,
            &[("Content-Type".to_string(), "application/xml".to_string())],
            format!("<?xml version=\"1.0\"?><extract>{items}</extract>").into_bytes(),
        )
    } else {
        respond(
            StatusCode::CREATED,
            &[("Content-Type".to_string(), "text/plain; charset=utf-8".to_string())],
            format!("{}\n", created.join("\n")).into_bytes(),
        )
    }
}

// --- helpers ---

fn temp_url_ok(store: &Store, path: &str, method: &str, query: &HashMap<String, String>) -> bool {
    let (Some(signature), Some(expires)) = (query.get("temp_url_sig"), query.get("temp_url_expires"))
    else {
        return false;
    };
    let Some(key) = store.account_meta.get("x-account-meta-temp-url-key") else {
        return false;
    };
    let Ok(expires_at) = expires.parse::<u64>() else {
        return false;
    };
    if expires_at < unix_now() {
        return false;
    }
    let mut mac =
        Hmac::<Sha1>::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{method}\n{expires_at}\n{path}").as_bytes());
    hex::encode(mac.finalize().into_bytes()) == *signature
}

fn stored_object(
    data: Vec<u8>,
    content_type: String,
    meta: HashMap<String, String>,
) -> StoredObject {
    let etag = format!("{:x}", md5::compute(&data));
    StoredObject {
        data,
        content_type,
        etag,
        meta,
        last_modified: unix_now().to_string(),
    }
}

fn meta_headers(headers: &HeaderMap, prefix: &str) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with(prefix))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    match query {
        Some(query) => url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        None => HashMap::new(),
    }
}

fn limit_of(query: &HashMap<String, String>) -> usize {
    query
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(10_000)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn plain_listing<'a>(names: impl Iterator<Item = &'a str>) -> Response {
    let mut body = String::new();
    for name in names {
        body.push_str(name);
        body.push('\n');
    }
    respond(
        StatusCode::OK,
        &[("Content-Type".to_string(), "text/plain; charset=utf-8".to_string())],
        body.into_bytes(),
    )
}

fn xml_listing<'a>(root: &str, names: impl Iterator<Item = &'a str>) -> Response {
    let items: String = names.map(|name| format!("<name>{name}</name>")).collect();
    respond(
        StatusCode::OK,
        &[("Content-Type".to_string(), "application/xml".to_string())],
        format!("<?xml version=\"1.0\"?><{root}>{items}</{root}>").into_bytes(),
    )
}

fn json_response(status: StatusCode, value: &serde_json::Value) -> Response {
    respond(
        status,
        &[("Content-Type".to_string(), "application/json".to_string())],
        value.to_string().into_bytes(),
    )
}

fn respond(status: StatusCode, headers: &[(String, String)], body: Vec<u8>) -> Response {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
