//! Minimal Drive-compatible provider the server and client talk to during E2E runs.
//! Speaks the same resumable protocol and metadata endpoints as the real one.

use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct Session {
    name: String,
    mime_type: String,
    parents: Vec<String>,
    size: u64,
    data: Vec<u8>,
    chunks: usize,
    object_id: Option<String>,
}

struct Object {
    name: String,
    mime_type: String,
    parents: Vec<String>,
    data: Option<Vec<u8>>,
}

#[derive(Default)]
struct StubState {
    next_id: u64,
    sessions: HashMap<String, Session>,
    objects: HashMap<String, Object>,
}

impl StubState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

#[derive(Clone)]
struct Stub {
    base_url: String,
    state: Arc<Mutex<StubState>>,
}

impl Stub {
    fn with_state<T>(&self, f: impl FnOnce(&mut StubState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

/// Handle to the running stub
pub struct ProviderStub {
    stub: Stub,
    handle: ServerHandle,
}

impl ProviderStub {
    pub async fn start(port: u16) -> Result<Self> {
        let stub = Stub {
            base_url: format!("http://127.0.0.1:{}", port),
            state: Arc::new(Mutex::new(StubState::default())),
        };
        let app_stub = stub.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(app_stub.clone()))
                .app_data(web::PayloadConfig::new(16 * 1024 * 1024))
                .route("/drive/v3/files", web::post().to(create_folder))
                .route("/drive/v3/files/{id}", web::get().to(get_object))
                .route("/drive/v3/files/{id}", web::delete().to(delete_object))
                .route("/upload/drive/v3/files", web::post().to(open_session))
                .route("/upload/sessions/{id}", web::put().to(put_session))
        })
        .workers(1)
        .bind(("127.0.0.1", port))
        .with_context(|| format!("Failed to bind provider stub on port {}", port))?
        .run();
        let handle = server.handle();
        tokio::spawn(server);
        println!("Provider stub listening on {}", stub.base_url);
        Ok(Self { stub, handle })
    }

    /// Chunk count of every finished session, keyed by declared size
    pub fn chunks_by_size(&self) -> HashMap<u64, usize> {
        self.stub.with_state(|state| {
            state
                .sessions
                .values()
                .filter(|s| s.object_id.is_some())
                .map(|s| (s.size, s.chunks))
                .collect()
        })
    }

    pub fn object_count(&self) -> usize {
        self.stub.with_state(|state| state.objects.len())
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

fn authorized(req: &HttpRequest) -> bool {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.starts_with("Bearer "))
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

fn parents_of(body: &Value) -> Vec<String> {
    body.get("parents")
        .and_then(|p| p.as_array())
        .map(|p| {
            p.iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

async fn create_folder(
    req: HttpRequest,
    stub: web::Data<Stub>,
    body: web::Json<Value>,
) -> HttpResponse {
    if !authorized(&req) {
        return HttpResponse::Unauthorized().finish();
    }
    let id = stub.with_state(|state| {
        let id = state.next_id("folder");
        state.objects.insert(
            id.clone(),
            Object {
                name: body["name"].as_str().unwrap_or_default().to_string(),
                mime_type: body["mimeType"].as_str().unwrap_or_default().to_string(),
                parents: parents_of(&body),
                data: None,
            },
        );
        id
    });
    HttpResponse::Ok().json(json!({ "id": id }))
}

async fn open_session(
    req: HttpRequest,
    stub: web::Data<Stub>,
    body: web::Json<Value>,
) -> HttpResponse {
    if !authorized(&req) {
        return HttpResponse::Unauthorized().finish();
    }
    let Some(size) = header(&req, "x-upload-content-length").and_then(|v| v.parse::<u64>().ok())
    else {
        return HttpResponse::BadRequest().body("missing X-Upload-Content-Length");
    };
    let mime_type = header(&req, "x-upload-content-type")
        .unwrap_or("application/octet-stream")
        .to_string();

    let id = stub.with_state(|state| {
        let id = state.next_id("session");
        state.sessions.insert(
            id.clone(),
            Session {
                name: body["name"].as_str().unwrap_or_default().to_string(),
                mime_type,
                parents: parents_of(&body),
                size,
                data: Vec::new(),
                chunks: 0,
                object_id: None,
            },
        );
        id
    });
    HttpResponse::Ok()
        .insert_header(("Location", format!("{}/upload/sessions/{}", stub.base_url, id)))
        .finish()
}

/// `bytes */total` -> None, `bytes s-e/total` -> Some(s)
fn parse_content_range(value: &str) -> Option<(Option<u64>, u64)> {
    let rest = value.strip_prefix("bytes ")?;
    let (span, total) = rest.split_once('/')?;
    let total = total.parse().ok()?;
    if span == "*" {
        return Some((None, total));
    }
    let (start, _) = span.split_once('-')?;
    Some((Some(start.parse().ok()?), total))
}

fn progress_response(held: u64) -> HttpResponse {
    let mut response = HttpResponse::build(StatusCode::PERMANENT_REDIRECT);
    if held > 0 {
        response.insert_header(("Range", format!("bytes=0-{}", held - 1)));
    }
    response.finish()
}

fn object_json(id: &str, object: &Object) -> Value {
    let mut value = json!({
        "id": id,
        "name": object.name,
        "mimeType": object.mime_type,
        "parents": object.parents,
    });
    if let Some(data) = &object.data {
        value["size"] = json!(data.len().to_string());
    }
    value
}

async fn put_session(
    req: HttpRequest,
    stub: web::Data<Stub>,
    path: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    let Some((start, total)) = header(&req, "content-range").and_then(parse_content_range) else {
        return HttpResponse::BadRequest().body("invalid Content-Range");
    };
    let session_id = path.into_inner();

    stub.with_state(|state| {
        let Some(session) = state.sessions.get_mut(&session_id) else {
            return HttpResponse::NotFound().body("session expired");
        };
        if session.size != total {
            return HttpResponse::BadRequest().body("size mismatch");
        }
        if let Some(object_id) = session.object_id.clone() {
            let object = &state.objects[&object_id];
            return HttpResponse::Ok().json(object_json(&object_id, object));
        }

        let held = session.data.len() as u64;
        let Some(start) = start else {
            return progress_response(held);
        };
        if start != held {
            return progress_response(held);
        }
        session.data.extend_from_slice(&body);
        session.chunks += 1;
        let held = session.data.len() as u64;
        if held < session.size {
            return progress_response(held);
        }

        let object = Object {
            name: session.name.clone(),
            mime_type: session.mime_type.clone(),
            parents: session.parents.clone(),
            data: Some(session.data.clone()),
        };
        let object_id = state.next_id("obj");
        let response = object_json(&object_id, &object);
        state.objects.insert(object_id.clone(), object);
        if let Some(session) = state.sessions.get_mut(&session_id) {
            session.object_id = Some(object_id);
        }
        HttpResponse::Ok().json(response)
    })
}

async fn get_object(
    req: HttpRequest,
    stub: web::Data<Stub>,
    path: web::Path<String>,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if !authorized(&req) {
        return HttpResponse::Unauthorized().finish();
    }
    let id = path.into_inner();
    stub.with_state(|state| match state.objects.get(&id) {
        None => HttpResponse::NotFound().finish(),
        Some(object) if query.get("alt").map(String::as_str) == Some("media") => {
            match &object.data {
                Some(data) => HttpResponse::Ok()
                    .content_type(object.mime_type.clone())
                    .body(data.clone()),
                None => HttpResponse::BadRequest().body("folders have no content"),
            }
        }
        Some(object) => HttpResponse::Ok().json(object_json(&id, object)),
    })
}

async fn delete_object(
    req: HttpRequest,
    stub: web::Data<Stub>,
    path: web::Path<String>,
) -> HttpResponse {
    if !authorized(&req) {
        return HttpResponse::Unauthorized().finish();
    }
    let id = path.into_inner();
    stub.with_state(|state| match state.objects.remove(&id) {
        Some(_) => HttpResponse::NoContent().finish(),
        None => HttpResponse::NotFound().finish(),
    })
}
