use std::io::{Read, Write};

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::{Deserialize, Serialize};
use serde_json::json;

use archiiv_store::{FileMeta, RecordInfo, RecordStore, StoreError};
use archiiv_types::{Capability, RecordId, SectionName};

use crate::auth::{Authorizer, Identity};
use crate::error::{ServerError, ServerResult};
use crate::response::{self, Envelope, NewDir, NewFile};
use crate::state::AppState;

type ApiResult<T> = ServerResult<Json<Envelope<T>>>;

const DIRECTORY_TYPE: &str = "inode/directory";

fn parse_id(raw: &str) -> ServerResult<RecordId> {
    Ok(RecordId::parse(raw)?)
}

fn content_type_for(section: &SectionName) -> &'static str {
    match section.as_str() {
        SectionName::META => "application/json",
        SectionName::THUMB => "image/webp",
        _ => "application/octet-stream",
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "data": { "status": "ok" } }))
}

pub async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "data": {
            "name": "archiiv-server",
            "version": env!("CARGO_PKG_VERSION"),
            "root": state.store.root(),
        }
    }))
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let Json(request) = body.map_err(|e| ServerError::BadRequest(format!("invalid json: {e}")))?;
    let token = state.auth.login(&request.username, &request.password).await?;
    Ok(response::ok(TokenResponse { token }))
}

pub async fn whoami(Extension(identity): Extension<Identity>) -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "data": { "name": identity.name } }))
}

// ---------------------------------------------------------------------------
// File system
// ---------------------------------------------------------------------------

pub async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "ok": true, "data": { "root": state.store.root() } }))
}

pub async fn stat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<RecordInfo> {
    let id = parse_id(&id)?;
    let info = state
        .blocking(move |store, authorizer| {
            authorizer.authorize(store, &identity, id, Capability::Read)?;
            Ok(store.record_info(id)?)
        })
        .await?;
    Ok(response::ok(info))
}

pub async fn ls(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> ApiResult<Vec<RecordId>> {
    let id = parse_id(&id)?;
    let children = state
        .blocking(move |store, authorizer| {
            authorizer.authorize(store, &identity, id, Capability::Read)?;
            Ok(store.get_children(id)?)
        })
        .await?;
    Ok(response::ok(children))
}

pub async fn cat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, section)): Path<(String, String)>,
) -> ServerResult<Response> {
    let id = parse_id(&id)?;
    let section = SectionName::new(section)?;
    let content_type = content_type_for(&section);

    let bytes = state
        .blocking(move |store, authorizer| {
            authorizer.authorize(store, &identity, id, Capability::Read)?;
            let mut file = store.open_section(id, section.as_str())?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)
                .map_err(|e| StoreError::io(format!("read section {id}.{section}"), e))?;
            Ok(buf)
        })
        .await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub async fn upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((id, section)): Path<(String, String)>,
    body: Bytes,
) -> ServerResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let section = SectionName::new(section)?;

    // Rewriting `meta` rewrites permissions, so only owners may do it, and
    // only with well-formed metadata for this record.
    let required = if section.as_str() == SectionName::META {
        let meta = FileMeta::decode(&body)
            .map_err(|e| ServerError::BadRequest(format!("invalid metadata: {e}")))?;
        if meta.id != id {
            return Err(ServerError::BadRequest(format!(
                "metadata describes {}, not {id}",
                meta.id
            )));
        }
        Capability::Owner
    } else {
        Capability::Write
    };

    state
        .blocking(move |store, authorizer| {
            authorizer.authorize(store, &identity, id, required)?;
            let mut file = store.create_section(id, section.as_str())?;
            file.write_all(&body)
                .map_err(|e| StoreError::io(format!("write section {id}.{section}"), e))?;
            tracing::debug!(%id, %section, bytes = body.len(), "section uploaded");
            Ok(())
        })
        .await?;
    Ok(response::done())
}

/// Create a record and hand it to its creator.
fn create_owned(
    store: &RecordStore,
    authorizer: &dyn Authorizer,
    identity: &Identity,
    parent: RecordId,
    name: &str,
    is_dir: bool,
) -> ServerResult<RecordId> {
    authorizer.authorize(store, identity, parent, Capability::Write)?;
    let id = store.make_record(parent, name, is_dir)?;
    let content_type = if is_dir { DIRECTORY_TYPE } else { "" };
    if let Err(e) = FileMeta::owned_by(id, &identity.name, content_type).save(store) {
        // A record without metadata is open to everyone; do not leave one.
        if let Err(undo) = store.unmount(parent, id) {
            tracing::warn!(%id, error = %undo, "could not remove record after failed metadata write");
        }
        return Err(e.into());
    }
    Ok(id)
}

pub async fn touch(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((parent, name)): Path<(String, String)>,
) -> ApiResult<NewFile> {
    let parent = parse_id(&parent)?;
    let id = state
        .blocking(move |store, authorizer| {
            create_owned(store, authorizer, &identity, parent, &name, false)
        })
        .await?;
    Ok(response::ok(NewFile { new_file_uuid: id }))
}

pub async fn mkdir(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((parent, name)): Path<(String, String)>,
) -> ApiResult<NewDir> {
    let parent = parse_id(&parent)?;
    let id = state
        .blocking(move |store, authorizer| {
            create_owned(store, authorizer, &identity, parent, &name, true)
        })
        .await?;
    Ok(response::ok(NewDir { new_dir_uuid: id }))
}

pub async fn mount(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((parent, child)): Path<(String, String)>,
) -> ServerResult<Json<serde_json::Value>> {
    let parent = parse_id(&parent)?;
    let child = parse_id(&child)?;
    state
        .blocking(move |store, authorizer| {
            authorizer.authorize(store, &identity, parent, Capability::Write)?;
            Ok(store.mount(parent, child)?)
        })
        .await?;
    Ok(response::done())
}

pub async fn unmount(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((parent, child)): Path<(String, String)>,
) -> ServerResult<Json<serde_json::Value>> {
    let parent = parse_id(&parent)?;
    let child = parse_id(&child)?;
    state
        .blocking(move |store, authorizer| {
            authorizer.authorize(store, &identity, parent, Capability::Write)?;
            Ok(store.unmount(parent, child)?)
        })
        .await?;
    Ok(response::done())
}
