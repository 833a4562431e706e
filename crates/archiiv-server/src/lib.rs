//! HTTP server for Archiiv.
//!
//! Serves the record store over an authenticated JSON API: `/auth/*` for
//! sessions, `/fs/*` for the file graph and `/v1/*` for service status.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod response;
pub mod router;
pub mod server;
pub mod state;
pub mod users;

pub use auth::{AllowAll, AuthProvider, Authorizer, Credentials, Identity, MetaAuthorizer, TokenAuth};
pub use config::{ServerConfig, SECRET_ENV};
pub use error::{ServerError, ServerResult};
pub use response::Envelope;
pub use server::ArchiivServer;
pub use state::AppState;
pub use users::UserStore;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use archiiv_crypto::TokenSecret;
    use archiiv_store::{init_store_dir, RecordStore};
    use archiiv_types::RecordId;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    struct TestApp {
        _dir: tempfile::TempDir,
        router: Router,
        root: RecordId,
    }

    impl TestApp {
        fn new() -> Self {
            Self::with_authorizer(Arc::new(MetaAuthorizer))
        }

        fn with_authorizer(authorizer: Arc<dyn Authorizer>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let layout = init_store_dir(dir.path()).unwrap();
            let store = Arc::new(RecordStore::open(&layout.fs_root, layout.root).unwrap());
            let users = Arc::new(UserStore::load(&layout.users_path).unwrap());
            users.create_user("marek", "123").unwrap();
            users.create_user("pub", "abc").unwrap();
            let auth = TokenAuth::new(TokenSecret::generate(), Duration::from_secs(600), users);
            let state = AppState::new(store, Arc::new(auth), authorizer);
            let router = router::build_router(state, &ServerConfig::default());
            Self {
                _dir: dir,
                router,
                root: layout.root,
            }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>, Option<String>) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .map(|v| v.to_str().unwrap().to_string());
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, body.to_vec(), content_type)
        }

        async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
            let (status, body, _) = self.send(request).await;
            (status, serde_json::from_slice(&body).unwrap())
        }

        async fn login(&self, username: &str, password: &str) -> String {
            let (status, body) = self
                .json(
                    Request::post("/auth/login")
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(
                            json!({"username": username, "password": password}).to_string(),
                        ))
                        .unwrap(),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["data"]["token"].as_str().unwrap().to_string()
        }

        async fn get(&self, token: &str, uri: &str) -> (StatusCode, Value) {
            self.json(
                Request::get(uri)
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
        }

        async fn post(&self, token: &str, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
            self.json(
                Request::post(uri)
                    .header(header::AUTHORIZATION, token)
                    .body(body.into())
                    .unwrap(),
            )
            .await
        }

        async fn touch(&self, token: &str, parent: RecordId, name: &str) -> RecordId {
            let (status, body) = self
                .post(token, &format!("/fs/touch/{parent}/{name}"), Body::empty())
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["data"]["new_file_uuid"].as_str().unwrap().parse().unwrap()
        }

        async fn mkdir(&self, token: &str, parent: RecordId, name: &str) -> RecordId {
            let (status, body) = self
                .post(token, &format!("/fs/mkdir/{parent}/{name}"), Body::empty())
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
            body["data"]["new_dir_uuid"].as_str().unwrap().parse().unwrap()
        }

        async fn ls(&self, token: &str, id: RecordId) -> Vec<String> {
            let (status, body) = self.get(token, &format!("/fs/ls/{id}")).await;
            assert_eq!(status, StatusCode::OK, "{body}");
            serde_json::from_value(body["data"].clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = TestApp::new();
        let (status, body) = app
            .json(Request::get("/v1/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn info_endpoint() {
        let app = TestApp::new();
        let (status, body) = app
            .json(Request::get("/v1/info").body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["root"], app.root.to_string());
    }

    #[tokio::test]
    async fn login_and_whoami() {
        let app = TestApp::new();
        let token = app.login("marek", "123").await;
        let (status, body) = app.get(&token, "/auth/whoami").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "marek");
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = TestApp::new();
        let (status, body) = app
            .json(
                Request::post("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"username":"marek","password":"x"}"#))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn malformed_login_is_bad_request() {
        let app = TestApp::new();
        let (status, body) = app
            .json(
                Request::post("/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{"))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn fs_requires_token() {
        let app = TestApp::new();
        let (status, body) = app
            .json(
                Request::get(format!("/fs/ls/{}", app.root))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);

        let (status, _) = app.get("garbage", &format!("/fs/ls/{}", app.root)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn touch_upload_cat() {
        let app = TestApp::new();
        let token = app.login("marek", "123").await;
        let file = app.touch(&token, app.root, "notes").await;
        assert_eq!(app.ls(&token, app.root).await, vec![file.to_string()]);

        let (status, body) = app
            .post(&token, &format!("/fs/upload/{file}/data"), "hello")
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, bytes, content_type) = app
            .send(
                Request::get(format!("/fs/cat/{file}/data"))
                    .header(header::AUTHORIZATION, &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"hello");
        assert_eq!(content_type.as_deref(), Some("application/octet-stream"));

        let (_, _, content_type) = app
            .send(
                Request::get(format!("/fs/cat/{file}/meta"))
                    .header(header::AUTHORIZATION, &token)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn stat_reports_record() {
        let app = TestApp::new();
        let token = app.login("marek", "123").await;
        let dir = app.mkdir(&token, app.root, "photos").await;
        let (status, body) = app.get(&token, &format!("/fs/stat/{dir}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "photos");
        assert_eq!(body["data"]["is_dir"], true);
        assert_eq!(body["data"]["ref_count"], 1);

        let (status, body) = app.get(&token, "/fs/root").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["root"], app.root.to_string());
    }

    #[tokio::test]
    async fn mount_unmount_and_collect() {
        let app = TestApp::new();
        let token = app.login("marek", "123").await;
        let dir = app.mkdir(&token, app.root, "second").await;
        let file = app.touch(&token, app.root, "x").await;

        let (status, _) = app
            .post(&token, &format!("/fs/mount/{dir}/{file}"), Body::empty())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.ls(&token, dir).await, vec![file.to_string()]);

        let (status, body) = app
            .post(&token, &format!("/fs/mount/{dir}/{file}"), Body::empty())
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["ok"], false);

        for parent in [app.root, dir] {
            let (status, _) = app
                .post(&token, &format!("/fs/unmount/{parent}/{file}"), Body::empty())
                .await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, _) = app.get(&token, &format!("/fs/stat/{file}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cycle_mount_is_conflict() {
        let app = TestApp::new();
        let token = app.login("marek", "123").await;
        let a = app.mkdir(&token, app.root, "a").await;
        let b = app.mkdir(&token, a, "b").await;
        let (status, _) = app
            .post(&token, &format!("/fs/mount/{b}/{a}"), Body::empty())
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn traversal_section_is_bad_request() {
        let app = TestApp::new();
        let token = app.login("marek", "123").await;
        let file = app.touch(&token, app.root, "x").await;
        let (status, body) = app
            .get(&token, &format!("/fs/cat/{file}/..%2Fetc%2Fpasswd"))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["ok"], false);
    }

    #[tokio::test]
    async fn bad_id_is_bad_request() {
        let app = TestApp::new();
        let token = app.login("marek", "123").await;
        let (status, _) = app.get(&token, "/fs/ls/not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let app = TestApp::new();
        let token = app.login("marek", "123").await;
        let (status, _) = app.get(&token, &format!("/fs/ls/{}", RecordId::new())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn other_users_are_forbidden() {
        let app = TestApp::new();
        let marek = app.login("marek", "123").await;
        let other = app.login("pub", "abc").await;
        let file = app.touch(&marek, app.root, "private").await;

        let (status, body) = app
            .post(&other, &format!("/fs/upload/{file}/data"), "mine now")
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["ok"], false);
        let (status, _) = app.get(&other, &format!("/fs/ls/{file}")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // The root has no metadata, so everyone may add to it.
        app.touch(&other, app.root, "public").await;
    }

    #[tokio::test]
    async fn owner_can_share_through_meta() {
        let app = TestApp::new();
        let marek = app.login("marek", "123").await;
        let other = app.login("pub", "abc").await;
        let file = app.touch(&marek, app.root, "shared").await;

        let mut meta = archiiv_store::FileMeta::owned_by(file, "marek", "text/plain");
        meta.grant("pub", archiiv_types::Capability::Read);
        let (status, body) = app
            .post(
                &marek,
                &format!("/fs/upload/{file}/meta"),
                serde_json::to_vec(&meta).unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, _) = app.get(&other, &format!("/fs/stat/{file}")).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .post(&other, &format!("/fs/upload/{file}/meta"), serde_json::to_vec(&meta).unwrap())
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn invalid_meta_upload_is_rejected() {
        let app = TestApp::new();
        let token = app.login("marek", "123").await;
        let file = app.touch(&token, app.root, "x").await;
        let (status, _) = app
            .post(&token, &format!("/fs/upload/{file}/meta"), "not json")
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let foreign = archiiv_store::FileMeta::owned_by(RecordId::new(), "marek", "");
        let (status, _) = app
            .post(
                &token,
                &format!("/fs/upload/{file}/meta"),
                serde_json::to_vec(&foreign).unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn allow_all_skips_meta() {
        let app = TestApp::with_authorizer(Arc::new(AllowAll));
        let marek = app.login("marek", "123").await;
        let other = app.login("pub", "abc").await;
        let file = app.touch(&marek, app.root, "x").await;
        let (status, _) = app
            .post(&other, &format!("/fs/upload/{file}/data"), "ok")
            .await;
        assert_eq!(status, StatusCode::OK);
    }
}
