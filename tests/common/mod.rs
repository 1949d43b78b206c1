#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use artsite::config::Config;
use artsite::db;
use artsite::routes;
use artsite::state::{AppState, DbPool};
use artsite::storage::FileStore;

pub const BOUNDARY: &str = "artsite-test-boundary";

/// A fully wired server backed by a throwaway database and upload tree.
pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub files: FileStore,
    _tmp: TempDir,
}

pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "body is not JSON ({}): {}",
                e,
                String::from_utf8_lossy(&self.body)
            )
        })
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.auth.bcrypt_cost = 4;
        config.database.path = Some(tmp.path().join("test.db"));
        config.storage.path = Some(tmp.path().join("uploads"));
        customize(&mut config);

        let pool = db::create_pool(&config.db_path()).unwrap();
        db::run_migrations(&pool).unwrap();
        let files = FileStore::open(config.uploads_path()).unwrap();

        let state = AppState {
            db: pool.clone(),
            config,
            files: files.clone(),
        };

        TestApp {
            router: routes::app(state),
            pool,
            files,
            _tmp: tmp,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        Response {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> Response {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_multipart(&self, uri: &str, form: Multipart) -> Response {
        let request = Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(form.finish()))
            .unwrap();
        self.send(request).await
    }

    /// Sign up and log in, returning the new account id.
    pub async fn create_account(&self, username: &str) -> i64 {
        let email = format!("{}@example.com", username);
        let res = self
            .post_json(
                "/sign_up",
                serde_json::json!({ "User_name": username, "Email": email, "Password": "pw" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);

        let res = self
            .post_json(
                "/login",
                serde_json::json!({ "Email": email, "Password": "pw" }),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);
        res.json()["id"].as_i64().unwrap()
    }

    pub fn count_rows(&self, table: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    /// Number of files stored for `post_id`; zero when the directory is absent.
    pub fn files_for_post(&self, post_id: i64) -> usize {
        match std::fs::read_dir(self.files.post_dir(post_id)) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

/// Minimal multipart/form-data body builder.
#[derive(Default)]
pub struct Multipart {
    body: Vec<u8>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, file_name: &str, content_type: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"attachments\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}
