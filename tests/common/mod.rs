use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;

use shiftdesk::cache::CacheService;
use shiftdesk::config::AppConfig;
use shiftdesk::server::{AppState, create_router};
use shiftdesk::store::MemoryStore;

pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Starts an in-process server over the in-memory store on an
    /// ephemeral port.
    pub async fn start() -> Self {
        let state = Arc::new(AppState {
            store: Arc::new(MemoryStore::new()),
            cache: Arc::new(CacheService::new()),
            config: AppConfig::for_tests(),
        });
        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .expect("serve");
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Registers an account and returns its bearer token.
    pub async fn register(&self, username: &str) -> String {
        let resp: Value = self
            .client
            .post(self.url("/api/register"))
            .json(&serde_json::json!({
                "username": username,
                "password": "hunter22",
                "email": format!("{username}@example.com"),
            }))
            .send()
            .await
            .expect("register")
            .json()
            .await
            .expect("parse register response");
        resp["token"].as_str().expect("token").to_string()
    }
}
