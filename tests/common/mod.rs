#![allow(dead_code)]

use std::net::SocketAddr;

use askroom::{AppState, Config, Hub, Store};
use tokio::net::TcpListener;

pub const ADMIN_PASSWORD: &str = "hunter2";

pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Store,
    pub hub: Hub,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(Self::config()).await
    }

    pub fn config() -> Config {
        Config {
            admin_password: Some(ADMIN_PASSWORD.to_owned()),
            ..Config::default()
        }
    }

    pub async fn spawn_with(config: Config) -> Self {
        let store = Store::memory().await.unwrap();
        let state = AppState::new(store.clone(), config);
        let hub = state.hub.clone();
        let app = askroom::app(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self { addr, store, hub }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder().cookie_store(true).build().unwrap()
    }

    /// A client whose cookie jar holds an admin session.
    pub async fn admin(&self) -> reqwest::Client {
        let client = self.client();
        let res = client
            .post(self.url("/admin/login"))
            .json(&serde_json::json!({ "password": ADMIN_PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        client
    }
}
