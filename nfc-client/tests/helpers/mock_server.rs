//! nfc-mock running in-process on an ephemeral port

use nfc_mock::{build_router, AppState, MockConfig};
use std::net::SocketAddr;
use tokio::task::JoinHandle;

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: AppState,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(config: MockConfig) -> Self {
        let state = AppState::new(config);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let app = build_router(state.clone());
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, handle }
    }

    /// Zero latency, 20 ms push period
    pub async fn instant() -> Self {
        Self::start(MockConfig::instant()).await
    }

    pub fn api_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
