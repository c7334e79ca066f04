use super::client::HttpClient;
use async_trait::async_trait;

const USER_AGENT: &str = concat!("gbfs_watch/", env!("CARGO_PKG_VERSION"));

/// Plain `reqwest` client. Timeouts are applied per request by the fetcher.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .unwrap_or_default();
        Self(client)
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}
