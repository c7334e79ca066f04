use crate::fetch::client::HttpClient;
use async_trait::async_trait;

/// An [`HttpClient`] wrapper that sends an API key as a URL query parameter.
///
/// Discovery documents sometimes list feed URLs that already carry the key
/// (or a stale one); any existing value for `param_name` is replaced so the
/// parameter appears exactly once.
pub struct UrlParam<C> {
    inner: C,
    param_name: String,
    key: String,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            inner,
            param_name: param_name.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let kept: Vec<(String, String)> = req
            .url()
            .query_pairs()
            .filter(|(name, _)| name != self.param_name.as_str())
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        {
            let mut pairs = req.url_mut().query_pairs_mut();
            pairs.clear();
            pairs.extend_pairs(kept);
            pairs.append_pair(&self.param_name, &self.key);
        }

        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{Client, Method, Request, Response, Url};
    use std::sync::Mutex;

    /// Records the URL of each request instead of sending it.
    #[derive(Default)]
    struct Capture(Mutex<Vec<String>>);

    #[async_trait]
    impl HttpClient for Capture {
        async fn execute(&self, req: Request) -> reqwest::Result<Response> {
            self.0.lock().unwrap().push(req.url().to_string());
            // An unparseable URL fails in the builder, before any I/O.
            Client::new().get("not a url").send().await
        }
    }

    #[tokio::test]
    async fn test_request_runs_on_spawned_task() {
        let client = std::sync::Arc::new(UrlParam::new(Capture::default(), "key", "k"));
        let task = std::sync::Arc::clone(&client);
        tokio::spawn(async move {
            let url = Url::parse("https://gbfs.test/gbfs.json").unwrap();
            let _ = task.execute(Request::new(Method::GET, url)).await;
        })
        .await
        .unwrap();

        let seen = client.inner.0.lock().unwrap();
        assert_eq!(seen[0], "https://gbfs.test/gbfs.json?key=k");
    }

    #[tokio::test]
    async fn test_replaces_existing_key() {
        let client = UrlParam::new(Capture::default(), "key", "fresh");
        let url = Url::parse("https://gbfs.test/en/station_status.json?key=stale&lang=en").unwrap();
        let _ = client.execute(Request::new(Method::GET, url)).await;

        let seen = client.inner.0.lock().unwrap();
        assert_eq!(
            seen[0],
            "https://gbfs.test/en/station_status.json?lang=en&key=fresh"
        );
    }
}
