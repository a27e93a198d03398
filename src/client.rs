//! API client with a read-through, write-through response cache
//!
//! Every call goes through the same routine: consult the cache under the request
//! path, and on a miss build the request, send it, validate the status, decode
//! the body and write the decoded value back before returning it. All failures
//! come back as [`ApiError`].
//!
//! Concurrent calls for the same path that both miss will both hit the network
//! and both write (last write wins) unless single-flight is enabled, in which
//! case concurrent GETs for one key share a single transport call.

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResponseCache;
use crate::error::ApiError;
use crate::http::{
    build_request, validate, AuthProvider, BearerToken, Method, NoAuth, PreparedRequest,
    ReqwestTransport, Transport,
};
use crate::single_flight::SingleFlight;

/// Settings for an [`ApiClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for every request path, e.g. `https://api.example.com/v1`
    pub base_url: String,
    /// Upper bound on a single transport call
    pub timeout: Option<Duration>,
    /// Coalesce concurrent GETs for the same cache key
    pub single_flight: bool,
    /// Sent as `Authorization: Bearer <token>` when set
    pub bearer_token: Option<String>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Some(Duration::from_secs(30)),
            single_flight: false,
            bearer_token: None,
        }
    }
}

/// HTTP API client that caches decoded responses
pub struct ApiClient<C: ResponseCache> {
    base_url: String,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
    cache: C,
    timeout: Option<Duration>,
    flights: Option<SingleFlight<Bytes>>,
}

impl<C: ResponseCache> ApiClient<C> {
    /// Creates a client that talks to the network through `reqwest`
    pub fn new(config: ClientConfig, cache: C) -> Self {
        Self::with_transport(config, cache, Arc::new(ReqwestTransport::new()))
    }

    /// Creates a client over a custom transport
    pub fn with_transport(config: ClientConfig, cache: C, transport: Arc<dyn Transport>) -> Self {
        let auth: Arc<dyn AuthProvider> = match config.bearer_token {
            Some(token) => Arc::new(BearerToken::new(token)),
            None => Arc::new(NoAuth),
        };

        Self {
            base_url: config.base_url,
            transport,
            auth,
            cache,
            timeout: config.timeout,
            flights: config.single_flight.then(SingleFlight::new),
        }
    }

    /// Replaces the authentication header provider
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// GETs `path` and decodes the response into `T`
    ///
    /// With `invalidate_cache` set, the cached entry for `path` is dropped first,
    /// forcing a network fetch.
    pub async fn get<T>(
        &self,
        path: &str,
        query: &[(String, String)],
        invalidate_cache: bool,
    ) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
    {
        if invalidate_cache {
            self.cache.invalidate(path);
        }
        self.fetch::<T, ()>(Method::Get, path, query, None).await
    }

    /// POSTs `body` as JSON to `path` and decodes the response into `T`
    ///
    /// The response is cached under `path` with the same policy as GET.
    pub async fn post<T, B>(
        &self,
        path: &str,
        body: &B,
        query: &[(String, String)],
    ) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.fetch(Method::Post, path, query, Some(body)).await
    }

    /// Removes every entry in this client's cache namespace
    pub fn clear_all_cache(&self) {
        self.cache.clear_all();
    }

    /// Closes the cache, flushing durable state
    pub fn shutdown(self) {
        self.cache.close();
    }

    async fn fetch<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
        B: Serialize + ?Sized,
    {
        if let Some(cached) = self.cache.read::<T>(path)? {
            return Ok(cached);
        }

        let request = build_request(method, &self.base_url, path, &self.auth.headers(), query, body)?;
        let body = match (&self.flights, method) {
            // Keyed on the full URL: requests that differ only in query must not share a body.
            (Some(flights), Method::Get) => {
                let key = request.url.to_string();
                flights.run(&key, self.send(request)).await?
            }
            _ => self.send(request).await?,
        };

        let value: T =
            serde_json::from_slice(&body).map_err(|e| ApiError::DecodeFailure(e.to_string()))?;
        self.cache.write(&value, path);
        Ok(value)
    }

    fn send(&self, request: PreparedRequest) -> BoxFuture<'static, Result<Bytes, ApiError>> {
        send_checked(Arc::clone(&self.transport), request, self.timeout).boxed()
    }
}

/// Sends `request` and returns the body of a successful response
async fn send_checked(
    transport: Arc<dyn Transport>,
    request: PreparedRequest,
    timeout: Option<Duration>,
) -> Result<Bytes, ApiError> {
    tracing::debug!(method = %request.method, url = %request.url, "Sending request");
    let call = transport.send(request);
    let response = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| ApiError::TransportFailure(format!("request timed out after {limit:?}")))??,
        None => call.await?,
    };

    if let Err(e) = validate(&response) {
        tracing::warn!(status = ?response.status, error = %e, "Request failed");
        return Err(e);
    }
    Ok(response.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{NullCache, ObjectCache};
    use crate::http::{RawResponse, TransportError};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u32,
        name: String,
    }

    /// Replays one canned result and records what was sent
    struct StubTransport {
        calls: AtomicUsize,
        result: Result<RawResponse, TransportError>,
        delay: Duration,
        last_request: Mutex<Option<PreparedRequest>>,
    }

    impl StubTransport {
        fn replying(status: u16, body: &str) -> Arc<Self> {
            Self::with(Ok(RawResponse::new(status, body.to_string())), Duration::ZERO)
        }

        fn with(result: Result<RawResponse, TransportError>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result,
                delay,
                last_request: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    fn user_json() -> &'static str {
        r#"{"id": 1, "name": "Ada"}"#
    }

    fn ada() -> User {
        User {
            id: 1,
            name: "Ada".to_string(),
        }
    }

    fn create_test_client(
        transport: Arc<StubTransport>,
        config: ClientConfig,
    ) -> (ApiClient<ObjectCache>, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = ObjectCache::with_dir(temp_dir.path().to_path_buf(), Duration::from_secs(60));
        (ApiClient::with_transport(config, cache, transport), temp_dir)
    }

    fn config() -> ClientConfig {
        ClientConfig::new("https://api.example.com")
    }

    #[tokio::test]
    async fn test_get_uses_cache_after_first_fetch() {
        let transport = StubTransport::replying(200, user_json());
        let (client, _temp_dir) = create_test_client(transport.clone(), config());

        let first: User = client.get("/users/1", &[], false).await.expect("first get");
        let second: User = client.get("/users/1", &[], false).await.expect("second get");

        assert_eq!(first, ada());
        assert_eq!(second, ada());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_get_with_invalidate_refetches() {
        let transport = StubTransport::replying(200, user_json());
        let (client, _temp_dir) = create_test_client(transport.clone(), config());

        let _: User = client.get("/users/1", &[], false).await.expect("first get");
        let _: User = client.get("/users/1", &[], true).await.expect("second get");

        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_failed_status_is_not_cached() {
        let transport = StubTransport::replying(404, "{}");
        let (client, _temp_dir) = create_test_client(transport.clone(), config());

        let result = client.get::<User>("/users/9", &[], false).await;

        assert_eq!(result, Err(ApiError::NotFound));
        assert!(!client.cache().entry_path("/users/9").exists());
    }

    #[tokio::test]
    async fn test_undecodable_body_is_decode_failure() {
        let transport = StubTransport::replying(200, "[1, 2, 3]");
        let (client, _temp_dir) = create_test_client(transport.clone(), config());

        let result = client.get::<User>("/users/1", &[], false).await;

        assert!(matches!(result, Err(ApiError::DecodeFailure(_))));
        assert!(!client.cache().entry_path("/users/1").exists());
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_decode_failure() {
        let transport = StubTransport::replying(200, user_json());
        let (client, _temp_dir) = create_test_client(transport.clone(), config());
        let _: User = client.get("/users/1", &[], false).await.expect("first get");
        std::fs::write(client.cache().entry_path("/users/1"), "{ broken").expect("Should write");

        let result = client.get::<User>("/users/1", &[], false).await;

        assert!(matches!(result, Err(ApiError::DecodeFailure(_))));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_transport_failure() {
        let transport = StubTransport::with(Err(TransportError::new("connection refused")), Duration::ZERO);
        let (client, _temp_dir) = create_test_client(transport, config());

        let result = client.get::<User>("/users/1", &[], false).await;

        assert_eq!(
            result,
            Err(ApiError::TransportFailure("connection refused".to_string()))
        );
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure_and_leaves_cache_untouched() {
        let transport = StubTransport::with(
            Ok(RawResponse::new(200, user_json().to_string())),
            Duration::from_millis(200),
        );
        let mut config = config();
        config.timeout = Some(Duration::from_millis(20));
        let (client, _temp_dir) = create_test_client(transport, config);

        let result = client.get::<User>("/users/1", &[], false).await;

        assert!(matches!(result, Err(ApiError::TransportFailure(_))));
        assert!(!client.cache().entry_path("/users/1").exists());
    }

    #[tokio::test]
    async fn test_post_sends_body_and_caches_under_path() {
        let transport = StubTransport::replying(200, user_json());
        let (client, _temp_dir) = create_test_client(transport.clone(), config());

        let created: User = client
            .post("/users", &serde_json::json!({"name": "Ada"}), &[])
            .await
            .expect("post");
        let cached: User = client.get("/users", &[], false).await.expect("get");

        assert_eq!(created, cached);
        assert_eq!(transport.calls(), 1);
        let sent = transport.last_request.lock().unwrap().clone().expect("request sent");
        assert_eq!(sent.method, Method::Post);
        assert_eq!(sent.body.as_deref(), Some(br#"{"name":"Ada"}"#.as_slice()));
    }

    #[tokio::test]
    async fn test_invalid_target_never_reaches_transport() {
        let transport = StubTransport::replying(200, user_json());
        let (client, _temp_dir) = create_test_client(transport.clone(), ClientConfig::new("nope"));

        let result = client.get::<User>("/users/1", &[], false).await;

        assert!(matches!(result, Err(ApiError::InvalidTarget(_))));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_bearer_token_and_query_reach_transport() {
        let transport = StubTransport::replying(200, user_json());
        let mut config = config();
        config.bearer_token = Some("t0ken".to_string());
        let (client, _temp_dir) = create_test_client(transport.clone(), config);

        let query = vec![("expand".to_string(), "true".to_string())];
        let _: User = client.get("/users/1", &query, false).await.expect("get");

        let sent = transport.last_request.lock().unwrap().clone().expect("request sent");
        assert_eq!(sent.url.as_str(), "https://api.example.com/users/1?expand=true");
        assert_eq!(sent.headers["authorization"], "Bearer t0ken");
    }

    #[tokio::test]
    async fn test_null_cache_always_fetches() {
        let transport = StubTransport::replying(200, user_json());
        let client = ApiClient::with_transport(config(), NullCache, transport.clone());

        let _: User = client.get("/users/1", &[], false).await.expect("first get");
        let _: User = client.get("/users/1", &[], false).await.expect("second get");

        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_clear_all_cache_forces_refetch() {
        let transport = StubTransport::replying(200, user_json());
        let (client, _temp_dir) = create_test_client(transport.clone(), config());

        let _: User = client.get("/users/1", &[], false).await.expect("first get");
        client.clear_all_cache();
        let _: User = client.get("/users/1", &[], false).await.expect("second get");

        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_without_single_flight_fetch_twice() {
        let transport = StubTransport::with(
            Ok(RawResponse::new(200, user_json().to_string())),
            Duration::from_millis(50),
        );
        let (client, _temp_dir) = create_test_client(transport.clone(), config());

        let (a, b) = tokio::join!(
            client.get::<User>("/users/1", &[], false),
            client.get::<User>("/users/1", &[], false),
        );

        assert_eq!(a, Ok(ada()));
        assert_eq!(b, Ok(ada()));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_with_single_flight_fetch_once() {
        let transport = StubTransport::with(
            Ok(RawResponse::new(200, user_json().to_string())),
            Duration::from_millis(50),
        );
        let mut config = config();
        config.single_flight = true;
        let (client, _temp_dir) = create_test_client(transport.clone(), config);

        let (a, b) = tokio::join!(
            client.get::<User>("/users/1", &[], false),
            client.get::<User>("/users/1", &[], false),
        );

        assert_eq!(a, Ok(ada()));
        assert_eq!(b, Ok(ada()));
        assert_eq!(transport.calls(), 1);
    }

    /// Answers with the `page` query parameter it was sent, after a delay
    struct PageEchoTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for PageEchoTransport {
        async fn send(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let page = request
                .url
                .query_pairs()
                .find(|(name, _)| name == "page")
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(RawResponse::new(200, format!(r#"{{"page": "{page}"}}"#)))
        }
    }

    #[tokio::test]
    async fn test_single_flight_keeps_queries_apart() {
        let transport = Arc::new(PageEchoTransport {
            calls: AtomicUsize::new(0),
        });
        let mut config = config();
        config.single_flight = true;
        let client = ApiClient::with_transport(config, NullCache, transport.clone());

        let page = |n: &str| vec![("page".to_string(), n.to_string())];
        let (page1, page2) = (page("1"), page("2"));
        let (first, second) = tokio::join!(
            client.get::<serde_json::Value>("/items", &page1, false),
            client.get::<serde_json::Value>("/items", &page2, false),
        );

        assert_eq!(first, Ok(serde_json::json!({"page": "1"})));
        assert_eq!(second, Ok(serde_json::json!({"page": "2"})));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }
}
