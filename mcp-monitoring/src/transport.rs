//! HTTP transport for probes
//!
//! Probes talk to servers through [`ProbeTransport`]. The production
//! implementation is [`HttpTransport`]: one `reqwest` client per protocol,
//! each gated by that protocol's connection pool and resolving host names
//! through the DNS cache namespace.

use crate::error::{ProbeError, TransportErrorKind};
use crate::optimizer::{ConnectionPool, TtlLruCache};
use crate::result::ProbePath;
use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use serde_json::Value;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// One outbound probe request
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub path: ProbePath,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl ProbeRequest {
    pub fn get(path: ProbePath, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path,
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn post(path: ProbePath, url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            path,
            method: HttpMethod::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
            timeout,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }
}

/// Raw HTTP answer; interpretation is left to the probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl ProbeResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends probe requests
///
/// Dropping the returned future aborts the request and releases its
/// connection.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse, ProbeError>;
}

/// `reqwest` resolver backed by the DNS cache namespace
pub struct CachingResolver {
    cache: Arc<TtlLruCache<String, Vec<SocketAddr>>>,
}

impl CachingResolver {
    pub fn new(cache: Arc<TtlLruCache<String, Vec<SocketAddr>>>) -> Self {
        Self { cache }
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(lookup(self.cache.clone(), name.as_str().to_string()))
    }
}

async fn lookup(
    cache: Arc<TtlLruCache<String, Vec<SocketAddr>>>,
    host: String,
) -> Result<Addrs, Box<dyn StdError + Send + Sync>> {
    if let Some(addrs) = cache.get(&host) {
        trace!(host = %host, "DNS cache hit");
        return Ok(Box::new(addrs.into_iter()));
    }
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
    if !addrs.is_empty() {
        cache.insert(host, addrs.clone());
    }
    Ok(Box::new(addrs.into_iter()))
}

/// Production transport over HTTP(S)
pub struct HttpTransport {
    rpc: (reqwest::Client, Arc<ConnectionPool>),
    rest: (reqwest::Client, Arc<ConnectionPool>),
}

impl HttpTransport {
    pub fn new(
        rpc_pool: Arc<ConnectionPool>,
        rest_pool: Arc<ConnectionPool>,
        dns_cache: Arc<TtlLruCache<String, Vec<SocketAddr>>>,
    ) -> Result<Self, reqwest::Error> {
        let resolver = Arc::new(CachingResolver::new(dns_cache));
        let rpc_client = rpc_pool.client_builder().dns_resolver(resolver.clone()).build()?;
        let rest_client = rest_pool.client_builder().dns_resolver(resolver).build()?;
        Ok(Self {
            rpc: (rpc_client, rpc_pool),
            rest: (rest_client, rest_pool),
        })
    }

    fn route(&self, path: ProbePath) -> &(reqwest::Client, Arc<ConnectionPool>) {
        match path {
            ProbePath::Rpc => &self.rpc,
            ProbePath::Rest => &self.rest,
        }
    }
}

#[async_trait]
impl ProbeTransport for HttpTransport {
    async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        let url = url::Url::parse(&request.url).map_err(|e| {
            ProbeError::transport(TransportErrorKind::Other, format!("invalid url: {e}"))
        })?;
        let host = url.host_str().unwrap_or_default().to_string();

        let (client, pool) = self.route(request.path);
        let _lease = pool.acquire(&host).await?;

        let mut builder = match request.method {
            HttpMethod::Get => client.get(url),
            HttpMethod::Post => client.post(url),
        };
        builder = builder.timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = read_body(response, pool.config().max_body_bytes).await?;

        Ok(ProbeResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Read the body, failing once it grows past `limit` bytes
async fn read_body(mut response: reqwest::Response, limit: usize) -> Result<String, ProbeError> {
    let oversized = || ProbeError::validation(format!("response body exceeds {limit} bytes"));
    if response
        .content_length()
        .is_some_and(|len| len > limit as u64)
    {
        return Err(oversized());
    }
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
        if bytes.len() + chunk.len() > limit {
            return Err(oversized());
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn map_reqwest_error(err: reqwest::Error) -> ProbeError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        let detail = format!("{err:?}").to_lowercase();
        if detail.contains("dns") || detail.contains("resolve") || detail.contains("lookup") {
            TransportErrorKind::Dns
        } else {
            TransportErrorKind::ConnectionRefused
        }
    } else {
        TransportErrorKind::Other
    };
    ProbeError::transport(kind, err.to_string())
}
