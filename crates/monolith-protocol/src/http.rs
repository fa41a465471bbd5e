//! Minimal HTTP/1.1 GET client over hyper, with rustls for `https`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, HOST, USER_AGENT};
use http::{Request, StatusCode, Uri};
use http_body_util::{BodyExt, Empty};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use monolith_core::ProbeError;
use rustls::pki_types::ServerName;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

const CLIENT_USER_AGENT: &str = concat!("monolith/", env!("CARGO_PKG_VERSION"));

/// Errors building an HTTP client.
#[derive(Debug, Error)]
pub enum ClientSetupError {
    #[error("tls setup failed: {0}")]
    Tls(#[from] rustls::Error),
}

/// GET-only HTTP client with a per-request deadline.
///
/// Every error is reported against the endpoint address the request was
/// made to, so failover logs name the endpoint rather than the full URL.
#[derive(Clone)]
pub struct HttpClient {
    tls: Arc<rustls::ClientConfig>,
    timeout: Duration,
}

impl HttpClient {
    /// Client trusting the Mozilla root store.
    pub fn new(timeout: Duration) -> Result<Self, ClientSetupError> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(
            rustls::crypto::ring::default_provider().into(),
        )
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Self {
            tls: Arc::new(config),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `address` + `path_and_query` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        address: &str,
        path_and_query: &str,
        headers: &[(&str, &str)],
    ) -> Result<T, ProbeError> {
        let body = self.get(address, path_and_query, headers).await?;
        serde_json::from_slice(&body)
            .map_err(|e| ProbeError::protocol(address, format!("invalid JSON response: {e}")))
    }

    /// GET `address` + `path_and_query`, returning the body of a 2xx response.
    pub async fn get(
        &self,
        address: &str,
        path_and_query: &str,
        headers: &[(&str, &str)],
    ) -> Result<Bytes, ProbeError> {
        let url = format!("{address}{path_and_query}");
        let uri: Uri = url
            .parse()
            .map_err(|e| ProbeError::protocol(address, format!("invalid url '{url}': {e}")))?;

        match tokio::time::timeout(self.timeout, self.send(address, &uri, headers)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%url, "http request timed out");
                Err(ProbeError::timeout(address, self.timeout))
            }
        }
    }

    async fn send(
        &self,
        address: &str,
        uri: &Uri,
        headers: &[(&str, &str)],
    ) -> Result<Bytes, ProbeError> {
        let https = match uri.scheme_str() {
            Some("https") => true,
            Some("http") | None => false,
            Some(other) => {
                return Err(ProbeError::protocol(
                    address,
                    format!("unsupported scheme '{other}'"),
                ));
            }
        };
        let host = uri
            .host()
            .ok_or_else(|| ProbeError::protocol(address, "url has no host"))?;
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        let authority = uri.authority().map(|a| a.as_str()).unwrap_or(host);
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");

        let mut builder = Request::builder()
            .method("GET")
            .uri(path)
            .header(HOST, authority)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::protocol(address, e))?;

        let stream = TcpStream::connect((host.trim_matches(['[', ']']), port))
            .await
            .map_err(|e| ProbeError::unreachable(address, e))?;

        let response = if https {
            let server_name = ServerName::try_from(host.to_string())
                .map_err(|e| ProbeError::protocol(address, format!("invalid tls server name: {e}")))?;
            let tls = TlsConnector::from(Arc::clone(&self.tls))
                .connect(server_name, stream)
                .await
                .map_err(|e| ProbeError::unreachable(address, format!("tls handshake failed: {e}")))?;
            exchange(address, tls, request).await?
        } else {
            exchange(address, stream, request).await?
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ProbeError::protocol(
                address,
                format!("authentication rejected (HTTP {})", status.as_u16()),
            ));
        }
        if !status.is_success() {
            return Err(ProbeError::protocol(
                address,
                format!("unexpected HTTP status {}", status.as_u16()),
            ));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProbeError::unreachable(address, format!("failed reading body: {e}")))?;
        Ok(body.to_bytes())
    }
}

async fn exchange<S>(
    address: &str,
    stream: S,
    request: Request<Empty<Bytes>>,
) -> Result<http::Response<Incoming>, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .map_err(|e| ProbeError::unreachable(address, format!("http handshake failed: {e}")))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "http connection closed with error");
        }
    });

    sender
        .send_request(request)
        .await
        .map_err(|e| ProbeError::unreachable(address, format!("request failed: {e}")))
}
