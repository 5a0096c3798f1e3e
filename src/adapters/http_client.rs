use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tracing::Instrument;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

const USER_AGENT: &str = concat!("Zentro-Gateway/", env!("CARGO_PKG_VERSION"));

/// HTTP client adapter using Hyper with Rustls.
///
/// Responsibilities:
/// * Sets a default `User-Agent` when the client sent none
/// * Fills in `Host` from the target only when the inbound request carried none
/// * Sends HTTP/1.1 upstream and converts the hyper body back to an Axum body
///
/// Retries and timeouts belong to the caller.
#[derive(Clone)]
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter.
    pub fn new() -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();
        for cert in native_certs.certs {
            if root_cert_store.add(cert).is_err() {
                tracing::warn!("Failed to add native certificate to rustls RootCertStore");
            }
        }
        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }
        tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);
        Ok(Self { client })
    }

    fn prepare(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let Some(host) = req.uri().host() else {
            return Err(HttpClientError::InvalidRequest(format!(
                "Outgoing URI has no host: {}",
                req.uri()
            )));
        };

        if !req.headers().contains_key(header::HOST) {
            let value = match req.uri().port_u16() {
                Some(port) => HeaderValue::from_str(&format!("{host}:{port}")),
                None => HeaderValue::from_str(host),
            }
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;
            req.headers_mut().insert(header::HOST, value);
        }

        if !req.headers().contains_key(header::USER_AGENT) {
            req.headers_mut()
                .insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        }
        *req.version_mut() = Version::HTTP_11;
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::prepare(&mut req)?;

        let span = tracing::debug_span!(
            "upstream_send",
            http.method = %req.method(),
            http.uri = %req.uri(),
        );
        let method = req.method().clone();
        let uri = req.uri().clone();

        match self.client.request(req).instrument(span).await {
            Ok(response) => {
                let (mut parts, hyper_body) = response.into_parts();
                // The body is re-framed by the downstream server.
                parts.headers.remove(header::TRANSFER_ENCODING);
                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => {
                tracing::debug!(method = %method, uri = %uri, error = %e, "Upstream request failed");
                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method} {uri} failed: {e}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        assert!(HttpClientAdapter::new().is_ok());
    }

    #[test]
    fn test_prepare_keeps_inbound_host() {
        let mut req = Request::builder()
            .uri("http://10.0.0.5:9000/users")
            .header(header::HOST, "public.example.com")
            .body(AxumBody::empty())
            .unwrap();
        HttpClientAdapter::prepare(&mut req).unwrap();
        assert_eq!(req.headers()[header::HOST], "public.example.com");
        assert_eq!(req.headers()[header::USER_AGENT], USER_AGENT);
        assert_eq!(req.version(), Version::HTTP_11);
    }

    #[test]
    fn test_prepare_fills_missing_host() {
        let mut req = Request::builder()
            .uri("http://10.0.0.5:9000/users")
            .body(AxumBody::empty())
            .unwrap();
        HttpClientAdapter::prepare(&mut req).unwrap();
        assert_eq!(req.headers()[header::HOST], "10.0.0.5:9000");
    }

    #[tokio::test]
    async fn test_relative_uri_is_rejected() {
        let client = HttpClientAdapter::new().unwrap();
        let req = Request::builder().uri("/relative").body(AxumBody::empty()).unwrap();
        let result = client.send_request(req).await;
        assert!(matches!(result, Err(HttpClientError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_a_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClientAdapter::new().unwrap();
        let req = Request::builder()
            .uri(format!("http://{addr}/"))
            .body(AxumBody::empty())
            .unwrap();
        let result = client.send_request(req).await;
        assert!(matches!(result, Err(HttpClientError::ConnectionError(_))));
    }
}
