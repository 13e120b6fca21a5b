use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::EnvoyConfig;
use super::FetchError;
use crate::portforward::PortForwarder;

/// Port of the sidecar proxy admin API inside the pod.
pub const ADMIN_PORT: u16 = 19000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for talking to a forwarded admin API.
///
/// System proxies are bypassed since the tunnel always ends on loopback.
pub fn admin_client() -> Result<reqwest::Client, Report<FetchError>> {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .change_context(FetchError::Client)
}

/// Open `forwarder`, read the configuration dump through it and close it again.
///
/// The tunnel is closed on every path once it has been opened.
///
/// # Errors
///
/// - [`FetchError::Tunnel`] if the tunnel cannot be opened
/// - [`FetchError::Cancelled`] if `cancel` fires during the request
/// - [`FetchError::Request`] if the admin API is unreachable or answers with an error status
/// - [`FetchError::Decode`] if the response is not a configuration dump
pub async fn fetch_config<F: PortForwarder>(
    cancel: &CancellationToken,
    forwarder: &mut F,
    http: &reqwest::Client,
) -> Result<EnvoyConfig, Report<FetchError>> {
    let address = forwarder
        .open(cancel)
        .await
        .change_context(FetchError::Tunnel)?;

    let result = select! {
        biased;
        _ = cancel.cancelled() => Err(Report::new(FetchError::Cancelled)),
        config = request_config(http, &address) => config,
    };

    forwarder.close();
    result
}

async fn request_config(http: &reqwest::Client, address: &str) -> Result<EnvoyConfig, Report<FetchError>> {
    let url = format!("http://{address}/config_dump?include_eds");
    debug!(%url, "Requesting proxy configuration");

    let body = http
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .change_context_lazy(|| FetchError::Request { url: url.clone() })?
        .bytes()
        .await
        .change_context_lazy(|| FetchError::Request { url: url.clone() })?;
    debug!(bytes = body.len(), "Received proxy configuration");

    EnvoyConfig::parse(&body).change_context(FetchError::Decode)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;
    use test_log::test;
    use tokio::io::AsyncReadExt;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use super::*;
    use crate::portforward::PortForwardError;

    const CONFIG_DUMP: &str = include_str!("testdata/config_dump.json");

    /// Hands out a fixed address and counts lifecycle calls.
    struct StaticForwarder {
        address: Option<String>,
        opened: usize,
        closed: usize,
    }

    impl StaticForwarder {
        fn new(address: Option<String>) -> Self {
            Self {
                address,
                opened: 0,
                closed: 0,
            }
        }
    }

    impl PortForwarder for StaticForwarder {
        async fn open(&mut self, _cancel: &CancellationToken) -> Result<String, Report<PortForwardError>> {
            self.opened += 1;
            self.address.clone().ok_or_else(|| {
                Report::new(PortForwardError::Dial {
                    target: "default/web:19000".to_string(),
                })
            })
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    /// Answer exactly one HTTP request; yields its request line.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (request_tx, request_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let n = conn.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let request_line = String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string();
            let _ = request_tx.send(request_line);

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            conn.write_all(response.as_bytes()).await.unwrap();
            conn.shutdown().await.unwrap();
        });

        (address, request_rx)
    }

    #[test(tokio::test)]
    async fn fetches_dump_and_closes_tunnel() {
        let (address, request_line) = serve_once("200 OK", CONFIG_DUMP).await;
        let mut forwarder = StaticForwarder::new(Some(address));

        let config = fetch_config(&CancellationToken::new(), &mut forwarder, &admin_client().unwrap())
            .await
            .unwrap();

        assert_eq!(
            request_line.await.unwrap(),
            "GET /config_dump?include_eds HTTP/1.1"
        );
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(forwarder.opened, 1);
        assert_eq!(forwarder.closed, 1);
    }

    #[test(tokio::test)]
    async fn error_status_closes_tunnel() {
        let (address, _request_line) = serve_once("500 Internal Server Error", "boom").await;
        let mut forwarder = StaticForwarder::new(Some(address));

        let err = fetch_config(&CancellationToken::new(), &mut forwarder, &admin_client().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err.current_context(), FetchError::Request { url } if url.ends_with("/config_dump?include_eds")));
        assert_eq!(forwarder.closed, 1);
    }

    #[test(tokio::test)]
    async fn malformed_dump_is_a_decode_error() {
        let (address, _request_line) = serve_once("200 OK", "{\"configs\": 7}").await;
        let mut forwarder = StaticForwarder::new(Some(address));

        let err = fetch_config(&CancellationToken::new(), &mut forwarder, &admin_client().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err.current_context(), FetchError::Decode));
        assert_eq!(forwarder.closed, 1);
    }

    #[test(tokio::test)]
    async fn tunnel_failure_skips_close() {
        let mut forwarder = StaticForwarder::new(None);

        let err = fetch_config(&CancellationToken::new(), &mut forwarder, &admin_client().unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err.current_context(), FetchError::Tunnel));
        assert_eq!(forwarder.opened, 1);
        assert_eq!(forwarder.closed, 0);
    }
}
