//! Outbound transport
//!
//! A [`Connector`] builds one connection context per session. The context
//! keeps a `reqwest::Client` pinned to the endpoint its [`EgressRoute`] is
//! bound to and replaces it when the route is rebound, so pooled keep-alive
//! connections never outlive a rotation. Every client routes all traffic
//! through its proxy; there is no direct fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tracing::{debug, instrument};

use crate::error::{RelayError, Result};
use crate::models::{ProxyEndpoint, UpstreamResponse};
use crate::relay::session::EgressRoute;

/// A live connection context
#[async_trait]
pub trait Connection: Send + Sync {
    /// Issue a body-less GET to `url`
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<UpstreamResponse>;
}

/// Factory for connection contexts
pub trait Connector: Send + Sync {
    fn connect(&self, route: Arc<EgressRoute>) -> Result<Arc<dyn Connection>>;
}

/// Connector backed by `reqwest`, one client per bound endpoint
#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl ReqwestConnector {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    /// Client that sends everything through `endpoint`
    fn client_for(&self, endpoint: &ProxyEndpoint) -> Result<reqwest::Client> {
        let proxy = reqwest::Proxy::all(endpoint.url().clone()).map_err(|e| {
            RelayError::InvalidProxyAddress(format!("{}: {}", endpoint.name, e))
        })?;

        reqwest::Client::builder()
            .proxy(proxy)
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| RelayError::Internal(format!("Failed to build HTTP client: {}", e)))
    }
}

impl Default for ReqwestConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), Duration::from_secs(30))
    }
}

impl Connector for ReqwestConnector {
    fn connect(&self, route: Arc<EgressRoute>) -> Result<Arc<dyn Connection>> {
        let endpoint = route.current();
        let client = self.client_for(&endpoint)?;

        Ok(Arc::new(ReqwestConnection {
            connector: self.clone(),
            route,
            bound: Mutex::new((endpoint, client)),
        }))
    }
}

struct ReqwestConnection {
    connector: ReqwestConnector,
    route: Arc<EgressRoute>,
    bound: Mutex<(Arc<ProxyEndpoint>, reqwest::Client)>,
}

impl ReqwestConnection {
    /// Client for the route's current endpoint, rebuilt after a rebind
    fn client(&self) -> Result<(Arc<ProxyEndpoint>, reqwest::Client)> {
        let endpoint = self.route.current();
        let mut bound = self.bound.lock();

        if !Arc::ptr_eq(&bound.0, &endpoint) {
            debug!(from = %bound.0, to = %endpoint, "Rebinding connection");
            let client = self.connector.client_for(&endpoint)?;
            *bound = (endpoint, client);
        }

        Ok((bound.0.clone(), bound.1.clone()))
    }
}

#[async_trait]
impl Connection for ReqwestConnection {
    #[instrument(skip(self, headers))]
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<UpstreamResponse> {
        let (endpoint, client) = self.client()?;

        let response = client.get(url).headers(headers.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        debug!(proxy = %endpoint.name, "Upstream responded {} ({} bytes)", status, body.len());
        Ok(UpstreamResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    const TARGET: &str = "http://catalog.test/search/car/list/general?count=true";

    /// Local forward proxy that answers every request itself with
    /// `{"via":"<tag>"}` and keeps connections alive
    #[derive(Clone)]
    struct LocalProxy {
        addr: SocketAddr,
        hits: Arc<AtomicUsize>,
        requests: Arc<Mutex<Vec<(String, Option<String>)>>>,
    }

    impl LocalProxy {
        async fn spawn(tag: &'static str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let proxy = Self {
                addr: listener.local_addr().unwrap(),
                hits: Arc::new(AtomicUsize::new(0)),
                requests: Arc::new(Mutex::new(Vec::new())),
            };

            let server = proxy.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(server.clone().serve_http(stream, tag));
                }
            });
            proxy
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }

        /// (request line, proxy-authorization) per request
        fn requests(&self) -> Vec<(String, Option<String>)> {
            self.requests.lock().clone()
        }

        async fn serve_http(self, stream: TcpStream, tag: &'static str) {
            let mut reader = BufReader::new(stream);
            loop {
                let mut request_line = String::new();
                let mut proxy_auth = None;
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {}
                    }
                    if line == "\r\n" {
                        break;
                    }
                    if request_line.is_empty() {
                        request_line = line.trim_end().to_string();
                    } else if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("proxy-authorization") {
                            proxy_auth = Some(value.trim().to_string());
                        }
                    }
                }

                self.hits.fetch_add(1, Ordering::SeqCst);
                self.requests.lock().push((request_line, proxy_auth));

                let body = format!("{{\"via\":\"{}\"}}", tag);
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                if reader.get_mut().write_all(response.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    }

    fn local_endpoint(name: &str, scheme: &str, addr: SocketAddr) -> Arc<ProxyEndpoint> {
        let mut endpoint =
            ProxyEndpoint::from_url(&format!("{}://relay:s3cret@{}", scheme, addr)).unwrap();
        endpoint.name = name.to_string();
        Arc::new(endpoint)
    }

    fn body(response: &UpstreamResponse) -> &[u8] {
        &response.body[..]
    }

    #[tokio::test]
    async fn test_requests_leave_through_the_bound_proxy() {
        let proxy = LocalProxy::spawn("A").await;
        let route = Arc::new(EgressRoute::new(local_endpoint("a", "http", proxy.addr)));
        let connection = ReqwestConnector::default().connect(route).unwrap();

        let response = connection.get(TARGET, &HeaderMap::new()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(body(&response), br#"{"via":"A"}"#);

        let requests = proxy.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].0.starts_with("GET http://catalog.test/search/car/list/general"));
        assert_eq!(requests[0].1.as_deref(), Some("Basic cmVsYXk6czNjcmV0"));
    }

    #[tokio::test]
    async fn test_rebind_switches_proxy_despite_keep_alive() {
        let a = LocalProxy::spawn("A").await;
        let b = LocalProxy::spawn("B").await;
        let endpoint_a = local_endpoint("a", "http", a.addr);
        let route = Arc::new(EgressRoute::new(endpoint_a.clone()));
        let connection = ReqwestConnector::default().connect(route.clone()).unwrap();

        let first = connection.get(TARGET, &HeaderMap::new()).await.unwrap();
        assert_eq!(body(&first), br#"{"via":"A"}"#);

        route.rebind(local_endpoint("b", "http", b.addr));
        let second = connection.get(TARGET, &HeaderMap::new()).await.unwrap();
        assert_eq!(body(&second), br#"{"via":"B"}"#);

        route.rebind(endpoint_a);
        let third = connection.get(TARGET, &HeaderMap::new()).await.unwrap();
        assert_eq!(body(&third), br#"{"via":"A"}"#);

        assert_eq!(a.hits(), 2);
        assert_eq!(b.hits(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_proxy_never_goes_direct() {
        let target = LocalProxy::spawn("DIRECT").await;
        let dead = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let route = Arc::new(EgressRoute::new(local_endpoint("dead", "http", dead)));
        let connection = ReqwestConnector::new(Duration::from_secs(2), Duration::from_secs(5))
            .connect(route)
            .unwrap();

        let result = connection
            .get(&format!("http://{}/list", target.addr), &HeaderMap::new())
            .await;

        assert!(result.is_err());
        assert_eq!(target.hits(), 0);
    }

    /// SOCKS5 server with username/password auth that serves HTTP itself
    async fn spawn_socks5() -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let log = log.clone();
                tokio::spawn(async move {
                    let mut head = [0u8; 2];
                    stream.read_exact(&mut head).await.ok()?;
                    let mut methods = vec![0u8; head[1] as usize];
                    stream.read_exact(&mut methods).await.ok()?;
                    stream.write_all(&[5, 2]).await.ok()?;

                    // RFC 1929 username/password
                    let mut ulen = [0u8; 2];
                    stream.read_exact(&mut ulen).await.ok()?;
                    let mut user = vec![0u8; ulen[1] as usize];
                    stream.read_exact(&mut user).await.ok()?;
                    let mut plen = [0u8; 1];
                    stream.read_exact(&mut plen).await.ok()?;
                    let mut pass = vec![0u8; plen[0] as usize];
                    stream.read_exact(&mut pass).await.ok()?;
                    stream.write_all(&[1, 0]).await.ok()?;

                    let mut request = [0u8; 4];
                    stream.read_exact(&mut request).await.ok()?;
                    let target = match request[3] {
                        3 => {
                            let mut len = [0u8; 1];
                            stream.read_exact(&mut len).await.ok()?;
                            let mut host = vec![0u8; len[0] as usize];
                            stream.read_exact(&mut host).await.ok()?;
                            String::from_utf8_lossy(&host).into_owned()
                        }
                        1 => {
                            let mut ip = [0u8; 4];
                            stream.read_exact(&mut ip).await.ok()?;
                            std::net::Ipv4Addr::from(ip).to_string()
                        }
                        _ => return None,
                    };
                    let mut port = [0u8; 2];
                    stream.read_exact(&mut port).await.ok()?;
                    stream.write_all(&[5, 0, 0, 1, 0, 0, 0, 0, 0, 0]).await.ok()?;

                    log.lock().push(format!(
                        "{}:{}@{}",
                        String::from_utf8_lossy(&user),
                        String::from_utf8_lossy(&pass),
                        target
                    ));

                    let mut reader = BufReader::new(stream);
                    let mut line = String::new();
                    while reader.read_line(&mut line).await.ok()? > 0 && line != "\r\n" {
                        line.clear();
                    }
                    let body = r#"{"via":"SOCKS"}"#;
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    reader.get_mut().write_all(response.as_bytes()).await.ok()
                });
            }
        });

        (addr, seen)
    }

    #[tokio::test]
    async fn test_socks5h_endpoint_tunnels_with_credentials() {
        let (addr, seen) = spawn_socks5().await;
        let route = Arc::new(EgressRoute::new(local_endpoint("socks", "socks5h", addr)));
        let connection = ReqwestConnector::default().connect(route).unwrap();

        let response = connection.get(TARGET, &HeaderMap::new()).await.unwrap();
        assert_eq!(body(&response), br#"{"via":"SOCKS"}"#);
        assert_eq!(seen.lock().clone(), vec!["relay:s3cret@catalog.test".to_string()]);
    }
}
