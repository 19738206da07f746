//! WebSocket tunnel.
//!
//! Dials the backend with tokio-tungstenite, accepts the client upgrade once
//! the backend answered, then pumps messages both ways until either side
//! closes.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{FromRequestParts, Request, WebSocketUpgrade};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::MaybeTlsStream;

use portcullis_core::RewriteResult;

use super::ProxyError;
use crate::error::GateError;

type BackendSocket = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A tunnel to one backend WebSocket URL.
#[derive(Debug, Clone)]
pub struct WsTunnel {
    target: String,
    connect_timeout: Duration,
    forwarded: Vec<HeaderName>,
}

impl WsTunnel {
    /// Create a tunnel to `target` (`ws://` or `wss://`).
    ///
    /// `User-Agent`, `Cookie`, `Origin` and `Sec-WebSocket-Protocol` are
    /// copied to the backend handshake.
    #[must_use]
    pub fn new(target: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            target: target.into(),
            connect_timeout,
            forwarded: vec![
                header::USER_AGENT,
                header::COOKIE,
                header::ORIGIN,
                header::SEC_WEBSOCKET_PROTOCOL,
            ],
        }
    }

    /// Also copy `names` from the client request to the backend handshake.
    #[must_use]
    pub fn forward_headers<I>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = HeaderName>,
    {
        self.forwarded.extend(names);
        self
    }

    /// The backend URL for a rewritten host and request URI.
    ///
    /// A URL rule keeps its scheme (`https` becomes `wss`, anything else
    /// `ws`) and port; without one the backend is assumed to speak `wss`.
    #[must_use]
    pub fn target_for(result: &RewriteResult, uri: &Uri) -> String {
        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        if !result.has_url() {
            return format!("wss://{}{path}", result.host);
        }
        let scheme = if result.scheme == "https" { "wss" } else { "ws" };
        let mut target = format!("{scheme}://{}", result.host);
        if !result.port.is_empty() {
            target.push(':');
            target.push_str(&result.port);
        }
        target.push_str(path);
        target
    }

    /// The backend URL.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Dial the backend, then upgrade the client connection and start
    /// tunnelling. The client is answered 502 if the backend cannot be
    /// reached.
    pub async fn handle(&self, req: Request) -> Response {
        let (mut parts, _body) = req.into_parts();
        let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(ws) => ws,
            Err(rejection) => return rejection.into_response(),
        };

        let (backend, protocol) = match self.connect(&parts.headers).await {
            Ok(connected) => connected,
            Err(e) => return GateError::from(e).into_response(),
        };
        let ws = match protocol {
            Some(protocol) => ws.protocols([protocol]),
            None => ws,
        };

        let target = self.target.clone();
        tracing::debug!(url = %target, "Connected to backend, upgrading client");
        ws.on_upgrade(move |socket| tunnel(socket, backend, target))
    }

    /// Open the backend socket. Returns it with the subprotocol the backend
    /// selected, if any.
    async fn connect(
        &self,
        headers: &HeaderMap,
    ) -> Result<(BackendSocket, Option<String>), ProxyError> {
        let mut request =
            self.target
                .as_str()
                .into_client_request()
                .map_err(|e| ProxyError::InvalidUrl {
                    url: self.target.clone(),
                    reason: e.to_string(),
                })?;

        for name in &self.forwarded {
            for value in headers.get_all(name) {
                request.headers_mut().append(name.clone(), value.clone());
            }
        }
        request
            .headers_mut()
            .insert("x-forwarded-proto", HeaderValue::from_static("https"));

        let (socket, response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| ProxyError::Transport(format!("timeout connecting to {}", self.target)))?
                .map_err(|e| ProxyError::Transport(format!("websocket {}: {e}", self.target)))?;

        let protocol = response
            .headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        Ok((socket, protocol))
    }
}

/// Pump messages between the upgraded client and the backend.
async fn tunnel(client_socket: WebSocket, backend_socket: BackendSocket, target: String) {
    let (client_write, client_read) = client_socket.split();
    let (backend_write, backend_read) = backend_socket.split();

    tokio::select! {
        result = client_to_backend(client_read, backend_write) => {
            if let Err(e) = result {
                tracing::debug!(url = %target, error = %e, "Client to backend forward ended");
            }
        }
        result = backend_to_client(backend_read, client_write) => {
            if let Err(e) = result {
                tracing::debug!(url = %target, error = %e, "Backend to client forward ended");
            }
        }
    }

    tracing::debug!(url = %target, "WebSocket tunnel ended");
}

async fn client_to_backend(
    mut client_read: SplitStream<WebSocket>,
    mut backend_write: SplitSink<BackendSocket, TungsteniteMessage>,
) -> Result<(), String> {
    while let Some(msg) = client_read.next().await {
        let msg = msg.map_err(|e| format!("error reading from client: {e}"))?;
        let forwarded = match msg {
            Message::Text(text) => TungsteniteMessage::Text(text),
            Message::Binary(data) => TungsteniteMessage::Binary(data),
            Message::Ping(data) => TungsteniteMessage::Ping(data),
            Message::Pong(data) => TungsteniteMessage::Pong(data),
            Message::Close(_) => {
                let _ = backend_write.send(TungsteniteMessage::Close(None)).await;
                break;
            }
        };
        backend_write
            .send(forwarded)
            .await
            .map_err(|e| format!("failed to send to backend: {e}"))?;
    }
    Ok(())
}

async fn backend_to_client(
    mut backend_read: SplitStream<BackendSocket>,
    mut client_write: SplitSink<WebSocket, Message>,
) -> Result<(), String> {
    while let Some(msg) = backend_read.next().await {
        let msg = msg.map_err(|e| format!("error reading from backend: {e}"))?;
        let forwarded = match msg {
            TungsteniteMessage::Text(text) => Message::Text(text),
            TungsteniteMessage::Binary(data) => Message::Binary(data),
            TungsteniteMessage::Ping(data) => Message::Ping(data),
            TungsteniteMessage::Pong(data) => Message::Pong(data),
            TungsteniteMessage::Close(_) => {
                let _ = client_write.send(Message::Close(None)).await;
                break;
            }
            TungsteniteMessage::Frame(_) => continue,
        };
        client_write
            .send(forwarded)
            .await
            .map_err(|e| format!("failed to send to client: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::Router;
    use parking_lot::Mutex;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request as HandshakeRequest, Response as HandshakeResponse,
    };
    use tokio_tungstenite::tungstenite::Error as WsError;

    use super::*;

    fn rewrite(host: &str, scheme: &str, port: &str, full_url: &str) -> RewriteResult {
        RewriteResult {
            host: host.to_string(),
            scheme: scheme.to_string(),
            port: port.to_string(),
            full_url: full_url.to_string(),
        }
    }

    /// Serve `tunnel` for every request on a local port.
    async fn serve(tunnel: WsTunnel) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app: Router =
            Router::new().fallback(move |req: Request| async move { tunnel.handle(req).await });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// A backend that echoes data frames, selects the `chat` subprotocol
    /// and records the handshake headers.
    async fn echo_backend() -> (SocketAddr, Arc<Mutex<Option<HeaderMap>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(None));
        let record = Arc::clone(&seen);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = move |req: &HandshakeRequest,
                                 mut resp: HandshakeResponse|
                  -> Result<HandshakeResponse, ErrorResponse> {
                *record.lock() = Some(req.headers().clone());
                resp.headers_mut()
                    .insert(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("chat"));
                Ok(resp)
            };
            let mut socket = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            while let Some(Ok(msg)) = socket.next().await {
                if (msg.is_text() || msg.is_binary()) && socket.send(msg).await.is_err() {
                    break;
                }
            }
        });

        (addr, seen)
    }

    #[test]
    fn targets() {
        let uri: Uri = "/socket?x=1".parse().unwrap();

        let bare = RewriteResult::unchanged("chat.example.net");
        assert_eq!(
            WsTunnel::target_for(&bare, &uri),
            "wss://chat.example.net/socket?x=1"
        );

        let https = rewrite("chat.modern", "https", "8443", "https://modern:8443");
        assert_eq!(
            WsTunnel::target_for(&https, &uri),
            "wss://chat.modern:8443/socket?x=1"
        );

        let http = rewrite("chat.modern", "http", "", "http://modern");
        assert_eq!(
            WsTunnel::target_for(&http, &uri),
            "ws://chat.modern/socket?x=1"
        );
    }

    #[tokio::test]
    async fn non_upgradable_request_is_rejected() {
        let tunnel = WsTunnel::new("ws://127.0.0.1:1/", Duration::from_secs(1));
        let req = Request::builder()
            .uri("/")
            .header(header::UPGRADE, "websocket")
            .body(Body::empty())
            .unwrap();
        let response = tunnel.handle(req).await;
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
    }

    #[tokio::test]
    async fn unreachable_backend_is_bad_gateway() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = closed.local_addr().unwrap();
        drop(closed);

        let gateway = serve(WsTunnel::new(format!("ws://{dead}/"), Duration::from_secs(2))).await;

        match tokio_tungstenite::connect_async(format!("ws://{gateway}/")).await {
            Err(WsError::Http(response)) => {
                assert_eq!(response.status().as_u16(), 502);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("client upgrade accepted without a backend"),
        }
    }

    #[tokio::test]
    async fn tunnel_relays_messages_and_headers() {
        let (backend, seen) = echo_backend().await;
        let tunnel = WsTunnel::new(format!("ws://{backend}/socket"), Duration::from_secs(2))
            .forward_headers([HeaderName::from_static("portcullis-user")]);
        let gateway = serve(tunnel).await;

        let mut request = format!("ws://{gateway}/socket").into_client_request().unwrap();
        let headers = request.headers_mut();
        headers.insert(header::COOKIE, HeaderValue::from_static("portcullis=sealed"));
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://chat.example.net"));
        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("chat"));
        headers.insert("portcullis-user", HeaderValue::from_static("cloud@user.com"));

        let (mut client, response) = tokio_tungstenite::connect_async(request).await.unwrap();
        assert_eq!(response.headers()[header::SEC_WEBSOCKET_PROTOCOL], "chat");

        client
            .send(TungsteniteMessage::Text("ping".into()))
            .await
            .unwrap();
        let echoed = client.next().await.unwrap().unwrap();
        assert_eq!(echoed, TungsteniteMessage::Text("ping".into()));

        let handshake = seen.lock().clone().unwrap();
        assert_eq!(handshake["portcullis-user"], "cloud@user.com");
        assert_eq!(handshake[header::COOKIE], "portcullis=sealed");
        assert_eq!(handshake[header::ORIGIN], "https://chat.example.net");
        assert_eq!(handshake["x-forwarded-proto"], "https");
    }
}
