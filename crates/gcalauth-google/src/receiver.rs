//! Loopback listener that captures the authorization redirect.
//!
//! Each interactive flow binds its own [`CallbackReceiver`] on the redirect
//! URI's host and port. The receiver owns a route table with exactly one
//! entry, the redirect path, and delivers the first valid authorization code
//! over a one-shot channel. It is torn down as soon as the code arrives, the
//! deadline passes, or the waiting future is dropped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::error::{AuthError, AuthResult};

/// Body sent once the code has been captured.
pub const CODE_RECEIVED_MESSAGE: &str = "Authorization code received. You can close this window.";

/// Body sent when the redirect carries no `code` parameter.
pub const CODE_MISSING_MESSAGE: &str = "Authorization code not found";

const CODE_ALREADY_RECEIVED_MESSAGE: &str = "Authorization code already received";
const STATE_MISMATCH_MESSAGE: &str = "Authorization state mismatch";

/// Upper bound on the request line plus headers we are willing to read.
const MAX_REQUEST_HEAD: u64 = 8 * 1024;

/// Browsers open speculative connections; do not let one hold a task forever.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// A plain-text HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CallbackResponse {
    pub status: u16,
    pub body: String,
}

impl CallbackResponse {
    fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn reason(&self) -> &'static str {
        match self.status {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            _ => "Internal Server Error",
        }
    }

    fn to_http(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}\n",
            self.status,
            self.reason(),
            self.body.len() + 1,
            self.body
        )
    }
}

/// The single route of a receiver.
///
/// Holds the sending half of the code channel until a code is delivered;
/// afterwards every request to the route is refused.
#[derive(Debug)]
pub(crate) struct CallbackRoute {
    path: String,
    expected_state: Option<String>,
    sender: Option<oneshot::Sender<String>>,
}

impl CallbackRoute {
    pub(crate) fn new(
        path: impl Into<String>,
        expected_state: Option<String>,
        sender: oneshot::Sender<String>,
    ) -> Self {
        Self {
            path: path.into(),
            expected_state,
            sender: Some(sender),
        }
    }

    /// Handles one request given its method and request target.
    pub(crate) fn handle(&mut self, method: &str, target: &str) -> CallbackResponse {
        let Ok(url) = Url::parse(&format!("http://localhost{}", target)) else {
            return CallbackResponse::new(400, "Malformed request");
        };

        if url.path() != self.path {
            debug!("no route for {}", url.path());
            return CallbackResponse::new(404, "Not Found");
        }
        if method != "GET" {
            return CallbackResponse::new(405, "Method Not Allowed");
        }

        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if self.sender.is_none() {
            return CallbackResponse::new(400, CODE_ALREADY_RECEIVED_MESSAGE);
        }

        let Some(code) = code.filter(|c| !c.is_empty()) else {
            return match error {
                Some(error) => {
                    warn!("authorization redirect reported an error: {}", error);
                    CallbackResponse::new(400, format!("{}: {}", CODE_MISSING_MESSAGE, error))
                }
                None => {
                    warn!("authorization redirect without a code");
                    CallbackResponse::new(400, CODE_MISSING_MESSAGE)
                }
            };
        };

        if let (Some(expected), Some(received)) = (&self.expected_state, &state)
            && expected != received
        {
            warn!("authorization redirect with unexpected state");
            return CallbackResponse::new(400, STATE_MISMATCH_MESSAGE);
        }

        let Some(sender) = self.sender.take() else {
            return CallbackResponse::new(400, CODE_ALREADY_RECEIVED_MESSAGE);
        };
        if sender.send(code).is_err() {
            debug!("authorization code arrived after the flow stopped waiting");
            return CallbackResponse::new(500, "Authorization session is no longer active");
        }

        info!("received authorization code");
        CallbackResponse::new(200, CODE_RECEIVED_MESSAGE)
    }
}

/// Aborts the accept loop however the wait ends.
struct ServerTask(JoinHandle<AuthResult<()>>);

impl Drop for ServerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A bound, not yet serving, callback listener.
#[derive(Debug)]
pub struct CallbackReceiver {
    listener: TcpListener,
    redirect_uri: Url,
}

impl CallbackReceiver {
    /// Binds a listener on the host and port of `redirect_uri`.
    ///
    /// Port `0` binds a free port; [`redirect_uri`](Self::redirect_uri) then
    /// reports the URI with the port actually in use.
    ///
    /// # Errors
    ///
    /// Returns a listener error if the address cannot be bound, and a
    /// configuration error if the URI has no host or port.
    pub async fn bind(redirect_uri: &Url) -> AuthResult<Self> {
        let host = match redirect_uri.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => {
                return Err(AuthError::configuration(format!(
                    "redirect URI has no host: {}",
                    redirect_uri
                )));
            }
        };
        let port = redirect_uri.port_or_known_default().ok_or_else(|| {
            AuthError::configuration(format!("redirect URI has no port: {}", redirect_uri))
        })?;

        let listener = TcpListener::bind((host.as_str(), port)).await.map_err(|e| {
            AuthError::listener(format!("failed to listen on {}:{}", host, port)).with_source(e)
        })?;
        let local_addr = listener.local_addr().map_err(|e| {
            AuthError::listener("failed to read listener address").with_source(e)
        })?;

        let mut redirect_uri = redirect_uri.clone();
        if port == 0 {
            redirect_uri
                .set_port(Some(local_addr.port()))
                .map_err(|()| AuthError::internal("cannot set port on redirect URI"))?;
        }

        debug!("listening for the authorization redirect on {}", local_addr);
        Ok(Self {
            listener,
            redirect_uri,
        })
    }

    /// The redirect URI this receiver answers on.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Serves the redirect route until one code has been delivered.
    ///
    /// Requests without a code are answered with `400` and do not end the
    /// wait. When `expected_state` is set, a redirect carrying a different
    /// `state` is refused. With `timeout` set the wait fails with a timeout
    /// error once it elapses; `None` waits indefinitely.
    pub async fn receive_code(
        self,
        expected_state: Option<String>,
        timeout: Option<Duration>,
    ) -> AuthResult<String> {
        let (tx, rx) = oneshot::channel();
        let route = Arc::new(Mutex::new(CallbackRoute::new(
            self.redirect_uri.path(),
            expected_state,
            tx,
        )));
        let mut server = ServerTask(tokio::spawn(serve(self.listener, route)));

        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx).await.map_err(|_| {
                AuthError::timeout(format!(
                    "authorization timed out after {:?} without a redirect",
                    limit
                ))
            })?,
            None => rx.await,
        };

        match received {
            Ok(code) => Ok(code),
            Err(_) => match (&mut server.0).await {
                Ok(Err(e)) => Err(e),
                _ => Err(AuthError::listener(
                    "callback listener stopped before receiving a code",
                )),
            },
        }
    }
}

async fn serve(listener: TcpListener, route: Arc<Mutex<CallbackRoute>>) -> AuthResult<()> {
    loop {
        let (stream, peer) = listener.accept().await.map_err(|e| {
            AuthError::listener("failed to accept callback connection").with_source(e)
        })?;
        debug!("callback connection from {}", peer);
        let route = Arc::clone(&route);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, route).await {
                debug!("callback connection failed: {}", e);
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    route: Arc<Mutex<CallbackRoute>>,
) -> std::io::Result<()> {
    let request_line =
        match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_line(&mut stream)).await {
            Ok(line) => line?,
            Err(_) => return Ok(()),
        };

    let mut parts = request_line.split_whitespace();
    let response = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(method, target),
        _ => CallbackResponse::new(400, "Malformed request"),
    };

    stream.write_all(response.to_http().as_bytes()).await?;
    stream.flush().await?;
    let _ = stream.shutdown().await;
    Ok(())
}

/// Reads the request line and discards the headers.
async fn read_request_line(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut reader = BufReader::new(stream.take(MAX_REQUEST_HEAD));
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    loop {
        header.clear();
        let n = reader.read_line(&mut header).await?;
        if n == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }
    Ok(request_line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorCode;
    use tokio::sync::oneshot::error::TryRecvError;

    fn route() -> (CallbackRoute, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (
            CallbackRoute::new("/callback", Some("state-token".to_string()), tx),
            rx,
        )
    }

    #[test]
    fn missing_code_is_client_error_and_delivers_nothing() {
        let (mut route, mut rx) = route();
        let response = route.handle("GET", "/callback");
        assert_eq!(response.status, 400);
        assert_eq!(response.body, CODE_MISSING_MESSAGE);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        let response = route.handle("GET", "/callback?code=");
        assert_eq!(response.status, 400);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn provider_error_is_echoed_without_delivery() {
        let (mut route, mut rx) = route();
        let response = route.handle("GET", "/callback?error=access_denied&state=state-token");
        assert_eq!(response.status, 400);
        assert!(response.body.contains("access_denied"));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn only_the_first_code_is_delivered() {
        let (mut route, mut rx) = route();
        let first = route.handle("GET", "/callback?code=ABC123");
        assert_eq!(first.status, 200);
        assert_eq!(first.body, CODE_RECEIVED_MESSAGE);

        let second = route.handle("GET", "/callback?code=XYZ789");
        assert_eq!(second.status, 400);
        assert_eq!(second.body, CODE_ALREADY_RECEIVED_MESSAGE);

        assert_eq!(rx.try_recv().unwrap(), "ABC123");
    }

    #[test]
    fn code_is_percent_decoded() {
        let (mut route, mut rx) = route();
        let response = route.handle("GET", "/callback?code=4%2F0Ad-x&scope=a+b");
        assert_eq!(response.status, 200);
        assert_eq!(rx.try_recv().unwrap(), "4/0Ad-x");
    }

    #[test]
    fn other_paths_and_methods_are_refused() {
        let (mut route, mut rx) = route();
        assert_eq!(route.handle("GET", "/favicon.ico").status, 404);
        assert_eq!(route.handle("GET", "/callback/extra?code=A").status, 404);
        assert_eq!(route.handle("POST", "/callback?code=A").status, 405);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn state_mismatch_is_refused_but_missing_state_is_accepted() {
        let (mut route, mut rx) = route();
        let response = route.handle("GET", "/callback?code=A&state=forged");
        assert_eq!(response.status, 400);
        assert_eq!(response.body, STATE_MISMATCH_MESSAGE);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(route.handle("GET", "/callback?code=B").status, 200);
        assert_eq!(rx.try_recv().unwrap(), "B");
    }

    #[test]
    fn response_serialization() {
        let http = CallbackResponse::new(200, CODE_RECEIVED_MESSAGE).to_http();
        assert!(http.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(http.contains("Content-Type: text/plain"));
        assert!(http.ends_with("You can close this window.\n"));
    }

    fn loopback() -> Url {
        Url::parse("http://127.0.0.1:0/callback").unwrap()
    }

    #[tokio::test]
    async fn bind_on_port_zero_reports_real_port() {
        let receiver = CallbackReceiver::bind(&loopback()).await.unwrap();
        let uri = receiver.redirect_uri();
        assert_eq!(uri.host_str(), Some("127.0.0.1"));
        assert_ne!(uri.port(), Some(0));
        assert!(uri.port().is_some());
        assert_eq!(uri.path(), "/callback");
    }

    #[tokio::test]
    async fn bind_conflict_is_listener_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let uri = Url::parse(&format!("http://127.0.0.1:{}/callback", port)).unwrap();

        let err = CallbackReceiver::bind(&uri).await.unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Listener);
    }

    #[tokio::test]
    async fn serves_redirect_over_http() {
        let receiver = CallbackReceiver::bind(&loopback()).await.unwrap();
        let uri = receiver.redirect_uri().clone();
        let waiting = tokio::spawn(receiver.receive_code(
            Some("state-token".to_string()),
            Some(Duration::from_secs(10)),
        ));

        let http = reqwest::Client::new();

        // a browser preconnect that never sends anything must not block the route
        let _idle = TcpStream::connect(uri.socket_addrs(|| None).unwrap()[0])
            .await
            .unwrap();

        let missing = http.get(uri.clone()).send().await.unwrap();
        assert_eq!(missing.status().as_u16(), 400);
        assert!(missing.text().await.unwrap().contains(CODE_MISSING_MESSAGE));

        let mut with_code = uri.clone();
        with_code.set_query(Some("code=ABC123&state=state-token"));
        let ok = http.get(with_code).send().await.unwrap();
        assert_eq!(ok.status().as_u16(), 200);
        assert!(ok.text().await.unwrap().contains("You can close this window"));

        assert_eq!(waiting.await.unwrap().unwrap(), "ABC123");
    }

    #[tokio::test]
    async fn listener_is_closed_after_delivery() {
        let receiver = CallbackReceiver::bind(&loopback()).await.unwrap();
        let uri = receiver.redirect_uri().clone();
        let waiting = tokio::spawn(receiver.receive_code(None, Some(Duration::from_secs(10))));

        let mut with_code = uri.clone();
        with_code.set_query(Some("code=first"));
        let http = reqwest::Client::new();
        assert_eq!(http.get(with_code).send().await.unwrap().status().as_u16(), 200);
        assert_eq!(waiting.await.unwrap().unwrap(), "first");

        let mut again = uri.clone();
        again.set_query(Some("code=second"));
        let second = tokio::time::timeout(Duration::from_secs(5), http.get(again).send()).await;
        assert!(!matches!(second, Ok(Ok(ref r)) if r.status().is_success()));
    }

    #[tokio::test]
    async fn times_out_without_redirect() {
        let receiver = CallbackReceiver::bind(&loopback()).await.unwrap();
        let err = receiver
            .receive_code(None, Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Timeout);
        assert!(err.message().contains("timed out after 100ms"));
    }
}
