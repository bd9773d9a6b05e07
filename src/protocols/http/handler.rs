//! HTTP connection handler for the Tokio runtime.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::pages;
use super::routes::{RouteTable, ROUTES};

/// Content type of every response.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Serve HTTP/1.1 exchanges on one accepted connection.
///
/// When `token` is cancelled the connection finishes the exchange in
/// flight and then closes instead of waiting for the next keep-alive
/// request. `idle_timeout` bounds how long the client may take to send
/// request headers.
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    token: CancellationToken,
    idle_timeout: Option<Duration>,
) -> Result<(), hyper::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut builder = http1::Builder::new();
    builder.timer(TokioTimer::new());
    if let Some(timeout) = idle_timeout {
        builder.header_read_timeout(timeout);
    }

    let service = service_fn(move |request: Request<Incoming>| async move {
        Ok::<_, Infallible>(exchange(&ROUTES, &request, peer))
    });

    let connection = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => result,
        _ = token.cancelled() => {
            debug!(peer = %peer, "Closing HTTP connection for shutdown");
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    }
}

/// Answer one request. Never fails: a response that cannot be built is
/// replaced by a 500 page.
pub fn exchange<B>(
    routes: &RouteTable,
    request: &Request<B>,
    peer: SocketAddr,
) -> Response<Full<Bytes>> {
    let path = request.uri().path();
    info!(peer = %peer, method = %request.method(), path, "HTTP request");

    match build_response(routes, path) {
        Ok(response) => response,
        Err(e) => {
            error!(peer = %peer, path, error = %e, "Failed to build HTTP response");
            server_error(&e.to_string())
        }
    }
}

/// Build the response for `path`, 404 when no route matches.
pub fn build_response(
    routes: &RouteTable,
    path: &str,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    match routes.lookup(path) {
        Some(page) => html_response(StatusCode::OK, page()),
        None => html_response(StatusCode::NOT_FOUND, pages::not_found()),
    }
}

/// Best-effort 500 response carrying `message`.
pub fn server_error(message: &str) -> Response<Full<Bytes>> {
    html_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        pages::server_error(message),
    )
    .unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

fn html_response(
    status: StatusCode,
    body: String,
) -> Result<Response<Full<Bytes>>, hyper::http::Error> {
    let body = Bytes::from(body);
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, HTML_CONTENT_TYPE)
        .header(CONTENT_LENGTH, body.len())
        .body(Full::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::http::pages::NOT_FOUND_MARKER;
    use http_body_util::BodyExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn peer() -> SocketAddr {
        "127.0.0.1:60000".parse().unwrap()
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_known_routes_return_html() {
        let routes = RouteTable::standard();
        for path in ["/", "/time", "/hello", "/echo", "/ECHO"] {
            let response = build_response(&routes, path).unwrap();
            assert_eq!(response.status(), StatusCode::OK, "path {path}");
            assert_eq!(response.headers()[CONTENT_TYPE], HTML_CONTENT_TYPE);

            let declared: usize = response.headers()[CONTENT_LENGTH]
                .to_str()
                .unwrap()
                .parse()
                .unwrap();
            let body = body_text(response).await;
            assert_eq!(declared, body.len(), "path {path}");
            assert!(body.starts_with("<!DOCTYPE html>"));
        }
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let request = Request::builder().uri("/nope").body(()).unwrap();
        let response = exchange(&RouteTable::standard(), &request, peer());

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], HTML_CONTENT_TYPE);
        assert!(body_text(response).await.contains(NOT_FOUND_MARKER));
    }

    #[tokio::test]
    async fn test_query_string_is_ignored() {
        let request = Request::builder().uri("/hello?name=x").body(()).unwrap();
        let response = exchange(&RouteTable::standard(), &request, peer());
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Приветствие"));
    }

    #[tokio::test]
    async fn test_server_error_response() {
        let response = server_error("boom & bust");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], HTML_CONTENT_TYPE);
        let body = body_text(response).await;
        assert!(body.contains("boom &amp; bust"));
    }

    #[tokio::test]
    async fn test_content_length_counts_utf8_bytes() {
        let response = build_response(&RouteTable::standard(), "/hello").unwrap();
        let declared: usize = response.headers()[CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let body = body_text(response).await;
        assert!(declared > body.chars().count());
        assert_eq!(declared, body.len());
    }

    #[tokio::test]
    async fn test_serves_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();

        let server = {
            let token = token.clone();
            tokio::spawn(async move {
                let (stream, peer) = listener.accept().await.unwrap();
                handle_connection(stream, peer, token, None).await
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /Time HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        client.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8(raw).unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"), "got {raw}");
        assert!(raw.to_ascii_lowercase().contains("content-type: text/html; charset=utf-8"));
        assert!(raw.contains("Серверное время: "));
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_token_closes_idle_keep_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();

        let server = {
            let token = token.clone();
            tokio::spawn(async move {
                let (stream, peer) = listener.accept().await.unwrap();
                handle_connection(stream, peer, token, None).await
            })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        // Read until the full first response has arrived, then cancel while
        // the connection idles waiting for the next request.
        let mut raw = Vec::new();
        let mut chunk = [0u8; 4096];
        while !String::from_utf8_lossy(&raw).contains("</html>") {
            let n = client.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the response completed");
            raw.extend_from_slice(&chunk[..n]);
        }
        token.cancel();

        let finished = tokio::time::timeout(Duration::from_secs(2), server).await;
        assert!(finished.is_ok(), "connection did not close after cancellation");
    }
}
