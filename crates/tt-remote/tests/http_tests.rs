//! HttpAuthority against a local socket
//!
//! A single-shot HTTP/1.1 responder stands in for the remote authority so
//! the request paths, bodies and failure classification are exercised end to
//! end through reqwest.

use pretty_assertions::assert_eq;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tt_remote::{
    HttpAuthority, IdentifierRequest, RemoteAuthority, RemoteConfig, RemoteError,
};
use tt_split::{Assignment, SplitRegistry};

/// Serve one canned response and hand back the raw request
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });

    (format!("http://{addr}"), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn fetches_split_registry() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"blue_button":{"false":50,"true":50},"time":{"clobberin_time":0,"hammertime":100}}"#,
    )
    .await;
    let authority = HttpAuthority::new(RemoteConfig::new(base)).unwrap();

    let registry = authority.fetch_split_registry().await.unwrap();
    let expected = SplitRegistry::new()
        .with_split("blue_button", [("false", 50), ("true", 50)])
        .with_split("time", [("clobberin_time", 0), ("hammertime", 100)]);
    assert_eq!(registry, expected);

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/v1/split_registry HTTP/1.1"));
}

#[tokio::test]
async fn fetches_visitor() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"id":"visitor-1","assignments":[{"split_name":"time","variant":"hammertime","unsynced":false}]}"#,
    )
    .await;
    let authority = HttpAuthority::new(RemoteConfig::new(base)).unwrap();

    let visitor = authority.fetch_visitor("visitor-1").await.unwrap();
    assert_eq!(visitor.id, "visitor-1");
    assert_eq!(visitor.assignments.len(), 1);

    let request = server.await.unwrap();
    assert!(request.starts_with("GET /api/v1/visitors/visitor-1 HTTP/1.1"));
}

#[tokio::test]
async fn create_identifier_posts_request() {
    let (base, server) = serve_once(
        "200 OK",
        r#"{"visitor":{"id":"canonical","assignments":[]}}"#,
    )
    .await;
    let authority = HttpAuthority::new(RemoteConfig::new(base)).unwrap();

    let visitor = authority
        .create_identifier(&IdentifierRequest::new("myapp_user_id", "visitor-1", "444"))
        .await
        .unwrap();
    assert_eq!(visitor.id, "canonical");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/v1/identifier HTTP/1.1"));
    assert!(request.contains(r#""identifier_type":"myapp_user_id""#));
    assert!(request.contains(r#""value":"444""#));
}

#[tokio::test]
async fn persist_assignment_posts_body() {
    let (base, server) = serve_once("204 No Content", "").await;
    let authority = HttpAuthority::new(RemoteConfig::new(base)).unwrap();

    authority
        .persist_assignment("visitor-1", &Assignment::computed("blue_button", "true"))
        .await
        .unwrap();

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/v1/assignment HTTP/1.1"));
    assert!(request.contains(r#""split_name":"blue_button""#));
}

#[tokio::test]
async fn server_error_is_transient() {
    let (base, _server) = serve_once("503 Service Unavailable", "{}").await;
    let authority = HttpAuthority::new(RemoteConfig::new(base)).unwrap();

    let err = authority.fetch_split_registry().await.unwrap_err();
    assert_eq!(err, RemoteError::Server { status: 503 });
    assert!(err.is_transient());
}

#[tokio::test]
async fn client_error_is_rejected() {
    let (base, _server) = serve_once("404 Not Found", "{}").await;
    let authority = HttpAuthority::new(RemoteConfig::new(base)).unwrap();

    let err = authority.fetch_visitor("nobody").await.unwrap_err();
    assert_eq!(err, RemoteError::Rejected { status: 404 });
    assert!(!err.is_transient());
}

#[tokio::test]
async fn malformed_body_is_decode_error() {
    let (base, _server) = serve_once("200 OK", r#"{"id":"#).await;
    let authority = HttpAuthority::new(RemoteConfig::new(base)).unwrap();

    let err = authority.fetch_visitor("visitor-1").await.unwrap_err();
    assert!(matches!(err, RemoteError::Decode(_)));
}

#[tokio::test]
async fn connection_refused_is_transient() {
    // Bind then drop to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let authority = HttpAuthority::new(RemoteConfig::new(format!("http://{addr}"))).unwrap();
    let err = authority.fetch_split_registry().await.unwrap_err();
    assert!(matches!(err, RemoteError::Unreachable(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        drop(socket);
    });

    let config = RemoteConfig::new(format!("http://{addr}")).with_timeout_ms(100);
    let authority = HttpAuthority::new(config).unwrap();
    let err = authority.fetch_split_registry().await.unwrap_err();
    assert_eq!(err, RemoteError::Timeout { timeout_ms: 100 });
}
