use std::net::SocketAddr;

use berth::{Context, HealthCheck, HttpError, Route, Settings, Surface};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// One request per connection; the server closes after answering.
async fn raw_get(addr: SocketAddr, path: &str) -> String {
    raw_get_with(addr, path, "").await
}

/// `extra` is inserted verbatim into the header block, CRLF-terminated.
async fn raw_get_with(addr: SocketAddr, path: &str, extra: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n{extra}Connection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

fn ephemeral() -> Settings {
    Settings { http_interface: Some("127.0.0.1".into()), http_port: 0, private_http_port: 0, ..Settings::default() }
}

#[tokio::test]
async fn public_and_private_listeners_serve_their_own_routes() {
    let mut surface = Surface::new(&ephemeral(), HealthCheck::always_healthy()).unwrap();
    surface
        .add(Route::fixed("/hello", &json!({"hello": "world"})))
        .unwrap();
    surface
        .add(
            Route::simple_read("/admin", |_ctx: Context| async { Ok::<_, HttpError>("secret") })
                .with_id(false)
                .private(),
        )
        .unwrap();

    let listening = surface.bind().await.unwrap();
    let public = listening.public_addr().unwrap();
    let private = listening.private_addr().unwrap();
    assert!(private.ip().is_loopback());
    assert_ne!(public.port(), 0);

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(listening.serve(shutdown.clone()));

    let res = raw_get(public, "/hello").await;
    assert!(res.starts_with("HTTP/1.1 200"), "{res}");
    assert!(res.ends_with(r#"{"hello":"world"}"#), "{res}");

    assert!(raw_get(public, "/admin").await.starts_with("HTTP/1.1 404"));
    let res = raw_get(private, "/admin").await;
    assert!(res.starts_with("HTTP/1.1 200"), "{res}");
    assert!(res.ends_with("\"secret\""), "{res}");

    for addr in [public, private] {
        assert!(raw_get(addr, "/healthcheck").await.starts_with("HTTP/1.1 200"));
    }

    shutdown.cancel();
    server.await.unwrap();

    assert!(TcpStream::connect(public).await.is_err());
    assert!(TcpStream::connect(private).await.is_err());
}

#[tokio::test]
async fn private_listener_can_be_disabled() {
    let settings = Settings { private_http_enabled: false, ..ephemeral() };
    let listening = Surface::new(&settings, HealthCheck::always_healthy()).unwrap().bind().await.unwrap();
    assert!(listening.public_addr().is_some());
    assert_eq!(listening.private_addr(), None);

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    listening.serve(shutdown).await;
}

#[tokio::test]
async fn cors_applies_to_the_public_listener_only() {
    let settings = Settings { cors: true, ..ephemeral() };
    let listening = Surface::new(&settings, HealthCheck::always_healthy()).unwrap().bind().await.unwrap();
    let public = listening.public_addr().unwrap();
    let private = listening.private_addr().unwrap();

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(listening.serve(shutdown.clone()));

    let res = raw_get_with(private, "/healthcheck", "Origin: http://evil\r\n").await.to_ascii_lowercase();
    assert!(res.starts_with("http/1.1 200"), "{res}");
    assert!(!res.contains("access-control-allow-origin"), "{res}");

    let res = raw_get_with(public, "/healthcheck", "Origin: http://evil\r\n").await.to_ascii_lowercase();
    assert!(res.contains("access-control-allow-origin: *"), "{res}");

    shutdown.cancel();
    server.await.unwrap();
}
