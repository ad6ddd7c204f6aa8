//! Common test utilities for ChatWire integration tests
//!
//! A scriptable mock chat server (WebSocket) and a minimal HTTP responder
//! for the offline replay path.

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::Notify;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

#[derive(Debug)]
enum ServerCommand {
    /// Push a text frame to the client
    Send(String),
    /// End the connection; true = proper close handshake, false = abrupt
    /// TCP teardown with no close frame
    Close(bool),
}

/// A scriptable mock chat backend
pub struct MockChatServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    received: Arc<Mutex<Vec<String>>>,
    clients: Arc<Mutex<Vec<UnboundedSender<ServerCommand>>>>,
    accept_count: Arc<AtomicUsize>,
}

impl MockChatServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let received = Arc::new(Mutex::new(Vec::new()));
        let clients = Arc::new(Mutex::new(Vec::new()));
        let accept_count = Arc::new(AtomicUsize::new(0));

        {
            let shutdown = Arc::clone(&shutdown);
            let received = Arc::clone(&received);
            let clients = Arc::clone(&clients);
            let accept_count = Arc::clone(&accept_count);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            match result {
                                Ok((stream, _)) => {
                                    accept_count.fetch_add(1, Ordering::SeqCst);
                                    let (tx, rx) = unbounded_channel();
                                    clients.lock().push(tx);
                                    let received = Arc::clone(&received);
                                    tokio::spawn(async move {
                                        handle_connection(stream, rx, received).await;
                                    });
                                }
                                Err(e) => {
                                    eprintln!("accept error: {e}");
                                    break;
                                }
                            }
                        }
                        _ = shutdown.notified() => break,
                    }
                }
            });
        }

        Self {
            addr,
            shutdown,
            received,
            clients,
            accept_count,
        }
    }

    /// Endpoint for `ClientConfig` / `ConnectionManager` (no path)
    pub fn endpoint(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Frames received from clients, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Number of connections accepted so far
    pub fn accept_count(&self) -> usize {
        self.accept_count.load(Ordering::SeqCst)
    }

    /// Push a frame to every connected client
    pub fn broadcast(&self, frame: impl Into<String>) {
        let frame = frame.into();
        for client in self.clients.lock().iter() {
            let _ = client.send(ServerCommand::Send(frame.clone()));
        }
    }

    /// End every connection; `normal` selects close-handshake vs abrupt drop
    pub fn close_all(&self, normal: bool) {
        for client in self.clients.lock().drain(..) {
            let _ = client.send(ServerCommand::Close(normal));
        }
    }

    /// Poll until at least `count` frames arrived or the timeout passes
    pub async fn wait_for_frames(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.received.lock().len() >= count).await
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockChatServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_connection(
    stream: TcpStream,
    mut commands: tokio::sync::mpsc::UnboundedReceiver<ServerCommand>,
    received: Arc<Mutex<Vec<String>>>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("websocket handshake failed: {e}");
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => received.lock().push(text),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
            cmd = commands.recv() => {
                match cmd {
                    Some(ServerCommand::Send(frame)) => {
                        if write.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Some(ServerCommand::Close(true)) => {
                        let _ = write
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "".into(),
                            })))
                            .await;
                        break;
                    }
                    Some(ServerCommand::Close(false)) | None => {
                        // Drop without a close frame.
                        break;
                    }
                }
            }
        }
    }
}

/// A minimal HTTP responder that records requests and answers 200
pub struct MockHttpServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl MockHttpServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let requests = Arc::new(Mutex::new(Vec::new()));

        {
            let shutdown = Arc::clone(&shutdown);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        result = listener.accept() => {
                            match result {
                                Ok((stream, _)) => {
                                    let requests = Arc::clone(&requests);
                                    tokio::spawn(async move {
                                        handle_http(stream, requests).await;
                                    });
                                }
                                Err(_) => break,
                            }
                        }
                        _ = shutdown.notified() => break,
                    }
                }
            });
        }

        Self {
            addr,
            shutdown,
            requests,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.requests.lock().len() >= count).await
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_http(mut stream: TcpStream, requests: Arc<Mutex<Vec<RecordedRequest>>>) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    // Read headers, then exactly content-length bytes of body.
    let (head_end, content_length) = loop {
        match stream.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(_) => return,
        }
        if let Some(pos) = find_header_end(&buffer) {
            let head = String::from_utf8_lossy(&buffer[..pos]).to_string();
            let length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            break (pos + 4, length);
        }
    };

    while buffer.len() < head_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(_) => return,
        }
    }

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let mut request_line = head.lines().next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("").to_string();
    let path = request_line.next().unwrap_or("").to_string();
    let body = String::from_utf8_lossy(&buffer[head_end..]).to_string();

    requests.lock().push(RecordedRequest { method, path, body });

    let _ = stream
        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
        .await;
    let _ = stream.shutdown().await;
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Poll a condition every 10ms until it holds or the timeout passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
