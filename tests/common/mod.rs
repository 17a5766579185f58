#![allow(dead_code)]

use avs_client::{Client, ClientConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

pub const BOUNDARY: &str = "------abcdefg123456";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn client_for(base_url: &str) -> Client {
    let config = ClientConfig::new(base_url).expect("valid mock server URL");
    Client::new(config).expect("HTTP client")
}

pub fn related_content_type() -> String {
    format!("multipart/related; boundary={}; type=\"application/json\"", BOUNDARY)
}

/// Builds multipart/related bodies the way the service frames responses.
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directive(self, json: &str) -> Self {
        self.part(&["Content-Type: application/json; charset=UTF-8"], json.as_bytes())
    }

    pub fn attachment(self, content_id: &str, data: &[u8]) -> Self {
        let id_header = format!("Content-ID: {}", content_id);
        self.part(&["Content-Type: application/octet-stream", &id_header], data)
    }

    pub fn part(mut self, headers: &[&str], data: &[u8]) -> Self {
        self.body
            .extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        for header in headers {
            self.body.extend_from_slice(header.as_bytes());
            self.body.extend_from_slice(b"\r\n");
        }
        self.body.extend_from_slice(b"\r\n");
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    /// Ends with the opening delimiter of a part that never arrives.
    pub fn unfinished(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        self.body
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}

/// A downchannel server that sends `first_chunk` and then holds the response
/// open. Resolves the returned receiver once the client hangs up.
pub async fn hanging_downchannel(first_chunk: Vec<u8>) -> (String, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (closed_tx, closed_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        if !read_request_head(&mut socket).await {
            return;
        }

        let response_head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\n\r\n",
            related_content_type()
        );
        let mut chunk = format!("{:x}\r\n", first_chunk.len()).into_bytes();
        chunk.extend_from_slice(&first_chunk);
        chunk.extend_from_slice(b"\r\n");

        if socket.write_all(response_head.as_bytes()).await.is_err()
            || socket.write_all(&chunk).await.is_err()
        {
            return;
        }

        drain_until_closed(&mut socket).await;
        let _ = closed_tx.send(());
    });

    (format!("http://{}", addr), closed_rx)
}

/// An events server that answers `status_line` with `body` as soon as the
/// request head arrives, without waiting for the request body.
pub async fn early_rejection(status_line: &str, body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        if !read_request_head(&mut socket).await {
            return;
        }
        if socket.write_all(response.as_bytes()).await.is_err() {
            return;
        }
        drain_until_closed(&mut socket).await;
    });

    format!("http://{}", addr)
}

async fn read_request_head(socket: &mut TcpStream) -> bool {
    let mut buf = vec![0u8; 4096];
    let mut head = Vec::new();
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    true
}

async fn drain_until_closed(socket: &mut TcpStream) {
    let mut buf = vec![0u8; 4096];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => continue,
        }
    }
}
