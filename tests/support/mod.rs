//! Shared fixtures for the integration tests: a loopback WebSocket frame
//! source, image encoding and polling helpers.

#![allow(dead_code)]

use std::future::Future;
use std::io::Cursor;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use image::{ImageFormat, Rgba, RgbaImage};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Commands the test sends to the loopback frame source.
pub enum ToClient {
    Frame(Vec<u8>),
    Text(String),
    Close,
}

/// Handle to a one-connection WebSocket server on 127.0.0.1.
pub struct FrameServer {
    /// `ws://` URL of the server.
    pub url: String,
    /// Text messages received from the client, in order.
    pub from_client: mpsc::UnboundedReceiver<String>,
    /// Messages to push to the client.
    pub to_client: mpsc::UnboundedSender<ToClient>,
}

impl FrameServer {
    /// Next text message from the client, failing the test after 5 seconds.
    pub async fn next_command(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("timed out waiting for a client command")
            .expect("server task ended")
    }

    pub fn send_frame(&self, bytes: Vec<u8>) {
        self.to_client.send(ToClient::Frame(bytes)).expect("server task ended");
    }

    pub fn send_text(&self, text: &str) {
        self.to_client
            .send(ToClient::Text(text.to_owned()))
            .expect("server task ended");
    }

    pub fn close(&self) {
        let _ = self.to_client.send(ToClient::Close);
    }
}

/// Start a frame source that accepts a single connection.
pub async fn spawn_frame_server() -> FrameServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (from_client_tx, from_client) = mpsc::unbounded_channel();
    let (to_client, mut to_client_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let (mut write, mut read) = ws.split();
        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = from_client_tx.send(text);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                },
                cmd = to_client_rx.recv() => match cmd {
                    Some(ToClient::Frame(bytes)) => {
                        if write.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                    }
                    Some(ToClient::Text(text)) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(ToClient::Close) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                },
            }
        }
    });

    FrameServer {
        url: format!("ws://{addr}/ws/video"),
        from_client,
        to_client,
    }
}

/// Encode a solid-colour PNG.
pub fn png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    encode(width, height, rgba, ImageFormat::Png)
}

/// Encode a solid-colour JPEG.
pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let rgb = image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([90, 120, 200, 255]),
    ))
    .to_rgb8();
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg).expect("encode jpeg");
    out.into_inner()
}

fn encode(width: u32, height: u32, rgba: [u8; 4], format: ImageFormat) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).expect("encode image");
    out.into_inner()
}

/// Poll `cond` every 10ms until it holds, failing the test after 5 seconds.
pub async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Assert that `fut` completes within 5 seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}
