//! Presentation push socket: JSON lines, fire-and-forget.
//!
//! The booth UI connects here and receives every update the machine
//! emits. The broadcast channel decouples the control loop from slow or
//! absent presentation clients; a lagged receiver skips ahead rather than
//! applying backpressure to the loop.

use booth_core::{UiEmitter, UiMessage};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Emitter that fans machine updates out to every presentation client.
pub struct BroadcastEmitter {
    tx: broadcast::Sender<String>,
}

impl BroadcastEmitter {
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }
}

impl UiEmitter for BroadcastEmitter {
    fn emit(&self, msg: UiMessage) {
        // No receivers is fine: the booth runs headless until the UI
        // attaches.
        let _ = self.tx.send(serde_json::to_string(&msg).unwrap());
    }
}

/// Accept presentation clients and stream updates to each of them.
pub async fn serve(listener: TcpListener, tx: broadcast::Sender<String>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                eprintln!("[push] presentation client connected from {}", addr);
                tokio::spawn(forward(stream, tx.subscribe()));
            }
            Err(e) => {
                eprintln!("[push] accept failed: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }
}

async fn forward(mut stream: TcpStream, mut rx: broadcast::Receiver<String>) {
    loop {
        match rx.recv().await {
            Ok(msg) => {
                if stream.write_all(msg.as_bytes()).await.is_err() {
                    break;
                }
                if stream.write_all(b"\n").await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // Client fell behind, skip missed messages and continue
                eprintln!("[push] presentation client lagged by {} messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    eprintln!("[push] presentation client disconnected");
}
