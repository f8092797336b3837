//! Command channel: one connection, one command, one echo.
//!
//! The touchscreen client connects, sends a single comma-delimited command
//! and gets the exact bytes echoed back before the connection closes. A
//! peer that connects and closes without sending anything is a deliberate
//! shutdown request; a peer that stays silent past the bounded wait is a
//! transient empty iteration, not a shutdown.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;

/// Only one pending connection is ever queued.
const LISTEN_BACKLOG: u32 = 1;
/// Upper bound on a single command message.
const MAX_COMMAND_LEN: usize = 1024;
/// Bounded wait for the client to produce its command after connecting.
const READ_WAIT: Duration = Duration::from_millis(500);

/// Outcome of one accept cycle.
pub enum Inbound {
    /// A command arrived; the caller dispatches it and then echoes via
    /// [`echo`].
    Command { bytes: Vec<u8>, stream: TcpStream },
    /// Nothing usable this iteration (no data in time, or a transport
    /// error). The loop just tries again.
    Idle,
    /// The peer closed without sending data: a shutdown request.
    Closed,
}

pub struct CommandChannel {
    listener: TcpListener,
}

impl CommandChannel {
    pub async fn bind(host: &str, port: u16) -> Result<Self, String> {
        let addr: std::net::SocketAddr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| format!("Invalid listen address {}:{}: {}", host, port, e))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        };
        let socket = socket.map_err(|e| format!("Failed to create socket: {}", e))?;

        socket
            .set_reuseaddr(true)
            .map_err(|e| format!("Failed to set reuseaddr: {}", e))?;
        socket
            .bind(addr)
            .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
        let listener = socket
            .listen(LISTEN_BACKLOG)
            .map_err(|e| format!("Failed to listen on {}: {}", addr, e))?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, String> {
        self.listener
            .local_addr()
            .map_err(|e| format!("Failed to read local address: {}", e))
    }

    /// Accept the next connection and read one command with a bounded wait.
    pub async fn accept(&self) -> Inbound {
        let (mut stream, addr) = match self.listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                eprintln!("[channel] accept failed: {}", e);
                return Inbound::Idle;
            }
        };
        eprintln!("[channel] connection from {}", addr);

        let mut buf = vec![0u8; MAX_COMMAND_LEN];
        match timeout(READ_WAIT, stream.read(&mut buf)).await {
            Ok(Ok(0)) => Inbound::Closed,
            Ok(Ok(n)) => {
                buf.truncate(n);
                Inbound::Command { bytes: buf, stream }
            }
            Ok(Err(e)) => {
                eprintln!("[channel] read failed: {}", e);
                Inbound::Idle
            }
            Err(_) => {
                eprintln!("[channel] no data from {} within {:?}", addr, READ_WAIT);
                Inbound::Idle
            }
        }
    }
}

/// Echo the raw received bytes back and close the connection. Transport
/// failures here are logged and absorbed; the command was already
/// dispatched.
pub async fn echo(stream: &mut TcpStream, bytes: &[u8]) {
    if let Err(e) = stream.write_all(bytes).await {
        eprintln!("[channel] echo failed: {}", e);
        return;
    }
    let _ = stream.flush().await;
    let _ = stream.shutdown().await;
}
