// Trade-capture WebSocket listener.
//
// A platform bridge connects to 127.0.0.1 and pushes executed fills as JSON
// text frames. One client is served at a time; frames are forwarded to the
// app loop untouched and parsed there.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::Stream;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

/// Pause after a failed accept (EMFILE and friends) before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Events emitted by the capture listener to the application layer.
#[derive(Debug, PartialEq)]
pub enum CaptureEvent {
    /// A bridge client connected.
    Connected { addr: String },
    /// The current bridge client went away.
    Disconnected,
    /// A text frame from the bridge (raw JSON).
    Message(String),
}

/// Source of raw client connections for [`run`].
#[async_trait]
pub trait CaptureListener: Send {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send;

    async fn accept(&mut self) -> std::io::Result<(Self::Conn, String)>;
}

/// TCP listener bound to loopback.
pub struct TungsteniteListener {
    inner: TcpListener,
}

impl TungsteniteListener {
    /// Bind `127.0.0.1:{port}`; port 0 picks a free port.
    pub async fn bind(port: u16) -> anyhow::Result<Self> {
        let inner = TcpListener::bind(("127.0.0.1", port)).await?;
        Ok(TungsteniteListener { inner })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }
}

#[async_trait]
impl CaptureListener for TungsteniteListener {
    type Conn = TcpStream;

    async fn accept(&mut self) -> std::io::Result<(TcpStream, String)> {
        let (stream, addr) = self.inner.accept().await?;
        Ok((stream, addr.to_string()))
    }
}

/// Accept bridge clients one at a time and forward their frames through
/// `tx`. Returns when the receiving side is dropped.
pub async fn run<L: CaptureListener>(
    mut listener: L,
    tx: mpsc::Sender<CaptureEvent>,
) -> anyhow::Result<()> {
    info!("Trade capture listener running");

    loop {
        let (conn, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Capture accept failed: {e}");
                if tx.is_closed() {
                    break;
                }
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };
        info!("Accepted capture connection from {addr}");

        let ws_stream = match tokio_tungstenite::accept_async(conn).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("Capture handshake failed for {addr}: {e}");
                continue;
            }
        };

        if tx
            .send(CaptureEvent::Connected { addr: addr.clone() })
            .await
            .is_err()
        {
            break;
        }

        let (_write, read) = ws_stream.split();
        if process_message_stream(read, &tx, &addr).await.is_err() {
            break;
        }

        if tx.send(CaptureEvent::Disconnected).await.is_err() {
            break;
        }
    }

    Ok(())
}

/// Forward text frames from `stream` through `tx` until the client closes,
/// errors, or the stream ends. `Err(())` means the receiver is gone.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<CaptureEvent>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                if tx.send(CaptureEvent::Message(text.to_string())).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Capture client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("Capture socket error from {addr}: {e}");
                break;
            }
            // Binary, ping, pong and raw frames carry nothing for us.
            _ => {}
        }
    }
    Ok(())
}
