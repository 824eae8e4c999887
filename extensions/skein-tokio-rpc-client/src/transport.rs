use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use skein::rpc::RpcError;
use skein_rpc_service::constants::DEFAULT_WS_PATH;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

/// One open byte-frame channel to a peer.
///
/// Each item on either side is exactly one whole frame. Dropping `outbound`
/// closes the channel; `inbound` yields `None` once the peer is gone.
pub struct DuplexChannel {
    pub outbound: UnboundedSender<Vec<u8>>,
    pub inbound: UnboundedReceiver<Vec<u8>>,
}

impl DuplexChannel {
    /// Two channels wired back to back, for in-process peers.
    pub fn pair() -> (DuplexChannel, DuplexChannel) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            DuplexChannel {
                outbound: a_tx,
                inbound: b_rx,
            },
            DuplexChannel {
                outbound: b_tx,
                inbound: a_rx,
            },
        )
    }
}

/// Opens duplex channels to addresses.
#[async_trait::async_trait]
pub trait DuplexTransport: Send + Sync + 'static {
    async fn connect(&self, address: &str) -> Result<DuplexChannel, RpcError>;
}

/// WebSocket transport; one binary message carries one frame.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

/// `host:port` becomes `ws://host:port/ws`; full `ws://` or `wss://` URLs are
/// used as given.
pub fn websocket_url(address: &str) -> String {
    if address.starts_with("ws://") || address.starts_with("wss://") {
        address.to_string()
    } else {
        format!("ws://{address}{DEFAULT_WS_PATH}")
    }
}

#[async_trait::async_trait]
impl DuplexTransport for WsTransport {
    async fn connect(&self, address: &str) -> Result<DuplexChannel, RpcError> {
        let url = websocket_url(address);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| RpcError::Network(format!("{url}: {err}")))?;
        let (mut sender, mut receiver) = ws_stream.split();

        let (out_tx, mut out_rx) = unbounded_channel::<Vec<u8>>();
        let (in_tx, in_rx) = unbounded_channel::<Vec<u8>>();

        // Send loop
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if sender.send(WsMessage::Binary(Bytes::from(frame))).await.is_err() {
                    break;
                }
            }
            let _ = sender.close().await;
        });

        // Receive loop
        tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(WsMessage::Binary(bytes)) => {
                        if in_tx.send(bytes.to_vec()).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!("WebSocket receive error: {}", err);
                        break;
                    }
                }
            }
        });

        Ok(DuplexChannel {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
