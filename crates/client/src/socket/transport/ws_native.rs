//! Native websocket transport using tokio-tungstenite.

use blogchat_shared::{AuthPayload, ChatError, Frame};
use futures_channel::mpsc::unbounded;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{TransportChannels, TransportKind};
use crate::config::SocketConfig;
use crate::runtime;
use crate::{log_debug, log_error};

pub(super) async fn connect(
    config: &SocketConfig,
    auth: AuthPayload,
) -> Result<TransportChannels, ChatError> {
    let url = config.websocket_url()?;
    let (ws_stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| ChatError::Transport(e.to_string()))?;
    let (mut write, mut read) = ws_stream.split();

    // Credentials go out as the first frame of the handshake.
    let auth_json = serde_json::to_string(&auth.into_frame())?;
    write
        .send(Message::Text(auth_json.into()))
        .await
        .map_err(|e| ChatError::Transport(e.to_string()))?;

    let (in_tx, in_rx) = unbounded::<Frame>();
    let (out_tx, mut out_rx) = unbounded::<Frame>();

    // Read pump: wire text frames -> incoming channel.
    runtime::spawn(async move {
        while let Some(result) = read.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<Frame>(&text) {
                    Ok(frame) => {
                        if in_tx.unbounded_send(frame).is_err() {
                            break;
                        }
                    }
                    Err(e) => log_error!("failed to parse frame: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(data)) => {
                    // Pong is handled by tungstenite itself.
                    log_debug!("ping: {:?}", data);
                }
                Ok(_) => {}
                Err(e) => {
                    log_error!("websocket read error: {}", e);
                    break;
                }
            }
        }
    });

    // Write pump: outgoing channel -> wire. The channel closing is the local
    // close signal.
    runtime::spawn(async move {
        while let Some(frame) = out_rx.next().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if let Err(e) = write.send(Message::Text(json.into())).await {
                        log_error!("websocket send failed: {}", e);
                        break;
                    }
                }
                Err(e) => log_error!("failed to encode frame: {}", e),
            }
        }
        let _ = write.send(Message::Close(None)).await;
    });

    Ok(TransportChannels {
        kind: TransportKind::WebSocket,
        outgoing: out_tx,
        incoming: in_rx,
    })
}
