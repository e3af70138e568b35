//! One websocket connection's lifetime (spec §6): a reader loop consuming
//! [`RelayClientFrame`]s, a writer task draining a per-connection outbound
//! queue, and one forwarder task per subscribed channel. Same paired
//! send/receive-task shape as the teacher's `processing_module`, generalized
//! from a single duplex stream to N dynamically (un)subscribed channels
//! multiplexed into one outbound queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use game_server::ClientId;
use protocol::{RelayClientFrame, RelayServerFrame};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::hub::{ChannelEvent, Hub};

type Forwarders = Arc<StdMutex<HashMap<String, JoinHandle<()>>>>;

/// Drives one accepted websocket end to end: assigns the connection's
/// [`ClientId`], relays frames until the socket closes or errs, then tears
/// down every forwarder task and notifies the hub of the disconnect.
pub async fn handle(stream: WebSocket, hub: Hub) {
    let client_id = hub.next_client_id();
    let (sink, mut receiver) = stream.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<RelayServerFrame>(protocol::CHANNEL_BUFFER_SIZE);

    let writer = tokio::spawn(run_writer(sink, outbound_rx));
    let forwarders: Forwarders = Arc::new(StdMutex::new(HashMap::new()));

    tracing::info!(client = client_id.0, "relay client connected");

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(client = client_id.0, %error, "websocket read error");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
        };

        match serde_json::from_str::<RelayClientFrame>(&text) {
            Ok(frame) => handle_frame(client_id, &hub, frame, &outbound_tx, &forwarders).await,
            Err(error) => {
                let _ =
                    outbound_tx.send(RelayServerFrame::Error { message: format!("invalid frame: {error}") }).await;
            }
        }
    }

    for (_, handle) in forwarders.lock().unwrap().drain() {
        handle.abort();
    }
    writer.abort();
    hub.disconnect(client_id);
    tracing::info!(client = client_id.0, "relay client disconnected");
}

async fn handle_frame(
    client_id: ClientId,
    hub: &Hub,
    frame: RelayClientFrame,
    outbound_tx: &mpsc::Sender<RelayServerFrame>,
    forwarders: &Forwarders,
) {
    match frame {
        RelayClientFrame::Subscribe { channel } => {
            let already_subscribed = forwarders.lock().unwrap().contains_key(&channel);
            if already_subscribed {
                return;
            }
            let receiver = hub.subscribe(&channel);
            let handle = tokio::spawn(run_forwarder(client_id, channel.clone(), receiver, outbound_tx.clone()));
            forwarders.lock().unwrap().insert(channel, handle);
        }
        RelayClientFrame::Unsubscribe { channel } => {
            if let Some(handle) = forwarders.lock().unwrap().remove(&channel) {
                handle.abort();
            }
        }
        RelayClientFrame::Broadcast { channel, payload } => {
            let subscribed = forwarders.lock().unwrap().contains_key(&channel);
            if !subscribed {
                let _ = outbound_tx
                    .send(RelayServerFrame::Error { message: format!("not subscribed to channel: {channel}") })
                    .await;
                return;
            }
            hub.broadcast_from_client(client_id, &channel, payload);
        }
    }
}

/// Pipes one subscribed channel's broadcast events into the connection's
/// single outbound queue, skipping any event this same client authored.
async fn run_forwarder(
    self_id: ClientId,
    channel: String,
    mut receiver: broadcast::Receiver<ChannelEvent>,
    outbound_tx: mpsc::Sender<RelayServerFrame>,
) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                if event.sender == self_id {
                    continue;
                }
                let frame = RelayServerFrame::Message { channel: channel.clone(), payload: event.payload };
                if outbound_tx.send(frame).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(client = self_id.0, %channel, skipped, "forwarder lagged, dropping buffered events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_writer(mut sink: SplitSink<WebSocket, Message>, mut outbound_rx: mpsc::Receiver<RelayServerFrame>) {
    while let Some(frame) = outbound_rx.recv().await {
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(error) => {
                tracing::error!(%error, "failed to encode relay server frame");
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_forwarders() -> Forwarders {
        Arc::new(StdMutex::new(HashMap::new()))
    }

    #[tokio::test]
    async fn broadcast_without_subscribing_first_yields_an_error_frame() {
        let hub = Hub::new();
        let client = hub.next_client_id();
        let (tx, mut rx) = mpsc::channel(8);
        let forwarders = new_forwarders();

        handle_frame(
            client,
            &hub,
            RelayClientFrame::Broadcast { channel: "asterobia:lobby".into(), payload: serde_json::json!({}) },
            &tx,
            &forwarders,
        )
        .await;

        match rx.try_recv().unwrap() {
            RelayServerFrame::Error { message } => assert!(message.contains("not subscribed")),
            other => panic!("expected an error frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribe_then_broadcast_is_observed_by_another_subscriber() {
        let hub = Hub::new();
        let client_a = hub.next_client_id();
        let client_b = hub.next_client_id();
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let forwarders_a = new_forwarders();
        let forwarders_b = new_forwarders();

        handle_frame(
            client_a,
            &hub,
            RelayClientFrame::Subscribe { channel: "asterobia:lobby".into() },
            &tx_a,
            &forwarders_a,
        )
        .await;
        handle_frame(
            client_b,
            &hub,
            RelayClientFrame::Subscribe { channel: "asterobia:lobby".into() },
            &tx_b,
            &forwarders_b,
        )
        .await;

        handle_frame(
            client_a,
            &hub,
            RelayClientFrame::Broadcast {
                channel: "asterobia:lobby".into(),
                payload: serde_json::json!({"type": "HOST_ANNOUNCE"}),
            },
            &tx_a,
            &forwarders_a,
        )
        .await;

        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), rx_b.recv()).await.unwrap().unwrap();
        match frame {
            RelayServerFrame::Message { channel, .. } => assert_eq!(channel, "asterobia:lobby"),
            other => panic!("expected a message frame, got {other:?}"),
        }
        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), _rx_a.recv()).await.is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let hub = Hub::new();
        let client_a = hub.next_client_id();
        let client_b = hub.next_client_id();
        let (tx_a, _rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let forwarders_a = new_forwarders();
        let forwarders_b = new_forwarders();

        handle_frame(
            client_a,
            &hub,
            RelayClientFrame::Subscribe { channel: "asterobia:lobby".into() },
            &tx_a,
            &forwarders_a,
        )
        .await;
        handle_frame(
            client_b,
            &hub,
            RelayClientFrame::Subscribe { channel: "asterobia:lobby".into() },
            &tx_b,
            &forwarders_b,
        )
        .await;
        handle_frame(
            client_b,
            &hub,
            RelayClientFrame::Unsubscribe { channel: "asterobia:lobby".into() },
            &tx_b,
            &forwarders_b,
        )
        .await;

        handle_frame(
            client_a,
            &hub,
            RelayClientFrame::Broadcast { channel: "asterobia:lobby".into(), payload: serde_json::json!({}) },
            &tx_a,
            &forwarders_a,
        )
        .await;

        assert!(tokio::time::timeout(std::time::Duration::from_millis(50), rx_b.recv()).await.is_err());
    }
}
