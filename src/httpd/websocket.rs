use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::stream::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::Instrument;

/// Streams each periodically captured frame as a binary message.
pub async fn handler(
    State(frames): State<broadcast::Sender<Bytes>>,
    ws: WebSocketUpgrade,
) -> Response {
    let span = tracing::debug_span!("frames websocket");
    let receiver = frames.subscribe();
    ws.on_upgrade(move |socket| stream_frames(socket, receiver).instrument(span))
}

async fn stream_frames(socket: WebSocket, receiver: broadcast::Receiver<Bytes>) {
    tracing::info!("frame client connected");
    match forward(socket, receiver).await {
        Ok(()) => tracing::info!("frame client disconnected"),
        Err(error) => tracing::error!(%error, "frame client error"),
    }
}

async fn forward(socket: WebSocket, receiver: broadcast::Receiver<Bytes>) -> Result<()> {
    let (sink, mut incoming) = socket.split();
    // Frames the client could not keep up with are dropped.
    let send = BroadcastStream::new(receiver)
        .filter_map(|frame| async move {
            match frame {
                Ok(frame) => Some(Ok(Message::Binary(frame))),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "frame client lagging");
                    None
                }
            }
        })
        .forward(sink);
    // Incoming messages are discarded, but they need to be received for the
    // pings to be answered.
    let receive = async move {
        while let Some(message) = incoming.next().await {
            if let Message::Close(_) = message? {
                break;
            }
        }
        Ok::<_, axum::Error>(())
    };
    tokio::select! {
        ret = send => ret?,
        ret = receive => ret?,
    }
    Ok(())
}
