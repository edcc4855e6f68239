//! WebSocket prediction push
//!
//! On connect the server sends the feature-to-index map. While inference is
//! active it then pushes one prediction per `push_interval`, either as a
//! JSON prediction message or, with `push_binary`, as the bare label index.

use super::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use nfc_common::api::PushMessage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| push_predictions(socket, state))
}

async fn push_predictions(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rng = StdRng::from_entropy();
    let mut announced: Option<BTreeMap<String, u32>> = None;

    let mut ticker = tokio::time::interval(state.config.push_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("WebSocket client connected");

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket read failed");
                    break;
                }
            },
            _ = ticker.tick() => {
                let outgoing = {
                    let store = state.store.read().await;
                    let features = store.feature_map();
                    let mut frames = Vec::new();

                    if announced.as_ref() != Some(&features) {
                        frames.push(encode(&PushMessage::Features { features: features.clone() }));
                        announced = Some(features.clone());
                    }

                    if let Some(prediction) = store.random_prediction(&mut rng, nfc_common::time::now()) {
                        if state.config.push_binary {
                            if let Some(index) = features.get(&prediction.feature) {
                                frames.push(Some(index.to_string()));
                            }
                        } else {
                            frames.push(encode(&PushMessage::Prediction { data: prediction }));
                        }
                    }
                    frames
                };

                for frame in outgoing.into_iter().flatten() {
                    if sender.send(Message::Text(frame)).await.is_err() {
                        info!("WebSocket client disconnected");
                        return;
                    }
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

fn encode(message: &PushMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "Failed to encode push message");
            None
        }
    }
}
