// Realtime detection over WebSocket
//
// Each connection gets its own engine. Frames go through a single-slot
// watch channel so a slow detector only ever sees the newest frame; the
// frames it skipped are reported as dropped.

use crate::http::AppState;
use crate::session_manager::SessionControl;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use greensort_api::{
    BestPayload, ClientMessage, DebugPayload, DetectionPayload, MetadataPayload, ResultPayload,
    ServerMessage, CLOSE_TRY_AGAIN_LATER,
};
use greensort_eye::{FrameOutcome, RealtimeSession, VisionError};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Latest frame waiting for the processor
#[derive(Debug, Clone)]
struct PendingFrame {
    /// Arrival order on this connection
    seq: u64,
    frame_id: Option<u64>,
    payload: Arc<str>,
}

/// WebSocket upgrade handler
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_frame_bytes = state.config.get().await.server.max_frame_bytes;
    // room for the JSON envelope around the base64 text
    ws.max_message_size(max_frame_bytes.saturating_mul(2))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let config = state.config.get().await;
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<SessionControl>();

    if let Err(e) = state.sessions.register(&session_id, control_tx.clone()) {
        warn!("Rejecting session {}: {}", session_id, e);
        let close = CloseFrame {
            code: CLOSE_TRY_AGAIN_LATER,
            reason: Cow::from("server at capacity"),
        };
        if let Err(e) = socket.send(Message::Close(Some(close))).await {
            debug!("Failed to send capacity close: {}", e);
        }
        return;
    }
    state.metrics.session_opened();
    info!("Realtime session started: {}", session_id);

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (frame_tx, mut frame_rx) = watch::channel::<Option<PendingFrame>>(None);

    let _ = out_tx.send(ServerMessage::Session {
        session_id: session_id.clone(),
    });

    // Writer: serialize outbound messages in order
    let session_id_send = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json)).await {
                warn!("Failed to send to {}: {}", session_id_send, e);
                break;
            }
        }
    });

    // Reader: route inbound messages
    let session_id_recv = session_id.clone();
    let out_tx_recv = out_tx.clone();
    let metrics_recv = state.metrics.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut seq = 0u64;
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match ClientMessage::parse(&text) {
                    ClientMessage::Frame { frame_id, image } => {
                        seq += 1;
                        metrics_recv.frame_received();
                        frame_tx.send_replace(Some(PendingFrame {
                            seq,
                            frame_id,
                            payload: Arc::from(image),
                        }));
                    }
                    ClientMessage::Reset => {
                        let _ = control_tx.send(SessionControl::Reset);
                    }
                    ClientMessage::Ping { id } => {
                        let _ = out_tx_recv.send(ServerMessage::Pong { id });
                    }
                },
                Ok(Message::Binary(_)) => {
                    warn!("Binary message from {} ignored", session_id_recv);
                }
                Ok(Message::Close(frame)) => {
                    debug!(
                        "Session {} closed by client ({:?})",
                        session_id_recv,
                        frame.map(|f| f.code)
                    );
                    break;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    warn!("WebSocket error from {}: {}", session_id_recv, e);
                    break;
                }
            }
        }
    });

    // Processor: one frame at a time, newest first
    let adapter = state.adapter.clone();
    let metrics = state.metrics.clone();
    let session_id_proc = session_id.clone();
    let mut process_task = tokio::spawn(async move {
        let mut session = RealtimeSession::new(&config, adapter);
        let mut last_seq = 0u64;

        loop {
            tokio::select! {
                biased;

                Some(control) = control_rx.recv() => match control {
                    SessionControl::Reset => session.reset(),
                },
                changed = frame_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let pending = frame_rx.borrow_and_update().clone();
                    let Some(pending) = pending else { continue };

                    let dropped = pending.seq.saturating_sub(last_seq + 1);
                    last_seq = pending.seq;
                    if dropped > 0 {
                        debug!("Session {} skipped {} frames", session_id_proc, dropped);
                        session.record_dropped(dropped);
                        metrics.frames_dropped(dropped);
                    }

                    let reply = match session.handle_frame(pending.frame_id, &pending.payload).await {
                        Ok(outcome) => {
                            metrics.record_inference(outcome.metadata.processing_ms as f64);
                            if outcome.event.is_confirmed() {
                                metrics.confirmation();
                            }
                            ServerMessage::Result(result_payload(outcome))
                        }
                        Err(VisionError::StaleFrame { frame_id, last }) => {
                            debug!("Discarding stale frame {} (last {})", frame_id, last);
                            continue;
                        }
                        Err(e) if e.is_frame_rejection() => {
                            metrics.frame_rejected();
                            ServerMessage::frame_error(e.code(), e.to_string(), pending.frame_id)
                        }
                        Err(e) => {
                            error!("Frame processing failed in {}: {}", session_id_proc, e);
                            ServerMessage::frame_error(e.code(), e.to_string(), pending.frame_id)
                        }
                    };

                    if out_tx.send(reply).is_err() {
                        break;
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => debug!("Writer finished for {}", session_id),
        _ = &mut recv_task => debug!("Reader finished for {}", session_id),
        _ = &mut process_task => debug!("Processor finished for {}", session_id),
    }
    send_task.abort();
    recv_task.abort();
    process_task.abort();

    state.sessions.unregister(&session_id);
    state.metrics.session_closed();
    info!("Realtime session ended: {}", session_id);
}

/// Wire form of a processed frame
pub fn result_payload(outcome: FrameOutcome) -> ResultPayload {
    ResultPayload {
        success: true,
        frame_id: outcome.frame_id,
        detections: outcome.detections.iter().map(DetectionPayload::from).collect(),
        stable: outcome.stable,
        phase: outcome.phase,
        event: outcome.event,
        best: outcome.best.map(|b| BestPayload {
            class: b.class,
            confidence: b.confidence,
            bbox: b.bbox,
            bin: b.bin,
            guidance: b.guidance,
        }),
        debug: Some(DebugPayload {
            all_predictions: outcome.all_predictions,
        }),
        metadata: MetadataPayload {
            processing_ms: outcome.metadata.processing_ms,
            avg_ms: outcome.metadata.avg_ms,
            fps: outcome.metadata.fps,
            low_light: outcome.metadata.low_light,
            raw_count: outcome.metadata.raw_count,
            dropped: outcome.metadata.dropped,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greensort_core::{
        BoundingBox, Detection, EnginePhase, GreensortConfig, StableEvent, WasteClass,
    };
    use greensort_eye::NullAdapter;

    #[test]
    fn test_result_payload_from_outcome() {
        let mut session = RealtimeSession::new(&GreensortConfig::default(), Arc::new(NullAdapter));
        let glass = Detection::new(WasteClass::Glass, 0.9, BoundingBox::new(10.0, 10.0, 200.0, 200.0));
        let mut outcome = None;
        for id in 1..=5 {
            outcome = Some(session.process_detections(id, id * 100, vec![glass], false, 2.0));
        }
        let payload = result_payload(outcome.unwrap());

        assert!(payload.success);
        assert_eq!(payload.frame_id, 5);
        assert!(payload.stable);
        assert_eq!(payload.phase, EnginePhase::Stable);
        assert!(matches!(payload.event, StableEvent::Confirmed { class: WasteClass::Glass, .. }));
        assert_eq!(payload.detections.len(), 1);
        let best = payload.best.unwrap();
        assert!(best.guidance.is_some());
        assert_eq!(
            payload.debug.unwrap().all_predictions.get(&WasteClass::Glass),
            Some(&0.9)
        );
        assert_eq!(payload.metadata.raw_count, 1);
    }
}
