//! Message router
//!
//! Decodes inbound client text into the closed `ClientMessage` enum and
//! dispatches each kind to the registry, the broadcast engine, or the
//! analytics engine. Anything that does not decode is answered with a
//! typed `error` reply to that client only; a bad message never crashes
//! the connection or the process.

use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::actors::broadcaster::BroadcastHandle;
use crate::actors::messages::{ClientMessage, ServerMessage};
use crate::analytics::AnalyticsEngine;
use crate::registry::{ClientId, ConnectionRegistry};

/// Everything the router needs to serve one connection's messages.
#[derive(Clone)]
pub struct RouterContext {
    pub registry: Arc<ConnectionRegistry>,
    pub broadcast: BroadcastHandle,
    pub analytics: Arc<AnalyticsEngine>,
}

/// Handle one inbound text frame. Returns the reply to send to the
/// originating client, if any.
pub async fn handle_message(
    ctx: &RouterContext,
    client_id: ClientId,
    raw: &str,
) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(raw) {
        Ok(message) => message,
        Err(decode_err) => {
            // distinguish garbage bytes from a well-formed envelope with an
            // unknown or malformed kind
            let reply = if serde_json::from_str::<serde_json::Value>(raw).is_err() {
                debug!(%client_id, "unparseable message payload");
                ServerMessage::Error {
                    message: "invalid message format".to_string(),
                }
            } else {
                debug!(%client_id, "unrecognized message: {decode_err}");
                ServerMessage::Error {
                    message: format!("unrecognized message: {decode_err}"),
                }
            };
            return Some(reply);
        }
    };

    dispatch(ctx, client_id, message).await
}

async fn dispatch(
    ctx: &RouterContext,
    client_id: ClientId,
    message: ClientMessage,
) -> Option<ServerMessage> {
    match message {
        ClientMessage::Subscribe { streams } => {
            trace!(%client_id, ?streams, "subscribe");
            let Some(current) = ctx.registry.add_subscriptions(client_id, &streams).await else {
                return Some(unknown_client(client_id));
            };

            // lazy activation: first subscriber arms the broadcast timer
            if ctx.registry.has_any_subscriber().await
                && let Err(e) = ctx.broadcast.start().await
            {
                error!("failed to start broadcaster: {e}");
            }

            Some(ServerMessage::SubscriptionConfirmed {
                streams: sorted(current),
            })
        }

        ClientMessage::Unsubscribe { streams } => {
            trace!(%client_id, ?streams, "unsubscribe");
            let Some(remaining) = ctx.registry.remove_subscriptions(client_id, &streams).await
            else {
                return Some(unknown_client(client_id));
            };

            // last subscriber gone: disarm the timer
            if !ctx.registry.has_any_subscriber().await
                && let Err(e) = ctx.broadcast.stop().await
            {
                error!("failed to stop broadcaster: {e}");
            }

            Some(ServerMessage::UnsubscriptionConfirmed {
                streams: sorted(remaining),
            })
        }

        ClientMessage::RequestCorrelation {
            streams,
            start,
            end,
            threshold,
        } => {
            trace!(%client_id, streams = streams.len(), "correlation request");
            match ctx
                .analytics
                .correlation(&streams, start, end, threshold)
                .await
            {
                Ok(data) => Some(ServerMessage::CorrelationResult { data }),
                Err(e) => Some(ServerMessage::Error {
                    message: e.to_string(),
                }),
            }
        }

        ClientMessage::RequestAnomalyDetection {
            streams,
            start,
            end,
            threshold,
            algorithm,
        } => {
            trace!(%client_id, streams = streams.len(), "anomaly detection request");
            match ctx
                .analytics
                .anomaly_detection(&streams, start, end, threshold, algorithm.as_deref())
                .await
            {
                Ok(data) => Some(ServerMessage::AnomalyDetectionResult { data }),
                Err(e) => Some(ServerMessage::Error {
                    message: e.to_string(),
                }),
            }
        }

        ClientMessage::StartStreaming => {
            debug!(%client_id, "manual streaming start");
            if let Err(e) = ctx.broadcast.start().await {
                error!("failed to start broadcaster: {e}");
            }
            None
        }

        ClientMessage::StopStreaming => {
            debug!(%client_id, "manual streaming stop");
            if let Err(e) = ctx.broadcast.stop().await {
                error!("failed to stop broadcaster: {e}");
            }
            None
        }
    }
}

fn unknown_client(client_id: ClientId) -> ServerMessage {
    ServerMessage::Error {
        message: format!("unknown client: {client_id}"),
    }
}

fn sorted(streams: std::collections::HashSet<String>) -> Vec<String> {
    let mut streams: Vec<String> = streams.into_iter().collect();
    streams.sort();
    streams
}
