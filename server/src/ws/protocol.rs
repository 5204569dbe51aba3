use axum::extract::ws::Message;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;

use crate::state::AppState;
use crate::ws::{ConnectionId, ConnectionSender};

/// A client message the server cannot interpret. Fatal to that connection only.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON message: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("binary message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Inbound query. Clients may send other fields (e.g. `stage`, `member`);
/// only a non-empty `token` asks for a response. A `null` token is the
/// same as an absent one.
#[derive(Debug, Default, Deserialize)]
pub struct QueryMessage {
    #[serde(default)]
    pub token: Option<String>,
}

/// Handle an incoming text message.
pub fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    connection_id: &ConnectionId,
) -> Result<(), ProtocolError> {
    let query: QueryMessage = serde_json::from_str(text)?;
    match query.token.as_deref() {
        Some(token) if !token.is_empty() => respond_token(token, tx, state, connection_id),
        _ => {}
    }
    Ok(())
}

/// Handle an incoming binary message. Payloads carry the same JSON as text frames.
pub fn handle_binary_message(
    data: &[u8],
    tx: &ConnectionSender,
    state: &AppState,
    connection_id: &ConnectionId,
) -> Result<(), ProtocolError> {
    let text = std::str::from_utf8(data)?;
    handle_text_message(text, tx, state, connection_id)
}

/// Send the detail of the stage named by `token`. Unknown tokens get no reply.
fn respond_token(token: &str, tx: &ConnectionSender, state: &AppState, connection_id: &ConnectionId) {
    let Some(detail) = state.theatre.stage_detail(token) else {
        tracing::debug!(connection_id = %connection_id, token = %token, "Query for unknown stage");
        return;
    };

    let json = match serde_json::to_string(&detail) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(connection_id = %connection_id, error = %e, "Failed to serialize stage detail");
            return;
        }
    };

    match tx.try_send(Message::Text(json.into())) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            tracing::debug!(connection_id = %connection_id, "Outbox full, stage detail dropped");
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::event_channel;
    use crate::theatre::{OpenContent, Theatre};
    use crate::ws::new_connection_registry;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_state() -> (AppState, String) {
        let (tx, _rx) = event_channel();
        let mut theatre = Theatre::new(tx);
        let owner = theatre.add_member("Shakespeare");
        let actor = theatre.add_member("Prospero");
        let stage = theatre.create_open_stage(owner, "Play: The Tempest");
        theatre.publish(OpenContent::text(actor, "Our revels now are ended"), stage);

        let state = AppState {
            theatre: Arc::new(theatre),
            connections: new_connection_registry(),
            outbox_capacity: 4,
            write_timeout: Duration::from_secs(1),
        };
        (state, stage.to_hex())
    }

    #[test]
    fn test_token_query_returns_stage_detail() {
        let (state, stage) = test_state();
        let (tx, mut rx) = mpsc::channel(4);
        let id = ConnectionId::new();

        let msg = format!(r#"{{"token":"{}"}}"#, stage);
        handle_text_message(&msg, &tx, &state, &id).unwrap();

        let Message::Text(reply) = rx.try_recv().unwrap() else {
            panic!("expected text reply");
        };
        let detail: serde_json::Value = serde_json::from_str(reply.as_str()).unwrap();
        assert_eq!(detail["stage"]["name"], "Play: The Tempest");
        assert_eq!(detail["stage"]["token"], stage);
        assert_eq!(detail["content"][0]["author"]["name"], "Prospero");
    }

    #[test]
    fn test_binary_query_is_accepted() {
        let (state, stage) = test_state();
        let (tx, mut rx) = mpsc::channel(4);
        let msg = format!(r#"{{"token":"{}"}}"#, stage);
        handle_binary_message(msg.as_bytes(), &tx, &state, &ConnectionId::new()).unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_messages_without_token_get_no_reply() {
        let (state, _) = test_state();
        let (tx, mut rx) = mpsc::channel(4);
        let id = ConnectionId::new();
        handle_text_message(r#"{"stage":"larissa-onboarding"}"#, &tx, &state, &id).unwrap();
        handle_text_message(r#"{"token":""}"#, &tx, &state, &id).unwrap();
        handle_text_message("{}", &tx, &state, &id).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_null_token_is_valid_and_gets_no_reply() {
        let (state, _) = test_state();
        let (tx, mut rx) = mpsc::channel(4);
        let id = ConnectionId::new();
        handle_text_message(r#"{"token":null,"stage":"x"}"#, &tx, &state, &id).unwrap();
        handle_binary_message(br#"{"token":null}"#, &tx, &state, &id).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unknown_token_gets_no_reply() {
        let (state, _) = test_state();
        let (tx, mut rx) = mpsc::channel(4);
        let unknown = crate::token::Token::random().to_hex();
        let msg = format!(r#"{{"token":"{}"}}"#, unknown);
        handle_text_message(&msg, &tx, &state, &ConnectionId::new()).unwrap();
        handle_text_message(r#"{"token":"xyz"}"#, &tx, &state, &ConnectionId::new()).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_malformed_json_is_protocol_error() {
        let (state, _) = test_state();
        let (tx, _rx) = mpsc::channel(4);
        let err = handle_text_message("{not json", &tx, &state, &ConnectionId::new()).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn test_invalid_utf8_is_protocol_error() {
        let (state, _) = test_state();
        let (tx, _rx) = mpsc::channel(4);
        let err = handle_binary_message(&[0xff, 0xfe], &tx, &state, &ConnectionId::new()).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidUtf8(_)));
    }
}
