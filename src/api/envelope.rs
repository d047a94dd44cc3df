use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use crate::error::HostBoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeState {
    Success,
    Exception,
}

impl fmt::Display for EnvelopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("success"),
            Self::Exception => f.write_str("exception"),
        }
    }
}

/// The uniform result body of every non-streaming action.
///
/// `additionalInformation` carries a serialized payload on success and
/// diagnostic text on exception.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub state: EnvelopeState,
    pub message: String,
    pub additional_information: String,
}

impl ResponseEnvelope {
    pub fn success(message: impl Into<String>, additional_information: impl Into<String>) -> Self {
        Self {
            state: EnvelopeState::Success,
            message: message.into(),
            additional_information: additional_information.into(),
        }
    }

    /// Success envelope whose payload is `payload` serialized as JSON.
    pub fn success_json<T: Serialize + ?Sized>(message: impl Into<String>, payload: &T) -> Self {
        match serde_json::to_string(payload) {
            Ok(json) => Self::success(message, json),
            Err(e) => Self::from_error(&HostBoxError::from(e)),
        }
    }

    pub fn exception(message: impl Into<String>, additional_information: impl Into<String>) -> Self {
        Self {
            state: EnvelopeState::Exception,
            message: message.into(),
            additional_information: additional_information.into(),
        }
    }

    pub fn from_error(err: &HostBoxError) -> Self {
        Self::exception(err.to_string(), err.detail())
    }

    /// Envelope for a handler that panicked, built from the unwind payload.
    pub fn from_panic(panic: Box<dyn Any + Send + 'static>) -> Self {
        let detail = if let Some(message) = panic.downcast_ref::<String>() {
            message.clone()
        } else if let Some(message) = panic.downcast_ref::<&str>() {
            message.to_string()
        } else {
            "unknown panic payload".to_string()
        };
        Self::exception("Internal error", format!("Panic: {detail}"))
    }

    pub fn is_success(&self) -> bool {
        self.state == EnvelopeState::Success
    }
}

/// What a handler produced: an envelope the transport serializes, or a
/// response whose body the handler already built (file download).
#[derive(Debug)]
pub enum Reply {
    Envelope(ResponseEnvelope),
    Raw(Response),
}

impl Reply {
    /// Text used for the audit description when the log is not verbose.
    pub fn state_label(&self) -> String {
        match self {
            Self::Envelope(envelope) => envelope.state.to_string(),
            Self::Raw(_) => "raw".to_string(),
        }
    }

    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            Self::Envelope(envelope) => Some(envelope),
            Self::Raw(_) => None,
        }
    }
}

impl From<ResponseEnvelope> for Reply {
    fn from(envelope: ResponseEnvelope) -> Self {
        Self::Envelope(envelope)
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Self::Envelope(envelope) => envelope.into_response(),
            Self::Raw(response) => response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::CONTENT_TYPE;

    #[test]
    fn test_wire_shape() {
        let envelope = ResponseEnvelope::success("Access granted", "HostBox v1 (srv)");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "state": "success",
                "message": "Access granted",
                "additionalInformation": "HostBox v1 (srv)"
            })
        );
    }

    #[test]
    fn test_from_error_carries_message_and_detail() {
        let err = HostBoxError::not_found("Object not found: /nope");
        let envelope = ResponseEnvelope::from_error(&err);

        assert_eq!(envelope.state, EnvelopeState::Exception);
        assert_eq!(envelope.message, "Object not found: /nope");
        assert_eq!(envelope.additional_information, "NotFound: Object not found: /nope");
    }

    #[test]
    fn test_success_json_embeds_payload_as_string() {
        let envelope = ResponseEnvelope::success_json("Object list extracted", &vec![1, 2, 3]);
        assert!(envelope.is_success());
        assert_eq!(envelope.additional_information, "[1,2,3]");
    }

    #[test]
    fn test_envelope_reply_is_json_with_ok_status() {
        let response = Reply::from(ResponseEnvelope::exception("Undefined action", "")).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_raw_reply_passes_response_through() {
        let raw = (StatusCode::OK, "bytes").into_response();
        let reply = Reply::Raw(raw);
        assert_eq!(reply.state_label(), "raw");
        assert!(reply.envelope().is_none());
        assert!(reply.into_response().headers().get(CONTENT_TYPE).unwrap() != "application/json");
    }
}
