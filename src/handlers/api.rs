use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{info, warn};

use crate::state::AppState;

/// Spoken to the caller before the stream connects.
pub const GREETING: &str =
    "Thank you for calling Dr. Vet's office! How can I help you today?";

/// Voice used for the greeting.
pub const GREETING_VOICE: &str = "Polly.Joanna-Neural";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub message: &'static str,
}

/// Health check handler
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        message: "Twilio Media Stream Server is running!",
    })
}

/// Incoming call webhook
///
/// Answers with TwiML that greets the caller and connects the call to the
/// media stream endpoint on this server.
pub async fn incoming_call(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let host = state.config.public_host.clone().or_else(|| {
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    });

    let Some(host) = host else {
        warn!("Incoming call without Host header and no public host configured");
        return (StatusCode::BAD_REQUEST, "Missing Host header").into_response();
    };

    info!(host = %host, "Answering incoming call");
    (
        [(header::CONTENT_TYPE, "text/xml")],
        twiml_response(&host),
    )
        .into_response()
}

fn twiml_response(host: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say voice="{GREETING_VOICE}">{}</Say><Connect><Stream url="wss://{}/media-stream" /></Connect></Response>"#,
        xml_escape(GREETING),
        xml_escape(host)
    )
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twiml_points_at_media_stream() {
        let twiml = twiml_response("calls.example.com");
        assert!(twiml.contains(r#"<Stream url="wss://calls.example.com/media-stream" />"#));
        assert!(twiml.contains(r#"<Say voice="Polly.Joanna-Neural">"#));
        assert!(twiml.contains("Dr. Vet&apos;s office"));
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape(r#"a&b<"c">"#), "a&amp;b&lt;&quot;c&quot;&gt;");
    }
}
