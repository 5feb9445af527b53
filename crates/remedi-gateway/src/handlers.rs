use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::{Form, Json};

use crate::server::AppState;

/// Header carrying the session token back to the client.
pub(crate) const SESSION_HEADER: &str = "x-session-token";

/// Fixed body returned for any pipeline failure.
pub(crate) const ERROR_BODY: &str = "An error occurred while processing your request.";

#[derive(serde::Deserialize)]
pub(crate) struct ChatForm {
    pub msg: String,
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

pub(crate) async fn index_handler() -> Html<&'static str> {
    Html(include_str!("../assets/chat.html"))
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

/// One conversation turn: resolve the session, retrieve and generate under
/// the session's lock, commit the exchange only on success.
pub(crate) async fn chat_handler(
    State(state): State<AppState>,
    form: Result<Form<ChatForm>, FormRejection>,
) -> axum::response::Response {
    let Ok(Form(form)) = form else {
        return (StatusCode::BAD_REQUEST, "missing form field: msg").into_response();
    };

    let (token, transcript) = state.sessions.resolve(form.session.as_deref()).await;
    let mut transcript = transcript.lock().await;

    let rendered = transcript.render_with_pending(&form.msg);

    match state.pipeline.answer(&form.msg, &rendered).await {
        Ok(answer) => {
            transcript.commit_exchange(&form.msg, &answer.text);
            drop(transcript);
            ([(SESSION_HEADER, token)], answer.text).into_response()
        }
        Err(e) => {
            drop(transcript);
            tracing::error!("chat turn failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(SESSION_HEADER, token)],
                ERROR_BODY,
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
    }

    #[test]
    fn chat_form_session_defaults_to_none() {
        let form: ChatForm = serde_json::from_str(r#"{"msg":"hello"}"#).unwrap();
        assert_eq!(form.msg, "hello");
        assert!(form.session.is_none());
    }

    #[test]
    fn chat_form_missing_msg_is_an_error() {
        assert!(serde_json::from_str::<ChatForm>(r#"{"session":"abc"}"#).is_err());
    }

    #[test]
    fn chat_page_mentions_the_chat_route() {
        let page = include_str!("../assets/chat.html");
        assert!(page.contains("/get"));
        assert!(page.contains("msg"));
    }
}
