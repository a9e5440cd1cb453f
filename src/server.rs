//! HTTP surface for the ensemble.
//!
//! `GET /` is a liveness string. `POST /paraphrase` takes JSON text plus
//! optional generation overrides and returns the selected candidate.
//! Any origin may call the API, so a browser client served elsewhere can use it.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::gateway::{GenerationOptions, RequestError, StyleHints};
use crate::selector::{Ensemble, SelectionError};

pub const BANNER: &str = "AI Paraphraser API is running!";

pub struct AppState {
    pub ensemble: Ensemble,
    /// Applied when the request body leaves a field unset.
    pub defaults: GenerationOptions,
}

#[derive(Debug, Deserialize)]
struct ParaphraseBody {
    #[serde(default)]
    text: String,
    temperature: Option<f32>,
    candidates: Option<u32>,
    max_length: Option<u32>,
    styles: Option<Vec<String>>,
}

impl ParaphraseBody {
    fn options(&self, defaults: &GenerationOptions) -> GenerationOptions {
        let mut opts = defaults.clone();
        if let Some(t) = self.temperature {
            opts.temperature = t;
        }
        if let Some(n) = self.candidates {
            opts.candidates = n;
        }
        if let Some(max) = self.max_length {
            opts.max_length = max;
        }
        if let Some(styles) = &self.styles {
            opts.styles = StyleHints::new(styles);
        }
        opts
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/paraphrase", post(paraphrase))
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "listening");
    }
    axum::serve(listener, router(state)).await
}

async fn index() -> &'static str {
    BANNER
}

async fn paraphrase(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ParaphraseBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejected request body");
            return error_response(StatusCode::BAD_REQUEST, RequestError::EmptyText.to_string());
        }
    };

    let options = body.options(&state.defaults);
    let result = state.ensemble.paraphrase(&body.text, options).await;
    match result {
        Ok(selection) => Json(json!({
            "original": body.text,
            "paraphrased": selection.candidate.text,
            "provider_used": selection.provider,
            "score": selection.score.total,
            "breakdown": selection.score,
        }))
        .into_response(),
        Err(SelectionError::AllProvidersFailed { errors }) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "all providers failed",
                "failures": errors,
            })),
        )
            .into_response(),
        Err(err) if err.is_client_error() => {
            error_response(StatusCode::BAD_REQUEST, err_message(&err))
        }
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn err_message(err: &SelectionError) -> String {
    match err {
        SelectionError::InvalidRequest(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
