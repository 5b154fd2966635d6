//! # Public Validation Routes
//!
//! - `GET /validar/:token`        - Verdict page (HTML), linked from the QR code
//! - `GET /v1/validations/:token` - Same verdict as JSON
//!
//! Unknown tokens are an ordinary `invalid` verdict with status 200.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::resolver::{Resolution, Verdict};

use super::error::AppError;
use super::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/validar/:token", get(verdict_page))
        .route("/v1/validations/:token", get(verdict_json))
}

fn lookup(state: &AppState, token: &str) -> Result<Resolution, AppError> {
    state
        .resolver
        .resolve(token)
        .map_err(|e| AppError::internal(e, state.config.environment))
}

async fn verdict_json(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Resolution>, AppError> {
    Ok(Json(lookup(&state, &token)?))
}

async fn verdict_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, AppError> {
    let resolution = lookup(&state, &token)?;
    Ok(([(header::CACHE_CONTROL, "no-store")], Html(render_page(&resolution))).into_response())
}

fn render_page(resolution: &Resolution) -> String {
    let (heading, summary) = match resolution.verdict {
        Verdict::Valid => ("Valid credential", "This card was issued and is in good standing."),
        Verdict::Revoked => (
            "Revoked credential",
            "This card has been revoked and is no longer valid.",
        ),
        Verdict::Invalid => ("Invalid credential", "No valid card matches this code."),
    };

    let mut details = String::new();
    if let Some(public) = &resolution.credential {
        details.push_str("<dl>");
        details.push_str(&format!("<dt>Name</dt><dd>{}</dd>", escape_html(&public.name)));
        if let Some(cpf) = &public.cpf {
            details.push_str(&format!("<dt>CPF</dt><dd>{}</dd>", escape_html(cpf)));
        }
        details.push_str(&format!(
            "<dt>Card number</dt><dd>{}</dd>",
            escape_html(public.card_number.as_str())
        ));
        details.push_str(&format!(
            "<dt>Issued</dt><dd>{}</dd>",
            public.issued_at.format("%d/%m/%Y")
        ));
        details.push_str("</dl>");
    }

    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>{heading}</title></head><body class=\"verdict-{verdict}\">\
         <h1>{heading}</h1><p>{summary}</p>{details}</body></html>\n",
        verdict = resolution.verdict,
    )
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
