//! # Operator Card Routes
//!
//! - `POST /v1/credentials/:id/issue`    - Issue identifiers (idempotent)
//! - `GET  /v1/credentials/:id/card.png` - Download the rendered card

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::{CardNumber, CredentialId, IssuedIdentifiers, ValidationToken};
use crate::layout::CardFormat;
use crate::print::PrintSpec;
use crate::render::{CpfDisplay, RenderOptions};

use super::error::AppError;
use super::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/credentials/:id/issue", post(issue_identifiers))
        .route("/v1/credentials/:id/card.png", get(download_card))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IssueResponse {
    pub card_number: CardNumber,
    pub validation_token: ValidationToken,
    pub issued_at: DateTime<Utc>,
}

impl From<IssuedIdentifiers> for IssueResponse {
    fn from(ids: IssuedIdentifiers) -> Self {
        Self {
            card_number: ids.card_number,
            validation_token: ids.validation_token,
            issued_at: ids.issued_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatParam {
    #[default]
    Raster,
    Print,
}

#[derive(Debug, Default, Deserialize)]
pub struct CardQuery {
    #[serde(default)]
    pub format: FormatParam,
    pub dpi: Option<u32>,
    pub cpf: Option<CpfDisplay>,
}

impl CardQuery {
    fn render_options(&self) -> Result<RenderOptions, AppError> {
        let format = match self.format {
            FormatParam::Raster => CardFormat::Raster,
            FormatParam::Print => {
                let spec = match self.dpi {
                    Some(dpi) => PrintSpec::from_user(dpi)
                        .map_err(|e| AppError::Validation(e.to_string()))?,
                    None => PrintSpec::default(),
                };
                CardFormat::Print(spec)
            }
        };
        Ok(RenderOptions {
            format,
            cpf_display: self.cpf.unwrap_or_default(),
            ..RenderOptions::default()
        })
    }
}

async fn issue_identifiers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<IssueResponse>, AppError> {
    let id = CredentialId::new(id);
    let ids = state
        .cards
        .issue(&id)
        .map_err(|e| AppError::from_service(e, state.config.environment))?;
    Ok(Json(ids.into()))
}

async fn download_card(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CardQuery>,
) -> Result<Response, AppError> {
    let options = query.render_options()?;
    let id = CredentialId::new(id);
    let card = state
        .cards
        .render_card(&id, options)
        .await
        .map_err(|e| AppError::from_service(e, state.config.environment))?;

    let disposition = format!("attachment; filename=\"{}\"", card.filename());
    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        card.png,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults_to_raster_masked() {
        let options = CardQuery::default().render_options().unwrap();
        assert_eq!(options.format, CardFormat::Raster);
        assert_eq!(options.cpf_display, CpfDisplay::Masked);
    }

    #[test]
    fn query_print_with_dpi() {
        let query = CardQuery {
            format: FormatParam::Print,
            dpi: Some(600),
            cpf: Some(CpfDisplay::Full),
        };
        let options = query.render_options().unwrap();
        assert_eq!(options.format, CardFormat::Print(PrintSpec { dpi: 600 }));
        assert_eq!(options.cpf_display, CpfDisplay::Full);
    }

    #[test]
    fn query_rejects_bad_dpi() {
        let query = CardQuery {
            format: FormatParam::Print,
            dpi: Some(10),
            cpf: None,
        };
        assert!(matches!(query.render_options(), Err(AppError::Validation(_))));
    }
}
