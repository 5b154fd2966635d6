//! Card Service - Single Operator Entry Point
//!
//! CRITICAL: `render_card` checks approval and issues identifiers itself.
//! There is no path to a rendered card that skips either step.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::credential::{CardNumber, Credential, CredentialId, CredentialStatus, IssuedIdentifiers};
use crate::hashing::render_fingerprint;
use crate::issuer::{IssueError, TokenIssuer};
use crate::photo::PhotoSource;
use crate::render::{CardRenderer, RenderError, RenderOptions};
use crate::store::{CredentialStore, StoreError};
use crate::templates::CardTemplate;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("credential not found: {0}")]
    NotFound(CredentialId),

    #[error("credential {id} is {status}, not approved")]
    NotApproved { id: CredentialId, status: CredentialStatus },

    #[error(transparent)]
    Issue(IssueError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<IssueError> for ServiceError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::NotFound(id) => Self::NotFound(id),
            IssueError::NotApproved { id, status } => Self::NotApproved { id, status },
            other => Self::Issue(other),
        }
    }
}

/// A rendered card ready to hand out.
#[derive(Debug, Clone)]
pub struct RenderedCard {
    pub png: Vec<u8>,
    pub card_number: CardNumber,
    pub fingerprint: String,
}

impl RenderedCard {
    /// `cartao-<sanitized card number>.png`
    pub fn filename(&self) -> String {
        format!("cartao-{}.png", self.card_number.sanitized())
    }
}

pub struct CardService {
    store: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    renderer: Arc<CardRenderer>,
    photos: Arc<dyn PhotoSource>,
    fetch_timeout: Duration,
}

impl CardService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        renderer: Arc<CardRenderer>,
        photos: Arc<dyn PhotoSource>,
    ) -> Self {
        Self {
            issuer: TokenIssuer::new(store.clone()),
            store,
            renderer,
            photos,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_issuer(mut self, issuer: TokenIssuer) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Issue identifiers for an approved credential (idempotent).
    pub fn issue(&self, id: &CredentialId) -> Result<IssuedIdentifiers, ServiceError> {
        Ok(self.issuer.issue(id)?)
    }

    /// Render a card for download.
    ///
    /// Refuses non-approved credentials, issues identifiers on first use,
    /// and treats any photo problem as "no photo".
    pub async fn render_card(
        &self,
        id: &CredentialId,
        options: RenderOptions,
    ) -> Result<RenderedCard, ServiceError> {
        let credential = self.ready_for_render(id)?;
        let photo = match credential.photo_reference.as_deref() {
            Some(reference) => self.fetch_photo(id, reference).await,
            None => None,
        };
        self.compose(credential, photo, options).await
    }

    /// As [`render_card`](Self::render_card), with photo bytes supplied by
    /// the caller instead of fetched from the photo store.
    pub async fn render_card_with_photo(
        &self,
        id: &CredentialId,
        photo: Vec<u8>,
        options: RenderOptions,
    ) -> Result<RenderedCard, ServiceError> {
        let credential = self.ready_for_render(id)?;
        self.compose(credential, Some(photo), options).await
    }

    fn ready_for_render(&self, id: &CredentialId) -> Result<Credential, ServiceError> {
        let mut credential = self
            .store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.clone()))?;

        if !credential.status.is_approved() {
            return Err(ServiceError::NotApproved {
                id: id.clone(),
                status: credential.status,
            });
        }

        if credential.identifiers.is_none() {
            credential.identifiers = Some(self.issuer.issue(id)?);
        }
        Ok(credential)
    }

    async fn compose(
        &self,
        credential: Credential,
        photo: Option<Vec<u8>>,
        options: RenderOptions,
    ) -> Result<RenderedCard, ServiceError> {
        let id = credential.id.clone();
        let card_number = credential
            .card_number()
            .cloned()
            .ok_or_else(|| RenderError::NotIssued(id.clone()))?;

        let renderer = Arc::clone(&self.renderer);
        let png = tokio::task::spawn_blocking(move || {
            renderer.render(&credential, photo.as_deref(), &options)
        })
        .await
        .map_err(|e| RenderError::Failure(format!("render task failed: {e}")))??;

        let fingerprint = render_fingerprint(&png);
        tracing::info!(
            credential_id = %id,
            card_number = %card_number,
            fingerprint = %fingerprint,
            bytes = png.len(),
            "card rendered"
        );

        Ok(RenderedCard {
            png,
            card_number,
            fingerprint,
        })
    }

    async fn fetch_photo(&self, id: &CredentialId, reference: &str) -> Option<Vec<u8>> {
        match tokio::time::timeout(self.fetch_timeout, self.photos.fetch(reference)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                tracing::warn!(
                    credential_id = %id,
                    error = %e,
                    "photo fetch failed, using placeholder"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    credential_id = %id,
                    timeout_ms = self.fetch_timeout.as_millis() as u64,
                    "photo fetch timed out, using placeholder"
                );
                None
            }
        }
    }
}

/// Read the background template, bounded by `timeout`. Any failure,
/// including the timeout, is `AssetMissing`.
pub async fn load_template(path: &Path, timeout: Duration) -> Result<CardTemplate, RenderError> {
    let bytes = match tokio::time::timeout(timeout, tokio::fs::read(path)).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            return Err(RenderError::AssetMissing(format!("{}: {e}", path.display())));
        }
        Err(_) => {
            return Err(RenderError::AssetMissing(format!(
                "{}: read timed out",
                path.display()
            )));
        }
    };
    Ok(CardTemplate::from_bytes(&bytes)?)
}
