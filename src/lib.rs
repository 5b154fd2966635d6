//! CredCard Core - Member Credential Cards
//!
//! Issues a stable card number and validation token per approved
//! credential, renders the card PNG (background, photo, text, QR) and
//! resolves public validation lookups.
//!
//! # Guarantees
//! 1. Identifiers are assigned once and never change
//! 2. Identical inputs render byte-identical PNGs
//! 3. Public validation never leaks data for revoked or unknown tokens

pub mod api;
pub mod config;
pub mod credential;
pub mod hashing;
pub mod issuer;
pub mod layout;
pub mod photo;
pub mod print;
pub mod qr;
pub mod render;
pub mod resolver;
pub mod service;
pub mod store;
pub mod templates;

pub use config::{AppConfig, Environment};
pub use credential::{
    mask_cpf, CardNumber, Credential, CredentialId, CredentialStatus, IssuedIdentifiers,
    ValidationToken,
};
pub use hashing::render_fingerprint;
pub use issuer::{IssueError, TokenIssuer};
pub use layout::{CardFormat, CardLayout};
pub use photo::{HttpPhotoSource, MemoryPhotoSource, PhotoMask, PhotoSource};
pub use print::PrintSpec;
pub use render::{CardRenderer, CpfDisplay, RenderError, RenderOptions};
pub use resolver::{Resolution, ValidationResolver, Verdict};
pub use service::{CardService, RenderedCard, ServiceError};
pub use store::{CredentialStore, JsonFileStore, MemoryStore, OptimisticStore, StoreError};
pub use templates::CardTemplate;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
