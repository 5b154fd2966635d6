//! Shared handler state. Every collaborator is passed in; nothing is global.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::resolver::ValidationResolver;
use crate::service::CardService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cards: Arc<CardService>,
    pub resolver: Arc<ValidationResolver>,
}

impl AppState {
    pub fn new(config: AppConfig, cards: CardService, resolver: ValidationResolver) -> Self {
        Self {
            config: Arc::new(config),
            cards: Arc::new(cards),
            resolver: Arc::new(resolver),
        }
    }
}
