//! Token Issuer
//!
//! Assigns `card_number` and `validation_token` to an approved credential,
//! once. All randomness comes from the operating system CSPRNG.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use thiserror::Error;

use crate::credential::{
    CardNumber, CredentialId, CredentialStatus, IssuedIdentifiers, ValidationToken,
    CARD_NUMBER_PREFIX, CARD_NUMBER_SUFFIX_LEN,
};
use crate::store::{AssignOutcome, CredentialStore, StoreError};

/// Fresh identifier pairs tried before giving up on uniqueness collisions.
pub const MAX_GENERATION_ATTEMPTS: usize = 4;

const BASE36_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("credential not found: {0}")]
    NotFound(CredentialId),

    #[error("credential {id} is {status}, only approved credentials are issued")]
    NotApproved { id: CredentialId, status: CredentialStatus },

    #[error("issuance conflict for {id}: {reason}")]
    Conflict { id: CredentialId, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct TokenIssuer {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Return the credential's identifiers, generating them on first call.
    ///
    /// Safe to call concurrently for the same id: every caller gets the pair
    /// that the store accepted first.
    pub fn issue(&self, id: &CredentialId) -> Result<IssuedIdentifiers, IssueError> {
        let credential = self
            .store
            .get(id)?
            .ok_or_else(|| IssueError::NotFound(id.clone()))?;

        if let Some(existing) = credential.identifiers {
            return Ok(existing);
        }
        if !credential.status.is_approved() {
            return Err(IssueError::NotApproved {
                id: id.clone(),
                status: credential.status,
            });
        }

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let issued_at = self.clock.now();
            let candidate = IssuedIdentifiers {
                card_number: generate_card_number(issued_at),
                validation_token: generate_validation_token(),
                issued_at,
            };

            match self.store.assign_identifiers(id, candidate) {
                Ok(AssignOutcome::Assigned(ids)) => {
                    tracing::info!(
                        credential_id = %id,
                        card_number = %ids.card_number,
                        "identifiers issued"
                    );
                    return Ok(ids);
                }
                Ok(AssignOutcome::AlreadyAssigned(ids)) => {
                    tracing::debug!(
                        credential_id = %id,
                        "identifiers already issued by a concurrent caller"
                    );
                    return Ok(ids);
                }
                Err(StoreError::DuplicateToken | StoreError::DuplicateCardNumber(_)) => {
                    tracing::warn!(
                        credential_id = %id,
                        attempt,
                        "identifier collision, regenerating"
                    );
                }
                Err(StoreError::Contention { attempts, .. }) => {
                    return Err(IssueError::Conflict {
                        id: id.clone(),
                        reason: format!("conditional write lost {attempts} times"),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(IssueError::Conflict {
            id: id.clone(),
            reason: format!("no unique identifiers after {MAX_GENERATION_ATTEMPTS} attempts"),
        })
    }
}

/// `MAF-<base36 millis>-<6 random [0-9A-Z]>`.
pub fn generate_card_number(now: DateTime<Utc>) -> CardNumber {
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    let mut rng = OsRng;
    let suffix: String = (0..CARD_NUMBER_SUFFIX_LEN)
        .map(|_| BASE36_ALPHABET[rng.gen_range(0..BASE36_ALPHABET.len())] as char)
        .collect();

    let raw = format!("{CARD_NUMBER_PREFIX}-{}-{suffix}", to_base36(millis));
    match CardNumber::parse(&raw) {
        Ok(number) => number,
        Err(_) => unreachable!("generated card number always matches its own format"),
    }
}

/// 32 bytes from the OS CSPRNG, hex encoded.
pub fn generate_validation_token() -> ValidationToken {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    ValidationToken::from_bytes(&bytes)
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
