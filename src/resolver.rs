//! Public Validation
//!
//! Maps a token to one of three verdicts. Only `valid` carries member data;
//! `revoked` and `invalid` are bare, so a token cannot be used to enumerate
//! anything beyond its own verdict.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::{mask_cpf, CardNumber, Credential, CredentialStatus, ValidationToken};
use crate::store::{CredentialStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Revoked,
    Invalid,
}

impl Verdict {
    /// Pending and rejected fold into `invalid` with unknown tokens.
    pub fn for_status(status: CredentialStatus) -> Self {
        match status {
            CredentialStatus::AutoApproved | CredentialStatus::ManuallyApproved => Self::Valid,
            CredentialStatus::Revoked => Self::Revoked,
            CredentialStatus::PendingReview | CredentialStatus::Rejected => Self::Invalid,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Revoked => "revoked",
            Self::Invalid => "invalid",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a `valid` verdict may disclose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicCredential {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    pub card_number: CardNumber,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub verdict: Verdict,
    #[serde(flatten)]
    pub credential: Option<PublicCredential>,
}

impl Resolution {
    fn bare(verdict: Verdict) -> Self {
        Self { verdict, credential: None }
    }

    fn from_record(record: &Credential) -> Self {
        let verdict = Verdict::for_status(record.status);
        if verdict != Verdict::Valid {
            return Self::bare(verdict);
        }
        // A valid record without identifiers cannot have been found by token.
        let Some(ids) = &record.identifiers else {
            return Self::bare(Verdict::Invalid);
        };
        Self {
            verdict,
            credential: Some(PublicCredential {
                name: record.name.clone(),
                cpf: record.cpf.as_deref().map(mask_cpf),
                card_number: ids.card_number.clone(),
                issued_at: ids.issued_at,
            }),
        }
    }
}

pub struct ValidationResolver {
    store: Arc<dyn CredentialStore>,
}

impl ValidationResolver {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Read-only lookup. An unknown or malformed token is an `invalid`
    /// verdict, not an error; only a failing store is.
    pub fn resolve(&self, token: &str) -> Result<Resolution, StoreError> {
        let Ok(token) = ValidationToken::parse(token) else {
            return Ok(Resolution::bare(Verdict::Invalid));
        };

        let resolution = match self.store.find_by_token(&token)? {
            Some(record) => Resolution::from_record(&record),
            None => Resolution::bare(Verdict::Invalid),
        };
        tracing::debug!(verdict = %resolution.verdict, "validation lookup");
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::IssuedIdentifiers;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn token() -> ValidationToken {
        ValidationToken::from_bytes(&[0x11; 32])
    }

    fn resolver_with(status: CredentialStatus) -> ValidationResolver {
        let store = MemoryStore::new();
        store
            .insert(
                Credential::new("c1", "Carlos Souza", status)
                    .with_cpf("123.456.789-01")
                    .with_identifiers(IssuedIdentifiers {
                        card_number: CardNumber::parse("MAF-K3J9-AB12CD").unwrap(),
                        validation_token: token(),
                        issued_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
                    }),
            )
            .unwrap();
        ValidationResolver::new(Arc::new(store))
    }

    #[test]
    fn test_status_table() {
        assert_eq!(Verdict::for_status(CredentialStatus::AutoApproved), Verdict::Valid);
        assert_eq!(Verdict::for_status(CredentialStatus::ManuallyApproved), Verdict::Valid);
        assert_eq!(Verdict::for_status(CredentialStatus::Revoked), Verdict::Revoked);
        assert_eq!(Verdict::for_status(CredentialStatus::PendingReview), Verdict::Invalid);
        assert_eq!(Verdict::for_status(CredentialStatus::Rejected), Verdict::Invalid);
    }

    #[test]
    fn test_valid_discloses_masked_fields() {
        let resolution = resolver_with(CredentialStatus::AutoApproved)
            .resolve(token().as_str())
            .unwrap();
        assert_eq!(resolution.verdict, Verdict::Valid);
        let public = resolution.credential.unwrap();
        assert_eq!(public.cpf.as_deref(), Some("***.***.***-01"));
        assert_eq!(public.card_number.as_str(), "MAF-K3J9-AB12CD");
    }

    #[test]
    fn test_revoked_is_bare() {
        let resolution = resolver_with(CredentialStatus::Revoked)
            .resolve(token().as_str())
            .unwrap();
        assert_eq!(resolution, Resolution::bare(Verdict::Revoked));
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json, serde_json::json!({"verdict": "revoked"}));
    }

    #[test]
    fn test_pending_is_invalid() {
        let resolution = resolver_with(CredentialStatus::PendingReview)
            .resolve(token().as_str())
            .unwrap();
        assert_eq!(resolution, Resolution::bare(Verdict::Invalid));
    }

    #[test]
    fn test_unknown_and_malformed_tokens() {
        let resolver = resolver_with(CredentialStatus::AutoApproved);
        let unknown = "ff".repeat(32);
        assert_eq!(resolver.resolve(&unknown).unwrap().verdict, Verdict::Invalid);
        assert_eq!(resolver.resolve("../../etc/passwd").unwrap().verdict, Verdict::Invalid);
        assert_eq!(resolver.resolve("").unwrap().verdict, Verdict::Invalid);
    }

    #[test]
    fn test_valid_json_shape() {
        let resolution = resolver_with(CredentialStatus::ManuallyApproved)
            .resolve(token().as_str())
            .unwrap();
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json["verdict"], "valid");
        assert_eq!(json["card_number"], "MAF-K3J9-AB12CD");
        assert_eq!(json["name"], "Carlos Souza");
    }
}
