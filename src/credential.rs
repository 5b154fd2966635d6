//! Credential Model
//!
//! The record behind one member card. `card_number` and `validation_token`
//! travel together as [`IssuedIdentifiers`]: a credential either has both or
//! neither.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CARD_NUMBER_PREFIX: &str = "MAF";
pub const CARD_NUMBER_SUFFIX_LEN: usize = 6;
pub const VALIDATION_TOKEN_LEN: usize = 64;
pub const CPF_MASK_CHAR: char = '*';

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("card number {0:?} does not match MAF-<base36>-<6 alphanumeric>")]
    CardNumber(String),

    #[error("validation token must be {VALIDATION_TOKEN_LEN} lowercase hex characters")]
    ValidationToken,
}

/// Opaque record identifier, owned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(String);

impl CredentialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    PendingReview,
    AutoApproved,
    ManuallyApproved,
    Rejected,
    Revoked,
}

impl CredentialStatus {
    /// Approved credentials are the only ones that may be issued or rendered.
    pub fn is_approved(self) -> bool {
        matches!(self, Self::AutoApproved | Self::ManuallyApproved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingReview => "pending_review",
            Self::AutoApproved => "auto_approved",
            Self::ManuallyApproved => "manually_approved",
            Self::Rejected => "rejected",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Printed card identifier, `MAF-<base36 timestamp>-<6 alphanumeric>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardNumber(String);

impl CardNumber {
    pub fn parse(raw: &str) -> Result<Self, FormatError> {
        let invalid = || FormatError::CardNumber(raw.to_string());
        let mut parts = raw.split('-');
        let (Some(prefix), Some(stamp), Some(suffix), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let upper_alnum = |s: &str| s.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase());

        if prefix != CARD_NUMBER_PREFIX
            || stamp.is_empty()
            || !upper_alnum(stamp)
            || suffix.len() != CARD_NUMBER_SUFFIX_LEN
            || !upper_alnum(suffix)
        {
            return Err(invalid());
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name safe form, keeping only `[A-Za-z0-9_-]`.
    pub fn sanitized(&self) -> String {
        self.0
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect()
    }
}

impl TryFrom<String> for CardNumber {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CardNumber> for String {
    fn from(value: CardNumber) -> Self {
        value.0
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public lookup token, 64 lowercase hex characters (256 bits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ValidationToken(String);

impl ValidationToken {
    pub fn parse(raw: &str) -> Result<Self, FormatError> {
        let well_formed = raw.len() == VALIDATION_TOKEN_LEN
            && raw.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(FormatError::ValidationToken);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ValidationToken {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ValidationToken> for String {
    fn from(value: ValidationToken) -> Self {
        value.0
    }
}

impl fmt::Display for ValidationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The pair assigned once at issuance, plus when that happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedIdentifiers {
    pub card_number: CardNumber,
    pub validation_token: ValidationToken,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cpf: Option<String>,
    pub status: CredentialStatus,
    #[serde(default)]
    pub certification_date: Option<NaiveDate>,
    #[serde(default)]
    pub identifiers: Option<IssuedIdentifiers>,
    #[serde(default)]
    pub photo_reference: Option<String>,
}

impl Credential {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: CredentialStatus) -> Self {
        Self {
            id: CredentialId::new(id),
            name: name.into(),
            cpf: None,
            status,
            certification_date: None,
            identifiers: None,
            photo_reference: None,
        }
    }

    pub fn with_cpf(mut self, cpf: impl Into<String>) -> Self {
        self.cpf = Some(cpf.into());
        self
    }

    pub fn with_certification_date(mut self, date: NaiveDate) -> Self {
        self.certification_date = Some(date);
        self
    }

    pub fn with_photo_reference(mut self, reference: impl Into<String>) -> Self {
        self.photo_reference = Some(reference.into());
        self
    }

    pub fn with_identifiers(mut self, identifiers: IssuedIdentifiers) -> Self {
        self.identifiers = Some(identifiers);
        self
    }

    pub fn card_number(&self) -> Option<&CardNumber> {
        self.identifiers.as_ref().map(|ids| &ids.card_number)
    }

    pub fn validation_token(&self) -> Option<&ValidationToken> {
        self.identifiers.as_ref().map(|ids| &ids.validation_token)
    }
}

/// Replace every alphanumeric character but the last two with
/// [`CPF_MASK_CHAR`], keeping punctuation in place: `123.456.789-01` becomes
/// `***.***.***-01`.
pub fn mask_cpf(cpf: &str) -> String {
    let total = cpf.chars().filter(|c| c.is_alphanumeric()).count();
    let keep_from = total.saturating_sub(2);

    let mut seen = 0;
    cpf.chars()
        .map(|c| {
            if !c.is_alphanumeric() {
                return c;
            }
            seen += 1;
            if seen > keep_from {
                c
            } else {
                CPF_MASK_CHAR
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_number_accepts_issued_shape() {
        assert!(CardNumber::parse("MAF-K3J9-AB12CD").is_ok());
        assert!(CardNumber::parse("MAF-LZ8X2Q1A-000000").is_ok());
    }

    #[test]
    fn test_card_number_rejects_malformed() {
        for raw in [
            "",
            "MAF-K3J9",
            "MAF--AB12CD",
            "maf-K3J9-AB12CD",
            "MAF-k3j9-AB12CD",
            "MAF-K3J9-AB12C",
            "MAF-K3J9-AB12CD-X",
            "XYZ-K3J9-AB12CD",
        ] {
            assert!(CardNumber::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_card_number_sanitized_for_filenames() {
        let number = CardNumber::parse("MAF-K3J9-AB12CD").unwrap();
        assert_eq!(number.sanitized(), "MAF-K3J9-AB12CD");
    }

    #[test]
    fn test_validation_token_format() {
        let good = "a1".repeat(32);
        assert!(ValidationToken::parse(&good).is_ok());
        assert!(ValidationToken::parse(&good.to_uppercase()).is_err());
        assert!(ValidationToken::parse(&good[..62]).is_err());
        assert!(ValidationToken::parse(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_token_from_bytes_is_lowercase_hex() {
        let token = ValidationToken::from_bytes(&[0xAB; 32]);
        assert_eq!(token.as_str(), "ab".repeat(32));
    }

    #[test]
    fn test_mask_cpf_formatted() {
        assert_eq!(mask_cpf("123.456.789-01"), "***.***.***-01");
    }

    #[test]
    fn test_mask_cpf_digits_only() {
        assert_eq!(mask_cpf("12345678901"), "*********01");
        assert_eq!(mask_cpf("7"), "7");
    }

    #[test]
    fn test_mask_cpf_hides_letters_and_non_ascii_digits() {
        assert_eq!(mask_cpf("AB3.456.789-X1"), "***.***.***-X1");
        assert_eq!(mask_cpf("١٢٣.456.789-01"), "***.***.***-01");
        assert_eq!(mask_cpf("abc def"), "*** *ef");
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&CredentialStatus::ManuallyApproved).unwrap();
        assert_eq!(json, r#""manually_approved""#);
        assert!(CredentialStatus::AutoApproved.is_approved());
        assert!(!CredentialStatus::Revoked.is_approved());
        assert!(!CredentialStatus::PendingReview.is_approved());
    }

    #[test]
    fn test_card_number_deserialize_validates() {
        let err = serde_json::from_str::<CardNumber>(r#""not-a-card""#);
        assert!(err.is_err());
    }
}
