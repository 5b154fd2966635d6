//! Record Store Boundary
//!
//! The credential records themselves live in an external store. This module
//! defines what the card engine needs from it: lookups by id and by token,
//! and one atomic "assign identifiers if still unset" write.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::{
    CardNumber, Credential, CredentialId, CredentialStatus, IssuedIdentifiers, ValidationToken,
};

/// Retry bound for [`OptimisticStore`] before it reports contention.
pub const MAX_OPTIMISTIC_RETRIES: usize = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential not found: {0}")]
    NotFound(CredentialId),

    #[error("validation token already assigned to another credential")]
    DuplicateToken,

    #[error("card number {0} already assigned to another credential")]
    DuplicateCardNumber(CardNumber),

    #[error("credential {0} already has identifiers; they cannot be replaced")]
    IdentifiersImmutable(CredentialId),

    #[error("conditional write for {id} lost {attempts} times in a row")]
    Contention { id: CredentialId, attempts: usize },

    #[error("record store error: {0}")]
    Backend(String),
}

/// Result of an assign-if-null write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    /// This call won; the given identifiers are now stored.
    Assigned(IssuedIdentifiers),
    /// Identifiers were already present; these are the stored ones.
    AlreadyAssigned(IssuedIdentifiers),
}

impl AssignOutcome {
    pub fn into_identifiers(self) -> IssuedIdentifiers {
        match self {
            Self::Assigned(ids) | Self::AlreadyAssigned(ids) => ids,
        }
    }
}

pub trait CredentialStore: Send + Sync {
    fn get(&self, id: &CredentialId) -> Result<Option<Credential>, StoreError>;

    fn find_by_token(&self, token: &ValidationToken) -> Result<Option<Credential>, StoreError>;

    /// Store `identifiers` on the credential only if it has none yet.
    ///
    /// Must be atomic: of two concurrent calls for the same id, exactly one
    /// gets `Assigned` and the other reads the winner back as
    /// `AlreadyAssigned`. A token or card number already held by another
    /// credential is rejected with `DuplicateToken` / `DuplicateCardNumber`.
    fn assign_identifiers(
        &self,
        id: &CredentialId,
        identifiers: IssuedIdentifiers,
    ) -> Result<AssignOutcome, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<CredentialId, Credential>,
    by_token: HashMap<ValidationToken, CredentialId>,
    card_numbers: HashSet<CardNumber>,
}

/// In-process store with a true compare-and-set under one write lock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a record, as the approval workflow would.
    ///
    /// Identifiers already issued to a record survive the replacement. An
    /// incoming record that omits them keeps the stored pair; one that
    /// carries a different pair is rejected with `IdentifiersImmutable`.
    pub fn insert(&self, mut credential: Credential) -> Result<(), StoreError> {
        let mut inner = self.inner.write();

        let issued = inner.records.get(&credential.id).and_then(|c| c.identifiers.clone());
        if let Some(issued) = issued {
            match &credential.identifiers {
                Some(incoming) if incoming != &issued => {
                    return Err(StoreError::IdentifiersImmutable(credential.id));
                }
                _ => credential.identifiers = Some(issued),
            }
        }

        if let Some(ids) = &credential.identifiers {
            if let Some(owner) = inner.by_token.get(&ids.validation_token) {
                if owner != &credential.id {
                    return Err(StoreError::DuplicateToken);
                }
            }
            let owned_here = inner
                .records
                .get(&credential.id)
                .and_then(|c| c.card_number())
                .is_some_and(|n| n == &ids.card_number);
            if inner.card_numbers.contains(&ids.card_number) && !owned_here {
                return Err(StoreError::DuplicateCardNumber(ids.card_number.clone()));
            }
        }

        if let Some(previous) = inner.records.remove(&credential.id) {
            if let Some(ids) = previous.identifiers {
                inner.by_token.remove(&ids.validation_token);
                inner.card_numbers.remove(&ids.card_number);
            }
        }

        if let Some(ids) = &credential.identifiers {
            inner.by_token.insert(ids.validation_token.clone(), credential.id.clone());
            inner.card_numbers.insert(ids.card_number.clone());
        }
        inner.records.insert(credential.id.clone(), credential);
        Ok(())
    }

    /// Status transitions belong to the approval workflow; this is its hook.
    pub fn set_status(
        &self,
        id: &CredentialId,
        status: CredentialStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.status = status;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every record, ordered by id.
    pub fn snapshot(&self) -> Vec<Credential> {
        let mut records: Vec<Credential> = self.inner.read().records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, id: &CredentialId) -> Result<Option<Credential>, StoreError> {
        Ok(self.inner.read().records.get(id).cloned())
    }

    fn find_by_token(&self, token: &ValidationToken) -> Result<Option<Credential>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .by_token
            .get(token)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    fn assign_identifiers(
        &self,
        id: &CredentialId,
        identifiers: IssuedIdentifiers,
    ) -> Result<AssignOutcome, StoreError> {
        let mut inner = self.inner.write();

        let existing = inner
            .records
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?
            .identifiers
            .clone();
        if let Some(existing) = existing {
            return Ok(AssignOutcome::AlreadyAssigned(existing));
        }

        if inner.by_token.contains_key(&identifiers.validation_token) {
            return Err(StoreError::DuplicateToken);
        }
        if inner.card_numbers.contains(&identifiers.card_number) {
            return Err(StoreError::DuplicateCardNumber(identifiers.card_number));
        }

        inner.by_token.insert(identifiers.validation_token.clone(), id.clone());
        inner.card_numbers.insert(identifiers.card_number.clone());
        if let Some(record) = inner.records.get_mut(id) {
            record.identifiers = Some(identifiers.clone());
        }
        Ok(AssignOutcome::Assigned(identifiers))
    }
}

/// On-disk shape of a credentials file: one record, or a list of them.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CredentialFile {
    List(Vec<Credential>),
    Single(Credential),
}

/// Credential records held in a JSON file.
///
/// Reads are served from memory. Every newly assigned identifier pair is
/// written back to the file before `assign_identifiers` returns, so a
/// restarted process sees the same card number and token.
pub struct JsonFileStore {
    path: PathBuf,
    single: bool,
    memory: MemoryStore,
    write_lock: Mutex<()>,
    dirty: AtomicBool,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| StoreError::Backend(format!("{}: {e}", path.display())))?;
        let file: CredentialFile = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Backend(format!("{}: {e}", path.display())))?;

        let (records, single) = match file {
            CredentialFile::List(records) => (records, false),
            CredentialFile::Single(record) => (vec![record], true),
        };
        let memory = MemoryStore::new();
        for record in records {
            memory.insert(record)?;
        }
        tracing::info!(path = %path.display(), records = memory.len(), "credentials loaded");

        Ok(Self {
            path,
            single,
            memory,
            write_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ids of every record in the file, ordered.
    pub fn ids(&self) -> Vec<CredentialId> {
        self.memory.snapshot().into_iter().map(|c| c.id).collect()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut records = self.memory.snapshot();
        let file = match (self.single, records.len()) {
            (true, 1) => CredentialFile::Single(records.remove(0)),
            _ => CredentialFile::List(records),
        };
        let json =
            serde_json::to_vec_pretty(&file).map_err(|e| StoreError::Backend(e.to_string()))?;

        // Write beside the target, then rename over it.
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        std::fs::write(&staging, json)
            .and_then(|()| std::fs::rename(&staging, &self.path))
            .map_err(|e| StoreError::Backend(format!("{}: {e}", self.path.display())))?;

        self.dirty.store(false, Ordering::SeqCst);
        tracing::debug!(path = %self.path.display(), "credentials file updated");
        Ok(())
    }
}

impl CredentialStore for JsonFileStore {
    fn get(&self, id: &CredentialId) -> Result<Option<Credential>, StoreError> {
        self.memory.get(id)
    }

    fn find_by_token(&self, token: &ValidationToken) -> Result<Option<Credential>, StoreError> {
        self.memory.find_by_token(token)
    }

    fn assign_identifiers(
        &self,
        id: &CredentialId,
        identifiers: IssuedIdentifiers,
    ) -> Result<AssignOutcome, StoreError> {
        let outcome = self.memory.assign_identifiers(id, identifiers)?;
        // A failed earlier write leaves the file behind memory; retry it here.
        if matches!(outcome, AssignOutcome::Assigned(_)) || self.dirty.load(Ordering::SeqCst) {
            self.dirty.store(true, Ordering::SeqCst);
            self.persist()?;
        }
        Ok(outcome)
    }
}

/// A backend with versioned reads and write-if-version, but no native
/// assign-if-null.
pub trait VersionedBackend: Send + Sync {
    fn load(&self, id: &CredentialId) -> Result<Option<(Credential, u64)>, StoreError>;

    fn find_by_token(&self, token: &ValidationToken) -> Result<Option<Credential>, StoreError>;

    fn card_number_in_use(&self, number: &CardNumber) -> Result<bool, StoreError>;

    /// Persist `credential` if the stored version is still `expected`.
    /// Returns `false` when another writer got there first.
    ///
    /// The uniqueness checks in [`OptimisticStore`] run before this write and
    /// cannot see a concurrent writer on a different record. The backend must
    /// therefore hold unique indexes on token and card number and fail this
    /// write with `DuplicateToken` / `DuplicateCardNumber` when either is
    /// already taken by another credential.
    fn write_if_version(&self, credential: &Credential, expected: u64) -> Result<bool, StoreError>;
}

/// Emulates assign-if-null on a [`VersionedBackend`] with a bounded
/// optimistic read-modify-write loop.
pub struct OptimisticStore<B> {
    backend: B,
    max_retries: usize,
}

impl<B: VersionedBackend> OptimisticStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_retries: MAX_OPTIMISTIC_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: VersionedBackend> CredentialStore for OptimisticStore<B> {
    fn get(&self, id: &CredentialId) -> Result<Option<Credential>, StoreError> {
        Ok(self.backend.load(id)?.map(|(credential, _)| credential))
    }

    fn find_by_token(&self, token: &ValidationToken) -> Result<Option<Credential>, StoreError> {
        self.backend.find_by_token(token)
    }

    fn assign_identifiers(
        &self,
        id: &CredentialId,
        identifiers: IssuedIdentifiers,
    ) -> Result<AssignOutcome, StoreError> {
        let attempts = self.max_retries + 1;
        for attempt in 1..=attempts {
            let (mut record, version) = self
                .backend
                .load(id)?
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;

            if let Some(existing) = record.identifiers {
                return Ok(AssignOutcome::AlreadyAssigned(existing));
            }
            if self.backend.find_by_token(&identifiers.validation_token)?.is_some() {
                return Err(StoreError::DuplicateToken);
            }
            if self.backend.card_number_in_use(&identifiers.card_number)? {
                return Err(StoreError::DuplicateCardNumber(identifiers.card_number));
            }

            record.identifiers = Some(identifiers.clone());
            if self.backend.write_if_version(&record, version)? {
                return Ok(AssignOutcome::Assigned(identifiers));
            }
            tracing::debug!(
                credential_id = %id,
                attempt,
                "optimistic assign lost a race, retrying"
            );
        }

        Err(StoreError::Contention {
            id: id.clone(),
            attempts,
        })
    }
}
