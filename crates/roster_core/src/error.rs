use shared::domain::CollectionKind;
use storage::ImportError;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to persist {kind}: {source:#}")]
pub struct PersistFailure {
    pub kind: CollectionKind,
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid {kind} collection: {reason}")]
    InvalidArgument { kind: CollectionKind, reason: String },
    /// The in-memory change was applied and observed; only durability failed.
    #[error("{}", join_failures(.0))]
    Persistence(Vec<PersistFailure>),
    #[error("import into {kind} rejected: {source}")]
    Import {
        kind: CollectionKind,
        #[source]
        source: ImportError,
    },
}

impl StoreError {
    pub(crate) fn check(failures: Vec<PersistFailure>) -> Result<(), StoreError> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Persistence(failures))
        }
    }

    pub fn persistence_failures(&self) -> &[PersistFailure] {
        match self {
            StoreError::Persistence(failures) => failures,
            _ => &[],
        }
    }
}

fn join_failures(failures: &[PersistFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("index {index} out of range for {len} items")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no items match the current filter")]
    NoMatches,
}
