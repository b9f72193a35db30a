//! Bulk import sources. An import is all-or-nothing: one null or
//! undecodable element rejects the whole batch.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read import file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("import source is not a JSON array: {0}")]
    Malformed(String),
    #[error("import element {index} is null")]
    NullElement { index: usize },
    #[error("import element {index} is invalid: {message}")]
    Parse { index: usize, message: String },
}

pub trait ImportSource<T> {
    fn read_all(&self) -> Result<Vec<T>, ImportError>;
}

impl<T: Clone> ImportSource<T> for Vec<T> {
    fn read_all(&self) -> Result<Vec<T>, ImportError> {
        Ok(self.clone())
    }
}

/// A JSON file holding an array of records.
#[derive(Debug, Clone)]
pub struct JsonImportFile {
    path: PathBuf,
}

impl JsonImportFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T: DeserializeOwned> ImportSource<T> for JsonImportFile {
    fn read_all(&self) -> Result<Vec<T>, ImportError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| ImportError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_json_array(&raw)
    }
}

pub fn parse_json_array<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>, ImportError> {
    let values: Vec<Value> =
        serde_json::from_str(raw).map_err(|err| ImportError::Malformed(err.to_string()))?;
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            if value.is_null() {
                return Err(ImportError::NullElement { index });
            }
            serde_json::from_value(value).map_err(|err| ImportError::Parse {
                index,
                message: err.to_string(),
            })
        })
        .collect()
}
