use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("resource '{path}' not found")]
    NotFound { path: String },
    #[error("resource path '{path}' escapes the resource root")]
    InvalidPath { path: String },
    #[error("failed to read resource '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse '{path}' at {field}: {source}")]
    Json {
        path: String,
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read-only access to the world's files. Only consulted while loading.
pub trait ResourceLoader {
    fn load_bytes(&self, path: &str) -> Result<Vec<u8>, ResourceError>;
}

/// Parses a JSON resource, reporting the path of the first field that fails.
pub fn load_json<T: DeserializeOwned>(
    loader: &dyn ResourceLoader,
    path: &str,
) -> Result<T, ResourceError> {
    let bytes = loader.load_bytes(path)?;
    parse_json(path, &bytes)
}

pub(crate) fn parse_json<T: DeserializeOwned>(path: &str, bytes: &[u8]) -> Result<T, ResourceError> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        ResourceError::Json {
            path: path.to_string(),
            field,
            source: error.into_inner(),
        }
    })
}

/// Files under a directory on disk.
#[derive(Debug, Clone)]
pub struct DirResources {
    root: PathBuf,
}

impl DirResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ResourceError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(ResourceError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ResourceLoader for DirResources {
    fn load_bytes(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let full = self.resolve(path)?;
        fs::read(&full).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ResourceError::NotFound {
                path: path.to_string(),
            },
            _ => ResourceError::Io {
                path: path.to_string(),
                source,
            },
        })
    }
}

/// Files held in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryResources {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, contents: &str) -> Self {
        self.insert(path, contents.as_bytes().to_vec());
        self
    }

    pub fn insert(&mut self, path: &str, contents: Vec<u8>) {
        self.files.insert(path.to_string(), contents);
    }
}

impl ResourceLoader for MemoryResources {
    fn load_bytes(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ResourceError::NotFound {
                path: path.to_string(),
            })
    }
}
