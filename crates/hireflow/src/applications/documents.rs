use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use tracing::warn;

use super::domain::DocumentField;

const NAME_ATTEMPTS: usize = 3;

/// Blob storage addressed by generated filename. Writes never overwrite.
pub trait DocumentStore: Send + Sync {
    /// Write a new blob; fails with `AlreadyExists` if the name is taken.
    fn create(&self, name: &str, bytes: &[u8]) -> Result<(), DocumentStoreError>;
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, DocumentStoreError>;
    fn exists(&self, name: &str) -> Result<bool, DocumentStoreError>;
    /// Remove a blob. Removing a missing blob is not an error.
    fn delete(&self, name: &str) -> Result<(), DocumentStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentStoreError {
    #[error("document '{0}' already exists")]
    AlreadyExists(String),
    #[error("invalid document name '{0}'")]
    InvalidName(String),
    #[error("document store io failure for '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Documents kept as plain files in one directory.
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    /// Open the directory, creating it when absent.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, DocumentStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| DocumentStoreError::Io {
            name: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, DocumentStoreError> {
        if is_safe_name(name) {
            Ok(self.root.join(name))
        } else {
            Err(DocumentStoreError::InvalidName(name.to_string()))
        }
    }
}

/// Best-effort removal of a file whose write did not complete.
fn remove_partial(path: &Path, name: &str) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            warn!(document = %name, error = %err, "failed to remove partially written document");
        }
    }
}

impl DocumentStore for LocalDocumentStore {
    fn create(&self, name: &str, bytes: &[u8]) -> Result<(), DocumentStoreError> {
        let path = self.path_for(name)?;
        let io_error = |source| DocumentStoreError::Io {
            name: name.to_string(),
            source,
        };

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(DocumentStoreError::AlreadyExists(name.to_string()))
            }
            Err(err) => return Err(io_error(err)),
        };

        let written = file.write_all(bytes).and_then(|_| file.sync_all());
        if let Err(err) = written {
            drop(file);
            remove_partial(&path, name);
            return Err(io_error(err));
        }
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, DocumentStoreError> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(DocumentStoreError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }

    fn exists(&self, name: &str) -> Result<bool, DocumentStoreError> {
        let path = self.path_for(name)?;
        Ok(path.is_file())
    }

    fn delete(&self, name: &str) -> Result<(), DocumentStoreError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(DocumentStoreError::Io {
                name: name.to_string(),
                source,
            }),
        }
    }
}

/// A flat filename with no separators or parent references.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0'])
}

/// `<field>-<millis>-<9 digits>.<ext>`
pub fn generate_document_name(field: DocumentField, extension: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{millis}-{nonce:09}.{extension}", field.form_name())
}

/// Store `bytes` under a fresh generated name, retrying name collisions.
pub fn store_new_document<D>(
    store: &D,
    field: DocumentField,
    extension: &str,
    bytes: &[u8],
) -> Result<String, DocumentStoreError>
where
    D: DocumentStore + ?Sized,
{
    let mut last_error = None;
    for _ in 0..NAME_ATTEMPTS {
        let name = generate_document_name(field, extension);
        match store.create(&name, bytes) {
            Ok(()) => return Ok(name),
            Err(err @ DocumentStoreError::AlreadyExists(_)) => last_error = Some(err),
            Err(err) => return Err(err),
        }
    }
    Err(last_error.unwrap_or_else(|| {
        DocumentStoreError::AlreadyExists(field.form_name().to_string())
    }))
}
