//! JSON file persistence shared by the registry and the event log.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Database error types.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("endpoint must not be empty")]
    EmptyEndpoint,
}

impl DbError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Load a JSON document, substituting the default value when the file does not exist.
///
/// A file that cannot be read or parsed is renamed to `<path>.corrupt` and the default is
/// returned. Only a failure to move it aside is an error, since the next write would
/// otherwise overwrite it.
pub fn load_or_default<T>(path: &Path) -> Result<T, DbError>
where
    T: DeserializeOwned + Default,
{
    let problem = match fs::read(path) {
        Ok(data) => match serde_json::from_slice(&data) {
            Ok(value) => return Ok(value),
            Err(e) => DbError::json(path, e),
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => DbError::io(path, e),
    };

    let aside = sibling(path, ".corrupt");
    fs::rename(path, &aside).map_err(|e| DbError::io(path, e))?;
    tracing::warn!(
        "{}; moved it to {} and starting empty",
        problem,
        aside.display()
    );
    Ok(T::default())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Rewrite the whole file with `value`.
///
/// The document goes to a sibling temp file which is synced and renamed over the target,
/// so readers of `path` see either the old or the new contents.
pub fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), DbError> {
    let data = serde_json::to_vec(value).map_err(|e| DbError::json(path, e))?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| DbError::io(dir, e))?;
    }

    let tmp = sibling(path, ".tmp");

    let write = || -> io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        DbError::io(path, e)
    })
}
