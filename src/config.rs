//! Loading of the YAML configuration file.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("read config {path:?} failed, {err}")]
    Io {
        path: PathBuf,
        err: std::io::Error,
    },

    #[error("parse config {path:?} failed, {err}")]
    Yaml {
        path: PathBuf,
        err: serde_yaml::Error,
    },
}

pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, Error> {
    let path = path.as_ref();

    let content = std::fs::read_to_string(path).map_err(|err| Error::Io {
        path: path.to_path_buf(),
        err,
    })?;

    serde_yaml::from_str(&content).map_err(|err| Error::Yaml {
        path: path.to_path_buf(),
        err,
    })
}
