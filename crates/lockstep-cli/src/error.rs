use std::io;
use std::path::PathBuf;

use lockstep_core::EmuError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write screenshot: {0}")]
    Io(#[from] io::Error),

    #[error("invalid run profile {path}: {source}")]
    Profile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to encode screenshot: {0}")]
    Png(#[from] png::EncodingError),

    #[error(transparent)]
    Emulation(#[from] EmuError),

    #[error("no ROM given on the command line or in the run profile")]
    MissingRom,

    #[error("screenshot writer thread panicked")]
    WriterPanicked,
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Read a whole file, remembering its path for the error message.
pub fn read_file(path: &std::path::Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}
