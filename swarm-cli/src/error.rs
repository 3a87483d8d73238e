use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("bad segment size entry in {path}: `{line}`")]
    InvalidSizeEntry { path: PathBuf, line: String },
}

pub type Result<T> = std::result::Result<T, CliError>;
