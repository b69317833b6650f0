use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to prepare directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
