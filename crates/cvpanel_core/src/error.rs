use thiserror::Error;

/// Errors surfaced while building or querying a patch.
///
/// Signal routing itself never fails; a disconnected or dangling cable
/// degrades to a silent bus instead of an error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown module type '{0}'")]
    UnknownModuleType(String),

    #[error("duplicate module id '{0}'")]
    DuplicateModuleId(String),

    #[error("module '{module}' has no port '{port}'")]
    UnknownPort { module: String, port: String },

    #[error("invalid params for module '{module}': {source}")]
    BadParams {
        module: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize params for module '{module}': {source}")]
    SerializeParams {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
