use std::{fmt, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use serde_json::Error as JsonError;
use serde_yaml::Error as YamlError;
use walkdir::Error as WalkDirError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum WeaveError {
    #[error("Reference error at {path}: {message}")]
    ConfigReference { path: String, message: String },
    #[error("Extraction error at {path} (record {record}): {message}")]
    Extraction {
        path: String,
        record: String,
        message: String,
    },
    #[error("Provider error ({kind} provider '{name}'): {message}")]
    Provider {
        kind: String,
        name: String,
        message: String,
    },
    #[error("Shape error at {path}: {message}")]
    Shape { path: String, message: String },
    #[error("Method '{method}' at {path} requires {requirement}")]
    MethodRequirement {
        path: String,
        method: String,
        requirement: String,
    },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Duplicate node id: {0}")]
    DuplicateId(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
}

impl WeaveError {
    /// Stable short tag for the error family, used for exit reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            WeaveError::ConfigReference { .. } => "config_reference",
            WeaveError::Extraction { .. } => "extraction",
            WeaveError::Provider { .. } => "provider",
            WeaveError::Shape { .. } => "shape",
            WeaveError::MethodRequirement { .. } => "method_requirement",
            WeaveError::Config(_) => "config",
            WeaveError::DuplicateId(_) => "duplicate_id",
            WeaveError::Io(_) => "io",
            WeaveError::NotFound(_) => "not_found",
            WeaveError::Serialization(_) => "serialization",
        }
    }

    pub(crate) fn reference<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        WeaveError::ConfigReference {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn shape<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        WeaveError::Shape {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn requirement<P, M, R>(path: P, method: M, requirement: R) -> Self
    where
        P: Into<String>,
        M: Into<String>,
        R: Into<String>,
    {
        WeaveError::MethodRequirement {
            path: path.into(),
            method: method.into(),
            requirement: requirement.into(),
        }
    }
}

impl From<toml::de::Error> for WeaveError {
    fn from(src: toml::de::Error) -> WeaveError {
        WeaveError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<JsonError> for WeaveError {
    fn from(src: JsonError) -> WeaveError {
        WeaveError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<YamlError> for WeaveError {
    fn from(src: YamlError) -> WeaveError {
        WeaveError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<io::Error> for WeaveError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => WeaveError::NotFound(format!("{x}")),
            _ => WeaveError::Io(format!("IOError: {}: {x}", x.kind())),
        }
    }
}

impl From<WalkDirError> for WeaveError {
    fn from(x: WalkDirError) -> Self {
        match x.into_io_error() {
            Some(io_error) => io_error.into(),
            None => WeaveError::Io("directory walk failed (symlink loop)".to_string()),
        }
    }
}

impl From<fmt::Error> for WeaveError {
    fn from(x: fmt::Error) -> Self {
        WeaveError::Serialization(format!("{x}"))
    }
}
