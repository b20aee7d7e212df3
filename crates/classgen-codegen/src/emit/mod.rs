//! Backends
//!
//! Both emitters consume the same post-interception [`ClassDecl`](crate::ir::ClassDecl).

mod binary;
mod source;

pub use binary::emit_class_file;
pub use source::{escape_string, render_source, render_to_string};

/// Backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Java-like source text
    Source,
    /// Encoded class file
    Binary,
}

impl std::str::FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(Self::Source),
            "binary" => Ok(Self::Binary),
            other => Err(format!("unknown target `{}`", other)),
        }
    }
}

/// Output of one backend
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Source(String),
    Binary(Vec<u8>),
}

impl Artifact {
    pub fn target(&self) -> Target {
        match self {
            Self::Source(_) => Target::Source,
            Self::Binary(_) => Target::Binary,
        }
    }

    pub fn as_source(&self) -> Option<&str> {
        match self {
            Self::Source(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Source(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Source(text) => text.into_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}
