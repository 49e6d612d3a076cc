//! On-disk form of a generator: the bound method plus lowering options.

use std::path::Path;

use serde::{Deserialize, Serialize};
use turnstile_ir::MethodDecl;
use turnstile_lower::LoweringOptions;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorFile {
    pub method: MethodDecl,
    #[serde(default)]
    pub options: LoweringOptions,
}

impl GeneratorFile {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn read(path: &Path) -> Result<Self, InputError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }
}

#[derive(Debug, derive_more::Display, derive_more::From)]
pub enum InputError {
    #[display("cannot read input: {_0}")]
    Io(std::io::Error),
    #[display("malformed generator file: {_0}")]
    Json(serde_json::Error),
}

impl std::error::Error for InputError {}
