//! Analysis options.
//!
//! Options are read from a TOML file, every key optional:
//!
//! ```toml
//! python_version = "3.11"
//! input = "foo.py"
//! module_name = "foo"
//! max_call_depth = 16
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A `major.minor` interpreter version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PythonVersion(pub u8, pub u8);

impl Default for PythonVersion {
    fn default() -> Self {
        PythonVersion(3, 11)
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}

impl FromStr for PythonVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid python version '{}'", s))?;
        let major = major
            .trim()
            .parse()
            .map_err(|_| format!("invalid major version in '{}'", s))?;
        let minor = minor
            .trim()
            .parse()
            .map_err(|_| format!("invalid minor version in '{}'", s))?;
        Ok(PythonVersion(major, minor))
    }
}

impl TryFrom<String> for PythonVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PythonVersion> for String {
    fn from(version: PythonVersion) -> Self {
        version.to_string()
    }
}

/// Options for one analysis run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Version the analyzed code was compiled for.
    pub python_version: PythonVersion,
    /// Interpreter used by providers that compile source themselves.
    pub python_exe: Option<PathBuf>,
    /// Name of the analyzed file, used in diagnostics.
    pub input: Option<String>,
    /// Name of the exported declaration unit.
    pub module_name: String,
    /// Calls nested deeper than this return `Any` without being analyzed.
    pub max_call_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            python_version: PythonVersion::default(),
            python_exe: None,
            input: None,
            module_name: "inferred".to_string(),
            max_call_depth: 16,
        }
    }
}

impl Options {
    /// Parse options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.python_version, PythonVersion(3, 11));
        assert_eq!(options.module_name, "inferred");
        assert_eq!(options.max_call_depth, 16);
    }

    #[test]
    fn test_from_toml_partial() {
        let options = Options::from_toml_str(
            r#"
            python_version = "3.12"
            module_name = "foo"
            "#,
        )
        .unwrap();
        assert_eq!(options.python_version, PythonVersion(3, 12));
        assert_eq!(options.module_name, "foo");
        assert_eq!(options.max_call_depth, 16);
        assert!(options.python_exe.is_none());
    }

    #[test]
    fn test_from_toml_rejects_bad_version() {
        let err = Options::from_toml_str("python_version = \"three\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_version_parse() {
        assert_eq!("3.11".parse::<PythonVersion>(), Ok(PythonVersion(3, 11)));
        assert!("311".parse::<PythonVersion>().is_err());
    }
}
