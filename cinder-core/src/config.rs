/// Checker configuration
///
/// Solver profile and the search limits of the checker. Passed explicitly to
/// every check; nothing here is global.

use std::path::Path;

use cinder_verify::{SimpleProver, SmtProfile};
use miette::Report;
use serde::{Deserialize, Serialize};

pub type ConfigError = Report;

fn config_msg(message: impl Into<String>) -> ConfigError {
    Report::msg(message.into())
}

/// Environment variable overriding the solver profile.
pub const PROFILE_ENV: &str = "CINDER_PROFILE";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Solver profile (fast, ci, thorough)
    #[serde(default)]
    pub profile: SmtProfile,

    /// Rounds of predicate unpacking before a memory action or call
    #[serde(default = "default_max_unpack_rounds")]
    pub max_unpack_rounds: usize,

    /// Nesting limit for predicate packing during a resource request
    #[serde(default = "default_max_pack_depth")]
    pub max_pack_depth: usize,

    /// Case-split budget of the built-in prover; the profile decides when absent
    #[serde(default)]
    pub max_case_splits: Option<usize>,

    /// Prove alignment of every load and store
    #[serde(default)]
    pub check_alignment: bool,
}

fn default_max_unpack_rounds() -> usize {
    16
}

fn default_max_pack_depth() -> usize {
    8
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            profile: SmtProfile::default(),
            max_unpack_rounds: default_max_unpack_rounds(),
            max_pack_depth: default_max_pack_depth(),
            max_case_splits: None,
            check_alignment: false,
        }
    }
}

impl CheckerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| config_msg(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| config_msg(format!("Failed to read config {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Defaults, with `CINDER_PROFILE` applied when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        match std::env::var(PROFILE_ENV) {
            Ok(value) => self.with_profile_str(&value),
            Err(_) => Ok(self),
        }
    }

    fn with_profile_str(mut self, value: &str) -> Result<Self, ConfigError> {
        self.profile = value.parse::<SmtProfile>().map_err(Report::new)?;
        Ok(self)
    }

    pub fn case_splits(&self) -> usize {
        self.max_case_splits
            .unwrap_or_else(|| self.profile.case_splits())
    }

    /// Built-in prover configured for this checker.
    pub fn simple_prover(&self) -> SimpleProver {
        SimpleProver::new(self.case_splits())
    }

    #[cfg(feature = "z3")]
    pub fn z3_prover(&self) -> cinder_verify::Z3Prover {
        cinder_verify::Z3Prover::new(self.profile)
    }
}
