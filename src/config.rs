//! Compiler configuration
//!
//! Callers either build a [`CompilerConfig`] directly or parse one from TOML
//! text; the crate itself never reads files.
//!
//! ```toml
//! assembly_name = "game"
//! safe_cast = "unchecked"
//! translation = "best-effort"
//! emit_sequence_points = false
//! ```

use serde::Deserialize;

/// How `SafeCast` is translated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SafeCastPolicy {
    /// Runtime-checked cast that throws on mismatch
    #[default]
    Checked,
    /// Identity conversion, same as `UnsafeCast`
    Unchecked,
}

/// What happens on an opcode from the catalogued untranslated list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationMode {
    /// Fail the compilation
    #[default]
    Strict,
    /// Emit `nop` and log a warning
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Name of the produced module; defaults to `module`
    pub assembly_name: Option<String>,
    pub safe_cast: SafeCastPolicy,
    pub translation: TranslationMode,
    /// Emit line markers when the module carries debug info
    pub emit_sequence_points: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            assembly_name: None,
            safe_cast: SafeCastPolicy::default(),
            translation: TranslationMode::default(),
            emit_sequence_points: true,
        }
    }
}

impl CompilerConfig {
    /// Parse from TOML text; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn assembly_name(&self) -> &str {
        self.assembly_name.as_deref().unwrap_or("module")
    }
}
