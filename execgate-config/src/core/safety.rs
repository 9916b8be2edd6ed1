use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Command safety classification lists
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SafetyConfig {
    /// Executables (by basename) that may auto-approve
    #[serde(default = "default_known_safe_commands")]
    pub known_safe_commands: Vec<String>,

    /// Executables (by basename) that always classify as dangerous
    #[serde(default = "default_dangerous_commands")]
    pub dangerous_commands: Vec<String>,

    /// Regex patterns; any matching token makes the command dangerous
    #[serde(default = "default_dangerous_patterns")]
    pub dangerous_patterns: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            known_safe_commands: default_known_safe_commands(),
            dangerous_commands: default_dangerous_commands(),
            dangerous_patterns: default_dangerous_patterns(),
        }
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_owned()).collect()
}

fn default_known_safe_commands() -> Vec<String> {
    to_owned_list(defaults::KNOWN_SAFE_COMMANDS)
}

fn default_dangerous_commands() -> Vec<String> {
    to_owned_list(defaults::DANGEROUS_COMMANDS)
}

fn default_dangerous_patterns() -> Vec<String> {
    to_owned_list(defaults::DANGEROUS_PATTERNS)
}
