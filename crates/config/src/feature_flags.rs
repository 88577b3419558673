use serde::{Deserialize, Serialize};

/// Recognized `ENABLE_*` feature flags (spec §6). Every flag defaults to
/// `false`; none change control-flow correctness on their own, they only
/// gate optional behavior the rest of the engine treats as advisory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub context_compression: bool,
    pub semantic_search: bool,
    pub enhanced_kb: bool,
    pub thompson_sampling: bool,
    pub multi_agent: bool,
    pub reflection: bool,
}

impl FeatureFlags {
    /// Parse from the `ENABLE_*` environment variables, each read with
    /// `std::env::var` and treated as enabled only when set to a truthy
    /// string (`"1"`, `"true"`, case-insensitive).
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            context_compression: env_flag("ENABLE_CONTEXT_COMPRESSION"),
            semantic_search: env_flag("ENABLE_SEMANTIC_SEARCH"),
            enhanced_kb: env_flag("ENABLE_ENHANCED_KB"),
            thompson_sampling: env_flag("ENABLE_THOMPSON_SAMPLING"),
            multi_agent: env_flag("ENABLE_MULTI_AGENT"),
            reflection: env_flag("ENABLE_REFLECTION"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_are_all_false() {
        let flags = FeatureFlags::default();
        assert!(!flags.context_compression);
        assert!(!flags.multi_agent);
    }

    #[test]
    #[serial]
    fn reads_truthy_env_values() {
        std::env::set_var("ENABLE_MULTI_AGENT", "true");
        std::env::set_var("ENABLE_REFLECTION", "0");
        let flags = FeatureFlags::from_env();
        assert!(flags.multi_agent);
        assert!(!flags.reflection);
        std::env::remove_var("ENABLE_MULTI_AGENT");
        std::env::remove_var("ENABLE_REFLECTION");
    }
}
