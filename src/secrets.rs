//! Secret values handed to embedding providers and tools.
//!
//! A [`SecretsProvider`] is an explicit value owned by whoever needs it;
//! nothing is stored process-wide. Values are never printed by `Debug`.

use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Default)]
pub struct SecretsProvider {
    values: HashMap<String, String>,
}

impl fmt::Debug for SecretsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("SecretsProvider").field("keys", &keys).finish()
    }
}

impl SecretsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the named environment variables that are set.
    pub fn from_env<S: AsRef<str>>(names: &[S]) -> Self {
        let mut secrets = Self::new();
        for name in names {
            if let Ok(value) = std::env::var(name.as_ref()) {
                secrets.put(name.as_ref(), value);
            }
        }
        secrets
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get() {
        let mut secrets = SecretsProvider::new();
        assert!(secrets.get("OPENAI_API_KEY").is_none());
        secrets.put("OPENAI_API_KEY", "sk-test");
        assert_eq!(secrets.get("OPENAI_API_KEY"), Some("sk-test"));
        assert!(secrets.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn debug_hides_values() {
        let mut secrets = SecretsProvider::new();
        secrets.put("TOKEN", "hunter2");
        let printed = format!("{:?}", secrets);
        assert!(printed.contains("TOKEN"));
        assert!(!printed.contains("hunter2"));
    }

    #[test]
    fn from_env_skips_unset_variables() {
        let secrets = SecretsProvider::from_env(&["AGENTC_TEST_SURELY_UNSET_VARIABLE"]);
        assert!(!secrets.contains("AGENTC_TEST_SURELY_UNSET_VARIABLE"));
    }
}
