use std::collections::HashMap;
use std::env;

use crate::error::ResolverError;
use crate::traits::KeyResolver;

const ENV_PREFIX: &str = "env:";

/// Resolves credentials from environment variables
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvResolver;

impl EnvResolver {
    pub fn new() -> Self {
        Self
    }
}

impl KeyResolver for EnvResolver {
    /// Parses "env:VAR1,VAR2" into a map of variable name to value.
    /// Every named variable must be set.
    fn resolve(&self, source: &str) -> Result<HashMap<String, String>, ResolverError> {
        let names = source.strip_prefix(ENV_PREFIX).ok_or_else(|| {
            ResolverError::UnsupportedSource(format!("expected 'env:' prefix, got: {}", source))
        })?;

        let names: Vec<&str> = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            return Err(ResolverError::UnsupportedSource("empty env source".to_string()));
        }

        names
            .into_iter()
            .map(|name| {
                env::var(name)
                    .map(|value| (name.to_string(), value))
                    .map_err(|_| ResolverError::MissingKey(name.to_string()))
            })
            .collect()
    }
}
