//! Secret reference resolution for provider API keys.
//!
//! Supported forms: `ENV=NAME` reads an environment variable, `FILE=/path`
//! reads a file from an allow-listed secrets directory, `${NAME}` expands
//! an environment variable, anything else is the literal key.

use std::path::{Path, PathBuf};

/// Directories `FILE=` references may point into. Anything outside is
/// rejected before touching the filesystem.
const ALLOWED_SECRET_DIRS: &[&str] = &["/etc/aibox/secrets", "/run/secrets", "/var/run/secrets"];

/// Resolves secret references against the environment and the allow-listed
/// secret directories.
#[derive(Debug, Clone)]
pub struct SecretResolver {
    allowed_dirs: Vec<PathBuf>,
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self {
            allowed_dirs: ALLOWED_SECRET_DIRS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl SecretResolver {
    /// A resolver with a custom allow-list, for tests.
    pub fn with_allowed_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { allowed_dirs: dirs }
    }

    /// Resolve one secret reference to its value.
    pub fn resolve(&self, value: &str) -> Result<String, String> {
        self.resolve_with_env(value, |name| std::env::var(name).ok())
    }

    pub(crate) fn resolve_with_env(
        &self,
        value: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, String> {
        if value.is_empty() {
            return Ok(String::new());
        }

        if let Some(name) = value.strip_prefix("ENV=") {
            return env(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| format!("environment variable {name} not set"));
        }

        if let Some(path) = value.strip_prefix("FILE=") {
            let path = path.trim();
            self.validate_path(path)?;

            let contents =
                std::fs::read_to_string(path).map_err(|e| format!("reading {path}: {e}"))?;
            return Ok(contents.trim().to_string());
        }

        if let Some(name) = value.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
            return env(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| format!("environment variable {name} not set"));
        }

        Ok(value.to_string())
    }

    fn validate_path(&self, path: &str) -> Result<(), String> {
        if path.contains("..") {
            return Err(format!("path traversal not allowed: {path}"));
        }

        let path = Path::new(path);
        if !path.is_absolute() {
            return Err(format!("secret path must be absolute: {}", path.display()));
        }

        if self.allowed_dirs.iter().any(|dir| path.starts_with(dir)) {
            Ok(())
        } else {
            Err(format!("path {} not in allowed directories", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn inline_values_pass_through() {
        let resolver = SecretResolver::default();
        let env = env_of(&[]);

        assert_eq!(resolver.resolve_with_env("sk-inline", &env).unwrap(), "sk-inline");
        assert_eq!(resolver.resolve_with_env("", &env).unwrap(), "");
    }

    #[test]
    fn env_prefix() {
        let resolver = SecretResolver::default();
        let env = env_of(&[("MY_KEY", "from-env")]);

        assert_eq!(resolver.resolve_with_env("ENV=MY_KEY", &env).unwrap(), "from-env");
        assert!(resolver.resolve_with_env("ENV=MISSING", &env).is_err());
    }

    #[test]
    fn dollar_brace_expansion() {
        let resolver = SecretResolver::default();
        let env = env_of(&[("MY_KEY", "expanded")]);

        assert_eq!(resolver.resolve_with_env("${MY_KEY}", &env).unwrap(), "expanded");
        assert!(resolver.resolve_with_env("${MISSING}", &env).is_err());
    }

    #[test]
    fn file_reads_from_allowed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let secret_path = dir.path().join("api-key");
        let mut file = std::fs::File::create(&secret_path).unwrap();
        writeln!(file, "  file-secret  ").unwrap();

        let resolver = SecretResolver::with_allowed_dirs(vec![dir.path().to_path_buf()]);
        let env = env_of(&[]);

        let reference = format!("FILE={}", secret_path.display());
        assert_eq!(resolver.resolve_with_env(&reference, &env).unwrap(), "file-secret");
    }

    #[test]
    fn file_outside_allowlist_is_rejected() {
        let resolver = SecretResolver::default();
        let env = env_of(&[]);

        let err = resolver.resolve_with_env("FILE=/etc/passwd", &env).unwrap_err();
        assert!(err.contains("not in allowed directories"));
    }

    #[test]
    fn file_traversal_is_rejected() {
        let resolver = SecretResolver::default();
        let env = env_of(&[]);

        let err = resolver
            .resolve_with_env("FILE=/run/secrets/../../etc/passwd", &env)
            .unwrap_err();
        assert!(err.contains("path traversal"));
    }

    #[test]
    fn relative_file_is_rejected() {
        let resolver = SecretResolver::with_allowed_dirs(vec![PathBuf::from("/run/secrets")]);
        let env = env_of(&[]);

        assert!(resolver.resolve_with_env("FILE=secrets/key", &env).is_err());
    }
}
