use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration for the on-disk credential store.
///
/// The token file is written by the sign-in tooling and holds the GitHub
/// OAuth token the relay exchanges for short-lived Copilot credentials.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Path to the persisted token state.
    pub token_path: Option<PathBuf>,
}

impl AuthConfig {
    /// The configured token path, or the default location under the
    /// user's configuration directory.
    pub fn token_path(&self) -> PathBuf {
        match &self.token_path {
            Some(path) => expand_home(path),
            None => {
                let mut path = home_dir();
                path.push(".config");
                path.push("copilot-relay");
                path.push("token.json");
                path
            }
        }
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(stripped) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    home_dir().join(stripped)
}
