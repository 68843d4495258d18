//! SSH key loading

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use russh::keys::ssh_key::PrivateKey;
use russh::keys::{decode_secret_key, load_secret_key};
use tracing::debug;

/// Where the private key used for authentication comes from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Explicit path to key file
    Path(PathBuf),
    /// Base64-encoded key from environment
    Env(String),
}

impl KeySource {
    /// Load the private key into memory
    ///
    /// The key is loaded once and shared by every executor of a run, so
    /// nothing is written to disk for `Env` keys.
    ///
    /// # Errors
    /// Returns `KeyError` if the file is missing or too permissive, the
    /// environment variable is unset, or the key cannot be decoded
    pub fn load(&self) -> Result<Arc<PrivateKey>, KeyError> {
        match self {
            KeySource::Path(path) => {
                validate_key_permissions(path)?;
                let key = load_secret_key(path, None)
                    .map_err(|e| KeyError::Decode(e.to_string()))?;
                debug!(path = %path.display(), "loaded SSH key from file");
                Ok(Arc::new(key))
            }
            KeySource::Env(var_name) => {
                let base64_key =
                    env::var(var_name).map_err(|_| KeyError::EnvNotSet(var_name.clone()))?;
                let key_data = base64_decode(&base64_key).map_err(|_| KeyError::InvalidBase64)?;
                let pem = String::from_utf8(key_data)
                    .map_err(|_| KeyError::Decode("key is not valid UTF-8".to_string()))?;
                let key =
                    decode_secret_key(&pem, None).map_err(|e| KeyError::Decode(e.to_string()))?;
                debug!(var = %var_name, "loaded SSH key from environment");
                Ok(Arc::new(key))
            }
        }
    }
}

/// Key loading errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("key file not found: {0}")]
    NotFound(String),

    #[error("cannot decode private key: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim())
}

fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(KeyError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(KeyError::Io(e)),
    };

    // group and other bits must be clear
    if metadata.permissions().mode() & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_file() {
        let source = KeySource::Path(PathBuf::from("/nonexistent/fleetward/id_ed25519"));
        assert!(matches!(source.load(), Err(KeyError::NotFound(_))));
    }

    #[test]
    fn test_open_permissions_rejected() {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("fleetward_key_perm_{}", std::process::id()));
        std::fs::write(&path, "not a key").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let result = KeySource::Path(path.clone()).load();
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(KeyError::BadPermissions(_))));
    }

    #[test]
    fn test_env_key_not_set() {
        let source = KeySource::Env("FLEETWARD_TEST_KEY_THAT_IS_NOT_SET".to_string());
        assert!(matches!(source.load(), Err(KeyError::EnvNotSet(_))));
    }
}
