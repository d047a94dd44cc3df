use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{debug, info};

use super::models::{Caller, Capabilities, Principal};
use crate::config::AuthConfig;

/// API 密钥认证器
///
/// Holds the configured principals keyed by the SHA-256 of their API key.
/// Raw keys are never stored.
#[derive(Debug, Clone, Default)]
pub struct Authenticator {
    principals: HashMap<String, Principal>,
}

impl Authenticator {
    pub fn from_config(config: &AuthConfig) -> Self {
        let principals = config
            .principals
            .iter()
            .map(|p| {
                let capabilities = Capabilities {
                    admin: p.groups.iter().any(|g| g.eq_ignore_ascii_case(&config.admin_group)),
                    user: p.groups.iter().any(|g| g.eq_ignore_ascii_case(&config.user_group)),
                };
                let principal = Principal {
                    name: p.name.clone(),
                    capabilities,
                };
                (p.key_sha256.to_ascii_lowercase(), principal)
            })
            .collect::<HashMap<_, _>>();

        info!("Loaded {} API principals", principals.len());
        Self { principals }
    }

    /// 计算密钥哈希
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Resolve a presented key to a caller. Unknown or missing keys yield the
    /// anonymous caller rather than an error.
    pub fn authenticate(&self, key: Option<&str>) -> Caller {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Caller::anonymous();
        };

        match self.principals.get(&Self::hash_key(key)) {
            Some(principal) => principal.caller(),
            None => {
                debug!("Unknown API key presented");
                Caller::anonymous()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}
