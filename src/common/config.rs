//! Configuration for the membership registry

use serde::{Deserialize, Serialize};

/// Tunables for the coordinator server list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    /// Number of backups per replication group
    #[serde(default = "default_replication_group_size")]
    pub replication_group_size: usize,

    /// Initial number of concurrent update-RPC slots in the dissemination
    /// loop; the pool grows on demand
    #[serde(default = "default_update_rpc_pool_size")]
    pub update_rpc_pool_size: usize,

    /// Re-publish a cluster update when replaying an already-enlisted server
    /// from the durable log. The pre-crash coordinator already published it,
    /// so the default keeps the replay silent.
    #[serde(default)]
    pub publish_recovered_enlistment: bool,
}

fn default_replication_group_size() -> usize {
    3
}
fn default_update_rpc_pool_size() -> usize {
    8
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            replication_group_size: default_replication_group_size(),
            update_rpc_pool_size: default_update_rpc_pool_size(),
            publish_recovered_enlistment: false,
        }
    }
}

impl ListConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ListConfig = serde_json::from_str(&content)
            .map_err(|e| crate::Error::Other(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Save to file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| crate::Error::Other(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.replication_group_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "replication_group_size must be at least 1".into(),
            ));
        }

        if self.update_rpc_pool_size == 0 {
            return Err(crate::Error::InvalidConfig(
                "update_rpc_pool_size must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ListConfig::default();
        assert_eq!(config.replication_group_size, 3);
        assert_eq!(config.update_rpc_pool_size, 8);
        assert!(!config.publish_recovered_enlistment);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.json");

        let mut config = ListConfig::default();
        config.replication_group_size = 5;
        config.to_file(&path).unwrap();

        let loaded = ListConfig::from_file(&path).unwrap();
        assert_eq!(loaded.replication_group_size, 5);
        assert_eq!(loaded.update_rpc_pool_size, 8);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{"replication_group_size": 4}"#).unwrap();

        let loaded = ListConfig::from_file(&path).unwrap();
        assert_eq!(loaded.replication_group_size, 4);
        assert_eq!(loaded.update_rpc_pool_size, 8);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mut config = ListConfig::default();
        config.replication_group_size = 0;
        assert!(config.validate().is_err());

        let mut config = ListConfig::default();
        config.update_rpc_pool_size = 0;
        assert!(config.validate().is_err());
    }
}
