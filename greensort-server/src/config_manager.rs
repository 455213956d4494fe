// Configuration manager for runtime threshold updates

use greensort_api::ConfigUpdate;
use greensort_core::GreensortConfig;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Live configuration shared by the HTTP handlers
///
/// Sessions take a snapshot when they open, so updates only affect
/// connections accepted afterwards.
pub struct ConfigManager {
    config: Arc<RwLock<GreensortConfig>>,
}

impl ConfigManager {
    pub fn new(config: GreensortConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Get current configuration
    pub async fn get(&self) -> GreensortConfig {
        let config = self.config.read().await;
        config.clone()
    }

    /// Update configuration section; the change is dropped if validation fails
    pub async fn update_section<F>(&self, updater: F) -> Result<GreensortConfig, String>
    where
        F: FnOnce(&mut GreensortConfig) -> Result<(), String>,
    {
        let mut config = self.config.write().await;
        let mut candidate = config.clone();
        updater(&mut candidate)?;
        candidate.validate().map_err(|e| e.to_string())?;
        *config = candidate.clone();
        Ok(candidate)
    }

    /// Apply a threshold update from the REST API
    pub async fn apply_thresholds(&self, update: &ConfigUpdate) -> Result<GreensortConfig, String> {
        update.validate()?;
        let config = self
            .update_section(|c| {
                update.apply_to(&mut c.stabilizer);
                Ok(())
            })
            .await?;
        info!(
            "Thresholds updated: default {} per-class {:?}",
            config.stabilizer.default_threshold, config.stabilizer.threshold_per_class
        );
        Ok(config)
    }

    /// Reload the per-session sections from file
    ///
    /// `server` and `inference` stay as they are: the listener and the
    /// detector are bound once at startup.
    pub async fn reload_from_file(&self, path: &str) -> Result<GreensortConfig, String> {
        let loaded = GreensortConfig::from_file(path).map_err(|e| e.to_string())?;
        let config = self
            .update_section(move |c| {
                c.stabilizer = loaded.stabilizer;
                c.filter = loaded.filter;
                c.presentation = loaded.presentation;
                c.transport = loaded.transport;
                Ok(())
            })
            .await?;
        info!("Configuration reloaded from {}", path);
        Ok(config)
    }
}
