//! A settings-driven config implementation.
//!
//! Useful as a stand-in plugin: it reports the attributes it was configured
//! with, loads data unchanged, checks required attributes and fills defaults
//! on finalize.

use async_trait::async_trait;
use serde_json::Value;

use crate::codec::ConfigData;
use crate::config::Config;
use crate::context::Context;
use crate::error::Result;
use crate::settings::PassthroughSettings;

/// Config implementation backed by [`PassthroughSettings`].
#[derive(Debug, Clone, Default)]
pub struct PassthroughConfig {
    settings: PassthroughSettings,
}

impl PassthroughConfig {
    /// Create a passthrough config from settings.
    pub fn new(settings: PassthroughSettings) -> Self {
        Self { settings }
    }

    /// The settings in use.
    pub fn settings(&self) -> &PassthroughSettings {
        &self.settings
    }
}

#[async_trait]
impl Config for PassthroughConfig {
    type Machine = Value;

    fn init(&self) {
        tracing::info!(
            attributes = self.settings.attributes.len(),
            required = self.settings.required.len(),
            "passthrough config initialised"
        );
    }

    async fn config_attributes(&self) -> Result<Vec<String>> {
        Ok(self.settings.attributes.clone())
    }

    async fn config_load(&self, _ctx: &Context, data: ConfigData) -> Result<ConfigData> {
        Ok(data)
    }

    async fn config_validate(
        &self,
        _ctx: &Context,
        data: ConfigData,
        _machine: &Value,
    ) -> Result<Vec<String>> {
        Ok(self
            .settings
            .required
            .iter()
            .filter(|key| !data.contains_key(key.as_str()))
            .map(|key| format!("{} is required", key))
            .collect())
    }

    async fn config_finalize(&self, _ctx: &Context, mut data: ConfigData) -> Result<ConfigData> {
        for (key, value) in &self.settings.defaults {
            if !data.contains_key(key) {
                data.insert(key.clone(), value.clone());
            }
        }
        Ok(data)
    }
}
