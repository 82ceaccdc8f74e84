use crate::config::{ConfigError, MonitorConfig};

/// A configured device.
///
/// `raw` is the value as written in `[devices]` (`origin[;extra...]`);
/// only the origin segment is used by the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    pub origin: String,
    pub raw: String,
}

/// Extract the origin segment from a configured device value.
pub fn origin_of(raw: &str) -> &str {
    raw.split(';').next().unwrap_or_default().trim()
}

/// Read-only list of monitored devices, in configuration order.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DeviceConfig>,
}

impl DeviceRegistry {
    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        let devices = config
            .device_entries()?
            .into_iter()
            .map(|(name, raw)| DeviceConfig {
                origin: origin_of(&raw).to_string(),
                name,
                raw,
            })
            .collect();
        Ok(Self { devices })
    }

    pub fn devices(&self) -> &[DeviceConfig] {
        &self.devices
    }

    pub fn origins(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.origin.as_str())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }
}

#[cfg(test)]
impl DeviceRegistry {
    pub fn from_origins(origins: &[&str]) -> Self {
        Self {
            devices: origins
                .iter()
                .map(|o| DeviceConfig {
                    name: o.to_lowercase(),
                    origin: o.to_string(),
                    raw: o.to_string(),
                })
                .collect(),
        }
    }
}
