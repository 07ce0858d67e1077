// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the PLC cycle monitor
//!
//! The configuration is backed by a YAML file and validated against a JSON
//! schema before deserialization, so a typo in a field name or a wrongly
//! typed value is reported as a schema error with a path instead of a serde
//! message deep inside the daemon startup.
//!
//! ### Example
//!
//! ```no_run
//! use plc_cycle_monitor::config::Config;
//!
//! let config = Config::from_file("config.yaml").unwrap();
//! for device in &config.devices {
//!     println!("{}: {}:{}", device.id, device.host, device.port);
//! }
//! ```

mod device;
mod monitoring;

pub use device::{
    BitMap, DeviceConfig, PrinterConfig, RegisterDecode, RegisterMap, RegisterSpec,
    ResolvedProfile, Variant, VariantProfile, VariantTable,
};
pub use monitoring::MonitoringConfig;

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

/// The embedded JSON schema the YAML file is validated against.
pub const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration: shared monitor timing plus one entry per workstation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// A missing file is created from defaults. An invalid file leaves a
    /// `config.sample.yaml` next to it for the operator to start from.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // First step: convert YAML to a generic value for schema validation
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;
        let json_value = serde_json::to_value(&yaml_value).with_context(|| {
            format!("Failed to convert YAML to JSON for validation: {:?}", path)
        })?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} against the schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = config.validate_devices() {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;
        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Rules the schema cannot express.
    fn validate_devices(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.id.is_empty() {
                anyhow::bail!("Device with empty id (name: {:?})", device.name);
            }
            if !seen.insert(device.id.as_str()) {
                anyhow::bail!("Duplicate device id: {}", device.id);
            }
            if device.host.is_empty() {
                anyhow::bail!("Device {} has an empty host", device.id);
            }
            if device.enabled && device.bits.cycle_ok.is_none() {
                anyhow::bail!(
                    "Device {} is enabled but has no cycle_ok bit configured",
                    device.id
                );
            }
            if device.printer.enabled && device.printer.host.is_empty() {
                anyhow::bail!(
                    "Device {} has label printing enabled but no printer host",
                    device.id
                );
            }
        }
        Ok(())
    }

    /// Write a `config.sample.yaml` with default values next to the broken
    /// file for the operator to edit.
    fn create_sample_config(original_path: &Path) -> Result<()> {
        let sample_path = original_path.with_file_name("config.sample.yaml");
        let sample_config = Self::default();
        sample_config
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;
        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn valid_yaml() -> &'static str {
        r#"
monitoring:
  scan_interval_ms: 500
devices:
  - id: station-1
    name: Clutch station 1
    host: 192.168.3.250
    bits:
      cycle_ok: 221
      variant_selector: 20
    registers:
      torque:
        address: 2704
    variants:
      at:
        part_no: AT-100
        revision: A
        vendor_code: V01
"#
    }

    #[test]
    fn missing_file_creates_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let config = Config::from_file(&path).unwrap();
        assert!(config.devices.is_empty());
        assert_eq!(config.monitoring.scan_interval_ms, 1000);
        assert!(path.exists());
    }

    #[test]
    fn round_trip_preserves_devices() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, valid_yaml()).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.monitoring.scan_interval_ms, 500);
        assert_eq!(config.devices.len(), 1);
        let device = &config.devices[0];
        assert_eq!(device.bits.cycle_ok, Some(221));
        assert_eq!(device.registers.torque.as_ref().unwrap().address, 2704);
        assert_eq!(device.registers.torque.as_ref().unwrap().decode, RegisterDecode::U16);

        let saved = dir.path().join("saved.yaml");
        config.save_to_file(&saved).unwrap();
        let reloaded = Config::from_file(&saved).unwrap();
        assert_eq!(reloaded.devices[0].id, config.devices[0].id);
        assert_eq!(reloaded.devices[0].bits.cycle_ok, Some(221));
    }

    #[test]
    fn schema_rejects_wrongly_typed_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "monitoring:\n  scan_interval_ms: fast\ndevices: []\n",
        )
        .unwrap();
        assert!(Config::from_file(&path).is_err());
        assert!(dir.path().join("config.sample.yaml").exists());
    }

    #[test]
    fn enabled_device_without_cycle_ok_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "devices:\n  - id: st1\n    name: Station 1\n    host: 10.0.0.5\n",
        )
        .unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("cycle_ok"));
    }

    #[test]
    fn duplicate_device_ids_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let yaml = r#"
devices:
  - id: st1
    name: A
    host: 10.0.0.5
    bits: { cycle_ok: 221 }
  - id: st1
    name: B
    host: 10.0.0.6
    bits: { cycle_ok: 221 }
"#;
        fs::write(&path, yaml).unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Duplicate device id"));
    }
}
