//! Pipeline Manifest Parser
//!
//! A manifest describes one graphics pipeline the way the shader compiler and the client
//! would hand it to the driver: the device it targets, the client's fixed-function state,
//! per-stage metadata and the sparse register list. Register keys are hardware names
//! (`VGT_SHADER_STAGES_EN`, `SPI_SHADER_USER_DATA_VS_3`) or `0x`-prefixed addresses; values
//! are integers, `0x` hex strings or the name of a driver-reserved user-data role.

use gfx6_pipeline::create_info::{ColorTargetInfo, MAX_COLOR_TARGETS};
use gfx6_pipeline::metadata::PipelineMetadata;
use gfx6_pipeline::register_list::{RegisterList, RegisterListError};
use gfx6_pipeline::regs::{self, NUM_USER_DATA_REGISTERS};
use gfx6_pipeline::signature::UserDataMapping;
use gfx6_pipeline::{DeviceConfig, PipelineBinary, PipelineCreateInfo};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Code size used when a manifest does not give one
const DEFAULT_CODE_SIZE: usize = 256;

/// Errors raised while loading a manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid manifest YAML: {0}")]
    Yaml(#[from] serde_norway::Error),
    #[error(transparent)]
    Registers(#[from] RegisterListError),
    #[error(transparent)]
    RegisterKey(#[from] RegisterParseError),
    #[error("{0} color targets given, at most {MAX_COLOR_TARGETS} are supported")]
    TooManyColorTargets(usize),
}

/// Errors raised while parsing a register key or value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterParseError {
    #[error("unknown register name '{0}'")]
    UnknownName(String),
    #[error("invalid register address '{0}'")]
    InvalidAddress(String),
    #[error("invalid register value '{0}'")]
    InvalidValue(String),
}

fn parse_hex(s: &str) -> Option<u32> {
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    u32::from_str_radix(&digits.replace('_', ""), 16).ok()
}

/// Address of a `SPI_SHADER_USER_DATA_<stage>_<n>` register
fn user_data_address(name: &str) -> Option<u16> {
    let rest = name.strip_prefix("SPI_SHADER_USER_DATA_")?;
    let (stage, index) = rest.split_once('_')?;
    let index: u16 = index.parse().ok()?;
    if index >= NUM_USER_DATA_REGISTERS {
        return None;
    }
    regs::address_of(&format!("SPI_SHADER_USER_DATA_{stage}_0")).map(|base| base + index)
}

/// A register address as written in a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterKey(pub u16);

impl FromStr for RegisterKey {
    type Err = RegisterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("0x") || s.starts_with("0X") {
            let addr = parse_hex(s).and_then(|addr| u16::try_from(addr).ok()).ok_or_else(|| RegisterParseError::InvalidAddress(s.to_string()))?;
            return Ok(Self(addr));
        }
        regs::address_of(s).or_else(|| user_data_address(s)).map(Self).ok_or_else(|| RegisterParseError::UnknownName(s.to_string()))
    }
}

impl fmt::Display for RegisterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match regs::name_of(self.0) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{:#06x}", self.0),
        }
    }
}

/// Name of each user-data role accepted as a register value
const USER_DATA_ROLE_NAMES: &[(&str, UserDataMapping)] = &[
    ("GlobalTable", UserDataMapping::GlobalTable),
    ("PerShaderTable", UserDataMapping::PerShaderTable),
    ("SpillTable", UserDataMapping::SpillTable),
    ("BaseVertex", UserDataMapping::BaseVertex),
    ("BaseInstance", UserDataMapping::BaseInstance),
    ("DrawIndex", UserDataMapping::DrawIndex),
    ("Workgroup", UserDataMapping::Workgroup),
    ("EsGsLdsSize", UserDataMapping::EsGsLdsSize),
    ("ViewId", UserDataMapping::ViewId),
    ("StreamOutTable", UserDataMapping::StreamOutTable),
    ("VertexBufferTable", UserDataMapping::VertexBufferTable),
    ("BaseIndex", UserDataMapping::BaseIndex),
    ("Log2IndexSize", UserDataMapping::Log2IndexSize),
];

/// A register value as written in a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue(pub u32);

impl FromStr for RegisterValue {
    type Err = RegisterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(value) = parse_hex(s) {
            return Ok(Self(value));
        }
        if let Ok(value) = s.parse::<u32>() {
            return Ok(Self(value));
        }
        USER_DATA_ROLE_NAMES
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, role)| Self(role.raw()))
            .ok_or_else(|| RegisterParseError::InvalidValue(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for RegisterValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(Self(value)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}

fn default_code_size() -> usize {
    DEFAULT_CODE_SIZE
}

/// Raw pipeline manifest as parsed from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineManifest {
    /// Unique pipeline identifier
    pub id: String,
    /// Human-readable pipeline name
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub create_info: PipelineCreateInfo,
    /// Color targets from slot 0 on; overrides `create_info.cb_state.targets` when present
    #[serde(default)]
    pub color_targets: Vec<ColorTargetInfo>,
    #[serde(default)]
    pub metadata: PipelineMetadata,
    /// Size of the zero-filled code blob standing in for machine code
    #[serde(default = "default_code_size")]
    pub code_size: usize,
    /// Register values keyed by name or address
    #[serde(default)]
    pub registers: BTreeMap<String, RegisterValue>,
}

impl PipelineManifest {
    /// Parses a manifest from YAML content
    ///
    /// # Arguments
    /// * `yaml_content` - YAML string containing the manifest
    pub fn from_yaml(yaml_content: &str) -> Result<Self, ManifestError> {
        Ok(serde_norway::from_str(yaml_content)?)
    }

    /// Parses a manifest from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML manifest file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Client state with the manifest's color targets applied
    pub fn create_info(&self) -> Result<PipelineCreateInfo, ManifestError> {
        let mut create_info = self.create_info.clone();
        if !self.color_targets.is_empty() {
            if self.color_targets.len() > MAX_COLOR_TARGETS {
                return Err(ManifestError::TooManyColorTargets(self.color_targets.len()));
            }
            create_info.cb_state.targets = Default::default();
            create_info.cb_state.targets[..self.color_targets.len()].copy_from_slice(&self.color_targets);
        }
        Ok(create_info)
    }

    /// Builds the shader compiler output the manifest describes
    pub fn binary(&self) -> Result<PipelineBinary, ManifestError> {
        let pairs = self.registers.iter().map(|(key, value)| Ok((key.parse::<RegisterKey>()?.0, value.0))).collect::<Result<Vec<_>, RegisterParseError>>()?;
        let registers = RegisterList::from_pairs(pairs)?;
        Ok(PipelineBinary { metadata: self.metadata.clone(), registers, code: vec![0; self.code_size] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gfx6_pipeline::create_info::ChNumFormat;
    use gfx6_pipeline::device::GfxIpLevel;

    #[test]
    fn test_register_key_parsing() {
        assert_eq!("VGT_SHADER_STAGES_EN".parse::<RegisterKey>().unwrap(), RegisterKey(regs::VGT_SHADER_STAGES_EN));
        assert_eq!("0xA2D5".parse::<RegisterKey>().unwrap(), RegisterKey(regs::VGT_SHADER_STAGES_EN));
        assert_eq!("SPI_SHADER_USER_DATA_VS_3".parse::<RegisterKey>().unwrap(), RegisterKey(regs::SPI_SHADER_VS.user_data_0 + 3));

        assert_eq!("SPI_SHADER_USER_DATA_VS_16".parse::<RegisterKey>(), Err(RegisterParseError::UnknownName("SPI_SHADER_USER_DATA_VS_16".into())));
        assert!("NOT_A_REGISTER".parse::<RegisterKey>().is_err());
        assert!("0x1_0000".parse::<RegisterKey>().is_err());
    }

    #[test]
    fn test_register_value_parsing() {
        assert_eq!("0x43F".parse::<RegisterValue>().unwrap(), RegisterValue(0x43F));
        assert_eq!("15".parse::<RegisterValue>().unwrap(), RegisterValue(15));
        assert_eq!("VertexBufferTable".parse::<RegisterValue>().unwrap(), RegisterValue(UserDataMapping::VertexBufferTable.raw()));
        assert!("nonsense".parse::<RegisterValue>().is_err());
    }

    #[test]
    fn test_manifest_parsing() {
        let yaml = r#"
id: vs_ps
name: VS and PS
device:
  properties:
    gfx_level: Gfx8_1
    rb_plus: true
  settings:
    rb_plus_enable: true
color_targets:
  - format: X8Y8Z8W8_Unorm
    channel_write_mask: 15
metadata:
  hardware_stages:
    ps:
      entry_offset: 512
registers:
  CB_SHADER_MASK: 0xF
  PA_CL_VTE_CNTL: "0x43F"
  SPI_SHADER_USER_DATA_VS_0: GlobalTable
  SPI_SHADER_USER_DATA_VS_3: VertexBufferTable
"#;

        let manifest = PipelineManifest::from_yaml(yaml).unwrap();
        assert_eq!(manifest.id, "vs_ps");
        assert_eq!(manifest.device.properties.gfx_level, GfxIpLevel::Gfx8_1);
        assert!(manifest.device.settings.rb_plus_enable);
        // Unspecified fields keep their defaults
        assert_eq!(manifest.device.properties.num_shader_engines, DeviceConfig::default().properties.num_shader_engines);
        assert_eq!(manifest.code_size, DEFAULT_CODE_SIZE);

        let create_info = manifest.create_info().unwrap();
        assert_eq!(create_info.cb_state.targets[0].format, ChNumFormat::X8Y8Z8W8_Unorm);
        assert_eq!(create_info.cb_state.targets[1], ColorTargetInfo::default());

        let binary = manifest.binary().unwrap();
        assert_eq!(binary.registers.at(regs::CB_SHADER_MASK), 0xF);
        assert_eq!(binary.registers.at(regs::PA_CL_VTE_CNTL), 0x43F);
        assert_eq!(binary.registers.at(regs::SPI_SHADER_VS.user_data_0 + 3), UserDataMapping::VertexBufferTable.raw());
        assert_eq!(binary.metadata.hardware_stages.ps.entry_offset, Some(512));
        assert_eq!(binary.code.len(), DEFAULT_CODE_SIZE);
    }

    #[test]
    fn test_same_register_by_name_and_address_is_rejected() {
        let yaml = r#"
id: dup
name: Duplicate
registers:
  CB_SHADER_MASK: 15
  "0xA08F": 15
"#;
        let manifest = PipelineManifest::from_yaml(yaml).unwrap();
        assert!(matches!(manifest.binary(), Err(ManifestError::Registers(RegisterListError::DuplicateRegister(regs::CB_SHADER_MASK)))));
    }

    #[test]
    fn test_too_many_color_targets() {
        let mut manifest = PipelineManifest::from_yaml("id: x\nname: x\n").unwrap();
        manifest.color_targets = vec![ColorTargetInfo::default(); MAX_COLOR_TARGETS + 1];
        assert!(matches!(manifest.create_info(), Err(ManifestError::TooManyColorTargets(9))));
    }

    #[test]
    fn test_unknown_register_name_is_reported() {
        let manifest = PipelineManifest::from_yaml("id: x\nname: x\nregisters:\n  CB_SHADER_MASKK: 15\n").unwrap();
        assert!(matches!(manifest.binary(), Err(ManifestError::RegisterKey(RegisterParseError::UnknownName(name))) if name == "CB_SHADER_MASKK"));
    }
}
