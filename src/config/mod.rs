/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量和运行时动态调整
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub mod fx;

pub use fx::{FxConfig, GpuSortTest};

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 特效子系统主配置
///
/// 顶层配置容器，目前只有 `fx` 一个区块，保留容器层以便后续扩展。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectsConfig {
    /// GPU 粒子特效配置
    #[serde(default)]
    pub fx: FxConfig,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            fx: FxConfig::default(),
        }
    }
}

impl EffectsConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_json_str(&content)
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 保存为TOML文件
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, content).map_err(ConfigError::FileError)
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("FX_ALLOW_GPU_PARTICLES") {
            self.fx.allow_gpu_particles = val.parse().unwrap_or(self.fx.allow_gpu_particles);
        }
        if let Ok(val) = env::var("FX_ALLOW_GPU_SORTING") {
            self.fx.allow_gpu_sorting = val.parse().unwrap_or(self.fx.allow_gpu_sorting);
        }
        if let Ok(val) = env::var("FX_FREEZE_GPU_SIMULATION") {
            self.fx.freeze_gpu_simulation = val.parse().unwrap_or(self.fx.freeze_gpu_simulation);
        }
        if let Ok(val) = env::var("FX_MAX_GPU_PARTICLES_SPAWNED_PER_FRAME") {
            if let Ok(count) = val.parse() {
                self.fx.max_gpu_particles_spawned_per_frame = count;
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.fx.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EffectsConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = EffectsConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: EffectsConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            config.fx.max_gpu_particles_spawned_per_frame,
            parsed.fx.max_gpu_particles_spawned_per_frame
        );
    }

    #[test]
    fn test_json_serialization() {
        let config = EffectsConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed: EffectsConfig = serde_json::from_str(&json_str).unwrap();
        assert_eq!(config.fx.particle_slack_gpu, parsed.fx.particle_slack_gpu);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EffectsConfig::default();
        env::set_var("FX_MAX_GPU_PARTICLES_SPAWNED_PER_FRAME", "4096");
        config.apply_env_overrides();
        assert_eq!(config.fx.max_gpu_particles_spawned_per_frame, 4096);
        env::remove_var("FX_MAX_GPU_PARTICLES_SPAWNED_PER_FRAME");
    }
}
