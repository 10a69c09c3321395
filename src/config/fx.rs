//! GPU 粒子特效运行时配置
//!
//! 对应一组进程级可调参数（排序开关、剔除开关、模拟冻结、粒子上限等）。
//! 所有读取方通过 [`FxConfig::snapshot`] 获得不可变快照，可在任意线程调用；
//! 唯一的修改入口是 [`FxConfig::apply`]，先验证再整体替换共享快照。
//! 本模块之外的代码不允许直接写这些参数。

use super::{ConfigError, ConfigResult};
use crate::impl_default;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock, RwLock};

/// GPU 排序自检选择器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuSortTest {
    /// 不运行自检
    None,
    /// 小缓冲区自检
    SmallBuffers,
    /// 大缓冲区自检
    LargeBuffers,
    /// 随机长度自检
    Random,
}

impl Default for GpuSortTest {
    fn default() -> Self {
        Self::None
    }
}

/// GPU 粒子特效配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    /// 可视化 GPU 粒子模拟（0 = 关闭，1 = 概览，2 = 逐发射器明细）
    pub visualize_gpu_simulation: u32,

    /// 是否允许 GPU 粒子
    pub allow_gpu_particles: bool,

    /// 是否允许 GPU 发射器排序
    pub allow_gpu_sorting: bool,

    /// 是否允许发射器剔除
    pub allow_culling: bool,

    /// 冻结 GPU 粒子模拟
    pub freeze_gpu_simulation: bool,

    /// 冻结粒子模拟（含控制线程簿记）
    pub freeze_particle_simulation: bool,

    /// 是否允许异步 Tick
    pub allow_async_tick: bool,

    /// GPU 粒子松弛比例（为避免 tile 抖动预留的额外容量，占总量百分比）
    pub particle_slack_gpu: f32,

    /// GPU 粒子 tile 预分配上限
    pub max_particle_tile_preallocation: u32,

    /// 单个发射器允许的 CPU 粒子上限
    pub max_cpu_particles_per_emitter: u32,

    /// 每帧允许生成的 GPU 粒子上限
    pub max_gpu_particles_spawned_per_frame: u32,

    /// GPU 粒子生成数量告警阈值
    pub gpu_spawn_warning_threshold: u32,

    /// GPU 碰撞检测的深度边界
    pub gpu_collision_depth_bounds: f32,

    /// 排序自检选择器
    pub test_gpu_sort: GpuSortTest,
}

impl_default!(FxConfig {
    visualize_gpu_simulation: 0,
    allow_gpu_particles: true,
    allow_gpu_sorting: true,
    allow_culling: true,
    freeze_gpu_simulation: false,
    freeze_particle_simulation: false,
    allow_async_tick: false,
    particle_slack_gpu: 0.02,
    max_particle_tile_preallocation: 100,
    max_cpu_particles_per_emitter: 1000,
    max_gpu_particles_spawned_per_frame: 1024 * 1024,
    gpu_spawn_warning_threshold: 20000,
    gpu_collision_depth_bounds: 500.0,
    test_gpu_sort: GpuSortTest::None,
});

/// 进程级共享配置快照
static FX_CONFIG: OnceLock<RwLock<Arc<FxConfig>>> = OnceLock::new();

fn shared() -> &'static RwLock<Arc<FxConfig>> {
    FX_CONFIG.get_or_init(|| RwLock::new(Arc::new(FxConfig::default())))
}

impl FxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.particle_slack_gpu) {
            return Err(ConfigError::ValidationError(
                "particle_slack_gpu must be in [0, 1]".to_string(),
            ));
        }
        if self.max_particle_tile_preallocation == 0 {
            return Err(ConfigError::ValidationError(
                "max_particle_tile_preallocation must be positive".to_string(),
            ));
        }
        if self.max_gpu_particles_spawned_per_frame == 0 {
            return Err(ConfigError::ValidationError(
                "max_gpu_particles_spawned_per_frame must be positive".to_string(),
            ));
        }
        if self.gpu_collision_depth_bounds <= 0.0 {
            return Err(ConfigError::ValidationError(
                "gpu_collision_depth_bounds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// 获取当前进程级配置快照
    ///
    /// 任意线程可调用。返回的 `Arc` 在持有期间内容不变，后续的
    /// [`FxConfig::apply`] 只影响之后的快照。
    pub fn snapshot() -> Arc<FxConfig> {
        match shared().read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 应用新的进程级配置
    ///
    /// 唯一指定的修改入口：先验证，验证失败则保持旧配置不变。
    pub fn apply(config: FxConfig) -> ConfigResult<()> {
        config.validate()?;
        let new = Arc::new(config);
        match shared().write() {
            Ok(mut guard) => *guard = new,
            Err(poisoned) => *poisoned.into_inner() = new,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(FxConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_slack_rejected() {
        let config = FxConfig {
            particle_slack_gpu: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(FxConfig::apply(config).is_err());
    }

    #[test]
    fn test_zero_spawn_cap_rejected() {
        let config = FxConfig {
            max_gpu_particles_spawned_per_frame: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_snapshot_isolated_from_later_apply() {
        let before = FxConfig::snapshot();
        let threshold = before.gpu_spawn_warning_threshold;
        let mut updated = (*before).clone();
        updated.gpu_spawn_warning_threshold = threshold + 1;
        FxConfig::apply(updated).unwrap();
        // 旧快照保持不变
        assert_eq!(before.gpu_spawn_warning_threshold, threshold);
        assert_eq!(
            FxConfig::snapshot().gpu_spawn_warning_threshold,
            threshold + 1
        );
        // 恢复，避免影响同进程其他测试
        FxConfig::apply((*before).clone()).unwrap();
    }

    #[test]
    fn test_sort_test_serde_roundtrip() {
        let config = FxConfig {
            test_gpu_sort: GpuSortTest::Random,
            ..Default::default()
        };
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: FxConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.test_gpu_sort, GpuSortTest::Random);
    }
}
