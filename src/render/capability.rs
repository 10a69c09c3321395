//! 平台与设备能力门控
//!
//! 判定当前平台/设备是否允许 GPU 常驻粒子模拟。两个判定函数都是纯函数，
//! 只依赖传入的参数，可在任意线程调用：
//!
//! - [`supports_gpu_particles`]：静态平台门槛（特性级别或桌面级平台）。
//! - [`runtime_supports_gpu_particles`]：在静态门槛之外叠加运行时开关和
//!   设备能力检查，任何一项不满足时 GPU 路径整体关闭，回退到外部的
//!   CPU 模拟路径（模式选择，不是错误）。

use crate::config::FxConfig;

/// 渲染特性级别
///
/// 按 wgpu 的 downlevel 层级排序，`Downlevel` 起支持计算着色器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FeatureLevel {
    /// WebGL2 兼容层（无计算着色器）
    DownlevelWebGl2,
    /// Downlevel 设备（有计算着色器，能力受限）
    Downlevel,
    /// 完整桌面级特性
    Full,
}

/// 目标平台
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPlatform {
    Windows,
    MacOs,
    Linux,
    Web,
    Android,
    Ios,
}

impl TargetPlatform {
    /// 检测当前编译目标平台
    pub fn current() -> Self {
        if cfg!(target_arch = "wasm32") {
            Self::Web
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "android") {
            Self::Android
        } else if cfg!(target_os = "ios") {
            Self::Ios
        } else {
            Self::Linux
        }
    }

    /// 是否是桌面级平台
    pub fn is_desktop(&self) -> bool {
        matches!(self, Self::Windows | Self::MacOs | Self::Linux)
    }
}

/// 着色器平台描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderPlatform {
    /// 特性级别
    pub feature_level: FeatureLevel,
    /// 目标平台
    pub platform: TargetPlatform,
}

impl ShaderPlatform {
    /// 以当前编译目标平台构造
    pub fn current(feature_level: FeatureLevel) -> Self {
        Self {
            feature_level,
            platform: TargetPlatform::current(),
        }
    }
}

/// 设备能力标志
///
/// 从 wgpu 的特性/限制/格式查询提炼出粒子模拟关心的布尔能力。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// 颜色附件数量上限
    pub max_color_attachments: u32,
    /// 双通道 32 位浮点格式 (Rg32Float) 可过滤采样
    pub rg32_float_filterable: bool,
    /// 3D 纹理支持
    pub texture_3d: bool,
    /// 存储资源视图支持
    pub storage_resource_views: bool,
}

impl DeviceCapabilities {
    /// 从 wgpu 适配器查询设备能力
    pub fn from_adapter(adapter: &wgpu::Adapter) -> Self {
        let limits = adapter.limits();
        let features = adapter.features();
        let rg32 = adapter.get_texture_format_features(wgpu::TextureFormat::Rg32Float);
        Self {
            max_color_attachments: limits.max_color_attachments,
            rg32_float_filterable: features.contains(wgpu::Features::FLOAT32_FILTERABLE)
                || rg32
                    .flags
                    .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE),
            texture_3d: limits.max_texture_dimension_3d > 0,
            storage_resource_views: limits.max_storage_buffers_per_shader_stage > 0,
        }
    }

    /// 假定全功能设备（桌面级独显的典型能力）
    pub fn assume_full() -> Self {
        Self {
            max_color_attachments: 8,
            rg32_float_filterable: true,
            texture_3d: true,
            storage_resource_views: true,
        }
    }

    /// 多渲染目标支持（至少 4 个颜色附件）
    pub fn multiple_render_targets(&self) -> bool {
        self.max_color_attachments >= 4
    }

    /// 宽 MRT 支持（至少 8 个颜色附件）
    pub fn wide_mrt(&self) -> bool {
        self.max_color_attachments >= 8
    }
}

/// 静态平台门槛：着色器平台是否支持 GPU 粒子
///
/// 特性级别达到 [`FeatureLevel::Downlevel`] 即可；桌面级平台无条件放行
/// （用于编辑器里的移动端预览，特性级别门槛被桌面平台短路）。
pub fn supports_gpu_particles(platform: &ShaderPlatform) -> bool {
    platform.feature_level >= FeatureLevel::Downlevel || platform.platform.is_desktop()
}

/// 运行时门槛：当前配置与设备是否支持 GPU 粒子
///
/// 在全局开关关闭时立即返回 false，不再查询设备能力。与
/// [`supports_gpu_particles`] 不同，这里没有桌面平台短路：缺少任何一项
/// 设备能力都会关闭 GPU 路径。
pub fn runtime_supports_gpu_particles(config: &FxConfig, caps: &DeviceCapabilities) -> bool {
    config.allow_gpu_particles
        && caps.multiple_render_targets()
        && caps.wide_mrt()
        && caps.rg32_float_filterable
        && caps.texture_3d
        && caps.storage_resource_views
}
