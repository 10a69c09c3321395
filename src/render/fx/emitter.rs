//! GPU 精灵发射器描述与资源快照
//!
//! 定义创建/更新一个 GPU 常驻发射器所需的全部输入数据：
//! 逐粒子属性布局、初始粒子快照、发射器级常量参数。
//! [`GpuSpriteResourceData`] 在 `begin_*` 调用入队时被整体拷贝，
//! 调用方的副本在调用返回后即可释放或复用。

use glam::Vec3;
use std::ops::Range;

// ============================================================================
// 逐粒子数据
// ============================================================================

/// GPU 粒子结构（对应 WGSL struct）
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSpriteParticle {
    /// 位置
    pub position: [f32; 3],
    /// 当前年龄
    pub age: f32,
    /// 速度
    pub velocity: [f32; 3],
    /// 生命周期
    pub lifetime: f32,
    /// 杂项通道：大小、旋转、随机种子、存活标记
    pub misc: [f32; 4],
}

impl Default for GpuSpriteParticle {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            age: 0.0,
            velocity: [0.0; 3],
            lifetime: 0.0,
            misc: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// 逐粒子属性布局描述
///
/// 以字节偏移描述各属性通道在粒子结构中的位置，设备端据此组织
/// 属性缓冲区。默认值与 [`GpuSpriteParticle`] 的内存布局一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleAttributeLayout {
    /// 单个粒子的字节跨度
    pub stride: u32,
    /// 位置通道偏移
    pub position_offset: u32,
    /// 速度通道偏移
    pub velocity_offset: u32,
    /// 年龄通道偏移
    pub age_offset: u32,
    /// 杂项通道偏移
    pub misc_offset: u32,
}

impl Default for ParticleAttributeLayout {
    fn default() -> Self {
        Self {
            stride: std::mem::size_of::<GpuSpriteParticle>() as u32,
            position_offset: 0,
            velocity_offset: 16,
            age_offset: 12,
            misc_offset: 32,
        }
    }
}

// ============================================================================
// 发射器级常量
// ============================================================================

/// 发射器级常量参数（上传为 uniform）
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EmitterUniforms {
    /// 发射器原点
    pub origin: [f32; 3],
    /// 阻力系数
    pub drag: f32,
    /// 初始速度下界
    pub velocity_min: [f32; 3],
    /// 生命周期下界
    pub lifetime_min: f32,
    /// 初始速度上界
    pub velocity_max: [f32; 3],
    /// 生命周期上界
    pub lifetime_max: f32,
    /// 恒定加速度（含重力）
    pub acceleration: [f32; 3],
    /// 粒子大小
    pub size: f32,
    /// 粒子颜色
    pub color: [f32; 4],
}

impl Default for EmitterUniforms {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            drag: 0.0,
            velocity_min: [-1.0, 2.0, -1.0],
            lifetime_min: 1.0,
            velocity_max: [1.0, 5.0, 1.0],
            lifetime_max: 3.0,
            acceleration: [0.0, -9.81, 0.0],
            size: 0.1,
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

// ============================================================================
// 资源快照
// ============================================================================

/// 创建/更新 GPU 精灵资源的数据快照
///
/// 入队时整体拷贝，之后对调用方副本的修改不影响已入队的操作。
#[derive(Debug, Clone)]
pub struct GpuSpriteResourceData {
    /// 逐粒子属性布局
    pub layout: ParticleAttributeLayout,
    /// 粒子容量
    pub max_particles: u32,
    /// 初始粒子快照（可为空）
    pub initial_particles: Vec<GpuSpriteParticle>,
    /// 发射器级常量
    pub emitter_constants: EmitterUniforms,
    /// 是否需要排序缓冲区
    pub needs_sorting: bool,
}

impl Default for GpuSpriteResourceData {
    fn default() -> Self {
        Self {
            layout: ParticleAttributeLayout::default(),
            max_particles: 4096,
            initial_particles: Vec::new(),
            emitter_constants: EmitterUniforms::default(),
            needs_sorting: false,
        }
    }
}

// ============================================================================
// 发射器信息
// ============================================================================

/// 排序模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    /// 不排序
    None,
    /// 按视点深度排序（半透明混合需要）
    ViewDepth,
}

/// 碰撞模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionMode {
    /// 不碰撞
    None,
    /// 与场景深度缓冲碰撞
    DepthBuffer,
}

/// GPU 精灵发射器运行时信息
#[derive(Debug, Clone)]
pub struct GpuSpriteEmitterInfo {
    /// 最大粒子数
    pub max_particles: u32,
    /// 每秒发射数量
    pub spawn_rate: f32,
    /// 粒子生命周期范围（秒）
    pub lifetime: Range<f32>,
    /// 排序模式
    pub sort_mode: SortMode,
    /// 碰撞模式
    pub collision_mode: CollisionMode,
    /// 向量场影响系数
    pub vector_field_scale: f32,
    /// 是否启用
    pub enabled: bool,
}

impl Default for GpuSpriteEmitterInfo {
    fn default() -> Self {
        Self {
            max_particles: 4096,
            spawn_rate: 100.0,
            lifetime: 1.0..3.0,
            sort_mode: SortMode::None,
            collision_mode: CollisionMode::None,
            vector_field_scale: 1.0,
            enabled: true,
        }
    }
}

impl GpuSpriteEmitterInfo {
    pub fn new(max_particles: u32) -> Self {
        Self {
            max_particles,
            ..Default::default()
        }
    }

    /// 设置发射速率
    pub fn with_spawn_rate(mut self, rate: f32) -> Self {
        self.spawn_rate = rate;
        self
    }

    /// 设置生命周期
    pub fn with_lifetime(mut self, min: f32, max: f32) -> Self {
        self.lifetime = min..max;
        self
    }

    /// 设置排序模式
    pub fn with_sort_mode(mut self, mode: SortMode) -> Self {
        self.sort_mode = mode;
        self
    }

    /// 设置碰撞模式
    pub fn with_collision_mode(mut self, mode: CollisionMode) -> Self {
        self.collision_mode = mode;
        self
    }

    /// 构造与该发射器匹配的资源快照
    pub fn resource_data(&self, origin: Vec3) -> GpuSpriteResourceData {
        GpuSpriteResourceData {
            max_particles: self.max_particles,
            needs_sorting: self.sort_mode != SortMode::None,
            emitter_constants: EmitterUniforms {
                origin: origin.to_array(),
                lifetime_min: self.lifetime.start,
                lifetime_max: self.lifetime.end,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

// ============================================================================
// 生成簿记
// ============================================================================

/// 控制上下文一侧的生成簿记
///
/// `tick` 写入后备计数，设备上下文在 `PreInitViews` 交换前后台，
/// 保证异步 Tick 模式下两个上下文不触碰同一份计数。
#[derive(Debug, Clone, Copy, Default)]
pub struct SpawnState {
    /// 发射累积量
    pub accumulator: f32,
    /// 后备计数（控制上下文写入）
    pub back: u32,
    /// 前台计数（设备上下文消费）
    pub front: u32,
}

impl SpawnState {
    /// 按速率累积本帧应发射的粒子数
    pub fn accumulate(&mut self, rate: f32, delta_time: f32) -> u32 {
        self.accumulator += rate * delta_time;
        let count = self.accumulator.floor() as u32;
        self.accumulator -= count as f32;
        count
    }

    /// 交换前后台计数
    pub fn swap(&mut self) {
        self.front = self.back;
        self.back = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitter_info_default() {
        let info = GpuSpriteEmitterInfo::default();
        assert_eq!(info.max_particles, 4096);
        assert!(info.enabled);
        assert_eq!(info.sort_mode, SortMode::None);
    }

    #[test]
    fn test_spawn_accumulate() {
        let mut spawn = SpawnState::default();
        // 100/s * 0.01s = 1 个
        assert_eq!(spawn.accumulate(100.0, 0.01), 1);
        // 余量累积
        assert_eq!(spawn.accumulate(100.0, 0.005), 0);
        assert_eq!(spawn.accumulate(100.0, 0.005), 1);
    }

    #[test]
    fn test_spawn_swap() {
        let mut spawn = SpawnState::default();
        spawn.back = 42;
        spawn.swap();
        assert_eq!(spawn.front, 42);
        assert_eq!(spawn.back, 0);
    }

    #[test]
    fn test_resource_data_snapshot_matches_info() {
        let info = GpuSpriteEmitterInfo::new(1024)
            .with_sort_mode(SortMode::ViewDepth)
            .with_lifetime(0.5, 2.0);
        let data = info.resource_data(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(data.max_particles, 1024);
        assert!(data.needs_sorting);
        assert_eq!(data.emitter_constants.origin, [1.0, 2.0, 3.0]);
        assert_eq!(data.emitter_constants.lifetime_min, 0.5);
    }

    #[test]
    fn test_particle_layout_matches_struct() {
        let layout = ParticleAttributeLayout::default();
        assert_eq!(
            layout.stride as usize,
            std::mem::size_of::<GpuSpriteParticle>()
        );
        assert_eq!(layout.stride, 48);
    }
}
