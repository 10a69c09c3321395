//! GPU 精灵模拟资源
//!
//! 一个发射器的设备端缓冲区集合：粒子状态、存活/死亡列表、计数器、
//! tile 间接表、uniform。缓冲区只能在设备上下文中创建和销毁，
//! 控制上下文通过 [`super::device`] 的命令队列间接操作。

use crate::config::FxConfig;
use crate::core::error::{FxError, FxResult};
use crate::render::fx::emitter::{GpuSpriteParticle, GpuSpriteResourceData};
use crate::render::fx::simulation::SIM_UNIFORM_BUFFER_SIZE;

/// 每个 tile 容纳的粒子数
pub const PARTICLE_TILE_SIZE: u32 = 1024;

/// 向上取整到 2 的幂（排序缓冲区要求）
pub(crate) fn next_power_of_two(value: u32) -> u32 {
    value.max(1).next_power_of_two()
}

// ============================================================================
// Tile 分配
// ============================================================================

/// 发射器的 tile 配额
///
/// 按粒子容量加松弛比例折算 tile 数，超出预分配上限即分配失败——
/// 这是本层唯一的资源分配失败路径，失败只影响所属发射器。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileAllocation {
    tile_count: u32,
    capacity: u32,
}

impl TileAllocation {
    /// 为给定粒子容量计算 tile 配额
    pub fn for_particles(max_particles: u32, config: &FxConfig) -> FxResult<Self> {
        let slack = (max_particles as f32 * config.particle_slack_gpu).ceil() as u32;
        let padded = max_particles.saturating_add(slack).max(1);
        let tile_count = (padded + PARTICLE_TILE_SIZE - 1) / PARTICLE_TILE_SIZE;
        if tile_count > config.max_particle_tile_preallocation {
            return Err(FxError::TileAllocationFailed {
                requested: tile_count,
                available: config.max_particle_tile_preallocation,
            });
        }
        Ok(Self {
            tile_count,
            capacity: tile_count * PARTICLE_TILE_SIZE,
        })
    }

    /// tile 数
    pub fn tile_count(&self) -> u32 {
        self.tile_count
    }

    /// 含松弛的粒子容量
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// tile 间接表：tile 序号 -> 粒子基址
    pub fn tile_table(&self) -> Vec<u32> {
        (0..self.tile_count).map(|i| i * PARTICLE_TILE_SIZE).collect()
    }
}

// ============================================================================
// 设备端资源集合
// ============================================================================

/// 一个 GPU 精灵发射器的设备端资源
pub struct GpuSpriteResources {
    /// 粒子状态缓冲区
    pub particle_buffer: wgpu::Buffer,
    /// 死亡槽位栈
    pub dead_list_buffer: wgpu::Buffer,
    /// 计数器（alive, dead, spawn, pad）
    pub counter_buffer: wgpu::Buffer,
    /// tile 间接表
    pub tile_table_buffer: wgpu::Buffer,
    /// 发射器常量 uniform
    pub emitter_uniform_buffer: wgpu::Buffer,
    /// 模拟阶段 uniform（每个资源集独立，避免帧内写覆盖）
    pub sim_uniform_buffer: wgpu::Buffer,
    /// 排序键缓冲区（仅排序发射器）
    pub sort_key_buffer: Option<wgpu::Buffer>,
    /// 排序索引缓冲区（仅排序发射器）
    pub sort_index_buffer: Option<wgpu::Buffer>,
    /// 粒子容量（含松弛）
    pub capacity: u32,
    /// 请求的最大粒子数（不含松弛）
    pub max_particles: u32,
    /// tile 数
    pub tile_count: u32,
    /// 排序缓冲区长度（2 的幂）
    pub sort_capacity: u32,
}

impl GpuSpriteResources {
    /// 在设备上下文中创建资源集合
    ///
    /// tile 配额不足时返回错误，调用方应将所属发射器标记为惰性。
    pub fn new(
        device: &wgpu::Device,
        config: &FxConfig,
        data: &GpuSpriteResourceData,
    ) -> FxResult<Self> {
        let tiles = TileAllocation::for_particles(data.max_particles, config)?;
        let capacity = tiles.capacity();
        let particle_stride = data.layout.stride as u64;

        let particle_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FX Sprite Particles"),
            size: particle_stride * capacity as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });

        let dead_list_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FX Sprite Dead List"),
            size: (capacity * 4) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let counter_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FX Sprite Counters"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::INDIRECT,
            mapped_at_creation: false,
        });

        let tile_table_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FX Sprite Tile Table"),
            size: (tiles.tile_count() * 4) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let emitter_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FX Sprite Emitter Uniforms"),
            size: std::mem::size_of::<crate::render::fx::emitter::EmitterUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sim_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FX Sprite Stage Uniforms"),
            size: SIM_UNIFORM_BUFFER_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sort_capacity = next_power_of_two(capacity);
        let (sort_key_buffer, sort_index_buffer) = if data.needs_sorting {
            let keys = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("FX Sprite Sort Keys"),
                size: (sort_capacity * 4) as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let indices = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("FX Sprite Sort Indices"),
                size: (sort_capacity * 4) as u64,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::VERTEX,
                mapped_at_creation: false,
            });
            (Some(keys), Some(indices))
        } else {
            (None, None)
        };

        Ok(Self {
            particle_buffer,
            dead_list_buffer,
            counter_buffer,
            tile_table_buffer,
            emitter_uniform_buffer,
            sim_uniform_buffer,
            sort_key_buffer,
            sort_index_buffer,
            capacity,
            max_particles: data.max_particles,
            tile_count: tiles.tile_count(),
            sort_capacity,
        })
    }

    /// 初始化缓冲区内容（死亡列表、计数器、初始粒子、常量）
    pub fn initialize(&self, queue: &wgpu::Queue, data: &GpuSpriteResourceData) {
        let tiles = TileAllocation {
            tile_count: self.tile_count,
            capacity: self.capacity,
        };
        queue.write_buffer(
            &self.tile_table_buffer,
            0,
            bytemuck::cast_slice(&tiles.tile_table()),
        );

        let initial_count = (data.initial_particles.len() as u32).min(self.capacity);
        // 空闲槽位从高到低压栈，使初始粒子占据低位槽
        let dead_list: Vec<u32> = (initial_count..self.capacity).rev().collect();
        queue.write_buffer(&self.dead_list_buffer, 0, bytemuck::cast_slice(&dead_list));

        let counters = [initial_count, self.capacity - initial_count, 0u32, 0u32];
        queue.write_buffer(&self.counter_buffer, 0, bytemuck::cast_slice(&counters));

        if initial_count > 0 {
            let mut particles: Vec<GpuSpriteParticle> =
                data.initial_particles[..initial_count as usize].to_vec();
            for particle in &mut particles {
                particle.misc[3] = 1.0;
            }
            queue.write_buffer(&self.particle_buffer, 0, bytemuck::cast_slice(&particles));
        }

        queue.write_buffer(
            &self.emitter_uniform_buffer,
            0,
            bytemuck::bytes_of(&data.emitter_constants),
        );
    }

    /// 增量更新（常量参数；附带粒子快照时重置粒子状态）
    pub fn update(&self, queue: &wgpu::Queue, data: &GpuSpriteResourceData) {
        if data.initial_particles.is_empty() {
            queue.write_buffer(
                &self.emitter_uniform_buffer,
                0,
                bytemuck::bytes_of(&data.emitter_constants),
            );
        } else {
            self.initialize(queue, data);
        }
    }

    /// 更新数据是否要求重建缓冲区
    pub fn requires_reallocation(&self, data: &GpuSpriteResourceData) -> bool {
        data.max_particles > self.capacity
            || (data.needs_sorting && self.sort_key_buffer.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_allocation_rounds_up() {
        let config = FxConfig::default();
        let tiles = TileAllocation::for_particles(PARTICLE_TILE_SIZE + 1, &config).unwrap();
        assert_eq!(tiles.tile_count(), 2);
        assert_eq!(tiles.capacity(), 2 * PARTICLE_TILE_SIZE);
    }

    #[test]
    fn test_tile_allocation_includes_slack() {
        let config = FxConfig {
            particle_slack_gpu: 0.5,
            ..Default::default()
        };
        // 1024 + 50% 松弛 = 1536 -> 2 个 tile
        let tiles = TileAllocation::for_particles(PARTICLE_TILE_SIZE, &config).unwrap();
        assert_eq!(tiles.tile_count(), 2);
    }

    #[test]
    fn test_tile_allocation_fails_over_preallocation_cap() {
        let config = FxConfig {
            max_particle_tile_preallocation: 4,
            ..Default::default()
        };
        let err = TileAllocation::for_particles(PARTICLE_TILE_SIZE * 8, &config).unwrap_err();
        assert!(matches!(err, FxError::TileAllocationFailed { .. }));
    }

    #[test]
    fn test_tile_table_bases() {
        let config = FxConfig::default();
        let tiles = TileAllocation::for_particles(PARTICLE_TILE_SIZE * 3, &config).unwrap();
        let table = tiles.tile_table();
        assert_eq!(table[0], 0);
        assert_eq!(table[1], PARTICLE_TILE_SIZE);
        assert_eq!(table[2], PARTICLE_TILE_SIZE * 2);
    }

    #[test]
    fn test_next_power_of_two() {
        assert_eq!(next_power_of_two(0), 1);
        assert_eq!(next_power_of_two(1000), 1024);
        assert_eq!(next_power_of_two(1024), 1024);
    }
}
