//! GPU 粒子模拟计算管线
//!
//! 三个计算入口，分别挂接在不同的管线阶段：
//!
//! 1. 注入（`PreInitViews`）：从死亡槽位栈弹出空闲槽，初始化新粒子
//! 2. 模拟（`PreRender`）：积分运动、阻力、向量场力，回收过期粒子
//! 3. 深度碰撞（`PostRenderOpaque`）：对照场景深度缓冲反弹粒子
//!
//! 同一帧内三个阶段写同一资源集的 uniform 缓冲区，使用 256 字节对齐的
//! 动态偏移区分，避免单次提交内的写覆盖。

use crate::render::fx::resources::GpuSpriteResources;

/// 模拟 uniform 的动态偏移对齐
pub const SIM_UNIFORM_ALIGN: u64 = 256;
/// 每个资源集的模拟 uniform 槽位数（注入/模拟/碰撞）
pub const SIM_STAGE_COUNT: u64 = 3;
/// 每个资源集的模拟 uniform 缓冲区大小
pub const SIM_UNIFORM_BUFFER_SIZE: u64 = SIM_UNIFORM_ALIGN * SIM_STAGE_COUNT;

/// 向量场最大同时绑定数
pub const MAX_VECTOR_FIELDS: usize = 4;

/// 计算着色器工作组大小
const WORKGROUP_SIZE: u32 = 64;

/// 模拟阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimStage {
    Inject,
    Simulate,
    Collide,
}

impl SimStage {
    fn uniform_offset(&self) -> u64 {
        match self {
            Self::Inject => 0,
            Self::Simulate => SIM_UNIFORM_ALIGN,
            Self::Collide => SIM_UNIFORM_ALIGN * 2,
        }
    }
}

// ============================================================================
// Uniform 结构
// ============================================================================

/// 视图 uniform（帧驱动方在 `PostInitViews` 提供）
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewUniforms {
    /// 视图投影矩阵
    pub view_proj: [[f32; 4]; 4],
    /// 视点位置
    pub view_origin: [f32; 3],
    /// 深度缓冲尺寸的倒数（碰撞投影用）
    pub inv_depth_size: f32,
}

impl Default for ViewUniforms {
    fn default() -> Self {
        Self {
            view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            view_origin: [0.0; 3],
            inv_depth_size: 0.0,
        }
    }
}

/// 打包进模拟 uniform 的单个向量场
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VectorFieldGpu {
    /// 场中心（世界空间）
    pub center: [f32; 3],
    /// 强度
    pub intensity: f32,
    /// 半尺寸
    pub half_extents: [f32; 3],
    /// 衰减紧度
    pub tightness: f32,
}

/// 模拟阶段 uniform（对应 WGSL `StageUniforms`）
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SimulationStageUniforms {
    /// 视图投影矩阵（碰撞投影用）
    pub view_proj: [[f32; 4]; 4],
    /// 向量场打包
    pub vector_fields: [VectorFieldGpu; MAX_VECTOR_FIELDS],
    /// 时间步长
    pub delta_time: f32,
    /// 累计时间
    pub time: f32,
    /// 帧随机种子
    pub random_seed: f32,
    /// 有效向量场数量
    pub vector_field_count: u32,
    /// 碰撞深度边界
    pub collision_depth_bounds: f32,
    /// 本阶段注入的粒子数
    pub spawn_count: u32,
    /// 粒子容量
    pub capacity: u32,
    /// 发射器的向量场影响系数
    pub vector_field_scale: f32,
}

impl Default for SimulationStageUniforms {
    fn default() -> Self {
        Self {
            view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            vector_fields: [VectorFieldGpu::default(); MAX_VECTOR_FIELDS],
            delta_time: 0.0,
            time: 0.0,
            random_seed: 0.0,
            vector_field_count: 0,
            collision_depth_bounds: 500.0,
            spawn_count: 0,
            capacity: 0,
            vector_field_scale: 1.0,
        }
    }
}

// ============================================================================
// 管线
// ============================================================================

/// 粒子模拟管线集合
pub struct ParticleSimulationPipeline {
    inject_pipeline: wgpu::ComputePipeline,
    simulate_pipeline: wgpu::ComputePipeline,
    collide_pipeline: wgpu::ComputePipeline,
    sim_bind_group_layout: wgpu::BindGroupLayout,
    depth_bind_group_layout: wgpu::BindGroupLayout,
}

impl ParticleSimulationPipeline {
    /// 创建模拟管线（设备上下文）
    pub fn new(device: &wgpu::Device) -> Self {
        let sim_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("FX Simulation BGL"),
                entries: &[
                    // 阶段 uniform（动态偏移）
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // 发射器常量
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // 粒子状态
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // 死亡槽位栈
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // 计数器
                    wgpu::BindGroupLayoutEntry {
                        binding: 4,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // tile 间接表
                    wgpu::BindGroupLayoutEntry {
                        binding: 5,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let depth_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("FX Depth BGL"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                }],
            });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("FX Simulation Shader"),
            source: wgpu::ShaderSource::Wgsl(SIMULATION_SHADER.into()),
        });

        let sim_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("FX Simulation Pipeline Layout"),
            bind_group_layouts: &[&sim_bind_group_layout],
            push_constant_ranges: &[],
        });

        let collide_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("FX Collide Pipeline Layout"),
            bind_group_layouts: &[&sim_bind_group_layout, &depth_bind_group_layout],
            push_constant_ranges: &[],
        });

        let inject_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("FX Inject Pipeline"),
            layout: Some(&sim_layout),
            module: &shader,
            entry_point: "inject_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        let simulate_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("FX Simulate Pipeline"),
            layout: Some(&sim_layout),
            module: &shader,
            entry_point: "simulate_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        let collide_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("FX Collide Pipeline"),
            layout: Some(&collide_layout),
            module: &shader,
            entry_point: "collide_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        Self {
            inject_pipeline,
            simulate_pipeline,
            collide_pipeline,
            sim_bind_group_layout,
            depth_bind_group_layout,
        }
    }

    fn sim_bind_group(
        &self,
        device: &wgpu::Device,
        resources: &GpuSpriteResources,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FX Simulation BG"),
            layout: &self.sim_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &resources.sim_uniform_buffer,
                        offset: 0,
                        size: std::num::NonZeroU64::new(
                            std::mem::size_of::<SimulationStageUniforms>() as u64,
                        ),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: resources.emitter_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resources.particle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: resources.dead_list_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: resources.counter_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: resources.tile_table_buffer.as_entire_binding(),
                },
            ],
        })
    }

    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        stage: SimStage,
        depth_bind_group: Option<&wgpu::BindGroup>,
        thread_count: u32,
        label: &str,
    ) {
        if thread_count == 0 {
            return;
        }
        let workgroups = (thread_count + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        cpass.set_pipeline(pipeline);
        cpass.set_bind_group(0, bind_group, &[stage.uniform_offset() as u32]);
        if let Some(depth) = depth_bind_group {
            cpass.set_bind_group(1, depth, &[]);
        }
        cpass.dispatch_workgroups(workgroups, 1, 1);
    }

    /// 注入新粒子
    pub fn inject(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        resources: &GpuSpriteResources,
        uniforms: &SimulationStageUniforms,
    ) {
        queue.write_buffer(
            &resources.sim_uniform_buffer,
            SimStage::Inject.uniform_offset(),
            bytemuck::bytes_of(uniforms),
        );
        let bind_group = self.sim_bind_group(device, resources);
        self.dispatch(
            encoder,
            &self.inject_pipeline,
            &bind_group,
            SimStage::Inject,
            None,
            uniforms.spawn_count,
            "FX Inject Pass",
        );
    }

    /// 积分模拟
    pub fn simulate(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        resources: &GpuSpriteResources,
        uniforms: &SimulationStageUniforms,
    ) {
        queue.write_buffer(
            &resources.sim_uniform_buffer,
            SimStage::Simulate.uniform_offset(),
            bytemuck::bytes_of(uniforms),
        );
        let bind_group = self.sim_bind_group(device, resources);
        self.dispatch(
            encoder,
            &self.simulate_pipeline,
            &bind_group,
            SimStage::Simulate,
            None,
            resources.capacity,
            "FX Simulate Pass",
        );
    }

    /// 深度缓冲碰撞
    pub fn collide(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        resources: &GpuSpriteResources,
        uniforms: &SimulationStageUniforms,
        depth_view: &wgpu::TextureView,
    ) {
        queue.write_buffer(
            &resources.sim_uniform_buffer,
            SimStage::Collide.uniform_offset(),
            bytemuck::bytes_of(uniforms),
        );
        let bind_group = self.sim_bind_group(device, resources);
        let depth_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FX Depth BG"),
            layout: &self.depth_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(depth_view),
            }],
        });
        self.dispatch(
            encoder,
            &self.collide_pipeline,
            &bind_group,
            SimStage::Collide,
            Some(&depth_bind_group),
            resources.capacity,
            "FX Collide Pass",
        );
    }
}

/// 粒子模拟计算着色器
const SIMULATION_SHADER: &str = r#"
struct VectorField {
    center: vec3<f32>,
    intensity: f32,
    half_extents: vec3<f32>,
    tightness: f32,
};

struct StageUniforms {
    view_proj: mat4x4<f32>,
    vector_fields: array<VectorField, 4>,
    delta_time: f32,
    time: f32,
    random_seed: f32,
    vector_field_count: u32,
    collision_depth_bounds: f32,
    spawn_count: u32,
    capacity: u32,
    vector_field_scale: f32,
};

struct EmitterUniforms {
    origin: vec3<f32>,
    drag: f32,
    velocity_min: vec3<f32>,
    lifetime_min: f32,
    velocity_max: vec3<f32>,
    lifetime_max: f32,
    acceleration: vec3<f32>,
    size: f32,
    color: vec4<f32>,
};

struct Particle {
    position: vec3<f32>,
    age: f32,
    velocity: vec3<f32>,
    lifetime: f32,
    misc: vec4<f32>,
};

struct Counters {
    alive: atomic<u32>,
    dead: atomic<u32>,
    spawn: atomic<u32>,
    pad: u32,
};

@group(0) @binding(0) var<uniform> stage: StageUniforms;
@group(0) @binding(1) var<uniform> emitter: EmitterUniforms;
@group(0) @binding(2) var<storage, read_write> particles: array<Particle>;
@group(0) @binding(3) var<storage, read_write> dead_list: array<u32>;
@group(0) @binding(4) var<storage, read_write> counters: Counters;
@group(0) @binding(5) var<storage, read> tile_table: array<u32>;

@group(1) @binding(0) var scene_depth: texture_depth_2d;

const TILE_SIZE: u32 = 1024u;

fn pcg_hash(input: u32) -> u32 {
    var state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn rand_unit(seed: u32) -> f32 {
    return f32(pcg_hash(seed)) / 4294967295.0;
}

// 槽位号经 tile 间接表转换为粒子地址
fn slot_address(slot: u32) -> u32 {
    let tile = slot / TILE_SIZE;
    return tile_table[tile] + (slot % TILE_SIZE);
}

@compute @workgroup_size(64)
fn inject_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= stage.spawn_count) {
        return;
    }

    // 死亡槽位栈弹栈；空栈时把计数补回并放弃
    let old_dead = atomicSub(&counters.dead, 1u);
    if (old_dead == 0u) {
        atomicAdd(&counters.dead, 1u);
        return;
    }
    let slot = dead_list[old_dead - 1u];
    let addr = slot_address(slot);

    let seed = pcg_hash(i + u32(stage.random_seed * 4096.0));
    let r0 = rand_unit(seed);
    let r1 = rand_unit(seed + 1u);
    let r2 = rand_unit(seed + 2u);
    let r3 = rand_unit(seed + 3u);

    var p: Particle;
    p.position = emitter.origin;
    p.age = 0.0;
    p.velocity = mix(emitter.velocity_min, emitter.velocity_max, vec3<f32>(r0, r1, r2));
    p.lifetime = mix(emitter.lifetime_min, emitter.lifetime_max, r3);
    p.misc = vec4<f32>(emitter.size, 0.0, f32(seed), 1.0);
    particles[addr] = p;

    atomicAdd(&counters.alive, 1u);
}

fn vector_field_force(position: vec3<f32>) -> vec3<f32> {
    var force = vec3<f32>(0.0);
    for (var f = 0u; f < stage.vector_field_count; f++) {
        let field = stage.vector_fields[f];
        let offset = position - field.center;
        let normalized = abs(offset) / max(field.half_extents, vec3<f32>(0.0001));
        let outside = max(max(normalized.x, normalized.y), normalized.z);
        if (outside > 1.0) {
            continue;
        }
        // 距场心越远衰减越强
        let falloff = pow(max(1.0 - outside, 0.0), field.tightness);
        force += normalize(-offset + vec3<f32>(0.0001)) * field.intensity * falloff;
    }
    return force * stage.vector_field_scale;
}

@compute @workgroup_size(64)
fn simulate_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let slot = global_id.x;
    if (slot >= stage.capacity) {
        return;
    }
    let addr = slot_address(slot);
    var p = particles[addr];
    if (p.misc.w < 0.5) {
        return;
    }

    p.age += stage.delta_time;
    if (p.age >= p.lifetime) {
        // 回收：压回死亡槽位栈
        p.misc.w = 0.0;
        particles[addr] = p;
        let idx = atomicAdd(&counters.dead, 1u);
        dead_list[idx] = slot;
        atomicSub(&counters.alive, 1u);
        return;
    }

    var velocity = p.velocity;
    velocity += (emitter.acceleration + vector_field_force(p.position)) * stage.delta_time;
    velocity /= (1.0 + emitter.drag * stage.delta_time);
    p.velocity = velocity;
    p.position += velocity * stage.delta_time;
    particles[addr] = p;
}

@compute @workgroup_size(64)
fn collide_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let slot = global_id.x;
    if (slot >= stage.capacity) {
        return;
    }
    let addr = slot_address(slot);
    var p = particles[addr];
    if (p.misc.w < 0.5) {
        return;
    }

    let clip = stage.view_proj * vec4<f32>(p.position, 1.0);
    if (clip.w <= 0.0) {
        return;
    }
    let ndc = clip.xyz / clip.w;
    if (abs(ndc.x) > 1.0 || abs(ndc.y) > 1.0) {
        return;
    }
    let dims = textureDimensions(scene_depth);
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    let texel = vec2<i32>(uv * vec2<f32>(dims));
    let depth = textureLoad(scene_depth, texel, 0);

    // 粒子在场景表面之后且在深度边界内：反弹
    let penetration = (ndc.z - depth) * stage.collision_depth_bounds;
    if (penetration > 0.0 && penetration < stage.collision_depth_bounds) {
        p.velocity = reflect(p.velocity, vec3<f32>(0.0, 1.0, 0.0)) * 0.3;
        p.position += p.velocity * stage.delta_time;
        particles[addr] = p;
    }
}
"#;
