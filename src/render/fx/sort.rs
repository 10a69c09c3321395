//! GPU 排序协调器
//!
//! 多个发射器共享同一个 [`GpuSortManager`]：帧内任意时刻提交排序请求，
//! 协调器在每帧两个固定的解析点把挂起请求按键格式分批，合并为尽量少的
//! 设备排序调度。帧驱动方在正确的管线位置调用
//! [`GpuSortManager::on_pre_render`] 和 [`GpuSortManager::on_post_render_opaque`]。
//!
//! 顺序保证：解析点触发前提交的请求进入本次批次；触发之后提交的请求
//! 顺延到该解析点的下一次触发，永不丢弃。批量合并只是优化，对解析点
//! 顺序没有可观察影响。
//!
//! 全局排序开关关闭时请求被接受但直接丢弃（缓冲区保持未排序顺序）；
//! 剔除开关关闭时所有请求无条件解析——本层不做可见性判断，被剔除
//! 发射器的请求由上游决定是否提交。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use rand::Rng;
use wgpu::util::DeviceExt;

use crate::config::{FxConfig, GpuSortTest};
use crate::render::fx::device::{FxFrameContext, ResourceId};
use crate::render::fx::resources::next_power_of_two;

/// 动态偏移的 uniform 槽位对齐
const PARAMS_ALIGN: u64 = 256;
/// 排序计算着色器工作组大小
const SORT_WORKGROUP_SIZE: u32 = 256;

// ============================================================================
// 请求与批次
// ============================================================================

/// 解析点：每帧两个固定位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortResolutionPoint {
    /// 主场景渲染前
    PreRender,
    /// 不透明通道渲染后
    PostRenderOpaque,
}

impl SortResolutionPoint {
    fn index(&self) -> usize {
        match self {
            Self::PreRender => 0,
            Self::PostRenderOpaque => 1,
        }
    }
}

/// 排序键格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKeyFormat {
    /// 键已由发射器自行生成（跳过键生成通道）
    KeyU32,
    /// 按视点距离生成浮点深度键（半透明由远及近）
    KeyF32Depth,
}

/// 一条排序请求
#[derive(Debug, Clone)]
pub struct SortRequest {
    /// 目标资源集
    pub resource: ResourceId,
    /// 参与排序的元素数
    pub element_count: u32,
    /// 键格式
    pub key_format: SortKeyFormat,
    /// 期望的解析点
    pub point: SortResolutionPoint,
    /// 视点位置（深度键生成用）
    pub view_origin: [f32; 3],
}

/// 同键格式的请求批次
#[derive(Debug)]
pub struct SortBatch {
    pub key_format: SortKeyFormat,
    pub requests: Vec<SortRequest>,
}

/// 协调器统计
#[derive(Debug, Clone, Copy, Default)]
pub struct SortStats {
    /// 已解析的请求数
    pub resolved_requests: u64,
    /// 因排序关闭被丢弃的请求数
    pub discarded_requests: u64,
}

// ============================================================================
// 协调器
// ============================================================================

/// GPU 排序协调器
pub struct GpuSortManager {
    pending: [Mutex<Vec<SortRequest>>; 2],
    pipeline: Mutex<Option<SortPipeline>>,
    resolved_requests: AtomicU64,
    discarded_requests: AtomicU64,
}

impl Default for GpuSortManager {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuSortManager {
    pub fn new() -> Self {
        Self {
            pending: [Mutex::new(Vec::new()), Mutex::new(Vec::new())],
            pipeline: Mutex::new(None),
            resolved_requests: AtomicU64::new(0),
            discarded_requests: AtomicU64::new(0),
        }
    }

    fn lock_pending(&self, point: SortResolutionPoint) -> MutexGuard<'_, Vec<SortRequest>> {
        match self.pending[point.index()].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 提交排序请求
    ///
    /// 排序全局关闭时接受并丢弃；否则挂起到请求指定的解析点。
    pub fn add_request(&self, config: &FxConfig, request: SortRequest) {
        if !config.allow_gpu_sorting {
            self.discarded_requests.fetch_add(1, Ordering::Relaxed);
            log::trace!(
                "GPU sorting disabled; request for resource {} discarded",
                request.resource.0
            );
            return;
        }
        self.lock_pending(request.point).push(request);
    }

    /// 指定解析点的挂起请求数
    pub fn pending_count(&self, point: SortResolutionPoint) -> usize {
        self.lock_pending(point).len()
    }

    /// 统计快照
    pub fn stats(&self) -> SortStats {
        SortStats {
            resolved_requests: self.resolved_requests.load(Ordering::Relaxed),
            discarded_requests: self.discarded_requests.load(Ordering::Relaxed),
        }
    }

    /// 解析点：主场景渲染前
    pub fn on_pre_render(&self, frame: &mut FxFrameContext<'_>) {
        let config = FxConfig::snapshot();
        self.resolve(&config, SortResolutionPoint::PreRender, frame);
    }

    /// 解析点：不透明通道渲染后
    pub fn on_post_render_opaque(&self, frame: &mut FxFrameContext<'_>) {
        let config = FxConfig::snapshot();
        self.resolve(&config, SortResolutionPoint::PostRenderOpaque, frame);
    }

    fn resolve(
        &self,
        config: &FxConfig,
        point: SortResolutionPoint,
        frame: &mut FxFrameContext<'_>,
    ) {
        let requests = std::mem::take(&mut *self.lock_pending(point));
        if requests.is_empty() {
            return;
        }
        // 排序开关在请求挂起后被关闭：丢弃整批，缓冲区保持未排序顺序
        if !config.allow_gpu_sorting {
            self.discarded_requests
                .fetch_add(requests.len() as u64, Ordering::Relaxed);
            return;
        }
        self.resolved_requests
            .fetch_add(requests.len() as u64, Ordering::Relaxed);
        let batches = Self::partition(requests);

        let Some(gpu) = frame.gpu.as_mut() else {
            return;
        };
        let mut guard = match self.pipeline.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let pipeline = guard.get_or_insert_with(|| SortPipeline::new(gpu.device));
        for batch in &batches {
            pipeline.sort_batch(gpu.device, gpu.encoder, frame.resources, batch);
        }
    }

    /// 按键格式分批，保持提交顺序
    pub(crate) fn partition(requests: Vec<SortRequest>) -> Vec<SortBatch> {
        let mut batches: Vec<SortBatch> = Vec::new();
        for request in requests {
            if let Some(batch) = batches
                .iter_mut()
                .find(|b| b.key_format == request.key_format)
            {
                batch.requests.push(request);
            } else {
                batches.push(SortBatch {
                    key_format: request.key_format,
                    requests: vec![request],
                });
            }
        }
        batches
    }

    /// 运行排序自检（由 `test_gpu_sort` 配置触发）
    ///
    /// 生成合成键，执行设备排序后回读验证。只输出日志，不影响正确性。
    pub fn run_self_test(&self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let config = FxConfig::snapshot();
        let element_count: u32 = match config.test_gpu_sort {
            GpuSortTest::None => return,
            GpuSortTest::SmallBuffers => 256,
            GpuSortTest::LargeBuffers => 1 << 14,
            GpuSortTest::Random => rand::thread_rng().gen_range(2..=4096),
        };
        let padded = next_power_of_two(element_count);

        let mut rng = rand::thread_rng();
        let mut keys: Vec<u32> = (0..element_count)
            .map(|_| rng.gen::<u32>() & 0x7fff_ffff)
            .collect();
        let mut padded_keys = keys.clone();
        padded_keys.resize(padded as usize, u32::MAX);
        let indices: Vec<u32> = (0..padded).collect();

        let key_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("FX Sort Self-Test Keys"),
            contents: bytemuck::cast_slice(&padded_keys),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("FX Sort Self-Test Indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("FX Sort Self-Test Staging"),
            size: (padded * 4) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut guard = match self.pipeline.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let pipeline = guard.get_or_insert_with(|| SortPipeline::new(device));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("FX Sort Self-Test Encoder"),
        });
        pipeline.encode_steps(device, &mut encoder, &key_buffer, &index_buffer, padded);
        encoder.copy_buffer_to_buffer(&key_buffer, 0, &staging, 0, (padded * 4) as u64);
        queue.submit(Some(encoder.finish()));

        let (tx, rx) = crossbeam_channel::bounded(1);
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = tx.send(result);
            });
        device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {
                let mapped = staging.slice(..).get_mapped_range();
                let sorted: &[u32] = bytemuck::cast_slice(&mapped);
                keys.sort_unstable();
                let ok = sorted[..element_count as usize] == keys[..];
                if ok {
                    log::info!("GPU sort self-test passed ({element_count} elements)");
                } else {
                    log::error!("GPU sort self-test FAILED ({element_count} elements)");
                }
            }
            _ => log::error!("GPU sort self-test readback failed"),
        }
    }
}

// ============================================================================
// 排序管线
// ============================================================================

/// 键生成参数（对应 WGSL `KeyGenParams`）
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct KeyGenParams {
    view_origin: [f32; 3],
    element_count: u32,
    padded_count: u32,
    _pad: [u32; 3],
}

/// 双调排序单步参数（对应 WGSL `SortStepParams`）
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct SortStepParams {
    k: u32,
    j: u32,
    padded_count: u32,
    _pad: u32,
}

/// 双调排序步序列：(k, j) 对
fn bitonic_steps(padded: u32) -> Vec<(u32, u32)> {
    let mut steps = Vec::new();
    let mut k = 2u32;
    while k <= padded {
        let mut j = k >> 1;
        while j > 0 {
            steps.push((k, j));
            j >>= 1;
        }
        k <<= 1;
    }
    steps
}

struct SortPipeline {
    keygen_pipeline: wgpu::ComputePipeline,
    step_pipeline: wgpu::ComputePipeline,
    keygen_bind_group_layout: wgpu::BindGroupLayout,
    step_bind_group_layout: wgpu::BindGroupLayout,
}

impl SortPipeline {
    fn new(device: &wgpu::Device) -> Self {
        let keygen_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("FX Sort KeyGen BGL"),
                entries: &[
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
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
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
                ],
            });

        let step_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("FX Sort Step BGL"),
                entries: &[
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
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
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
                ],
            });

        let keygen_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("FX Sort KeyGen Shader"),
            source: wgpu::ShaderSource::Wgsl(SORT_KEYGEN_SHADER.into()),
        });
        let step_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("FX Sort Step Shader"),
            source: wgpu::ShaderSource::Wgsl(SORT_STEP_SHADER.into()),
        });

        let keygen_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("FX Sort KeyGen Pipeline Layout"),
            bind_group_layouts: &[&keygen_bind_group_layout],
            push_constant_ranges: &[],
        });
        let step_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("FX Sort Step Pipeline Layout"),
            bind_group_layouts: &[&step_bind_group_layout],
            push_constant_ranges: &[],
        });

        let keygen_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("FX Sort KeyGen Pipeline"),
            layout: Some(&keygen_layout),
            module: &keygen_shader,
            entry_point: "keygen_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });
        let step_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("FX Sort Step Pipeline"),
            layout: Some(&step_layout),
            module: &step_shader,
            entry_point: "sort_step_main",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        });

        Self {
            keygen_pipeline,
            step_pipeline,
            keygen_bind_group_layout,
            step_bind_group_layout,
        }
    }

    /// 对一个批次编码排序调度
    fn sort_batch(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        resources: &crate::render::fx::device::FxDeviceContext,
        batch: &SortBatch,
    ) {
        for request in &batch.requests {
            let Some(res) = resources.sprite_resources(request.resource) else {
                log::trace!(
                    "sort request for missing resource {} skipped",
                    request.resource.0
                );
                continue;
            };
            let (Some(key_buffer), Some(index_buffer)) =
                (res.sort_key_buffer.as_ref(), res.sort_index_buffer.as_ref())
            else {
                log::trace!(
                    "resource {} has no sort buffers; request skipped",
                    request.resource.0
                );
                continue;
            };

            let element_count = request.element_count.min(res.capacity);
            let padded = res.sort_capacity;

            if batch.key_format == SortKeyFormat::KeyF32Depth {
                let params = KeyGenParams {
                    view_origin: request.view_origin,
                    element_count,
                    padded_count: padded,
                    _pad: [0; 3],
                };
                let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("FX Sort KeyGen Params"),
                    contents: bytemuck::bytes_of(&params),
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("FX Sort KeyGen BG"),
                    layout: &self.keygen_bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: &params_buffer,
                                offset: 0,
                                size: std::num::NonZeroU64::new(
                                    std::mem::size_of::<KeyGenParams>() as u64,
                                ),
                            }),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: res.particle_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: key_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: index_buffer.as_entire_binding(),
                        },
                    ],
                });
                let workgroups = (padded + SORT_WORKGROUP_SIZE - 1) / SORT_WORKGROUP_SIZE;
                let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("FX Sort KeyGen Pass"),
                    timestamp_writes: None,
                });
                cpass.set_pipeline(&self.keygen_pipeline);
                cpass.set_bind_group(0, &bind_group, &[0]);
                cpass.dispatch_workgroups(workgroups, 1, 1);
                drop(cpass);
            }

            self.encode_steps(device, encoder, key_buffer, index_buffer, padded);
        }
    }

    /// 编码完整的双调排序步序列
    ///
    /// 每次调用使用独立的瞬态参数缓冲区，避免同一次提交内的写覆盖。
    fn encode_steps(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        key_buffer: &wgpu::Buffer,
        index_buffer: &wgpu::Buffer,
        padded: u32,
    ) {
        let steps = bitonic_steps(padded);
        if steps.is_empty() {
            return;
        }

        let mut bytes = vec![0u8; steps.len() * PARAMS_ALIGN as usize];
        for (i, (k, j)) in steps.iter().enumerate() {
            let params = SortStepParams {
                k: *k,
                j: *j,
                padded_count: padded,
                _pad: 0,
            };
            let offset = i * PARAMS_ALIGN as usize;
            bytes[offset..offset + std::mem::size_of::<SortStepParams>()]
                .copy_from_slice(bytemuck::bytes_of(&params));
        }
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("FX Sort Step Params"),
            contents: &bytes,
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("FX Sort Step BG"),
            layout: &self.step_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &params_buffer,
                        offset: 0,
                        size: std::num::NonZeroU64::new(
                            std::mem::size_of::<SortStepParams>() as u64
                        ),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: key_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: index_buffer.as_entire_binding(),
                },
            ],
        });

        let workgroups = (padded + SORT_WORKGROUP_SIZE - 1) / SORT_WORKGROUP_SIZE;
        for (i, _) in steps.iter().enumerate() {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("FX Sort Step Pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.step_pipeline);
            cpass.set_bind_group(0, &bind_group, &[(i as u32) * PARAMS_ALIGN as u32]);
            cpass.dispatch_workgroups(workgroups, 1, 1);
        }
    }
}

/// 深度键生成着色器
const SORT_KEYGEN_SHADER: &str = r#"
struct KeyGenParams {
    view_origin: vec3<f32>,
    element_count: u32,
    padded_count: u32,
};

struct Particle {
    position: vec3<f32>,
    age: f32,
    velocity: vec3<f32>,
    lifetime: f32,
    misc: vec4<f32>,
};

@group(0) @binding(0) var<uniform> params: KeyGenParams;
@group(0) @binding(1) var<storage, read> particles: array<Particle>;
@group(0) @binding(2) var<storage, read_write> keys: array<u32>;
@group(0) @binding(3) var<storage, read_write> indices: array<u32>;

@compute @workgroup_size(256)
fn keygen_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.padded_count) {
        return;
    }
    indices[i] = i;
    // 填充槽与死亡粒子排到末尾
    if (i >= params.element_count) {
        keys[i] = 0xffffffffu;
        return;
    }
    let p = particles[i];
    if (p.misc.w < 0.5) {
        keys[i] = 0xfffffffeu;
        return;
    }
    // 距离非负，IEEE 位型单调；取反使远距离获得小键（由远及近绘制）
    let bits = bitcast<u32>(distance(p.position, params.view_origin));
    keys[i] = min(~bits, 0xfffffffdu);
}
"#;

/// 双调排序单步着色器
const SORT_STEP_SHADER: &str = r#"
struct SortStepParams {
    k: u32,
    j: u32,
    padded_count: u32,
    pad: u32,
};

@group(0) @binding(0) var<uniform> params: SortStepParams;
@group(0) @binding(1) var<storage, read_write> keys: array<u32>;
@group(0) @binding(2) var<storage, read_write> indices: array<u32>;

@compute @workgroup_size(256)
fn sort_step_main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if (i >= params.padded_count) {
        return;
    }
    let partner = i ^ params.j;
    if (partner <= i) {
        return;
    }
    let ascending = (i & params.k) == 0u;
    let a = keys[i];
    let b = keys[partner];
    if ((a > b) == ascending) {
        keys[i] = b;
        keys[partner] = a;
        let tmp = indices[i];
        indices[i] = indices[partner];
        indices[partner] = tmp;
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::fx::device::FxDeviceContext;

    fn request(point: SortResolutionPoint, format: SortKeyFormat) -> SortRequest {
        SortRequest {
            resource: ResourceId(1),
            element_count: 128,
            key_format: format,
            point,
            view_origin: [0.0; 3],
        }
    }

    #[test]
    fn test_partition_groups_by_key_format() {
        let requests = vec![
            request(SortResolutionPoint::PreRender, SortKeyFormat::KeyF32Depth),
            request(SortResolutionPoint::PreRender, SortKeyFormat::KeyU32),
            request(SortResolutionPoint::PreRender, SortKeyFormat::KeyF32Depth),
        ];
        let batches = GpuSortManager::partition(requests);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].key_format, SortKeyFormat::KeyF32Depth);
        assert_eq!(batches[0].requests.len(), 2);
        assert_eq!(batches[1].requests.len(), 1);
    }

    #[test]
    fn test_resolution_point_clears_pending() {
        let manager = GpuSortManager::new();
        let config = FxConfig::default();
        let (_queue, mut ctx) = FxDeviceContext::new();

        manager.add_request(
            &config,
            request(SortResolutionPoint::PreRender, SortKeyFormat::KeyF32Depth),
        );
        assert_eq!(manager.pending_count(SortResolutionPoint::PreRender), 1);

        let mut frame = FxFrameContext {
            resources: &mut ctx,
            gpu: None,
        };
        manager.resolve(&config, SortResolutionPoint::PreRender, &mut frame);
        assert_eq!(manager.pending_count(SortResolutionPoint::PreRender), 0);
        assert_eq!(manager.stats().resolved_requests, 1);
    }

    #[test]
    fn test_request_after_resolution_defers_to_next_occurrence() {
        let manager = GpuSortManager::new();
        let config = FxConfig::default();
        let (_queue, mut ctx) = FxDeviceContext::new();

        let mut frame = FxFrameContext {
            resources: &mut ctx,
            gpu: None,
        };
        // 解析点已触发，之后提交的请求顺延
        manager.resolve(&config, SortResolutionPoint::PreRender, &mut frame);
        manager.add_request(
            &config,
            request(SortResolutionPoint::PreRender, SortKeyFormat::KeyU32),
        );
        assert_eq!(manager.pending_count(SortResolutionPoint::PreRender), 1);

        // 另一个解析点不消费它
        manager.resolve(&config, SortResolutionPoint::PostRenderOpaque, &mut frame);
        assert_eq!(manager.pending_count(SortResolutionPoint::PreRender), 1);

        // 下一次同一解析点消费它
        manager.resolve(&config, SortResolutionPoint::PreRender, &mut frame);
        assert_eq!(manager.pending_count(SortResolutionPoint::PreRender), 0);
    }

    #[test]
    fn test_disabled_sorting_discards_requests() {
        let manager = GpuSortManager::new();
        let config = FxConfig {
            allow_gpu_sorting: false,
            ..Default::default()
        };
        manager.add_request(
            &config,
            request(SortResolutionPoint::PreRender, SortKeyFormat::KeyF32Depth),
        );
        assert_eq!(manager.pending_count(SortResolutionPoint::PreRender), 0);
        assert_eq!(manager.stats().discarded_requests, 1);
    }

    #[test]
    fn test_bitonic_steps_cover_all_passes() {
        // n=8: k=2(j=1), k=4(j=2,1), k=8(j=4,2,1) -> 6 步
        let steps = bitonic_steps(8);
        assert_eq!(steps.len(), 6);
        assert_eq!(steps.first(), Some(&(2, 1)));
        assert_eq!(steps.last(), Some(&(8, 1)));
    }

    #[test]
    fn test_bitonic_steps_trivial_buffer() {
        assert!(bitonic_steps(1).is_empty());
    }
}
