//! 控制上下文与设备上下文的资源通道
//!
//! 两个执行上下文被显式建模：
//!
//! - **控制上下文**：任意线程。持有 [`FxCommandQueue`]，通过
//!   [`begin_create_gpu_sprite_resources`] / [`begin_update_gpu_sprite_resources`] /
//!   [`begin_release_gpu_sprite_resources`] 入队资源操作后立即返回。
//! - **设备上下文**：唯一允许创建/修改/释放设备缓冲区的上下文。持有
//!   [`FxDeviceContext`]，每帧按提交顺序排空命令队列。
//!
//! 顺序保证：同一资源的 create -> update -> release 按入队顺序应用；
//! 不同资源之间不保证顺序。入队后的操作不可取消——紧随 create 之后的
//! release 意味着设备上下文先完整执行初始化再进入释放流程，避免与
//! 半初始化的缓冲区竞争。
//!
//! 释放是延迟的：release 应用后资源移入延迟释放队列，等待
//! [`FRAMES_IN_FLIGHT`] 帧后才真正回收缓冲区，确保没有在途渲染命令
//! 仍引用它。帧驱动方约定：每帧先调用 [`FxDeviceContext::advance_frame`]
//! 和 [`FxDeviceContext::process_commands`]，再发出管线通知。

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::FxConfig;
use crate::render::fx::emitter::GpuSpriteResourceData;
use crate::render::fx::resources::{GpuSpriteResources, TileAllocation};

/// 在途帧数：释放后资源保留的帧数
pub const FRAMES_IN_FLIGHT: u64 = 3;

// ============================================================================
// 标识与句柄
// ============================================================================

/// 资源集合标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

/// GPU 精灵资源的控制端句柄
///
/// 不可克隆：唯一所有权即释放纪律。[`begin_release_gpu_sprite_resources`]
/// 消耗句柄，调用返回后控制端不再有任何途径触达该资源。
#[derive(Debug)]
pub struct GpuSpriteResourceHandle {
    id: ResourceId,
}

impl GpuSpriteResourceHandle {
    /// 资源标识（用于排序请求等只读引用场景）
    pub fn id(&self) -> ResourceId {
        self.id
    }

    fn into_id(self) -> ResourceId {
        let id = self.id;
        std::mem::forget(self);
        id
    }
}

impl Drop for GpuSpriteResourceHandle {
    fn drop(&mut self) {
        log::warn!(
            "GPU sprite resource handle {} dropped without BeginRelease; device-side entry leaks until teardown",
            self.id.0
        );
        debug_assert!(false, "resource handle must be released via BeginRelease");
    }
}

// ============================================================================
// 命令队列（控制端）
// ============================================================================

#[derive(Debug)]
enum FxDeviceCommand {
    Create {
        id: ResourceId,
        data: GpuSpriteResourceData,
    },
    Update {
        id: ResourceId,
        data: GpuSpriteResourceData,
    },
    Release {
        id: ResourceId,
    },
}

/// 控制上下文持有的命令队列发送端
#[derive(Clone)]
pub struct FxCommandQueue {
    sender: Sender<FxDeviceCommand>,
    next_id: Arc<AtomicU64>,
}

impl FxCommandQueue {
    fn enqueue(&self, command: FxDeviceCommand) {
        if self.sender.send(command).is_err() {
            // 设备上下文已销毁（无头退出路径）：未实体化的资源无需释放
            log::warn!("FX device context gone; resource command dropped");
        }
    }
}

/// 分配资源集合并开始异步的设备端初始化
///
/// 立即返回；初始化在设备上下文下一次排空命令时完成。传入的数据快照
/// 已被拷贝，调用方副本可立即复用。
pub fn begin_create_gpu_sprite_resources(
    queue: &FxCommandQueue,
    data: GpuSpriteResourceData,
) -> GpuSpriteResourceHandle {
    let id = ResourceId(queue.next_id.fetch_add(1, Ordering::Relaxed));
    queue.enqueue(FxDeviceCommand::Create { id, data });
    GpuSpriteResourceHandle { id }
}

/// 更新 GPU 精灵资源
///
/// 同一句柄上晚于 create 入队，设备端保证在 create 之后应用。
pub fn begin_update_gpu_sprite_resources(
    queue: &FxCommandQueue,
    handle: &GpuSpriteResourceHandle,
    data: GpuSpriteResourceData,
) {
    queue.enqueue(FxDeviceCommand::Update {
        id: handle.id,
        data,
    });
}

/// 开始释放 GPU 精灵资源
///
/// 消耗句柄；返回后句柄对调用方立即失效，所有权转入延迟释放队列。
/// 物理回收发生在设备上下文确认没有在途命令引用它之后。
pub fn begin_release_gpu_sprite_resources(
    queue: &FxCommandQueue,
    handle: GpuSpriteResourceHandle,
) {
    let id = handle.into_id();
    queue.enqueue(FxDeviceCommand::Release { id });
}

// ============================================================================
// 资源表（设备端）
// ============================================================================

/// 已应用操作的类别（逐帧诊断）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedOpKind {
    Create,
    Update,
    Release,
    /// 非法操作被拒绝（如对已释放资源的更新）
    Rejected,
}

/// 逐帧诊断记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedOp {
    pub resource: ResourceId,
    pub kind: AppliedOpKind,
}

/// 设备端资源条目
pub struct ResourceEntry {
    /// 最近一次应用的数据快照
    pub data: GpuSpriteResourceData,
    /// 已应用的更新代数
    pub generation: u32,
    /// 分配失败后的惰性标记：停止模拟，保持可安全释放
    pub inert: bool,
    /// 实体化的设备缓冲区（无头排空时为 None）
    pub resources: Option<GpuSpriteResources>,
}

struct DeferredRelease {
    id: ResourceId,
    resources: Option<GpuSpriteResources>,
    retire_frame: u64,
}

/// 设备上下文：命令接收端 + 资源表 + 延迟释放队列
pub struct FxDeviceContext {
    receiver: Receiver<FxDeviceCommand>,
    entries: HashMap<ResourceId, ResourceEntry>,
    deferred: VecDeque<DeferredRelease>,
    frame_index: u64,
    frame_ops: Vec<AppliedOp>,
}

impl FxDeviceContext {
    /// 创建一对命令队列/设备上下文
    pub fn new() -> (FxCommandQueue, FxDeviceContext) {
        let (sender, receiver) = unbounded();
        (
            FxCommandQueue {
                sender,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            FxDeviceContext {
                receiver,
                entries: HashMap::new(),
                deferred: VecDeque::new(),
                frame_index: 0,
                frame_ops: Vec::new(),
            },
        )
    }

    /// 推进帧号并回收到期的延迟释放资源
    pub fn advance_frame(&mut self) {
        self.frame_index += 1;
        while let Some(front) = self.deferred.front() {
            if front.retire_frame + FRAMES_IN_FLIGHT <= self.frame_index {
                let released = self.deferred.pop_front().expect("front checked above");
                log::trace!("FX sprite resource {} reclaimed", released.id.0);
                drop(released.resources);
            } else {
                break;
            }
        }
    }

    /// 排空命令队列并在设备上实体化资源
    pub fn process_commands(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> usize {
        let config = FxConfig::snapshot();
        self.drain(&config, Some((device, queue)))
    }

    /// 无设备排空（无头模式、设备丢失后的收尾）
    ///
    /// 只执行簿记状态机，不创建缓冲区。
    pub fn process_commands_headless(&mut self) -> usize {
        let config = FxConfig::snapshot();
        self.drain(&config, None)
    }

    fn drain(
        &mut self,
        config: &FxConfig,
        gpu: Option<(&wgpu::Device, &wgpu::Queue)>,
    ) -> usize {
        self.frame_ops.clear();
        let mut applied = 0;
        while let Ok(command) = self.receiver.try_recv() {
            self.apply(config, gpu, command);
            applied += 1;
        }
        applied
    }

    fn apply(
        &mut self,
        config: &FxConfig,
        gpu: Option<(&wgpu::Device, &wgpu::Queue)>,
        command: FxDeviceCommand,
    ) {
        match command {
            FxDeviceCommand::Create { id, data } => {
                if self.entries.contains_key(&id) {
                    log::warn!("duplicate create for FX sprite resource {}", id.0);
                    self.record(id, AppliedOpKind::Rejected);
                    return;
                }
                let (resources, inert) = Self::realize(config, gpu, &data, id);
                self.entries.insert(
                    id,
                    ResourceEntry {
                        data,
                        generation: 0,
                        inert,
                        resources,
                    },
                );
                self.record(id, AppliedOpKind::Create);
            }
            FxDeviceCommand::Update { id, data } => {
                let Some(entry) = self.entries.get_mut(&id) else {
                    log::warn!("update for unknown/released FX sprite resource {}", id.0);
                    self.record(id, AppliedOpKind::Rejected);
                    return;
                };
                entry.generation += 1;
                if entry.inert {
                    // 惰性发射器只记录簿记，不再触碰设备
                    entry.data = data;
                    self.record(id, AppliedOpKind::Update);
                    return;
                }
                let needs_realloc = entry
                    .resources
                    .as_ref()
                    .map(|res| res.requires_reallocation(&data))
                    .unwrap_or(false);
                if needs_realloc {
                    // 旧缓冲区可能仍被在途命令引用，移入延迟释放队列
                    let old = entry.resources.take();
                    self.deferred.push_back(DeferredRelease {
                        id,
                        resources: old,
                        retire_frame: self.frame_index,
                    });
                    let (resources, inert) = Self::realize(config, gpu, &data, id);
                    let entry = self.entries.get_mut(&id).expect("entry checked above");
                    entry.resources = resources;
                    entry.inert = inert;
                    entry.data = data;
                } else {
                    if let (Some(res), Some((_, queue))) = (entry.resources.as_ref(), gpu) {
                        res.update(queue, &data);
                    }
                    entry.data = data;
                }
                self.record(id, AppliedOpKind::Update);
            }
            FxDeviceCommand::Release { id } => {
                let Some(entry) = self.entries.remove(&id) else {
                    log::warn!("release for unknown FX sprite resource {}", id.0);
                    self.record(id, AppliedOpKind::Rejected);
                    return;
                };
                self.deferred.push_back(DeferredRelease {
                    id,
                    resources: entry.resources,
                    retire_frame: self.frame_index,
                });
                self.record(id, AppliedOpKind::Release);
            }
        }
    }

    fn realize(
        config: &FxConfig,
        gpu: Option<(&wgpu::Device, &wgpu::Queue)>,
        data: &GpuSpriteResourceData,
        id: ResourceId,
    ) -> (Option<GpuSpriteResources>, bool) {
        // 无设备时也验证 tile 配额，使惰性判定与实体化路径一致
        if let Err(err) = TileAllocation::for_particles(data.max_particles, config) {
            log::warn!(
                "FX sprite resource {} allocation failed: {err}; emitter marked inert",
                id.0
            );
            return (None, true);
        }
        let Some((device, queue)) = gpu else {
            return (None, false);
        };
        match GpuSpriteResources::new(device, config, data) {
            Ok(resources) => {
                resources.initialize(queue, data);
                (Some(resources), false)
            }
            Err(err) => {
                log::warn!(
                    "FX sprite resource {} allocation failed: {err}; emitter marked inert",
                    id.0
                );
                (None, true)
            }
        }
    }

    fn record(&mut self, resource: ResourceId, kind: AppliedOpKind) {
        self.frame_ops.push(AppliedOp { resource, kind });
    }

    /// 本次排空应用的操作序列（诊断）
    pub fn frame_ops(&self) -> &[AppliedOp] {
        &self.frame_ops
    }

    /// 查询资源条目
    pub fn entry(&self, id: ResourceId) -> Option<&ResourceEntry> {
        self.entries.get(&id)
    }

    /// 查询实体化的设备资源
    pub fn sprite_resources(&self, id: ResourceId) -> Option<&GpuSpriteResources> {
        self.entries.get(&id).and_then(|e| e.resources.as_ref())
    }

    /// 资源是否处于惰性状态
    pub fn is_inert(&self, id: ResourceId) -> bool {
        self.entries.get(&id).map(|e| e.inert).unwrap_or(false)
    }

    /// 存活资源数
    pub fn live_resource_count(&self) -> usize {
        self.entries.len()
    }

    /// 等待回收的资源数
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// 当前帧号
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

// ============================================================================
// 帧上下文
// ============================================================================

/// 一帧内可用的设备句柄
pub struct FrameGpu<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
}

/// 传入管线通知的帧上下文
///
/// `gpu` 为 `None` 时各阶段只做簿记（无头模式），不会触碰设备。
pub struct FxFrameContext<'a> {
    pub resources: &'a mut FxDeviceContext,
    pub gpu: Option<FrameGpu<'a>>,
}
