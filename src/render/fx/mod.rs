//! GPU 常驻粒子特效系统
//!
//! 粒子状态（位置、速度、年龄）常驻显存并完全在 GPU 上更新，
//! 与多阶段帧渲染管线同步。
//!
//! ## 架构设计
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      FX System                           │
//! ├─────────────────────────────────────────────────────────┤
//! │  控制上下文                    设备上下文                  │
//! │  Tick(dt)                                                │
//! │    生成计数 (双缓冲) ──┐                                   │
//! │  Begin* 资源操作 ──────┼──> 命令队列 ──> 资源表/延迟释放     │
//! │                       │                                  │
//! │                       └──> PreInitViews   (注入粒子)      │
//! │                            PostInitViews  (排序请求)      │
//! │                            PreRender      (积分模拟)      │
//! │                            PostRenderOpaque (深度碰撞)    │
//! │                                                          │
//! │  GpuSortManager: OnPreRender / OnPostRenderOpaque        │
//! │    两个解析点批量解析挂起的排序请求                          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 使用示例
//!
//! ```ignore
//! let (command_queue, mut device_ctx) = FxDeviceContext::new();
//! let desc = FxSystemDesc {
//!     feature_level: FeatureLevel::Full,
//!     platform: ShaderPlatform::current(FeatureLevel::Full),
//!     capabilities: DeviceCapabilities::from_adapter(&adapter),
//!     custom: None,
//!     command_queue,
//!     sort_manager: Arc::new(GpuSortManager::new()),
//! };
//! let mut fx = FxSystemHandle::create(&desc);
//!
//! // 每帧（帧驱动方）：
//! fx.system_mut().tick(dt);
//! device_ctx.advance_frame();
//! device_ctx.process_commands(&device, &queue);
//! let mut frame = FxFrameContext { resources: &mut device_ctx, gpu: Some(gpu) };
//! fx.system_mut().pre_init_views(&mut frame, true);
//! fx.system_mut().post_init_views(&mut frame, &view, true);
//! sort_manager.on_pre_render(&mut frame);
//! fx.system_mut().pre_render(&mut frame, None, true);
//! fx.system_mut().post_render_opaque(&mut frame, &view, scene.as_ref(), true);
//! sort_manager.on_post_render_opaque(&mut frame);
//!
//! // 退场：
//! FxSystemHandle::destroy(fx);
//! ```

pub mod debug;
pub mod device;
pub mod emitter;
pub mod registry;
pub mod resources;
pub mod simulation;
pub mod sort;
pub mod system;
pub mod vector_field;

pub use debug::{DebugCanvas, DebugLine};
pub use device::{
    begin_create_gpu_sprite_resources, begin_release_gpu_sprite_resources,
    begin_update_gpu_sprite_resources, AppliedOp, AppliedOpKind, FrameGpu, FxCommandQueue,
    FxDeviceContext, FxFrameContext, GpuSpriteResourceHandle, ResourceId, FRAMES_IN_FLIGHT,
};
pub use emitter::{
    CollisionMode, EmitterUniforms, GpuSpriteEmitterInfo, GpuSpriteParticle,
    GpuSpriteResourceData, ParticleAttributeLayout, SortMode,
};
pub use registry::{
    custom_fx_system_registered, register_custom_fx_system, unregister_custom_fx_system,
    CustomFxFactory,
};
pub use resources::{GpuSpriteResources, TileAllocation, PARTICLE_TILE_SIZE};
pub use simulation::{
    ParticleSimulationPipeline, SimulationStageUniforms, VectorFieldGpu, ViewUniforms,
    MAX_VECTOR_FIELDS,
};
pub use sort::{
    GpuSortManager, SortBatch, SortKeyFormat, SortRequest, SortResolutionPoint, SortStats,
};
pub use system::{
    EmitterId, FxSystemDesc, FxSystemHandle, FxSystemInterface, GlobalDistanceFieldData,
    GpuFxSystem, NullFxSystem, SceneTextureUniforms,
};
pub use vector_field::{VectorFieldComponent, VectorFieldRegistry};
