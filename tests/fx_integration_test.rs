use std::sync::Arc;

use bevy_ecs::entity::Entity;
use glam::Vec3;

use fx_system::config::FxConfig;
use fx_system::render::capability::{
    runtime_supports_gpu_particles, supports_gpu_particles, DeviceCapabilities, FeatureLevel,
    ShaderPlatform, TargetPlatform,
};
use fx_system::render::fx::{
    begin_create_gpu_sprite_resources, begin_release_gpu_sprite_resources,
    begin_update_gpu_sprite_resources, register_custom_fx_system, unregister_custom_fx_system,
    AppliedOpKind, FxDeviceContext, FxFrameContext, FxSystemDesc, FxSystemHandle,
    FxSystemInterface, GpuFxSystem, GpuSortManager, GpuSpriteEmitterInfo, GpuSpriteResourceData,
    NullFxSystem, SortKeyFormat, SortMode, SortRequest, SortResolutionPoint, VectorFieldComponent,
    ViewUniforms,
};

fn make_desc() -> (FxSystemDesc, FxDeviceContext) {
    let (command_queue, ctx) = FxDeviceContext::new();
    (
        FxSystemDesc {
            feature_level: FeatureLevel::Full,
            platform: ShaderPlatform {
                feature_level: FeatureLevel::Full,
                platform: TargetPlatform::Linux,
            },
            capabilities: DeviceCapabilities::assume_full(),
            custom: None,
            command_queue,
            sort_manager: Arc::new(GpuSortManager::new()),
        },
        ctx,
    )
}

#[test]
fn test_resource_lifecycle_application_order() {
    // create -> update*N -> release 的设备端应用顺序等于提交顺序
    let (queue, mut ctx) = FxDeviceContext::new();
    let handle = begin_create_gpu_sprite_resources(&queue, GpuSpriteResourceData::default());
    let id = handle.id();
    for _ in 0..3 {
        begin_update_gpu_sprite_resources(&queue, &handle, GpuSpriteResourceData::default());
    }
    begin_release_gpu_sprite_resources(&queue, handle);

    ctx.process_commands_headless();
    let kinds: Vec<_> = ctx
        .frame_ops()
        .iter()
        .filter(|op| op.resource == id)
        .map(|op| op.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            AppliedOpKind::Create,
            AppliedOpKind::Update,
            AppliedOpKind::Update,
            AppliedOpKind::Update,
            AppliedOpKind::Release,
        ]
    );
    // 释放完成后不再有任何设备端访问路径
    assert!(ctx.entry(id).is_none());
    assert_eq!(ctx.live_resource_count(), 0);
}

#[test]
fn test_runtime_gate_short_circuits_on_global_switch() {
    let disabled = FxConfig {
        allow_gpu_particles: false,
        ..Default::default()
    };
    // 其余能力全满也不放行
    assert!(!runtime_supports_gpu_particles(
        &disabled,
        &DeviceCapabilities::assume_full()
    ));
}

#[test]
fn test_pending_kill_is_monotonic() {
    let (desc, _ctx) = make_desc();
    let mut system = GpuFxSystem::new(&desc);
    assert!(!system.is_pending_kill());
    system.on_destroy();
    assert!(system.is_pending_kill());
    // pending-kill 之后 tick 与管线通知必须是无操作
    system.tick(0.016);
    assert!(system.is_pending_kill());
    assert_eq!(system.pending_spawn_total(), 0);
}

#[test]
fn test_sort_requests_never_dropped_across_resolution_points() {
    let manager = GpuSortManager::new();
    let config = FxConfig::default();
    let (_queue, mut ctx) = FxDeviceContext::new();
    let request = |point| SortRequest {
        resource: fx_system::render::fx::ResourceId(9),
        element_count: 64,
        key_format: SortKeyFormat::KeyF32Depth,
        point,
        view_origin: [0.0; 3],
    };

    // 解析点触发前提交的请求进入本次批次
    manager.add_request(&config, request(SortResolutionPoint::PreRender));
    let mut frame = FxFrameContext {
        resources: &mut ctx,
        gpu: None,
    };
    manager.on_pre_render(&mut frame);
    assert_eq!(manager.pending_count(SortResolutionPoint::PreRender), 0);
    assert_eq!(manager.stats().resolved_requests, 1);

    // 触发之后提交的请求顺延到下一次同一解析点，而不是被丢弃
    manager.add_request(&config, request(SortResolutionPoint::PreRender));
    manager.on_post_render_opaque(&mut frame);
    assert_eq!(manager.pending_count(SortResolutionPoint::PreRender), 1);
    manager.on_pre_render(&mut frame);
    assert_eq!(manager.pending_count(SortResolutionPoint::PreRender), 0);
    assert_eq!(manager.stats().resolved_requests, 2);
}

#[test]
fn test_custom_registry_selects_factory_then_falls_back() {
    let name = "integration-test-custom";
    register_custom_fx_system(
        name,
        Arc::new(|_desc| -> Box<dyn FxSystemInterface> { Box::new(NullFxSystem::new()) }),
    );

    let (mut desc, _ctx) = make_desc();
    desc.custom = Some(name.to_string());
    let handle = FxSystemHandle::create(&desc);
    // 自定义工厂构造的是无排序实现
    assert!(handle.system().gpu_sort_manager().is_none());
    FxSystemHandle::destroy(handle);

    unregister_custom_fx_system(name);
    let handle = FxSystemHandle::create(&desc);
    // 注销后回退到内建 GPU 实现
    assert!(handle.system().gpu_sort_manager().is_some());
    FxSystemHandle::destroy(handle);
}

#[test]
fn test_desktop_override_and_runtime_gate_disagree() {
    // 桌面平台短路了特性级别门槛
    let desktop = ShaderPlatform {
        feature_level: FeatureLevel::DownlevelWebGl2,
        platform: TargetPlatform::Windows,
    };
    assert!(supports_gpu_particles(&desktop));

    // 运行时检查没有桌面短路：缺 3D 纹理支持仍拒绝
    let caps = DeviceCapabilities {
        texture_3d: false,
        ..DeviceCapabilities::assume_full()
    };
    assert!(!runtime_supports_gpu_particles(&FxConfig::default(), &caps));
}

#[test]
fn test_full_frame_leaves_sort_sets_empty() {
    let (desc, mut ctx) = make_desc();
    let sort_manager = desc.sort_manager.clone();
    let mut system = GpuFxSystem::new(&desc);

    // 不排序的发射器走完整帧流程
    let id = system
        .add_gpu_sprite_emitter(
            GpuSpriteEmitterInfo::new(1024).with_sort_mode(SortMode::None),
            Vec3::ZERO,
        )
        .unwrap();
    system.tick(0.016);
    ctx.advance_frame();
    ctx.process_commands_headless();

    let view = ViewUniforms::default();
    let mut frame = FxFrameContext {
        resources: &mut ctx,
        gpu: None,
    };
    system.pre_init_views(&mut frame, true);
    system.post_init_views(&mut frame, &view, true);
    sort_manager.on_pre_render(&mut frame);
    system.pre_render(&mut frame, None, true);
    system.post_render_opaque(&mut frame, &view, None, true);
    sort_manager.on_post_render_opaque(&mut frame);

    assert!(system.remove_gpu_sprite_emitter(id));
    assert_eq!(sort_manager.pending_count(SortResolutionPoint::PreRender), 0);
    assert_eq!(
        sort_manager.pending_count(SortResolutionPoint::PostRenderOpaque),
        0
    );
}

#[test]
fn test_vector_field_add_is_idempotent_remove_clears() {
    let (desc, _ctx) = make_desc();
    let mut system = GpuFxSystem::new(&desc);
    let entity = Entity::from_raw(42);
    let component = VectorFieldComponent::default();

    system.add_vector_field(entity, &component);
    system.add_vector_field(entity, &component);
    assert_eq!(system.vector_field_count(), 1);

    system.remove_vector_field(entity);
    assert_eq!(system.vector_field_count(), 0);

    // 未注册组件的移除/更新是无操作
    system.remove_vector_field(entity);
    system.update_vector_field(entity, &component);
    assert_eq!(system.vector_field_count(), 0);
}

#[test]
fn test_sorting_emitter_submits_requests_each_frame() {
    let (desc, mut ctx) = make_desc();
    let sort_manager = desc.sort_manager.clone();
    let mut system = GpuFxSystem::new(&desc);
    system.add_gpu_sprite_emitter(
        GpuSpriteEmitterInfo::new(2048).with_sort_mode(SortMode::ViewDepth),
        Vec3::ZERO,
    );
    ctx.process_commands_headless();

    let mut frame = FxFrameContext {
        resources: &mut ctx,
        gpu: None,
    };
    system.post_init_views(&mut frame, &ViewUniforms::default(), true);
    assert_eq!(sort_manager.pending_count(SortResolutionPoint::PreRender), 1);
    sort_manager.on_pre_render(&mut frame);
    assert_eq!(sort_manager.pending_count(SortResolutionPoint::PreRender), 0);
}

#[test]
fn test_deferred_release_waits_frames_in_flight() {
    use fx_system::render::fx::FRAMES_IN_FLIGHT;
    let (queue, mut ctx) = FxDeviceContext::new();
    let handle = begin_create_gpu_sprite_resources(&queue, GpuSpriteResourceData::default());
    begin_release_gpu_sprite_resources(&queue, handle);
    ctx.process_commands_headless();
    assert_eq!(ctx.deferred_count(), 1);

    // 在途帧数耗尽前不回收
    for _ in 0..FRAMES_IN_FLIGHT - 1 {
        ctx.advance_frame();
        assert_eq!(ctx.deferred_count(), 1);
    }
    ctx.advance_frame();
    assert_eq!(ctx.deferred_count(), 0);
}

#[test]
fn test_destroy_flows_emitter_release_through_device_context() {
    let (desc, mut ctx) = make_desc();
    let mut system = GpuFxSystem::new(&desc);
    system.add_gpu_sprite_emitter(GpuSpriteEmitterInfo::new(256), Vec3::ZERO);
    system.add_gpu_sprite_emitter(GpuSpriteEmitterInfo::new(256), Vec3::ONE);
    ctx.process_commands_headless();
    assert_eq!(ctx.live_resource_count(), 2);

    system.on_destroy();
    system.destroy_gpu_simulation();
    ctx.process_commands_headless();
    assert_eq!(ctx.live_resource_count(), 0);
    assert_eq!(ctx.deferred_count(), 2);
}
