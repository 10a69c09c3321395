pub mod capability;
pub mod fx;

// Re-export capability gate
pub use capability::{
    runtime_supports_gpu_particles, supports_gpu_particles, DeviceCapabilities, FeatureLevel,
    ShaderPlatform, TargetPlatform,
};

// Re-export FX System components
pub use fx::{
    DebugCanvas, FxCommandQueue, FxDeviceContext, FxFrameContext, FxSystemDesc, FxSystemHandle,
    FxSystemInterface, GpuFxSystem, GpuSortManager, GpuSpriteEmitterInfo, NullFxSystem,
    VectorFieldComponent,
};
