//! # FX System
//!
//! A GPU-resident particle effects system for wgpu-based renderers.
//!
//! ## Features
//!
//! - **GPU-Resident Simulation**: per-particle state lives and updates entirely on the device
//! - **Pipeline Synchronization**: five fixed per-frame hooks driven by the renderer
//! - **Two Execution Contexts**: control-side enqueue, device-side FIFO application with
//!   deferred, frames-in-flight-safe release
//! - **Shared Sort Coordinator**: batched depth sorts at two fixed resolution points
//! - **Custom System Registry**: name-keyed factory table for alternate implementations
//!
//! ## Architecture Design
//!
//! The frame driver (renderer, external) calls the effects system at five fixed points
//! per frame: `Tick` on the control context, then `PreInitViews` -> `PostInitViews` ->
//! `PreRender` -> `PostRenderOpaque` on the device context. Resource creation, update
//! and destruction originate on the control context and are marshaled to the device
//! context, the only context permitted to touch device buffers.
//!
//! ### Example
//!
//! ```ignore
//! use fx_system::render::fx::{FxDeviceContext, FxSystemDesc, FxSystemHandle, GpuSortManager};
//!
//! let (command_queue, mut device_ctx) = FxDeviceContext::new();
//! let mut fx = FxSystemHandle::create(&desc);
//! fx.system_mut().tick(0.016);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: error types and shared macros
//! - [`config`]: runtime tunables with a single designated mutation path
//! - [`render`]: capability gate and the effects system

/// Core functionality: error types and shared macros
pub mod core;
/// Configuration system
pub mod config;
/// Rendering-facing modules: capability gate and FX system
pub mod render;
