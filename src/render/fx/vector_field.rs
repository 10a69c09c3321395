//! 向量场绑定
//!
//! 外部力场以组件形式注册到特效系统实例。绑定按 `Entity` 去重：
//! 重复添加只刷新参数，移除/更新未注册的组件是无操作而非错误。

use bevy_ecs::prelude::*;
use glam::{Mat4, Vec3};
use std::collections::HashMap;

use crate::render::fx::simulation::{VectorFieldGpu, MAX_VECTOR_FIELDS};

/// 向量场组件
///
/// 场资产本身（3D 纹理数据）由资产层持有，这里只携带模拟需要的
/// 世界空间描述。
#[derive(Component, Clone, Debug)]
pub struct VectorFieldComponent {
    /// 强度
    pub intensity: f32,
    /// 衰减紧度
    pub tightness: f32,
    /// 局部空间包围盒最小点
    pub local_bounds_min: Vec3,
    /// 局部空间包围盒最大点
    pub local_bounds_max: Vec3,
    /// 局部到世界变换
    pub transform: Mat4,
}

impl Default for VectorFieldComponent {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            tightness: 1.0,
            local_bounds_min: Vec3::splat(-0.5),
            local_bounds_max: Vec3::splat(0.5),
            transform: Mat4::IDENTITY,
        }
    }
}

impl VectorFieldComponent {
    /// 折算为模拟 uniform 里的打包形式
    fn to_gpu(&self) -> VectorFieldGpu {
        let center_local = (self.local_bounds_min + self.local_bounds_max) * 0.5;
        let center = self.transform.transform_point3(center_local);
        let half_extents_local = (self.local_bounds_max - self.local_bounds_min) * 0.5;
        let half_extents = self.transform.transform_vector3(half_extents_local).abs();
        VectorFieldGpu {
            center: center.to_array(),
            intensity: self.intensity,
            half_extents: half_extents.to_array(),
            tightness: self.tightness,
        }
    }
}

/// 实例内的向量场绑定表
///
/// 保持注册顺序，保证每帧打包结果确定。
#[derive(Default)]
pub struct VectorFieldRegistry {
    bindings: HashMap<Entity, VectorFieldComponent>,
    order: Vec<Entity>,
}

impl VectorFieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加绑定；重复添加刷新参数（幂等）
    pub fn add(&mut self, entity: Entity, component: &VectorFieldComponent) {
        if self.bindings.insert(entity, component.clone()).is_none() {
            self.order.push(entity);
        }
    }

    /// 移除绑定；未注册时无操作
    pub fn remove(&mut self, entity: Entity) {
        if self.bindings.remove(&entity).is_some() {
            self.order.retain(|e| *e != entity);
        }
    }

    /// 更新已注册绑定的参数；未注册时无操作
    pub fn update(&mut self, entity: Entity, component: &VectorFieldComponent) {
        if let Some(existing) = self.bindings.get_mut(&entity) {
            *existing = component.clone();
        }
    }

    /// 绑定数量
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// 是否绑定了指定组件
    pub fn contains(&self, entity: Entity) -> bool {
        self.bindings.contains_key(&entity)
    }

    /// 清空全部绑定
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.order.clear();
    }

    /// 按注册顺序打包前 [`MAX_VECTOR_FIELDS`] 个绑定
    pub fn pack(&self) -> ([VectorFieldGpu; MAX_VECTOR_FIELDS], u32) {
        let mut packed = [VectorFieldGpu::default(); MAX_VECTOR_FIELDS];
        let mut count = 0;
        for entity in &self.order {
            if count >= MAX_VECTOR_FIELDS {
                break;
            }
            if let Some(component) = self.bindings.get(entity) {
                packed[count] = component.to_gpu();
                count += 1;
            }
        }
        (packed, count as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(index: u32) -> Entity {
        Entity::from_raw(index)
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut registry = VectorFieldRegistry::new();
        let component = VectorFieldComponent::default();
        registry.add(entity(1), &component);
        registry.add(entity(1), &component);
        assert_eq!(registry.len(), 1);

        // 单次移除即完全清除
        registry.remove(entity(1));
        assert_eq!(registry.len(), 0);
        assert!(!registry.contains(entity(1)));
    }

    #[test]
    fn test_remove_unregistered_is_noop() {
        let mut registry = VectorFieldRegistry::new();
        registry.remove(entity(7));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_unregistered_is_noop() {
        let mut registry = VectorFieldRegistry::new();
        registry.update(entity(7), &VectorFieldComponent::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_readd_refreshes_parameters() {
        let mut registry = VectorFieldRegistry::new();
        registry.add(entity(1), &VectorFieldComponent::default());
        let stronger = VectorFieldComponent {
            intensity: 5.0,
            ..Default::default()
        };
        registry.add(entity(1), &stronger);
        let (packed, count) = registry.pack();
        assert_eq!(count, 1);
        assert_eq!(packed[0].intensity, 5.0);
    }

    #[test]
    fn test_pack_caps_at_max_fields() {
        let mut registry = VectorFieldRegistry::new();
        for i in 0..(MAX_VECTOR_FIELDS as u32 + 3) {
            registry.add(entity(i), &VectorFieldComponent::default());
        }
        let (_, count) = registry.pack();
        assert_eq!(count, MAX_VECTOR_FIELDS as u32);
    }

    #[test]
    fn test_pack_transforms_bounds_to_world() {
        let mut registry = VectorFieldRegistry::new();
        let component = VectorFieldComponent {
            transform: Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)),
            ..Default::default()
        };
        registry.add(entity(1), &component);
        let (packed, _) = registry.pack();
        assert!((packed[0].center[0] - 10.0).abs() < 1e-5);
        assert!((packed[0].half_extents[0] - 0.5).abs() < 1e-5);
    }
}
