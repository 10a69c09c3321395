//! 自定义特效系统注册表
//!
//! 进程级的名称到工厂函数映射，允许同一个创建入口按名字实例化不同的
//! 特效系统实现。注册通常发生在启动阶段，查找发生在
//! [`super::system::FxSystemHandle::create`]；两者之间用读写锁互斥。
//! 同名重复注册后写的生效；注销不存在的名字是无操作。

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::render::fx::system::{FxSystemDesc, FxSystemInterface};

/// 自定义特效系统工厂
pub type CustomFxFactory =
    Arc<dyn Fn(&FxSystemDesc) -> Box<dyn FxSystemInterface> + Send + Sync>;

static CUSTOM_FX_FACTORIES: OnceLock<RwLock<HashMap<String, CustomFxFactory>>> = OnceLock::new();

fn factories() -> &'static RwLock<HashMap<String, CustomFxFactory>> {
    CUSTOM_FX_FACTORIES.get_or_init(|| RwLock::new(HashMap::new()))
}

/// 注册自定义特效系统实现
///
/// 同名再次注册时覆盖旧工厂。静态初始化等早期阶段即可安全调用。
pub fn register_custom_fx_system(name: &str, factory: CustomFxFactory) {
    let mut guard = match factories().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if guard.insert(name.to_string(), factory).is_some() {
        log::debug!("custom FX system '{name}' re-registered; previous factory replaced");
    }
}

/// 注销自定义特效系统实现；名字不存在时无操作
pub fn unregister_custom_fx_system(name: &str) {
    let mut guard = match factories().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.remove(name);
}

/// 查找并调用注册的工厂
pub(crate) fn create_custom_fx_system(
    name: &str,
    desc: &FxSystemDesc,
) -> Option<Box<dyn FxSystemInterface>> {
    let factory = {
        let guard = match factories().read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.get(name).cloned()
    };
    factory.map(|f| f(desc))
}

/// 指定名字是否已注册
pub fn custom_fx_system_registered(name: &str) -> bool {
    let guard = match factories().read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 注册表是进程级共享的，测试各用独立名字避免相互干扰

    #[test]
    fn test_unregister_absent_is_noop() {
        unregister_custom_fx_system("registry-test-absent");
        assert!(!custom_fx_system_registered("registry-test-absent"));
    }

    #[test]
    fn test_register_unregister_roundtrip() {
        let name = "registry-test-roundtrip";
        register_custom_fx_system(
            name,
            Arc::new(|_desc| -> Box<dyn FxSystemInterface> {
                Box::new(crate::render::fx::system::NullFxSystem::new())
            }),
        );
        assert!(custom_fx_system_registered(name));
        unregister_custom_fx_system(name);
        assert!(!custom_fx_system_registered(name));
    }
}
