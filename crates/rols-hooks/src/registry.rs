use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::context::HookContext;
use crate::hook::Hook;

/// One plugin's implementation of one hook.
///
/// `Ok(None)` means "nothing to contribute". Implementations run on the blocking
/// thread pool, so they may do synchronous work such as reading files.
pub trait HookImpl: Send + Sync + 'static {
    fn call(&self, context: &HookContext) -> anyhow::Result<Option<Value>>;
}

impl<F> HookImpl for F
where
    F: Fn(&HookContext) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
{
    fn call(&self, context: &HookContext) -> anyhow::Result<Option<Value>> {
        self(context)
    }
}

/// A named bundle of hook implementations.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;

    fn register(&self, registry: &mut HookRegistry);
}

#[derive(Clone)]
pub struct Registration {
    plugin: Arc<str>,
    priority: i32,
    implementation: Arc<dyn HookImpl>,
}

impl Registration {
    #[must_use]
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    #[must_use]
    pub fn implementation(&self) -> Arc<dyn HookImpl> {
        Arc::clone(&self.implementation)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("plugin", &self.plugin)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Implementations per hook, highest priority first.
#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: FxHashMap<Hook, Vec<Registration>>,
    plugins: Vec<&'static str>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `implementation` for `hook`. It runs before every implementation with a
    /// lower priority and after those already registered with the same priority.
    pub fn register(
        &mut self,
        hook: Hook,
        plugin: &str,
        implementation: impl HookImpl,
        priority: i32,
    ) {
        let registrations = self.hooks.entry(hook).or_default();
        let index = registrations
            .iter()
            .position(|registration| registration.priority < priority)
            .unwrap_or(registrations.len());

        tracing::debug!("Registering {plugin} for {hook} at priority {priority}");
        registrations.insert(
            index,
            Registration {
                plugin: Arc::from(plugin),
                priority,
                implementation: Arc::new(implementation),
            },
        );
    }

    pub fn add_plugin(&mut self, plugin: &dyn Plugin) {
        if self.plugins.contains(&plugin.name()) {
            tracing::warn!("Plugin {} is already registered", plugin.name());
            return;
        }
        plugin.register(self);
        self.plugins.push(plugin.name());
    }

    #[must_use]
    pub fn registrations(&self, hook: Hook) -> &[Registration] {
        self.hooks.get(&hook).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn plugins(&self) -> &[&'static str] {
        &self.plugins
    }

    #[must_use]
    pub fn implements(&self, hook: Hook) -> bool {
        !self.registrations(hook).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &HookContext) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    fn order(registry: &HookRegistry, hook: Hook) -> Vec<&str> {
        registry
            .registrations(hook)
            .iter()
            .map(Registration::plugin)
            .collect()
    }

    #[test]
    fn test_higher_priority_first() {
        let mut registry = HookRegistry::new();
        registry.register(Hook::Hover, "low", noop, 0);
        registry.register(Hook::Hover, "high", noop, 10);
        registry.register(Hook::Hover, "middle", noop, 5);

        assert_eq!(order(&registry, Hook::Hover), ["high", "middle", "low"]);
    }

    #[test]
    fn test_equal_priority_keeps_registration_order() {
        let mut registry = HookRegistry::new();
        registry.register(Hook::Lint, "a", noop, 0);
        registry.register(Hook::Lint, "b", noop, 0);
        registry.register(Hook::Lint, "first", noop, 1);
        registry.register(Hook::Lint, "c", noop, 0);

        assert_eq!(order(&registry, Hook::Lint), ["first", "a", "b", "c"]);
    }

    #[test]
    fn test_unregistered_hook_is_empty() {
        let registry = HookRegistry::new();
        assert!(registry.registrations(Hook::Rename).is_empty());
        assert!(!registry.implements(Hook::Rename));
    }

    struct Twice;

    impl Plugin for Twice {
        fn name(&self) -> &'static str {
            "twice"
        }

        fn register(&self, registry: &mut HookRegistry) {
            registry.register(Hook::Hover, self.name(), noop, 0);
            registry.register(Hook::Lint, self.name(), noop, 0);
        }
    }

    #[test]
    fn test_plugin_registers_once() {
        let mut registry = HookRegistry::new();
        registry.add_plugin(&Twice);
        registry.add_plugin(&Twice);

        assert_eq!(registry.plugins(), ["twice"]);
        assert_eq!(order(&registry, Hook::Hover), ["twice"]);
        assert!(registry.implements(Hook::Lint));
    }
}
