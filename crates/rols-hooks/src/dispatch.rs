use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tokio::time::Instant;

use crate::context::HookContext;
use crate::hook::Hook;
use crate::hook::Policy;
use crate::registry::HookRegistry;
use crate::registry::Registration;

type Outcome = Result<Result<anyhow::Result<Option<Value>>, JoinError>, Elapsed>;

/// Runs hook implementations and combines their results according to the hook's
/// [`Policy`]. Failing, panicking and slow implementations are logged and count as
/// having returned nothing.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<HookRegistry>,
    timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: HookRegistry, timeout: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            timeout,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    /// Invoke `hook`.
    ///
    /// First-result hooks give the winning value or `null`; aggregate hooks give an
    /// array with one entry per implementation that produced something, in
    /// registration order.
    pub async fn dispatch(&self, hook: Hook, context: &HookContext) -> Value {
        let registrations: Vec<Registration> = self
            .registry
            .registrations(hook)
            .iter()
            .filter(|registration| {
                let enabled = context.config().plugin_enabled(registration.plugin());
                if !enabled {
                    tracing::trace!("Skipping disabled plugin {}", registration.plugin());
                }
                enabled
            })
            .cloned()
            .collect();

        match hook.policy() {
            Policy::FirstResult => self.first_result(hook, registrations, context).await,
            Policy::Aggregate => self.aggregate(hook, registrations, context).await,
        }
    }

    /// The first-result value deserialized as `T`.
    pub async fn dispatch_first<T: DeserializeOwned>(
        &self,
        hook: Hook,
        context: &HookContext,
    ) -> Option<T> {
        let value = self.dispatch(hook, context).await;
        if value.is_null() {
            return None;
        }
        serde_json::from_value(value)
            .map_err(|err| tracing::warn!("Unexpected {hook} result: {err}"))
            .ok()
    }

    /// Aggregate results deserialized as `T`. Implementations returning arrays have
    /// their items flattened into the output.
    pub async fn dispatch_all<T: DeserializeOwned>(
        &self,
        hook: Hook,
        context: &HookContext,
    ) -> Vec<T> {
        let Value::Array(results) = self.dispatch(hook, context).await else {
            return Vec::new();
        };

        results
            .into_iter()
            .flat_map(|result| match result {
                Value::Array(items) => items,
                other => vec![other],
            })
            .filter_map(|item| {
                serde_json::from_value(item)
                    .map_err(|err| tracing::warn!("Unexpected {hook} item: {err}"))
                    .ok()
            })
            .collect()
    }

    async fn first_result(
        &self,
        hook: Hook,
        registrations: Vec<Registration>,
        context: &HookContext,
    ) -> Value {
        for registration in registrations {
            let handle = spawn(&registration, context);
            let outcome = tokio::time::timeout(self.timeout, handle).await;
            if let Some(value) = settle(hook, registration.plugin(), outcome) {
                if !is_empty(&value) {
                    return value;
                }
            }
        }
        Value::Null
    }

    async fn aggregate(
        &self,
        hook: Hook,
        registrations: Vec<Registration>,
        context: &HookContext,
    ) -> Value {
        let deadline = Instant::now() + self.timeout;
        let handles: Vec<_> = registrations
            .iter()
            .map(|registration| spawn(registration, context))
            .collect();

        let mut results = Vec::new();
        for (registration, handle) in registrations.iter().zip(handles) {
            let outcome = tokio::time::timeout_at(deadline, handle).await;
            if let Some(value) = settle(hook, registration.plugin(), outcome) {
                if !value.is_null() {
                    results.push(value);
                }
            }
        }
        Value::Array(results)
    }
}

fn spawn(
    registration: &Registration,
    context: &HookContext,
) -> JoinHandle<anyhow::Result<Option<Value>>> {
    let implementation = registration.implementation();
    let context = context.clone();
    tokio::task::spawn_blocking(move || implementation.call(&context))
}

fn settle(hook: Hook, plugin: &str, outcome: Outcome) -> Option<Value> {
    match outcome {
        Ok(Ok(Ok(value))) => value,
        Ok(Ok(Err(err))) => {
            tracing::error!(?err, "Plugin {plugin} failed in {hook}");
            None
        }
        Ok(Err(err)) => {
            tracing::error!(?err, "Plugin {plugin} panicked in {hook}");
            None
        }
        Err(_) => {
            tracing::warn!("Plugin {plugin} timed out in {hook}");
            None
        }
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use rols_conf::Config;
    use rols_workspace::Workspace;
    use serde_json::json;
    use url::Url;

    use super::*;

    fn context() -> HookContext {
        let workspace = Workspace::with_config(
            Url::parse("file:///ws").unwrap(),
            Config::with_user_config_dir(None, None),
        );
        HookContext::new(Arc::new(workspace))
    }

    fn returns(value: Value) -> impl Fn(&HookContext) -> anyhow::Result<Option<Value>> {
        move |_: &HookContext| -> anyhow::Result<Option<Value>> { Ok(Some(value.clone())) }
    }

    fn nothing(_: &HookContext) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    fn fails(_: &HookContext) -> anyhow::Result<Option<Value>> {
        anyhow::bail!("plugin exploded")
    }

    fn dispatcher(registry: HookRegistry) -> Dispatcher {
        Dispatcher::new(registry, Duration::from_secs(5))
    }

    mod first_result {
        use super::*;

        #[tokio::test]
        async fn test_short_circuits() {
            let called = Arc::new(AtomicBool::new(false));
            let third = Arc::clone(&called);

            let mut registry = HookRegistry::new();
            registry.register(Hook::Hover, "none", nothing, 0);
            registry.register(Hook::Hover, "x", returns(json!("X")), 0);
            registry.register(
                Hook::Hover,
                "y",
                move |_: &HookContext| -> anyhow::Result<Option<Value>> {
                    third.store(true, Ordering::SeqCst);
                    Ok(Some(json!("Y")))
                },
                0,
            );

            let result = dispatcher(registry).dispatch(Hook::Hover, &context()).await;
            assert_eq!(result, json!("X"));
            assert!(!called.load(Ordering::SeqCst));
        }

        #[tokio::test]
        async fn test_failure_counts_as_no_result() {
            let mut registry = HookRegistry::new();
            registry.register(Hook::Rename, "broken", fails, 10);
            registry.register(Hook::Rename, "works", returns(json!({"changes": {}})), 0);

            let result = dispatcher(registry).dispatch(Hook::Rename, &context()).await;
            assert_eq!(result, json!({"changes": {}}));
        }

        #[tokio::test]
        async fn test_empty_results_fall_through() {
            let mut registry = HookRegistry::new();
            registry.register(Hook::FoldingRange, "empty", returns(json!([])), 1);
            registry.register(
                Hook::FoldingRange,
                "ranges",
                returns(json!([{"startLine": 0, "endLine": 2}])),
                0,
            );

            let result = dispatcher(registry)
                .dispatch(Hook::FoldingRange, &context())
                .await;
            assert_eq!(result, json!([{"startLine": 0, "endLine": 2}]));
        }

        #[tokio::test]
        async fn test_all_empty_is_null() {
            let mut registry = HookRegistry::new();
            registry.register(Hook::SignatureHelp, "a", nothing, 0);
            registry.register(Hook::SignatureHelp, "b", fails, 0);

            let result = dispatcher(registry)
                .dispatch(Hook::SignatureHelp, &context())
                .await;
            assert_eq!(result, Value::Null);
        }

        #[tokio::test]
        async fn test_priority_decides_winner() {
            let mut registry = HookRegistry::new();
            registry.register(Hook::Hover, "low", returns(json!("low")), 0);
            registry.register(Hook::Hover, "high", returns(json!("high")), 100);

            let result: Option<String> = dispatcher(registry)
                .dispatch_first(Hook::Hover, &context())
                .await;
            assert_eq!(result.as_deref(), Some("high"));
        }
    }

    mod aggregate {
        use super::*;

        #[tokio::test]
        async fn test_failures_are_isolated() {
            let mut registry = HookRegistry::new();
            registry.register(Hook::Completions, "a", returns(json!(["a"])), 0);
            registry.register(Hook::Completions, "broken", fails, 0);
            registry.register(Hook::Completions, "b", returns(json!(["b"])), 0);

            let dispatcher = dispatcher(registry);
            let result = dispatcher.dispatch(Hook::Completions, &context()).await;
            assert_eq!(result, json!([["a"], ["b"]]));

            let flat: Vec<String> = dispatcher
                .dispatch_all(Hook::Completions, &context())
                .await;
            assert_eq!(flat, ["a", "b"]);
        }

        #[tokio::test]
        async fn test_panics_are_isolated() {
            let mut registry = HookRegistry::new();
            registry.register(
                Hook::Lint,
                "panics",
                |_: &HookContext| -> anyhow::Result<Option<Value>> { panic!("boom") },
                0,
            );
            registry.register(Hook::Lint, "ok", returns(json!({"message": "fine"})), 0);

            let result = dispatcher(registry).dispatch(Hook::Lint, &context()).await;
            assert_eq!(result, json!([{"message": "fine"}]));
        }

        #[tokio::test]
        async fn test_timeout_is_no_result() {
            let mut registry = HookRegistry::new();
            registry.register(
                Hook::Lint,
                "slow",
                |_: &HookContext| -> anyhow::Result<Option<Value>> {
                    std::thread::sleep(Duration::from_millis(500));
                    Ok(Some(json!("late")))
                },
                0,
            );
            registry.register(Hook::Lint, "fast", returns(json!("fast")), 0);

            let dispatcher = Dispatcher::new(registry, Duration::from_millis(50));
            let result = dispatcher.dispatch(Hook::Lint, &context()).await;
            assert_eq!(result, json!(["fast"]));
        }

        #[tokio::test]
        async fn test_every_implementation_runs() {
            let calls = Arc::new(AtomicUsize::new(0));
            let mut registry = HookRegistry::new();
            for name in ["one", "two", "three"] {
                let calls = Arc::clone(&calls);
                registry.register(
                    Hook::DocumentDidSave,
                    name,
                    move |_: &HookContext| -> anyhow::Result<Option<Value>> {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(None)
                    },
                    0,
                );
            }

            let result = dispatcher(registry)
                .dispatch(Hook::DocumentDidSave, &context())
                .await;
            assert_eq!(result, json!([]));
            assert_eq!(calls.load(Ordering::SeqCst), 3);
        }

        #[tokio::test]
        async fn test_results_keep_registration_order() {
            let mut registry = HookRegistry::new();
            registry.register(
                Hook::CodeLens,
                "slow",
                |_: &HookContext| -> anyhow::Result<Option<Value>> {
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(Some(json!("slow")))
                },
                0,
            );
            registry.register(Hook::CodeLens, "fast", returns(json!("fast")), 0);

            let result = dispatcher(registry).dispatch(Hook::CodeLens, &context()).await;
            assert_eq!(result, json!(["slow", "fast"]));
        }
    }

    mod settings {
        use super::*;

        #[tokio::test]
        async fn test_disabled_plugin_is_skipped() {
            let mut registry = HookRegistry::new();
            registry.register(Hook::Hover, "off", returns(json!("off")), 10);
            registry.register(Hook::Hover, "on", returns(json!("on")), 0);

            let workspace = Workspace::with_config(
                Url::parse("file:///ws").unwrap(),
                Config::with_user_config_dir(None, None),
            );
            workspace
                .config()
                .update(json!({"plugins": {"off": {"enabled": false}}}));
            let context = HookContext::new(Arc::new(workspace));

            let result = dispatcher(registry).dispatch(Hook::Hover, &context).await;
            assert_eq!(result, json!("on"));
        }

        #[tokio::test]
        async fn test_unimplemented_hooks() {
            let dispatcher = dispatcher(HookRegistry::new());
            assert_eq!(
                dispatcher.dispatch(Hook::Hover, &context()).await,
                Value::Null
            );
            assert_eq!(
                dispatcher.dispatch(Hook::Lint, &context()).await,
                json!([])
            );
        }
    }
}
