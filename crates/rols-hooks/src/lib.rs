//! Plugin hooks
//!
//! Plugins register implementations of named [`Hook`]s in a [`HookRegistry`]; the
//! [`Dispatcher`] invokes them with a [`HookContext`] and combines the results
//! according to each hook's [`Policy`].

mod context;
mod dispatch;
mod hook;
mod registry;

pub use context::HookContext;
pub use dispatch::Dispatcher;
pub use hook::Hook;
pub use hook::Policy;
pub use registry::HookImpl;
pub use registry::HookRegistry;
pub use registry::Plugin;
pub use registry::Registration;
