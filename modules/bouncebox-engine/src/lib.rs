//! In-process event bus.
//!
//! Components form an ownership tree and broadcast immutable events through a shared
//! router. Delivery is synchronous and single-threaded: an event emitted while another
//! is being delivered is queued, so every callback sees events in send order.
//!
//! - [`Router`] queues messages and hands them to the kind and series dispatchers.
//! - [`Component`] owns children and decides which router their bindings land on.
//! - [`Middleware`] interposes filters between a front and its children.
//! - [`BounceBox`] drives a tree from one or more [`Source`]s.

pub mod bounce_box;
pub mod component;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod middleware;
pub mod router;
pub mod source;

pub use bounce_box::{BounceBox, RunSummary};
pub use component::{Component, ComponentBuilder, Relay, WeakComponent};
pub use config::BoxConfig;
pub use dispatch::{callback, handler, Backend, Callback, EventDispatcher, SeriesDispatcher};
pub use error::{BusError, Result};
pub use hooks::{AttachHook, EventBindingHook, HookRegistry, SeriesBindingHook};
pub use middleware::{filter, Filter, FilterDirection, Middleware};
pub use router::{BindKey, Exchange, Router};
pub use source::{iter_source, IterSource, Source, SourceSet};
