//! Frames, templates and name resolution for the Flabbergast runtime.
//!
//! This crate sits on top of the scheduler in `flb_sched` and gives the
//! language its data model: lazily computed frames, templates that build
//! them, the gather/disperse aggregation mechanism, and the lookup engine
//! that resolves dotted names against a chain of frames.
//!
//! # Architecture
//!
//! - [`Value`]: the closed set of runtime values.
//! - [`Definition`] and friends: the callbacks a compiled program is made
//!   of. They are handed a fresh future and never block.
//! - [`Attribute`] / [`AttributeSource`]: named definitions, overrides,
//!   drops and gathers, squashed by name into one attribute per name.
//! - [`Frame`]: launches every attribute of its sources in one batch and
//!   publishes the promises. Frames declaring gatherer buckets collect the
//!   values dispersed beneath them.
//! - [`Template`]: a frame recipe that can be amended or instantiated.
//! - [`Context`]: the frames a name can be resolved in, innermost first.
//! - [`LookupHandler`]: an explorer and a selector strategy driving the
//!   lookup grid (see [`lookup`]).
//! - [`host`]: the two operations an embedding host is offered.
//!
//! # Tracing
//!
//! Call [`init_tracing`] once at startup. Output is controlled by
//! `RUST_LOG`, for example `RUST_LOG=flb_eval=debug,flb_sched=debug` or
//! `RUST_LOG=flb_eval::lookup=trace` to follow every lookup step.

mod attribute;
mod context;
mod definition;
mod frame;
mod gatherer;
pub mod host;
pub mod lookup;
mod template;
mod value;

pub use attribute::{Attribute, AttributeSource};
pub use context::{Context, FrameAccessor, Visibility};
pub use definition::{
    collector_fn, constant, definition_fn, evaluate, fail, launch, override_fn,
    CollectorDefinition, Definition, OverrideDefinition, RootDefinition,
};
pub use frame::Frame;
pub use lookup::{
    explorer_fn, selector_fn, Explore, ExplorerFactory, LookupEnv, LookupExplorer,
    LookupHandler, LookupSelector, NamePredicate, Select, SelectorFactory,
};
pub use template::Template;
pub use value::Value;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset, or after the first call.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
