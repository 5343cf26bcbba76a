//! `wayfind-runtime` – route lifecycle and the per-tick control path.
//!
//! # Modules
//!
//! - [`navigator`] – [`Navigator`][navigator::Navigator]: owns the route
//!   memory, switches routes on background threads and localizes every
//!   frame through [`forward`][navigator::Navigator::forward].
//! - [`output`] – [`NavigatorOutput`][output::NavigatorOutput] and the
//!   flattened, JSON-serializable [`DrivingState`][output::DrivingState].
//! - [`control_loop`] – [`ControlLoop`][control_loop::ControlLoop]: a named
//!   fixed-rate thread feeding frames into the navigator.
//! - [`config`] – [`NavigatorConfig`][config::NavigatorConfig] loaded from
//!   TOML with `WAYFIND_*` environment overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   `tracing` subscriber with an optional OTLP span exporter.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wayfind_runtime::{Navigator, NavigatorConfig};
//! use wayfind_routes::{FileSystemRouteSource, raw_bytes_loader};
//! # fn network() -> Arc<dyn wayfind_perception::PerceptionNetwork> { unimplemented!() }
//!
//! let _guard = wayfind_runtime::init_tracing("wayfind");
//! let store = FileSystemRouteSource::new("/var/lib/wayfind/routes", raw_bytes_loader());
//! let navigator = Navigator::new(NavigatorConfig::default(), Box::new(store), network())?;
//! # Ok::<(), wayfind_types::NavError>(())
//! ```

pub mod config;
pub mod control_loop;
pub mod navigator;
pub mod output;
pub mod telemetry;

pub use config::NavigatorConfig;
pub use control_loop::{ControlLoop, TickInput};
pub use navigator::{Navigator, RouteState};
pub use output::{DrivingState, NavigatorOutput};
pub use telemetry::{TracerProviderGuard, init_tracing};
