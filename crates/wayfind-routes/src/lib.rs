//! `wayfind-routes` – route data sources.
//!
//! A route is an ordered list of stored images, each tagged with the
//! waypoint it was recorded at.  The navigator reads routes exclusively
//! through the [`RouteDataSource`][source::RouteDataSource] trait.
//!
//! # Modules
//!
//! - [`source`] – the [`RouteDataSource`][source::RouteDataSource] trait,
//!   [`RouteImage`][source::RouteImage] and [`StoreError`][source::StoreError].
//! - [`in_memory`] – [`InMemoryRouteSource`][in_memory::InMemoryRouteSource]:
//!   routes registered programmatically, for simulators and tests.
//! - [`filesystem`] – [`FileSystemRouteSource`][filesystem::FileSystemRouteSource]:
//!   routes recorded on disk as `root/<route>/<waypoint>/<image>`.

pub mod filesystem;
pub mod in_memory;
pub mod source;

pub use filesystem::{FileSystemRouteSource, ImageLoader, raw_bytes_loader};
pub use in_memory::InMemoryRouteSource;
pub use source::{RouteDataSource, RouteImage, StoreError};
