//! In-memory route source.
//!
//! Routes are registered with [`InMemoryRouteSource::insert_route`] and only
//! become visible after the next [`load_routes`][RouteDataSource::load_routes],
//! mirroring how a recording lands on disk before the navigator rescans.
//!
//! # Example
//!
//! ```rust
//! use wayfind_routes::{InMemoryRouteSource, RouteDataSource, RouteImage};
//! use wayfind_types::Frame;
//!
//! let mut source = InMemoryRouteSource::new();
//! source.insert_route("garden", vec![RouteImage { waypoint: 0, frame: Frame::new(1, 1, vec![0]) }]);
//! assert!(!source.contains("garden"));
//!
//! source.load_routes().unwrap();
//! source.open("garden").unwrap();
//! assert_eq!(source.num_waypoints(), 1);
//! ```

use std::collections::BTreeMap;

use crate::source::{RouteDataSource, RouteImage, StoreError};

/// Route source backed by a map of route name → images.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRouteSource {
    registered: BTreeMap<String, Vec<RouteImage>>,
    /// Route names published by the last `load_routes`.
    visible: Vec<String>,
    selected: Option<String>,
}

impl InMemoryRouteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a route.  It becomes visible on the next
    /// [`load_routes`][RouteDataSource::load_routes].
    pub fn insert_route(&mut self, name: impl Into<String>, images: Vec<RouteImage>) {
        self.registered.insert(name.into(), images);
    }

    /// Builder-style [`insert_route`][Self::insert_route] followed by a
    /// reload, so the route is visible immediately.
    pub fn with_route(mut self, name: impl Into<String>, images: Vec<RouteImage>) -> Self {
        self.insert_route(name, images);
        self.visible = self.registered.keys().cloned().collect();
        self
    }

    fn selected_images(&self) -> Option<&[RouteImage]> {
        self.selected
            .as_ref()
            .and_then(|name| self.registered.get(name))
            .map(Vec::as_slice)
    }
}

impl RouteDataSource for InMemoryRouteSource {
    fn load_routes(&mut self) -> Result<(), StoreError> {
        self.visible = self.registered.keys().cloned().collect();
        Ok(())
    }

    fn list_routes(&self) -> Vec<String> {
        self.visible.clone()
    }

    fn selected_route(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    fn open(&mut self, route: &str) -> Result<(), StoreError> {
        if !self.visible.iter().any(|r| r == route) {
            return Err(StoreError::UnknownRoute(route.to_string()));
        }
        self.selected = Some(route.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.selected = None;
    }

    fn num_waypoints(&self) -> usize {
        self.selected_images()
            .and_then(|images| images.iter().map(|im| im.waypoint).max())
            .map_or(0, |max| max + 1)
    }

    fn images(&self) -> Result<Vec<RouteImage>, StoreError> {
        self.selected_images()
            .map(<[RouteImage]>::to_vec)
            .ok_or(StoreError::NotOpen)
    }
}
