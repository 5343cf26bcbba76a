//! The `RouteDataSource` trait and supporting types.

use std::path::PathBuf;

use thiserror::Error;
use wayfind_types::{Frame, NavError, WaypointId};

/// Errors raised while listing, opening or reading routes.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unknown route: {0}")]
    UnknownRoute(String),
    #[error("No route is open")]
    NotOpen,
    #[error("Failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<StoreError> for NavError {
    fn from(err: StoreError) -> Self {
        NavError::Store(err.to_string())
    }
}

/// One stored image of the open route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteImage {
    pub waypoint: WaypointId,
    pub frame: Frame,
}

/// Persistent route storage.
///
/// A source keeps a list of known routes, refreshed by
/// [`load_routes`][RouteDataSource::load_routes], and at most one selected
/// route whose images can be read.
pub trait RouteDataSource: Send {
    /// Refresh the list of known routes from the backing storage.
    fn load_routes(&mut self) -> Result<(), StoreError>;

    /// Names of the known routes, in storage order.
    fn list_routes(&self) -> Vec<String>;

    /// `true` if `route` is among the known routes.
    fn contains(&self, route: &str) -> bool {
        self.list_routes().iter().any(|r| r == route)
    }

    /// The currently selected route, if any.
    fn selected_route(&self) -> Option<&str>;

    /// Select `route`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownRoute`] if the route is not known.
    fn open(&mut self, route: &str) -> Result<(), StoreError>;

    /// Deselect the current route.  No-op when none is selected.
    fn close(&mut self);

    fn is_open(&self) -> bool {
        self.selected_route().is_some()
    }

    /// Number of waypoints on the selected route (`0` when closed).
    fn num_waypoints(&self) -> usize;

    /// Every image of the selected route, in route order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotOpen`] when no route is selected, or an I/O or
    /// decode error from the backing storage.
    fn images(&self) -> Result<Vec<RouteImage>, StoreError>;
}
