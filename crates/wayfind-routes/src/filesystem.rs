//! Filesystem route source.
//!
//! Routes are recorded on disk as a three-level tree:
//!
//! ```text
//! <root>/
//!   <route>/            one directory per route
//!     <waypoint>/       one directory per waypoint, in route order
//!       <image>.jpg     stored images of that waypoint
//! ```
//!
//! Route and waypoint directories are sorted by name; waypoint ids are their
//! positions in that order.  Entries whose name starts with `.` are skipped,
//! as are files without an image extension.  Decoding is delegated to an
//! injected [`ImageLoader`].

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use wayfind_types::Frame;

use crate::source::{RouteDataSource, RouteImage, StoreError};

/// File extensions (lower-case) recognised as stored images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Decodes one stored image file into a [`Frame`].
pub type ImageLoader = Box<dyn Fn(&Path) -> Result<Frame, StoreError> + Send + Sync>;

/// An [`ImageLoader`] that hands the encoded file bytes through unchanged
/// (`width` and `height` are `0`), leaving decoding to the network.
pub fn raw_bytes_loader() -> ImageLoader {
    Box::new(|path: &Path| {
        let data = fs::read(path).map_err(|e| StoreError::io(path, e))?;
        Ok(Frame::new(0, 0, data))
    })
}

/// Route source reading the `<root>/<route>/<waypoint>/<image>` layout.
pub struct FileSystemRouteSource {
    root: PathBuf,
    loader: ImageLoader,
    routes: Vec<String>,
    selected: Option<String>,
    /// Waypoint directories of the selected route, in id order.
    waypoints: Vec<PathBuf>,
}

impl FileSystemRouteSource {
    /// Create a source over `root`.  No routes are listed until
    /// [`load_routes`][RouteDataSource::load_routes] is called.
    pub fn new(root: impl Into<PathBuf>, loader: ImageLoader) -> Self {
        Self {
            root: root.into(),
            loader,
            routes: Vec::new(),
            selected: None,
            waypoints: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for FileSystemRouteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemRouteSource")
            .field("root", &self.root)
            .field("routes", &self.routes)
            .field("selected", &self.selected)
            .field("waypoints", &self.waypoints.len())
            .finish_non_exhaustive()
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Sorted, non-hidden entries of `dir` that satisfy `keep`.
fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))? {
        let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
        if !is_hidden(&path) && keep(&path) {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

impl RouteDataSource for FileSystemRouteSource {
    fn load_routes(&mut self) -> Result<(), StoreError> {
        if !self.root.is_dir() {
            warn!(root = %self.root.display(), "routes directory does not exist");
            self.routes.clear();
            return Ok(());
        }
        self.routes = sorted_entries(&self.root, Path::is_dir)?
            .iter()
            .filter_map(|p| file_name(p))
            .collect();
        debug!(count = self.routes.len(), root = %self.root.display(), "routes loaded");
        Ok(())
    }

    fn list_routes(&self) -> Vec<String> {
        self.routes.clone()
    }

    fn selected_route(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    fn open(&mut self, route: &str) -> Result<(), StoreError> {
        if !self.routes.iter().any(|r| r == route) {
            return Err(StoreError::UnknownRoute(route.to_string()));
        }
        self.waypoints = sorted_entries(&self.root.join(route), Path::is_dir)?;
        self.selected = Some(route.to_string());
        debug!(route, waypoints = self.waypoints.len(), "route opened");
        Ok(())
    }

    fn close(&mut self) {
        self.selected = None;
        self.waypoints.clear();
    }

    fn num_waypoints(&self) -> usize {
        self.waypoints.len()
    }

    fn images(&self) -> Result<Vec<RouteImage>, StoreError> {
        if self.selected.is_none() {
            return Err(StoreError::NotOpen);
        }
        let mut images = Vec::new();
        for (waypoint, dir) in self.waypoints.iter().enumerate() {
            for path in sorted_entries(dir, |p| p.is_file() && is_image(p))? {
                let frame = (self.loader)(&path)?;
                images.push(RouteImage { waypoint, frame });
            }
        }
        Ok(images)
    }
}
