//! The navigator: route lifecycle plus per-tick localization.
//!
//! ```text
//!            route requested & known               task commits
//!  Closed ─────────────────────────────▶ Loading ───────────────▶ Open
//!    ▲                                     │                       │
//!    └──── no route / build failure ───────┴───── no route ────────┘
//! ```
//!
//! The control thread owns the [`Navigator`] and calls
//! [`forward`][Navigator::forward] once per tick.  Route-list reloads and
//! route opens run on short-lived background threads that share a single
//! session behind a `parking_lot::Mutex`.  The control thread only ever
//! `try_lock`s that mutex, so a rebuild in progress costs it the route
//! match for that tick and nothing more.
//!
//! Every route-switch request bumps a generation counter.  A background
//! open captures the generation it was spawned for and commits only if that
//! generation is still current, so a slow build for a route the caller has
//! since moved away from is discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};
use wayfind_memory::RouteMemory;
use wayfind_perception::PerceptionNetwork;
use wayfind_routes::RouteDataSource;
use wayfind_types::{Embedding, Frame, Intention, NavError, WaypointId};

use crate::config::NavigatorConfig;
use crate::output::NavigatorOutput;

// ─────────────────────────────────────────────────────────────────────────────
// Route state
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of the route the navigator localizes against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RouteState {
    #[default]
    Closed,
    /// A background task is building the corpus for `route`.
    Loading { route: String, generation: u64 },
    Open { route: String },
}

impl RouteState {
    /// Name of the open or loading route.
    pub fn route(&self) -> Option<&str> {
        match self {
            RouteState::Closed => None,
            RouteState::Loading { route, .. } | RouteState::Open { route } => Some(route),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, RouteState::Open { .. })
    }
}

/// State shared between the control thread and background route tasks.
struct Session {
    store: Box<dyn RouteDataSource>,
    memory: RouteMemory,
    route: RouteState,
    /// A route-list reload is in flight.
    reloading: bool,
    last_reload: Option<Instant>,
    /// Route whose last build failed, and when.
    last_failure: Option<(String, Instant)>,
}

impl Session {
    fn close(&mut self) {
        self.store.close();
        self.memory.clear();
        self.route = RouteState::Closed;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Background tasks
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    ReloadRoutes,
    OpenRoute,
}

/// Handle of one background route task.
struct RouteTask {
    kind: TaskKind,
    generation: u64,
    handle: JoinHandle<()>,
}

impl RouteTask {
    /// Join the task, logging a panic.  Returns `true` if it panicked.
    fn join(self) -> bool {
        match self.handle.join() {
            Ok(()) => false,
            Err(_) => {
                error!(kind = ?self.kind, generation = self.generation, "route task panicked");
                true
            }
        }
    }
}

/// Handles the background tasks need.
#[derive(Clone)]
struct Shared {
    session: Arc<Mutex<Session>>,
    network: Arc<dyn PerceptionNetwork>,
    generation: Arc<AtomicU64>,
    quit: Arc<AtomicBool>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn spawn(
        &self,
        kind: TaskKind,
        generation: u64,
        route: Option<String>,
    ) -> std::io::Result<RouteTask> {
        let shared = self.clone();
        let builder = thread::Builder::new();
        let handle = match (kind, route) {
            (TaskKind::OpenRoute, Some(route)) => builder
                .name("wayfind-route-open".to_string())
                .spawn(move || shared.open_route(&route, generation))?,
            _ => builder
                .name("wayfind-route-reload".to_string())
                .spawn(move || shared.reload_routes())?,
        };
        Ok(RouteTask {
            kind,
            generation,
            handle,
        })
    }

    #[instrument(skip(self))]
    fn reload_routes(&self) {
        let mut session = self.session.lock();
        if !self.quit.load(Ordering::Acquire) {
            match session.store.load_routes() {
                Ok(()) => info!(count = session.store.list_routes().len(), "route list reloaded"),
                Err(e) => error!(error = %e, "route list reload failed"),
            }
        }
        session.reloading = false;
        session.last_reload = Some(Instant::now());
    }

    #[instrument(skip(self))]
    fn open_route(&self, route: &str, generation: u64) {
        if self.quit.load(Ordering::Acquire) || !self.is_current(generation) {
            debug!("route open superseded before start");
            return;
        }
        let mut session = self.session.lock();
        if !self.is_current(generation) {
            debug!("route open superseded while waiting for the session");
            return;
        }

        let started = Instant::now();
        let result = build_corpus(&mut *session.store, self.network.as_ref(), route);

        if !self.is_current(generation) {
            debug!("discarding superseded route build");
            // A newer open reselects the store itself.
            if !matches!(session.route, RouteState::Loading { generation: g, .. } if g != generation) {
                session.close();
            }
            return;
        }
        match result {
            Ok(corpus) => {
                let images = corpus.ids.len();
                session.memory.reset(
                    corpus.num_waypoints,
                    corpus.ids,
                    corpus.coordinates,
                    corpus.keys,
                    corpus.values,
                );
                if session.memory.is_open() {
                    session.route = RouteState::Open {
                        route: route.to_string(),
                    };
                    session.last_failure = None;
                    info!(
                        images,
                        waypoints = session.memory.num_waypoints(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "route opened"
                    );
                } else {
                    warn!("route has no images; staying closed");
                    session.close();
                    session.last_failure = Some((route.to_string(), Instant::now()));
                }
            }
            Err(e) => {
                error!(error = %e, "route open failed");
                session.close();
                session.last_failure = Some((route.to_string(), Instant::now()));
            }
        }
    }
}

/// Feature vectors of every stored image of one route.
struct RouteCorpus {
    num_waypoints: usize,
    ids: Vec<WaypointId>,
    coordinates: Vec<Embedding>,
    keys: Vec<Embedding>,
    values: Vec<Embedding>,
}

fn build_corpus(
    store: &mut dyn RouteDataSource,
    network: &dyn PerceptionNetwork,
    route: &str,
) -> Result<RouteCorpus, NavError> {
    store.open(route)?;
    let images = store.images()?;
    let mut corpus = RouteCorpus {
        num_waypoints: store.num_waypoints(),
        ids: Vec::with_capacity(images.len()),
        coordinates: Vec::with_capacity(images.len()),
        keys: Vec::with_capacity(images.len()),
        values: Vec::with_capacity(images.len()),
    };
    for image in &images {
        let features = network.features(&image.frame)?;
        corpus.ids.push(image.waypoint);
        corpus.coordinates.push(features.coordinate);
        corpus.keys.push(features.key);
        corpus.values.push(features.value);
    }
    Ok(corpus)
}

// ─────────────────────────────────────────────────────────────────────────────
// Navigator
// ─────────────────────────────────────────────────────────────────────────────

/// Previous-tick values fed back into the network.
#[derive(Debug, Default)]
struct Carry {
    command: Option<Embedding>,
    destination: Option<Embedding>,
}

impl Carry {
    fn clear(&mut self) {
        self.command = None;
        self.destination = None;
    }
}

/// Number of consecutive busy ticks between contention warnings.
const CONTENTION_WARN_EVERY: u64 = 10;

/// Localizes the robot on a recorded route, one frame at a time.
pub struct Navigator {
    config: NavigatorConfig,
    shared: Shared,
    tasks: Vec<RouteTask>,
    carry: Carry,
    /// Generation of an open task that panicked, pending cleanup.
    panicked: Option<u64>,
    /// A reload task panicked and left `Session::reloading` set.
    reload_panicked: bool,
    busy_ticks: u64,
}

impl Navigator {
    /// Create a navigator over `store`, loading its route list.
    ///
    /// # Errors
    ///
    /// Returns [`NavError::Config`] for an invalid config and
    /// [`NavError::Store`] if the initial route listing fails.
    pub fn new(
        config: NavigatorConfig,
        mut store: Box<dyn RouteDataSource>,
        network: Arc<dyn PerceptionNetwork>,
    ) -> Result<Self, NavError> {
        config.validate()?;
        store.load_routes()?;
        info!(routes = store.list_routes().len(), "navigator ready");
        let session = Session {
            store,
            memory: RouteMemory::new(config.memory),
            route: RouteState::Closed,
            reloading: false,
            last_reload: None,
            last_failure: None,
        };
        Ok(Self {
            config,
            shared: Shared {
                session: Arc::new(Mutex::new(session)),
                network,
                generation: Arc::new(AtomicU64::new(0)),
                quit: Arc::new(AtomicBool::new(false)),
            },
            tasks: Vec::new(),
            carry: Carry::default(),
            panicked: None,
            reload_panicked: false,
            busy_ticks: 0,
        })
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// Current route state, or `None` if a background task holds the session.
    pub fn route_state(&self) -> Option<RouteState> {
        self.shared.session.try_lock().map(|s| s.route.clone())
    }

    /// Route names known to the store, or `None` if the session is busy.
    pub fn routes(&self) -> Option<Vec<String>> {
        self.shared.session.try_lock().map(|s| s.store.list_routes())
    }

    /// Current route-switch generation.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Background tasks not yet reaped.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Run one control tick.
    ///
    /// Never blocks on background route work.  When the session is busy or
    /// no route is open the navigation fields of the output are `None`.
    ///
    /// # Errors
    ///
    /// Propagates perception failures and route-memory precondition
    /// violations ([`NavError::DimensionMismatch`]).  Carries are left
    /// untouched on error.
    pub fn forward(
        &mut self,
        image: &Frame,
        intention: Intention,
        route: Option<&str>,
    ) -> Result<NavigatorOutput, NavError> {
        self.reap_tasks();
        self.check_state(route);

        let command = match (&self.carry.destination, &self.carry.command) {
            (Some(_), Some(gumbel)) => gumbel.clone(),
            _ => intention.command(),
        };
        let out = self
            .shared
            .network
            .forward(image, &command, self.carry.destination.as_deref())?;

        let outcome = match self.shared.session.try_lock() {
            Some(mut session) => {
                self.busy_ticks = 0;
                if session.memory.is_open() {
                    Some(session.memory.match_frame(&out.coordinate, &out.query)?)
                } else {
                    None
                }
            }
            None => {
                self.busy_ticks += 1;
                if self.busy_ticks % CONTENTION_WARN_EVERY == 0 {
                    warn!(ticks = self.busy_ticks, "route session busy; localization paused");
                }
                None
            }
        };

        let destination = outcome.as_ref().and_then(|o| o.destination.clone());
        self.carry.command = destination.as_ref().map(|_| out.gumbel.clone());
        self.carry.destination = destination.clone();

        Ok(NavigatorOutput {
            action: out.action,
            critic: out.critic,
            surprise: out.surprise,
            brake: out.brake,
            brake_critic: out.brake_critic,
            waypoint: outcome.as_ref().and_then(|o| o.waypoint),
            image: outcome.as_ref().map(|o| o.image),
            confidence: outcome.as_ref().map(|o| o.confidence),
            destination,
            command,
        })
    }

    /// Clear memory and carries, reload the route list and accept work
    /// again after a [`shutdown`][Self::shutdown].
    pub fn restart(&mut self, config: NavigatorConfig) -> Result<(), NavError> {
        config.validate()?;
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.join_tasks();
        self.shared.quit.store(false, Ordering::Release);

        let mut session = self.shared.session.lock();
        session.close();
        session.memory = RouteMemory::new(config.memory);
        session.reloading = false;
        session.last_failure = None;
        session.store.load_routes()?;
        session.last_reload = Some(Instant::now());
        drop(session);

        self.config = config;
        self.carry.clear();
        self.panicked = None;
        self.reload_panicked = false;
        self.busy_ticks = 0;
        info!("navigator restarted");
        Ok(())
    }

    /// Stop accepting background work and join every outstanding task.
    pub fn shutdown(&mut self) {
        self.shared.quit.store(true, Ordering::Release);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.join_tasks();
        info!("navigator shut down");
    }

    fn join_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.join();
        }
    }

    /// Join finished tasks.
    fn reap_tasks(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.tasks.drain(..).partition(|t| t.handle.is_finished());
        self.tasks = running;
        for task in finished {
            let (kind, generation) = (task.kind, task.generation);
            if task.join() {
                match kind {
                    TaskKind::OpenRoute => self.panicked = Some(generation),
                    TaskKind::ReloadRoutes => self.reload_panicked = true,
                }
            }
        }
    }

    /// Reconcile the route state with the requested route.  Skipped when
    /// the session is busy.
    fn check_state(&mut self, requested: Option<&str>) {
        let Some(mut session) = self.shared.session.try_lock() else {
            debug!("route state check skipped: session busy");
            return;
        };

        if let Some(failed) = self.panicked.take()
            && let RouteState::Loading { route, generation } = &session.route
            && *generation == failed
        {
            let route = route.clone();
            session.close();
            session.last_failure = Some((route, Instant::now()));
        }
        if std::mem::take(&mut self.reload_panicked) {
            session.reloading = false;
            session.last_reload = Some(Instant::now());
        }

        let Some(route) = requested else {
            if session.route != RouteState::Closed {
                self.shared.generation.fetch_add(1, Ordering::AcqRel);
                session.close();
                self.carry.clear();
                info!("route closed");
            }
            return;
        };

        if session.route.route() == Some(route) {
            return;
        }

        let cooldown = self.config.reload_cooldown();
        if !session.store.contains(route) {
            let due = session.last_reload.is_none_or(|at| at.elapsed() >= cooldown);
            if session.reloading || !due {
                return;
            }
            match self.shared.spawn(TaskKind::ReloadRoutes, self.generation(), None) {
                Ok(task) => {
                    debug!(route, "unknown route; reloading route list");
                    session.reloading = true;
                    self.tasks.push(task);
                }
                Err(e) => error!(error = %e, "failed to spawn route reload"),
            }
            return;
        }

        if let Some((failed, at)) = &session.last_failure
            && failed == route
            && at.elapsed() < cooldown
        {
            return;
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1;
        session.close();
        self.carry.clear();
        match self.shared.spawn(TaskKind::OpenRoute, generation, Some(route.to_string())) {
            Ok(task) => {
                info!(route, generation, "opening route");
                session.route = RouteState::Loading {
                    route: route.to_string(),
                    generation,
                };
                self.tasks.push(task);
            }
            Err(e) => error!(error = %e, route, "failed to spawn route open"),
        }
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        self.shared.quit.store(true, Ordering::Release);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("config", &self.config)
            .field("generation", &self.generation())
            .field("pending_tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Condvar;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use wayfind_perception::{ImageFeatures, NetworkOutput};
    use wayfind_routes::{InMemoryRouteSource, RouteImage, StoreError};

    const GUMBEL: [f32; 3] = [0.1, 0.2, 0.7];

    fn unit(axis: usize, scale: f32) -> Embedding {
        let mut v = vec![0.0; 4];
        v[axis] = scale;
        v
    }

    /// Blocks feature extraction until opened.
    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        cv: Condvar,
    }

    impl Gate {
        fn wait(&self) {
            let mut open = self.open.lock();
            while !*open {
                self.cv.wait(&mut open);
            }
        }

        fn release(&self) {
            *self.open.lock() = true;
            self.cv.notify_all();
        }
    }

    /// Frame `[k]` embeds as axis `k` of a 4-d space and attends to the
    /// image after it.  A frame starting with `255` fails inference.
    /// Feature extraction waits for `gate`, which starts closed.
    #[derive(Default)]
    struct TestNetwork {
        gate: Arc<Gate>,
        entered: AtomicBool,
        fail_features: AtomicBool,
        panic_features: AtomicBool,
        calls: Mutex<Vec<(Embedding, Option<Embedding>)>>,
    }

    impl TestNetwork {
        fn open() -> Arc<Self> {
            let network = Arc::new(Self::default());
            network.gate.release();
            network
        }

        fn last_call(&self) -> (Embedding, Option<Embedding>) {
            self.calls.lock().last().cloned().expect("network was called")
        }
    }

    impl PerceptionNetwork for TestNetwork {
        fn features(&self, image: &Frame) -> Result<ImageFeatures, NavError> {
            self.entered.store(true, Ordering::Release);
            self.gate.wait();
            if self.panic_features.load(Ordering::Acquire) {
                panic!("feature extractor crashed");
            }
            if self.fail_features.load(Ordering::Acquire) {
                return Err(NavError::Perception("feature extractor offline".to_string()));
            }
            let k = usize::from(image.data[0]);
            Ok(ImageFeatures {
                coordinate: unit(k, 1.0),
                key: unit(k, 1.0),
                value: vec![k as f32],
            })
        }

        fn forward(
            &self,
            image: &Frame,
            command: &[f32],
            destination: Option<&[f32]>,
        ) -> Result<NetworkOutput, NavError> {
            if image.data[0] == 255 {
                return Err(NavError::Perception("camera frame corrupt".to_string()));
            }
            self.calls
                .lock()
                .push((command.to_vec(), destination.map(<[f32]>::to_vec)));
            let k = usize::from(image.data[0]);
            Ok(NetworkOutput {
                action: 0.1,
                critic: 0.2,
                surprise: 0.3,
                gumbel: GUMBEL.to_vec(),
                brake: 0.0,
                brake_critic: 0.5,
                coordinate: unit(k, 1.0),
                query: unit((k + 1) % 4, 10.0),
            })
        }
    }

    /// Routes handed to it after construction appear on the next reload.
    #[derive(Default)]
    struct LateSource {
        pending: Arc<Mutex<Vec<(String, Vec<RouteImage>)>>>,
        inner: InMemoryRouteSource,
    }

    impl RouteDataSource for LateSource {
        fn load_routes(&mut self) -> Result<(), StoreError> {
            for (name, images) in self.pending.lock().drain(..) {
                self.inner.insert_route(name, images);
            }
            self.inner.load_routes()
        }
        fn list_routes(&self) -> Vec<String> {
            self.inner.list_routes()
        }
        fn selected_route(&self) -> Option<&str> {
            self.inner.selected_route()
        }
        fn open(&mut self, route: &str) -> Result<(), StoreError> {
            self.inner.open(route)
        }
        fn close(&mut self) {
            self.inner.close();
        }
        fn num_waypoints(&self) -> usize {
            self.inner.num_waypoints()
        }
        fn images(&self) -> Result<Vec<RouteImage>, StoreError> {
            self.inner.images()
        }
    }

    /// A [`LateSource`] whose listing crashes on one given call.
    struct CrashingListSource {
        crash_on: usize,
        calls: Arc<AtomicUsize>,
        inner: LateSource,
    }

    impl RouteDataSource for CrashingListSource {
        fn load_routes(&mut self) -> Result<(), StoreError> {
            if self.calls.fetch_add(1, Ordering::AcqRel) + 1 == self.crash_on {
                panic!("route index corrupt");
            }
            self.inner.load_routes()
        }
        fn list_routes(&self) -> Vec<String> {
            self.inner.list_routes()
        }
        fn selected_route(&self) -> Option<&str> {
            self.inner.selected_route()
        }
        fn open(&mut self, route: &str) -> Result<(), StoreError> {
            self.inner.open(route)
        }
        fn close(&mut self) {
            self.inner.close();
        }
        fn num_waypoints(&self) -> usize {
            self.inner.num_waypoints()
        }
        fn images(&self) -> Result<Vec<RouteImage>, StoreError> {
            self.inner.images()
        }
    }

    fn frame(k: u8) -> Frame {
        Frame::new(1, 1, vec![k])
    }

    /// One image per waypoint, frames `[0]..[3]`.
    fn route_images() -> Vec<RouteImage> {
        (0..4u8)
            .map(|k| RouteImage {
                waypoint: usize::from(k),
                frame: frame(k),
            })
            .collect()
    }

    fn store() -> InMemoryRouteSource {
        InMemoryRouteSource::new()
            .with_route("loop", route_images())
            .with_route("other", route_images())
    }

    fn config(cooldown_ms: u64) -> NavigatorConfig {
        NavigatorConfig {
            route_reload_cooldown_ms: cooldown_ms,
            ..NavigatorConfig::default()
        }
    }

    fn navigator(network: &Arc<TestNetwork>) -> Navigator {
        Navigator::new(config(0), Box::new(store()), network.clone()).expect("navigator")
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for navigator");
            thread::sleep(Duration::from_millis(2));
        }
    }

    /// Request `route` while the build is held back, so the requesting tick
    /// cannot match, then let it finish.
    fn open_route(nav: &mut Navigator, network: &TestNetwork, route: &str) {
        nav.forward(&frame(0), Intention::Ahead, Some(route)).unwrap();
        network.gate.release();
        wait_until(|| {
            nav.route_state()
                == Some(RouteState::Open {
                    route: route.to_string(),
                })
        });
    }

    #[test]
    fn closed_navigator_reports_no_navigation() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);

        let out = nav.forward(&frame(1), Intention::Left, None).unwrap();
        assert_eq!(out.waypoint, None);
        assert_eq!(out.image, None);
        assert_eq!(out.confidence, None);
        assert_eq!(out.destination, None);
        assert_eq!(out.command, vec![1.0, 0.0, 0.0]);
        assert_eq!(network.last_call(), (vec![1.0, 0.0, 0.0], None));
        assert_eq!(nav.route_state(), Some(RouteState::Closed));
    }

    #[test]
    fn route_opens_in_background_then_matches() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);

        let out = nav.forward(&frame(1), Intention::Ahead, Some("loop")).unwrap();
        assert_eq!(out.image, None, "memory is not open on the requesting tick");
        assert_eq!(nav.generation(), 1);

        network.gate.release();
        wait_until(|| nav.route_state().is_some_and(|s| s.is_open()));
        let out = nav.forward(&frame(1), Intention::Ahead, Some("loop")).unwrap();
        assert_eq!(out.waypoint, Some(1));
        assert_eq!(out.image, Some(1));
        assert_eq!(out.confidence, Some(0.0));
        assert_eq!(out.destination, Some(vec![2.0]));
        assert_eq!(out.command, Intention::Ahead.command());
    }

    #[test]
    fn destination_carries_gumbel_into_next_tick() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);
        open_route(&mut nav, &network, "loop");

        nav.forward(&frame(1), Intention::Right, Some("loop")).unwrap();
        let out = nav.forward(&frame(1), Intention::Right, Some("loop")).unwrap();
        assert_eq!(out.command, GUMBEL.to_vec());
        assert_eq!(network.last_call(), (GUMBEL.to_vec(), Some(vec![2.0])));
    }

    #[test]
    fn busy_session_does_not_block_forward() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);

        nav.forward(&frame(0), Intention::Ahead, Some("loop")).unwrap();
        wait_until(|| network.entered.load(Ordering::Acquire));

        // The open task holds the session for the whole build.
        let started = Instant::now();
        let out = nav.forward(&frame(1), Intention::Ahead, Some("loop")).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(out.waypoint, None);
        assert_eq!(out.image, None);
        assert_eq!(out.confidence, None);
        assert_eq!(out.destination, None);
        assert_eq!(nav.route_state(), None);

        network.gate.release();
        wait_until(|| nav.route_state().is_some_and(|s| s.is_open()));
        let out = nav.forward(&frame(1), Intention::Ahead, Some("loop")).unwrap();
        assert_eq!(out.waypoint, Some(1));
    }

    #[test]
    fn route_switch_clears_carries() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);
        open_route(&mut nav, &network, "loop");
        let out = nav.forward(&frame(1), Intention::Ahead, Some("loop")).unwrap();
        assert!(out.destination.is_some());
        let generation = nav.generation();

        let out = nav.forward(&frame(1), Intention::Left, Some("other")).unwrap();
        assert_eq!(nav.generation(), generation + 1);
        assert_eq!(out.command, Intention::Left.command());
        assert_eq!(network.last_call(), (Intention::Left.command(), None));

        wait_until(|| {
            nav.route_state()
                == Some(RouteState::Open {
                    route: "other".to_string(),
                })
        });
    }

    #[test]
    fn closing_the_route_bumps_generation() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);
        open_route(&mut nav, &network, "loop");
        let generation = nav.generation();

        let out = nav.forward(&frame(1), Intention::Ahead, None).unwrap();
        assert_eq!(out.image, None);
        assert_eq!(nav.generation(), generation + 1);
        assert_eq!(nav.route_state(), Some(RouteState::Closed));

        // Already closed: nothing to do.
        nav.forward(&frame(1), Intention::Ahead, None).unwrap();
        assert_eq!(nav.generation(), generation + 1);
    }

    #[test]
    fn unknown_route_reloads_route_list() {
        let network = TestNetwork::open();
        let source = LateSource::default();
        let pending = source.pending.clone();
        let mut nav = Navigator::new(config(0), Box::new(source), network.clone()).unwrap();

        nav.forward(&frame(0), Intention::Ahead, Some("late")).unwrap();
        pending.lock().push(("late".to_string(), route_images()));
        wait_until(|| {
            nav.forward(&frame(0), Intention::Ahead, Some("late")).unwrap();
            nav.route_state().is_some_and(|s| s.is_open())
        });
        assert_eq!(nav.routes(), Some(vec!["late".to_string()]));
    }

    #[test]
    fn panicking_reload_does_not_block_later_reloads() {
        let network = TestNetwork::open();
        let inner = LateSource::default();
        let pending = inner.pending.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CrashingListSource {
            crash_on: 2,
            calls: calls.clone(),
            inner,
        };
        let mut nav = Navigator::new(config(0), Box::new(source), network.clone()).unwrap();
        pending.lock().push(("late".to_string(), route_images()));

        // The first reload crashes before publishing the route.
        wait_until(|| {
            nav.forward(&frame(0), Intention::Ahead, Some("late")).unwrap();
            nav.route_state().is_some_and(|s| s.is_open())
        });
        assert!(calls.load(Ordering::Acquire) >= 3);
        assert_eq!(nav.routes(), Some(vec!["late".to_string()]));
    }

    #[test]
    fn reloads_are_rate_limited() {
        let network = Arc::new(TestNetwork::default());
        let mut nav =
            Navigator::new(config(60_000), Box::new(LateSource::default()), network.clone()).unwrap();

        for _ in 0..5 {
            nav.forward(&frame(0), Intention::Ahead, Some("missing")).unwrap();
            assert!(nav.pending_tasks() <= 1);
        }
        wait_until(|| {
            nav.forward(&frame(0), Intention::Ahead, Some("missing")).unwrap();
            nav.pending_tasks() == 0
        });
        nav.forward(&frame(0), Intention::Ahead, Some("missing")).unwrap();
        assert_eq!(nav.pending_tasks(), 0, "cooldown suppresses the next reload");
    }

    #[test]
    fn perception_failure_propagates_and_keeps_carries() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);
        open_route(&mut nav, &network, "loop");
        nav.forward(&frame(1), Intention::Ahead, Some("loop")).unwrap();

        let err = nav.forward(&frame(255), Intention::Ahead, Some("loop")).unwrap_err();
        assert!(matches!(err, NavError::Perception(_)));

        nav.forward(&frame(1), Intention::Ahead, Some("loop")).unwrap();
        assert_eq!(network.last_call().1, Some(vec![2.0]));
    }

    #[test]
    fn failed_build_falls_back_to_closed_and_retries() {
        let network = TestNetwork::open();
        network.fail_features.store(true, Ordering::Release);
        let mut nav = navigator(&network);

        nav.forward(&frame(0), Intention::Ahead, Some("loop")).unwrap();
        wait_until(|| nav.route_state() == Some(RouteState::Closed));

        network.fail_features.store(false, Ordering::Release);
        open_route(&mut nav, &network, "loop");
    }

    #[test]
    fn panicking_build_is_reaped_and_closed() {
        let network = TestNetwork::open();
        network.panic_features.store(true, Ordering::Release);
        let mut nav = Navigator::new(config(60_000), Box::new(store()), network.clone()).unwrap();

        nav.forward(&frame(0), Intention::Ahead, Some("loop")).unwrap();
        wait_until(|| {
            nav.forward(&frame(0), Intention::Ahead, Some("loop")).unwrap();
            nav.route_state() == Some(RouteState::Closed)
        });
        // The cooldown holds off an immediate retry.
        nav.forward(&frame(0), Intention::Ahead, Some("loop")).unwrap();
        assert_eq!(nav.route_state(), Some(RouteState::Closed));
    }

    #[test]
    fn shutdown_discards_in_flight_build() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);

        nav.forward(&frame(0), Intention::Ahead, Some("loop")).unwrap();
        wait_until(|| network.entered.load(Ordering::Acquire));

        let held = network.clone();
        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            held.gate.release();
        });
        nav.shutdown();
        releaser.join().unwrap();

        assert_eq!(nav.pending_tasks(), 0);
        assert_eq!(nav.route_state(), Some(RouteState::Closed));
    }

    #[test]
    fn restart_accepts_work_again() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);
        open_route(&mut nav, &network, "loop");
        nav.shutdown();

        nav.restart(config(0)).unwrap();
        assert_eq!(nav.route_state(), Some(RouteState::Closed));
        open_route(&mut nav, &network, "other");
    }

    #[test]
    fn restart_rejects_invalid_config() {
        let network = Arc::new(TestNetwork::default());
        let mut nav = navigator(&network);
        let bad = NavigatorConfig {
            clock_hz: 0,
            ..NavigatorConfig::default()
        };
        assert!(matches!(nav.restart(bad), Err(NavError::Config(_))));
    }
}
