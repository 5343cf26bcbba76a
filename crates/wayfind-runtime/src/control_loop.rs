//! Fixed-rate control thread driving a [`Navigator`].
//!
//! Each tick pulls a [`TickInput`] from a frame source, runs
//! [`Navigator::forward`] and hands the resulting [`DrivingState`] to a sink.
//! A tick without input (source returned `None`) is skipped.  Perception
//! errors are logged and nothing is published for that tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, warn};
use wayfind_types::{Frame, Intention};

use crate::navigator::Navigator;
use crate::output::DrivingState;

/// One tick worth of inbound data.
#[derive(Debug, Clone, PartialEq)]
pub struct TickInput {
    pub frame: Frame,
    pub intention: Intention,
    /// Route to localize on; `None` closes the current route.
    pub route: Option<String>,
}

impl TickInput {
    /// Build an input from a raw intention token, falling back to
    /// [`Intention::Ahead`] for an unknown token.
    pub fn from_token(frame: Frame, token: &str, route: Option<String>) -> Self {
        let intention = token.parse().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to intersection.ahead");
            Intention::Ahead
        });
        Self {
            frame,
            intention,
            route,
        }
    }
}

/// Handle of a running control thread.
pub struct ControlLoop {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<Navigator>>,
}

impl ControlLoop {
    /// Spawn the `wayfind-control` thread running `navigator` at the rate of
    /// its config.
    pub fn spawn<S, K>(mut navigator: Navigator, mut source: S, mut sink: K) -> std::io::Result<Self>
    where
        S: FnMut() -> Option<TickInput> + Send + 'static,
        K: FnMut(DrivingState) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let period = navigator.config().tick_period();

        let handle = thread::Builder::new()
            .name("wayfind-control".to_string())
            .spawn(move || {
                info!(period_ms = period.as_millis() as u64, "control loop started");
                let mut overrun_count: u64 = 0;

                while !flag.load(Ordering::Relaxed) {
                    let tick_start = Instant::now();

                    if let Some(input) = source() {
                        match navigator.forward(&input.frame, input.intention, input.route.as_deref()) {
                            Ok(output) => sink(DrivingState::from_output(&output)),
                            Err(e) => warn!(error = %e, "control tick failed"),
                        }
                    } else {
                        debug!("no frame available");
                    }

                    let tick_duration = tick_start.elapsed();
                    if tick_duration > period {
                        overrun_count += 1;
                        if overrun_count % 10 == 1 {
                            warn!(
                                tick_ms = tick_duration.as_secs_f32() * 1000.0,
                                target_ms = period.as_secs_f32() * 1000.0,
                                overruns = overrun_count,
                                "control loop overrun"
                            );
                        }
                    }
                    thread::sleep(period.saturating_sub(tick_duration));
                }

                navigator.shutdown();
                info!("control loop stopped");
                navigator
            })?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Flag that stops the loop when set.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and hand back the (shut down) navigator.  Returns
    /// `None` if the control thread panicked.
    pub fn stop(mut self) -> Option<Navigator> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> Option<Navigator> {
        self.shutdown.store(true, Ordering::Relaxed);
        let handle = self.handle.take()?;
        handle.join().map_err(|_| error!("control thread panicked")).ok()
    }
}

impl Drop for ControlLoop {
    fn drop(&mut self) {
        self.stop_inner();
    }
}
