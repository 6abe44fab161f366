//! Analytics manager implementation.

use crate::config::{AnalyticsBuilder, Config, DEFAULT_AUTO_FLUSH_INTERVAL};
use crate::session::{IdentityStore, Session};
use crate::state::{ManagerState, ProbeFollowUp, Route, Target, TimerCommand};
use crate::transport::HttpTransport;
use crate::types::{props_to_value, BatchedTracks, Tracking};
use crate::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Name of the event tracked right after a successful `init`.
pub const APP_STARTED_EVENT: &str = "app_started";

/// Vortex analytics manager.
///
/// Events are buffered until the collector's health check answers, then
/// either posted one by one, or collected and posted in batches by the
/// auto-flush timer. A separate manual batch is only sent on
/// [`flush_manual_batch`](Self::flush_manual_batch) or
/// [`shutdown`](Self::shutdown).
///
/// Tracking never fails and never blocks on the network: every request is
/// spawned on the runtime the manager was built on and its outcome is only
/// logged. Clones share the same queues and state.
///
/// # Example
///
/// ```rust,no_run
/// use vortex::AnalyticsManager;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), vortex::Error> {
///     let analytics = AnalyticsManager::builder()
///         .app_version("1.4.2")
///         .build()?;
///
///     analytics.init("tenant_123", "https://in.vortexanalytics.io", "windows");
///     analytics.set_auto_batching(true, Duration::from_secs(10));
///
///     analytics.track_event("level_started", "");
///     analytics.track_event_with_props("level_finished", [("level", "3"), ("deaths", "7")]);
///
///     analytics.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AnalyticsManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    transport: HttpTransport,
    runtime: Handle,
    store: Mutex<Box<dyn IdentityStore>>,
    state: Mutex<ManagerState>,
}

/// Point-in-time view of the manager state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatus {
    pub initialized: bool,
    pub server_checked: bool,
    pub server_alive: bool,
    pub auto_batching: bool,
    pub auto_flush_interval: Duration,
    pub auto_flush_armed: bool,
    pub stopped: bool,
    pub pending_events: usize,
    pub manual_batch_events: usize,
}

impl std::fmt::Debug for AnalyticsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsManager")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl AnalyticsBuilder {
    /// Build the analytics manager.
    pub fn build(self) -> Result<AnalyticsManager, Error> {
        let (config, store, runtime) = self.build_parts()?;
        AnalyticsManager::from_parts(config, store, runtime)
    }
}

impl AnalyticsManager {
    /// Create a new builder.
    pub fn builder() -> AnalyticsBuilder {
        AnalyticsBuilder::new()
    }

    fn from_parts(
        config: Config,
        store: Box<dyn IdentityStore>,
        runtime: Handle,
    ) -> Result<Self, Error> {
        let transport = HttpTransport::new(&config)?;

        let mut state = ManagerState::default();
        if let Some(interval) = config.auto_batching() {
            state.auto_batching = true;
            state.auto_flush_interval = interval;
        }

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                transport,
                runtime,
                store: Mutex::new(store),
                state: Mutex::new(state),
            }),
        })
    }

    /// Get the manager configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get a snapshot of the manager state.
    pub fn status(&self) -> ManagerStatus {
        let state = self.inner.lock();
        ManagerStatus {
            initialized: state.initialized,
            server_checked: state.server_checked,
            server_alive: state.server_alive,
            auto_batching: state.auto_batching,
            auto_flush_interval: state.auto_flush_interval,
            auto_flush_armed: state.is_armed(),
            stopped: state.is_stopped(),
            pending_events: state.queue.len(),
            manual_batch_events: state.queue.manual_len(),
        }
    }

    /// Get the number of events waiting in the auto queue.
    pub fn pending_event_count(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Get the number of events waiting in the manual batch.
    pub fn manual_batch_len(&self) -> usize {
        self.inner.lock().queue.manual_len()
    }

    /// Durable anonymous identity; empty before a successful `init`.
    pub fn identity(&self) -> String {
        self.inner.lock().session.identity.clone()
    }

    /// Session id of this manager; empty before a successful `init`.
    pub fn session_id(&self) -> String {
        self.inner.lock().session.session_id.clone()
    }

    // ============================================
    // LIFECYCLE
    // ============================================

    /// Initialize the manager.
    ///
    /// Does nothing once initialized. When the settings disable tracking for
    /// the current context the target is recorded but nothing else happens,
    /// so a later call may still initialize.
    #[instrument(skip(self, tenant_id, url, platform))]
    pub fn init(
        &self,
        tenant_id: impl Into<String>,
        url: impl Into<String>,
        platform: impl Into<String>,
    ) {
        let inner = &self.inner;
        {
            let mut state = inner.lock();
            if state.initialized || state.is_stopped() {
                return;
            }

            let url: String = url.into();
            state.target = Target {
                tenant_id: tenant_id.into(),
                url: url.trim_end_matches('/').to_string(),
                platform: platform.into(),
            };

            if !inner.config.settings().allows(inner.config.context()) {
                debug!(context = ?inner.config.context(), "tracking disabled by settings");
                return;
            }

            state.initialized = true;
            let mut store = inner.store.lock().unwrap_or_else(PoisonError::into_inner);
            state.session = Session::init(&mut **store, inner.config.app_version());

            info!(
                tenant_id = %state.target.tenant_id,
                session_id = %state.session.session_id,
                app_version = %state.session.app_version,
                "analytics initialized"
            );
        }

        // Queued before the probe is spawned, so it always rides the first batch.
        inner.process_track_event(APP_STARTED_EVENT.to_string(), String::new());
        inner.check_server_availability();
    }

    /// Flush everything still buffered and stop the auto-flush timer.
    ///
    /// Pending events are appended to the manual batch, which is then posted
    /// as one `/batch` request; this call waits for that request, at most
    /// [`Config::shutdown_timeout`], and drops the events if it takes longer.
    /// Afterwards every tracking call is a no-op. Calling it again does
    /// nothing.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let (url, tracks) = {
            let mut state = self.inner.lock();
            if state.is_stopped() {
                return;
            }
            state.stop();
            state.queue.merge_pending_into_manual();
            (state.target.url.clone(), state.queue.take_manual())
        };

        if tracks.is_empty() {
            info!("shut down with nothing to flush");
            return;
        }

        info!(event_count = tracks.len(), "flushing events on shutdown");
        let batch = BatchedTracks::new(tracks);
        let limit = self.inner.config.shutdown_timeout();
        match timeout(limit, self.inner.transport.post_batch(&url, &batch)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    error = %e,
                    event_count = batch.len(),
                    "shutdown flush failed, events dropped"
                );
            }
            Err(_) => {
                warn!(
                    timeout = ?limit,
                    event_count = batch.len(),
                    "shutdown flush timed out, events dropped"
                );
            }
        }
    }

    // ============================================
    // TRACK
    // ============================================

    /// Track an event. `value` is an opaque payload, often a JSON object.
    pub fn track_event(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.process_track_event(name.into(), value.into());
    }

    /// Track an event whose value is a flat JSON object built from `props`.
    pub fn track_event_with_props<I, K, V>(&self, name: impl Into<String>, props: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.track_event(name, props_to_value(props));
    }

    /// Add an event to the manual batch.
    ///
    /// Dropped unless the health check has confirmed the collector is alive.
    pub fn batched_track_event(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut state = self.inner.lock();
        if !state.server_alive || state.is_stopped() {
            return;
        }
        let event = state.create_tracking(name.into(), value.into());
        state.queue.push_manual(event);
    }

    /// Add an event to the manual batch with a flat JSON object value built
    /// from `props`. Same gate as [`batched_track_event`](Self::batched_track_event).
    pub fn batched_track_event_with_props<I, K, V>(&self, name: impl Into<String>, props: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.batched_track_event(name, props_to_value(props));
    }

    /// Post the manual batch now, if the collector is alive and the batch is
    /// not empty.
    pub fn flush_manual_batch(&self) {
        self.inner.post_batch_routine();
    }

    /// Turn timer-driven batching on or off.
    ///
    /// While on, every tracked event is queued and the queue is posted every
    /// `interval`. The timer only runs once the collector is known to be
    /// alive; turning batching on earlier arms it when the health check
    /// succeeds. A zero interval falls back to
    /// [`DEFAULT_AUTO_FLUSH_INTERVAL`].
    pub fn set_auto_batching(&self, enabled: bool, interval: Duration) {
        let interval = if interval.is_zero() {
            warn!("auto-flush interval cannot be zero, using default");
            DEFAULT_AUTO_FLUSH_INTERVAL
        } else {
            interval
        };

        let mut state = self.inner.lock();
        match state.set_auto_batching(enabled, interval) {
            Some(TimerCommand::Arm(period)) => {
                let handle = self.inner.spawn_auto_flush(period);
                state.arm(handle);
                debug!(interval = ?period, "auto-flush armed");
            }
            Some(TimerCommand::Disarm) => state.disarm(),
            None => {}
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process_track_event(self: &Arc<Self>, name: String, value: String) {
        if !self.config.settings().allows(self.config.context()) {
            return;
        }

        let (url, route) = {
            let mut state = self.lock();
            if state.is_stopped() {
                return;
            }
            let event = state.create_tracking(name, value);
            (state.target.url.clone(), state.route(event))
        };

        match route {
            Route::Queued => debug!("event queued"),
            Route::SendNow(event) => self.spawn_post_track(url, event),
        }
    }

    fn check_server_availability(self: &Arc<Self>) {
        let url = self.lock().target.url.clone();
        if url.is_empty() {
            debug!("no collector url, skipping availability check");
            return;
        }

        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let alive = inner.transport.check_health(&url).await;
            inner.on_check_complete(alive);
        });
    }

    fn on_check_complete(self: &Arc<Self>, alive: bool) {
        let mut state = self.lock();
        let follow_up = state.record_probe(alive);
        info!(alive, "collector availability checked");

        match follow_up {
            ProbeFollowUp::ArmTimer(period) => {
                let handle = self.spawn_auto_flush(period);
                state.arm(handle);
            }
            ProbeFollowUp::FlushQueue => {
                // Drained from its own task, not from inside the probe.
                let inner = Arc::clone(self);
                self.runtime.spawn(async move {
                    inner.flush_internal_queue();
                });
            }
            ProbeFollowUp::Nothing => {}
        }
    }

    fn flush_internal_queue(&self) {
        let (url, tracks) = {
            let mut state = self.lock();
            if state.queue.is_empty() {
                return;
            }
            (state.target.url.clone(), state.queue.take_pending())
        };

        debug!(event_count = tracks.len(), "flushing queued events");
        self.spawn_post_batch(url, BatchedTracks::new(tracks));
    }

    fn post_batch_routine(&self) {
        let (url, tracks) = {
            let mut state = self.lock();
            if !state.server_alive || state.queue.manual_len() == 0 {
                return;
            }
            (state.target.url.clone(), state.queue.take_manual())
        };

        debug!(event_count = tracks.len(), "flushing manual batch");
        self.spawn_post_batch(url, BatchedTracks::new(tracks));
    }

    fn spawn_auto_flush(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        self.runtime.spawn(auto_flush_loop(Arc::downgrade(self), period))
    }

    fn spawn_post_track(&self, url: String, event: Tracking) {
        let transport = self.transport.clone();
        self.runtime.spawn(async move {
            if let Err(e) = transport.post_track(&url, &event).await {
                warn!(
                    error = %e,
                    event_name = %event.name(),
                    "track request failed, event dropped"
                );
            }
        });
    }

    fn spawn_post_batch(&self, url: String, batch: BatchedTracks) {
        let transport = self.transport.clone();
        self.runtime.spawn(async move {
            if let Err(e) = transport.post_batch(&url, &batch).await {
                warn!(
                    error = %e,
                    event_count = batch.len(),
                    "batch request failed, events dropped"
                );
            }
        });
    }
}

/// Flush the auto queue every `period`, first one full period after arming.
/// Ends when the manager is dropped or the task is aborted.
async fn auto_flush_loop(inner: Weak<Inner>, period: Duration) {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;

        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.flush_internal_queue();
    }
}
