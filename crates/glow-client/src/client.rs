//! Main Glow client implementation

use dashmap::DashMap;
use glow_core::{Action, Brightness, DeviceState, DimmingTime};
use glow_transport::{Connection, Connector, TransportError};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::builder::GlowBuilder;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::session::{Exchange, Link, Outcome, Request};

/// State observer callback type
pub type StateObserver = Box<dyn Fn(&DeviceState) + Send + Sync>;

/// Handle returned by [`Glow::register_observer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Result of a state query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateSnapshot {
    /// The device answered; state reflects its report
    Fresh(DeviceState),
    /// No state response in time; state is the last known one
    Stale(DeviceState),
}

impl StateSnapshot {
    pub fn is_fresh(&self) -> bool {
        matches!(self, StateSnapshot::Fresh(_))
    }

    pub fn state(&self) -> &DeviceState {
        match self {
            StateSnapshot::Fresh(state) | StateSnapshot::Stale(state) => state,
        }
    }

    pub fn into_state(self) -> DeviceState {
        match self {
            StateSnapshot::Fresh(state) | StateSnapshot::Stale(state) => state,
        }
    }
}

/// Client for one Glow light
///
/// Each operation is one complete exchange: connect, handshake, write,
/// optionally wait for state, disconnect. Exchanges on one client never
/// overlap.
pub struct Glow {
    config: ClientConfig,

    /// Opens a connection per exchange when no external one is set
    connector: Option<Arc<dyn Connector>>,

    /// Caller-owned connection; never disconnected by the client
    connection: RwLock<Option<Arc<dyn Connection>>>,

    /// Last known device state
    state: RwLock<DeviceState>,

    /// State observers
    observers: DashMap<ObserverId, StateObserver>,

    /// Observer ID counter
    next_observer_id: AtomicU64,

    /// Serializes exchanges
    exchange_lock: Mutex<()>,
}

impl Glow {
    pub(crate) fn new(
        config: ClientConfig,
        connector: Option<Arc<dyn Connector>>,
        connection: Option<Arc<dyn Connection>>,
    ) -> Self {
        Self {
            config,
            connector,
            connection: RwLock::new(connection),
            state: RwLock::new(DeviceState::new()),
            observers: DashMap::new(),
            next_observer_id: AtomicU64::new(1),
            exchange_lock: Mutex::new(()),
        }
    }

    /// Create a builder
    pub fn builder() -> GlowBuilder {
        GlowBuilder::new()
    }

    /// Client that opens its own connection for each exchange
    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Self::new(ClientConfig::default(), Some(Arc::new(connector)), None)
    }

    /// Client that runs every exchange on `connection` and leaves it open
    pub fn with_connection(connection: Arc<dyn Connection>) -> Self {
        Self::new(ClientConfig::default(), None, Some(connection))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Snapshot of the last known state
    pub fn state(&self) -> DeviceState {
        self.state.read().clone()
    }

    /// Power state, if known
    pub fn is_on(&self) -> Option<bool> {
        self.state.read().is_on
    }

    /// Replace (or clear) the external connection used for later exchanges
    pub fn set_connection(&self, connection: Option<Arc<dyn Connection>>) {
        *self.connection.write() = connection;
    }

    // ------------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------------

    /// Call `observer` after every successful state change
    ///
    /// Observers run synchronously on the task that performed the operation
    /// and must not register or unregister observers themselves.
    pub fn register_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&DeviceState) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer_id.fetch_add(1, Ordering::SeqCst));
        self.observers.insert(id, Box::new(observer));
        debug!("Registered {}", id);
        id
    }

    /// Remove an observer. `false` if it was not registered.
    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    fn notify_observers(&self, state: &DeviceState) {
        for entry in self.observers.iter() {
            (entry.value())(state);
        }
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Turn the light on, then optionally set its brightness
    ///
    /// Brightness is a second, independent exchange: if it fails the light
    /// is still on.
    pub async fn turn_on(&self, brightness: Option<Brightness>) -> Result<()> {
        self.command(|_| Ok(Action::TurnOn), |state| state.is_on = Some(true))
            .await?;

        if let Some(brightness) = brightness {
            self.set_brightness(brightness).await?;
        }
        Ok(())
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.command(
            |_| Ok(Action::TurnOff),
            |state| {
                state.is_on = Some(false);
                state.remaining_minutes = Some(0);
                state.is_paused = Some(false);
            },
        )
        .await
    }

    /// Pause the dimming countdown
    pub async fn pause(&self) -> Result<()> {
        self.command(|_| Ok(Action::Pause), |state| state.is_paused = Some(true))
            .await
    }

    /// Resume the dimming countdown
    pub async fn resume(&self) -> Result<()> {
        self.command(|_| Ok(Action::Resume), |state| state.is_paused = Some(false))
            .await
    }

    /// Set brightness, keeping the configured dimming duration
    ///
    /// Falls back to the default duration when none is known. The remaining
    /// countdown is never used here.
    pub async fn set_brightness(&self, brightness: Brightness) -> Result<()> {
        self.command(
            |state| {
                let dimming_minutes = state
                    .configured_minutes
                    .filter(|minutes| *minutes > 0)
                    .unwrap_or_else(|| DimmingTime::DEFAULT.minutes());
                Ok(Action::SetBrightness {
                    brightness,
                    dimming_minutes,
                })
            },
            |state| state.brightness = Some(brightness),
        )
        .await
    }

    /// Set the dimming duration at the current brightness
    ///
    /// The device takes both in one command, so the brightness must already
    /// be known locally.
    pub async fn set_dimming_time(&self, dimming: DimmingTime) -> Result<()> {
        self.command(
            |state| {
                let brightness = state.brightness.ok_or_else(|| {
                    ClientError::InvalidArgument(
                        "brightness unknown; set brightness before the dimming time".into(),
                    )
                })?;
                Ok(Action::SetBrightness {
                    brightness,
                    dimming_minutes: dimming.minutes(),
                })
            },
            |state| state.configured_minutes = Some(dimming.minutes()),
        )
        .await
    }

    /// Ask the device for its state
    ///
    /// A missing state response is not an error: the result is
    /// [`StateSnapshot::Stale`] with the last known state.
    pub async fn query_state(&self) -> Result<StateSnapshot> {
        let _guard = self.exchange_lock.lock().await;

        let outcome = self.exchange(Request::Query).await?;
        let fresh = outcome.fresh;
        let state = self.commit(outcome, |_| {});

        if fresh {
            Ok(StateSnapshot::Fresh(state))
        } else {
            Ok(StateSnapshot::Stale(state))
        }
    }

    /// Connect and wait for the ready marker without sending a command
    pub async fn handshake(&self) -> Result<()> {
        let _guard = self.exchange_lock.lock().await;
        self.exchange(Request::Handshake).await?;
        info!("Handshake succeeded");
        Ok(())
    }

    /// Run one command exchange and commit its effect
    ///
    /// `build` sees the current state and may refuse before anything is
    /// written. `effect` is applied after the device accepted the command.
    async fn command<B, E>(&self, build: B, effect: E) -> Result<()>
    where
        B: FnOnce(&DeviceState) -> Result<Action>,
        E: FnOnce(&mut DeviceState),
    {
        let _guard = self.exchange_lock.lock().await;

        let action = {
            let state = self.state.read();
            build(&*state)?
        };
        info!("Sending {}", action.name());

        let outcome = self.exchange(Request::Command(action.body())).await?;
        self.commit(outcome, effect);
        Ok(())
    }

    /// Install the staged state, apply `effect`, notify observers
    fn commit(&self, outcome: Outcome, effect: impl FnOnce(&mut DeviceState)) -> DeviceState {
        let snapshot = {
            let mut state = self.state.write();
            *state = outcome.state;
            effect(&mut *state);
            state.clone()
        };
        self.notify_observers(&snapshot);
        snapshot
    }

    /// Caller holds `exchange_lock`
    async fn exchange(&self, request: Request) -> Result<Outcome> {
        let link = self.link().await?;
        let base = self.state();

        let result = Exchange::new(link, &self.config, base).run(request).await;
        if let Err(e) = &result {
            warn!("Exchange failed: {}", e);
        }
        result
    }

    async fn link(&self) -> Result<Link> {
        let external = self.connection.read().clone();
        if let Some(connection) = external {
            return Ok(Link::External(connection));
        }

        match &self.connector {
            Some(connector) => Ok(Link::Owned(connector.connect().await?)),
            None => Err(TransportError::NotConnected.into()),
        }
    }
}
