//! Central state machine coordinating endpoint selection, tunnel lifecycle
//! and routing switches.
//!
//! Structured as a single-threaded coordinator: two timers and a shutdown
//! listener are the only producers of [`Event`], and every mutation of
//! [`RotationState`] plus every [`RoutingSwitcher`] call happens inside
//! [`RotationManager::run`]'s receive loop. This gives the serialization the
//! rotation/emergency paths require without an explicit lock around the
//! whole cycle.

mod state;

pub use state::RotationState;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;

use std::time::{Duration, Instant};

use crate::blacklist::BlacklistRegistry;
use crate::endpoint::{Endpoint, EndpointCatalog};
use crate::probe::{self, ReachabilityProbe};
use crate::rng::{self, Rng};
use crate::routing::{self, RoutingSwitcher};
use crate::tunnel::{self, Slot, SlotState, TunnelController};

#[derive(Debug, Error)]
pub enum Error {
    #[error("fewer than two endpoints available at startup")]
    InsufficientEndpoints,
    #[error("no candidate endpoint available for selection")]
    NoCandidate,
    #[error("no secondary available for emergency switch")]
    SecondaryUnavailable,
    #[error("failed to prepare candidate {0}")]
    PrepareFailed(String),
    #[error(transparent)]
    Tunnel(#[from] tunnel::Error),
    #[error(transparent)]
    Routing(#[from] routing::Error),
}

/// Tuning knobs; defaults match spec §4.7.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub rotation_interval: Duration,
    pub health_check_interval: Duration,
    pub blacklist_ttl: Duration,
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(30 * 60),
            health_check_interval: Duration::from_secs(5 * 60),
            blacklist_ttl: Duration::from_secs(24 * 60 * 60),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

enum Event {
    HealthCheckTick,
    RotationTick,
    Shutdown,
}

pub struct RotationManager {
    catalog: EndpointCatalog,
    blacklist: BlacklistRegistry,
    tunnel: TunnelController,
    probe: Box<dyn ReachabilityProbe>,
    routing: RoutingSwitcher,
    rng: Box<dyn Rng>,
    state: RotationState,
    config: Config,
}

impl RotationManager {
    pub fn new(
        catalog: EndpointCatalog,
        blacklist: BlacklistRegistry,
        tunnel: TunnelController,
        probe: Box<dyn ReachabilityProbe>,
        routing: RoutingSwitcher,
        rng: Box<dyn Rng>,
        config: Config,
    ) -> Self {
        Self {
            catalog,
            blacklist,
            tunnel,
            probe,
            routing,
            rng,
            state: RotationState::new(),
            config,
        }
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    /// Runs startup, then the coordinator loop, until `cancel` fires.
    /// Consumes `self`: the manager's lifetime is the daemon's lifetime.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), Error> {
        self.startup().await?;

        let (tx, mut rx) = mpsc::channel(8);

        spawn_ticker(tx.clone(), self.config.health_check_interval, || Event::HealthCheckTick, cancel.clone());
        spawn_ticker(tx.clone(), self.config.rotation_interval, || Event::RotationTick, cancel.clone());

        let shutdown_tx = tx.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            let _ = shutdown_tx.send(Event::Shutdown).await;
        });
        drop(tx);

        while let Some(event) = rx.recv().await {
            match event {
                Event::HealthCheckTick => self.health_check_cycle().await,
                Event::RotationTick => self.rotation_cycle().await,
                Event::Shutdown => break,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// §4.7.1.
    pub async fn startup(&mut self) -> Result<(), Error> {
        self.routing.setup().await?;

        let now = Instant::now();
        let available = self.blacklist.filter(self.catalog.list(), now);
        if available.len() < 2 {
            tracing::error!(available = available.len(), "insufficient endpoints to start");
            return Err(Error::InsufficientEndpoints);
        }

        let primary = rng::choose(self.rng.as_ref(), &available)
            .cloned()
            .cloned()
            .ok_or(Error::InsufficientEndpoints)?;

        self.tunnel.connect(&primary, Slot::Primary).await?;

        match self.probe.probe(Slot::Primary).await {
            Ok(true) => {}
            _ => {
                tracing::error!(endpoint = %primary.name, "primary endpoint failed reachability probe at startup");
                self.blacklist.add(&primary.name, now);
                let _ = self.tunnel.disconnect(Slot::Primary).await;
                return Err(Error::PrepareFailed(primary.name));
            }
        }

        self.routing.switch_to(Slot::Primary).await?;
        self.state.occupy(Slot::Primary, primary.clone(), SlotState::Up);
        tracing::info!(endpoint = %primary.name, "primary endpoint established");

        if let Err(err) = self.prepare_secondary(now).await {
            tracing::warn!(%err, "prepare-secondary failed during startup, will retry at next health check");
        }

        Ok(())
    }

    /// §4.7.2: uniform random choice over endpoints that are neither
    /// blacklisted nor already occupying a slot.
    fn select_candidate(&self, now: Instant) -> Option<Endpoint> {
        let occupied = self.state.occupied_names();
        let available: Vec<&Endpoint> = self
            .blacklist
            .filter(self.catalog.list(), now)
            .into_iter()
            .filter(|e| !occupied.contains(&e.name.as_str()))
            .collect();
        rng::choose(self.rng.as_ref(), &available).map(|e| (*e).clone())
    }

    /// §4.7.3. Non-fatal to the caller: failures are logged and surfaced as
    /// `PrepareFailed`/`NoCandidate`, never panics or aborts the daemon.
    pub async fn prepare_secondary(&mut self, now: Instant) -> Result<(), Error> {
        let Some(candidate) = self.select_candidate(now) else {
            tracing::warn!("no candidate available to prepare secondary");
            return Err(Error::NoCandidate);
        };

        if let Err(err) = self.tunnel.connect(&candidate, Slot::Secondary).await {
            tracing::warn!(endpoint = %candidate.name, %err, "secondary candidate failed to connect");
            self.blacklist.add(&candidate.name, now);
            let _ = self.tunnel.disconnect(Slot::Secondary).await;
            return Err(Error::PrepareFailed(candidate.name));
        }

        match self.probe.probe(Slot::Secondary).await {
            Ok(true) => {}
            _ => {
                tracing::warn!(endpoint = %candidate.name, "secondary candidate failed reachability probe");
                self.blacklist.add(&candidate.name, now);
                let _ = self.tunnel.disconnect(Slot::Secondary).await;
                return Err(Error::PrepareFailed(candidate.name));
            }
        }

        tracing::info!(endpoint = %candidate.name, "secondary endpoint established");
        self.state.occupy(Slot::Secondary, candidate, SlotState::Up);
        Ok(())
    }

    /// §4.7.4. Failures are logged and the cycle is abandoned; the next
    /// scheduled tick tries again. Exposed publicly so operators can force
    /// an out-of-band rotation (e.g. a CLI subcommand) in addition to the
    /// timer-driven path in [`run`](Self::run).
    pub async fn rotation_cycle(&mut self) {
        if let Err(err) = self.try_rotation_cycle().await {
            tracing::warn!(%err, "planned rotation cycle did not complete");
        }
    }

    async fn try_rotation_cycle(&mut self) -> Result<(), Error> {
        let now = Instant::now();
        if self.state.slot_state(Slot::Primary) != SlotState::Up || self.state.slot_state(Slot::Secondary) != SlotState::Up {
            tracing::warn!("rotation cycle skipped: primary/secondary not both up");
            return Ok(());
        }

        let Some(candidate) = self.select_candidate(now) else {
            tracing::warn!("rotation cycle skipped: no candidate endpoint available");
            return Err(Error::NoCandidate);
        };

        if let Err(err) = self.tunnel.connect(&candidate, Slot::Staging).await {
            tracing::warn!(endpoint = %candidate.name, %err, "rotation candidate failed to connect");
            self.blacklist.add(&candidate.name, now);
            let _ = self.tunnel.disconnect(Slot::Staging).await;
            return Err(Error::PrepareFailed(candidate.name));
        }

        if !matches!(self.probe.probe(Slot::Staging).await, Ok(true)) {
            tracing::warn!(endpoint = %candidate.name, "rotation candidate failed reachability probe");
            self.blacklist.add(&candidate.name, now);
            let _ = self.tunnel.disconnect(Slot::Staging).await;
            return Err(Error::PrepareFailed(candidate.name));
        }

        self.state.occupy(Slot::Staging, candidate.clone(), SlotState::Up);

        // Re-check primary immediately before committing the switch; a
        // failure here cancels the planned cycle in favor of emergency.
        if !matches!(self.probe.probe(Slot::Primary).await, Ok(true)) {
            tracing::warn!(endpoint = %candidate.name, "primary became unhealthy mid-rotation, aborting planned cycle");
            let _ = self.tunnel.disconnect(Slot::Staging).await;
            self.state.clear(Slot::Staging);
            self.handle_primary_unhealthy(now).await;
            return Ok(());
        }

        self.routing.switch_to(Slot::Staging).await?;
        tracing::info!(endpoint = %candidate.name, "routing switched to staging interface for rotation");

        let _ = self.tunnel.disconnect(Slot::Primary).await;
        self.state.clear(Slot::Primary);

        self.tunnel.connect(&candidate, Slot::Primary).await?;
        self.routing.switch_to(Slot::Primary).await?;

        let _ = self.tunnel.disconnect(Slot::Staging).await;
        self.state.clear(Slot::Staging);
        self.state.occupy(Slot::Primary, candidate.clone(), SlotState::Up);

        tracing::info!(endpoint = %candidate.name, "planned rotation complete");
        Ok(())
    }

    /// §4.7.5.
    pub async fn health_check_cycle(&mut self) {
        let now = Instant::now();

        if self.state.slot_state(Slot::Primary) == SlotState::Up && !matches!(self.probe.probe(Slot::Primary).await, Ok(true)) {
            self.handle_primary_unhealthy(now).await;
        }

        if self.state.slot_state(Slot::Secondary) == SlotState::Up && !matches!(self.probe.probe(Slot::Secondary).await, Ok(true)) {
            if let Some(secondary) = self.state.endpoint(Slot::Secondary).cloned() {
                tracing::warn!(endpoint = %secondary.name, "secondary endpoint unhealthy");
                self.blacklist.add(&secondary.name, now);
            }
            let _ = self.tunnel.disconnect(Slot::Secondary).await;
            self.state.clear(Slot::Secondary);
            if let Err(err) = self.prepare_secondary(now).await {
                tracing::warn!(%err, "failed to prepare replacement secondary");
            }
        }
    }

    async fn handle_primary_unhealthy(&mut self, now: Instant) {
        if let Some(primary) = self.state.endpoint(Slot::Primary).cloned() {
            tracing::warn!(endpoint = %primary.name, "primary endpoint unhealthy");
            self.blacklist.add(&primary.name, now);
        }
        if let Err(err) = self.emergency_switch(now).await {
            tracing::error!(%err, "emergency switch failed");
        }
    }

    /// §4.7.6.
    async fn emergency_switch(&mut self, now: Instant) -> Result<(), Error> {
        if self.state.slot_state(Slot::Secondary) != SlotState::Up {
            tracing::error!("emergency switch requested but no secondary is available");
            return Err(Error::SecondaryUnavailable);
        }

        self.routing.switch_to(Slot::Secondary).await?;

        let _ = self.tunnel.disconnect(Slot::Primary).await;
        self.state.clear(Slot::Primary);

        let secondary = self
            .state
            .endpoint(Slot::Secondary)
            .cloned()
            .expect("checked Up above");
        self.state.clear(Slot::Secondary);
        self.state.occupy(Slot::Primary, secondary.clone(), SlotState::Up);

        tracing::warn!(endpoint = %secondary.name, "emergency switch complete, routing now via secondary's interface");

        if let Err(err) = self.prepare_secondary(now).await {
            tracing::warn!(%err, "failed to prepare new secondary after emergency switch");
        }
        Ok(())
    }

    /// §4.7.7.
    pub async fn shutdown(&mut self) {
        tracing::info!("shutting down rotation manager");
        for slot in [Slot::Primary, Slot::Secondary, Slot::Staging] {
            let _ = self.tunnel.disconnect(slot).await;
            self.state.clear(slot);
        }
        if let Err(err) = self.routing.teardown().await {
            tracing::error!(%err, "failed to tear down routing state");
        }
    }
}

fn spawn_ticker(tx: mpsc::Sender<Event>, interval: Duration, make_event: impl Fn() -> Event + Send + 'static, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // the first tick fires immediately; discard it
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if tx.send(make_event()).await.is_err() {
                        return;
                    }
                }
                _ = cancel.cancelled() => return,
            }
        }
    });
}
