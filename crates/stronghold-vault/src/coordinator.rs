//! Health polling loop driving init and unseal
//!
//! The coordinator never gives up on its own: unknown outcomes and failed
//! actions are followed by a sleep and another probe. It returns only when
//! the store is operational or standby, or when a failure cannot be fixed
//! by polling again (missing share file, shares exhausted, local I/O).

use std::time::Duration;

use tracing::{error, info, warn};

use crate::client::SecretStore;
use crate::init::Initializer;
use crate::state::{transition, Action, BootstrapState, Probe};
use crate::unseal::Unsealer;
use crate::Result;

/// How the polling loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Store is initialized, unsealed and active
    Operational,
    /// Store is an unsealed standby node
    Standby,
}

/// Drives the store from any state to operational
pub struct BootstrapCoordinator<'a, S: SecretStore + ?Sized> {
    store: &'a S,
    initializer: Initializer,
    unsealer: Unsealer,
    interval: Duration,
    state: BootstrapState,
}

impl<'a, S: SecretStore + ?Sized> BootstrapCoordinator<'a, S> {
    /// Coordinator polling `store` every `interval`
    pub fn new(
        store: &'a S,
        initializer: Initializer,
        unsealer: Unsealer,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            initializer,
            unsealer,
            interval,
            state: BootstrapState::Unknown,
        }
    }

    /// Current state
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    async fn probe(&self) -> Probe {
        match self.store.health().await {
            Ok(response) => {
                info!(status = response.status, "health check");
                Probe::Status(response.status)
            }
            Err(e) => {
                error!(error = %e, "health check failed");
                Probe::Unreachable
            }
        }
    }

    fn enter(&mut self, next: BootstrapState) {
        if self.state.is_regression_to(next) {
            warn!(from = %self.state, to = %next, "secret store state went backwards");
        }
        self.state = next;
    }

    /// Poll until the store is operational or standby
    pub async fn run(&mut self) -> Result<BootstrapOutcome> {
        loop {
            let probe = self.probe().await;
            let (next, action) = transition(self.state, probe);
            self.enter(next);

            match action {
                Action::Proceed => {
                    info!("secret store is initialized and unsealed");
                    return Ok(BootstrapOutcome::Operational);
                }
                Action::Stop => {
                    warn!("secret store is unsealed and in standby mode");
                    return Ok(BootstrapOutcome::Standby);
                }
                Action::Initialize => {
                    info!("secret store is not initialized");
                    self.enter(BootstrapState::Initializing);
                    if let Err(e) = self.initializer.initialize(self.store).await {
                        if !e.is_recoverable() {
                            return Err(e);
                        }
                        error!(error = %e, "initialization failed");
                        self.enter(BootstrapState::Error);
                    }
                }
                Action::Unseal => {
                    info!("secret store is sealed");
                    self.enter(BootstrapState::Unsealing);
                    if let Err(e) = self.unsealer.unseal(self.store).await {
                        if !e.is_recoverable() {
                            return Err(e);
                        }
                        error!(error = %e, "unseal failed");
                        self.enter(BootstrapState::Error);
                    }
                }
                Action::Wait => {
                    warn!(state = %self.state, ?probe, "secret store is in an unknown state");
                }
            }

            info!(
                wait_secs = self.interval.as_secs(),
                "next secret store check scheduled"
            );
            tokio::time::sleep(self.interval).await;
        }
    }
}
