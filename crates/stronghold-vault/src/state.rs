//! Bootstrap state machine
//!
//! Every polling cycle classifies the health probe into exactly one outcome.
//! [`transition`] is pure: given the current state and the probe it returns
//! the next state and the action the coordinator must take.
//!
//! | probe          | next state        | action     |
//! |----------------|-------------------|------------|
//! | 200            | Operational       | Proceed    |
//! | 429            | StandbyUnsealed   | Stop       |
//! | 501            | Uninitialized     | Initialize |
//! | 503            | SealedWithShares  | Unseal     |
//! | other/no reply | unchanged         | Wait       |

use std::fmt;

/// Health status: initialized, unsealed, active
pub const STATUS_ACTIVE: u16 = 200;
/// Health status: unsealed standby node
pub const STATUS_STANDBY: u16 = 429;
/// Health status: not initialized
pub const STATUS_UNINITIALIZED: u16 = 501;
/// Health status: sealed
pub const STATUS_SEALED: u16 = 503;

/// Where the store is in its bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapState {
    /// Nothing observed yet
    Unknown,
    /// Store reported it has never been initialized
    Uninitialized,
    /// Init request in flight
    Initializing,
    /// Store is initialized and sealed
    SealedWithShares,
    /// Unseal shares being submitted
    Unsealing,
    /// Store is unsealed and active
    Operational,
    /// Store is unsealed but another node is active
    StandbyUnsealed,
    /// The last action failed; the next probe decides what happens
    Error,
}

impl BootstrapState {
    /// Position along the bootstrap path, `None` for states off the path
    fn rank(self) -> Option<u8> {
        match self {
            BootstrapState::Unknown | BootstrapState::Error => None,
            BootstrapState::Uninitialized => Some(1),
            BootstrapState::Initializing => Some(2),
            BootstrapState::SealedWithShares => Some(3),
            BootstrapState::Unsealing => Some(4),
            BootstrapState::Operational | BootstrapState::StandbyUnsealed => Some(5),
        }
    }

    /// Whether moving from `self` to `next` goes backwards
    ///
    /// Unknown and Error never count: the first probe and the probe after a
    /// failed action may land anywhere.
    pub fn is_regression_to(self, next: BootstrapState) -> bool {
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to < from,
            _ => false,
        }
    }

    /// Whether the coordinator stops polling in this state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BootstrapState::Operational | BootstrapState::StandbyUnsealed
        )
    }
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapState::Unknown => "unknown",
            BootstrapState::Uninitialized => "uninitialized",
            BootstrapState::Initializing => "initializing",
            BootstrapState::SealedWithShares => "sealed",
            BootstrapState::Unsealing => "unsealing",
            BootstrapState::Operational => "operational",
            BootstrapState::StandbyUnsealed => "standby",
            BootstrapState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Result of one health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The store answered with this status
    Status(u16),
    /// No HTTP response (timeout, refused, TLS failure)
    Unreachable,
}

/// What the coordinator does after a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Store is operational: provisioning may start
    Proceed,
    /// Store is a standby node: stop without further action
    Stop,
    /// Submit the init request
    Initialize,
    /// Submit unseal shares
    Unseal,
    /// Nothing to do this cycle
    Wait,
}

/// Next state and action for a probe
pub fn transition(state: BootstrapState, probe: Probe) -> (BootstrapState, Action) {
    match probe {
        Probe::Status(STATUS_ACTIVE) => (BootstrapState::Operational, Action::Proceed),
        Probe::Status(STATUS_STANDBY) => (BootstrapState::StandbyUnsealed, Action::Stop),
        Probe::Status(STATUS_UNINITIALIZED) => (BootstrapState::Uninitialized, Action::Initialize),
        Probe::Status(STATUS_SEALED) => (BootstrapState::SealedWithShares, Action::Unseal),
        Probe::Status(_) | Probe::Unreachable => (state, Action::Wait),
    }
}
