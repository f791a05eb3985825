use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use super::ReplenishHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(Uuid);

impl ContainerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ContainerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ContainerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Network coordinates of a sandbox, exactly as handed out at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Compile,
    Execute,
    Test,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Compile => "compile",
            Purpose::Execute => "execute",
            Purpose::Test => "test",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerState {
    Provisioned,
    CheckedOut,
    Running,
    Completed,
    Failed,
    Destroyed,
}

impl ContainerState {
    pub fn can_transition_to(&self, target: &ContainerState) -> bool {
        match (self, target) {
            (ContainerState::Provisioned, ContainerState::CheckedOut) => true,

            (ContainerState::CheckedOut, ContainerState::Running) => true,
            // Staging failed or the lease expired before the action started
            (ContainerState::CheckedOut, ContainerState::Failed) => true,
            (ContainerState::CheckedOut, ContainerState::Destroyed) => true,

            (ContainerState::Running, ContainerState::Completed) => true,
            (ContainerState::Running, ContainerState::Failed) => true,

            (ContainerState::Completed, ContainerState::Destroyed) => true,
            (ContainerState::Failed, ContainerState::Destroyed) => true,

            // Nothing leads back to Provisioned for the same identity
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContainerState::Destroyed)
    }
}

/// A provisioned sandbox waiting in the pool. This is the only kind of
/// handle the pool will accept.
#[derive(Debug)]
pub struct IdleContainer {
    id: ContainerId,
    endpoint: Endpoint,
    provisioned_at: DateTime<Utc>,
}

impl IdleContainer {
    pub fn new(id: ContainerId, endpoint: Endpoint) -> Self {
        Self {
            id,
            endpoint,
            provisioned_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn provisioned_at(&self) -> DateTime<Utc> {
        self.provisioned_at
    }

    /// Consumes the idle handle. There is no conversion in the other direction.
    pub fn check_out(self, purpose: Purpose) -> CheckedOutContainer {
        CheckedOutContainer {
            id: self.id,
            endpoint: self.endpoint,
            purpose,
            state: ContainerState::CheckedOut,
            checked_out_at: Utc::now(),
            on_drop: None,
        }
    }
}

/// A sandbox exclusively owned by one request. Not `Clone`: it is consumed by
/// the replenisher, which destroys it.
///
/// With [`replace_on_drop`](Self::replace_on_drop) set, a handle dropped before
/// it reaches the replenisher or the pool (a cancelled request, for one)
/// schedules its own replacement.
#[derive(Debug)]
pub struct CheckedOutContainer {
    id: ContainerId,
    endpoint: Endpoint,
    purpose: Purpose,
    state: ContainerState,
    checked_out_at: DateTime<Utc>,
    on_drop: Option<ReplenishHandle>,
}

impl CheckedOutContainer {
    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn checked_out_at(&self) -> DateTime<Utc> {
        self.checked_out_at
    }

    pub fn mark_running(&mut self) {
        self.transition(ContainerState::Running);
    }

    pub fn mark_completed(&mut self) {
        self.transition(ContainerState::Completed);
    }

    pub fn mark_failed(&mut self) {
        self.transition(ContainerState::Failed);
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.transition(ContainerState::Destroyed);
    }

    pub fn replace_on_drop(&mut self, replenisher: ReplenishHandle) {
        self.on_drop = Some(replenisher);
    }

    /// Called once the container has been handed over for replacement.
    pub(super) fn disarm(&mut self) {
        self.on_drop = None;
    }

    /// A stand-in carrying this container's identity, to be scheduled in its
    /// place. The run is over either way, so anything unfinished is failed.
    fn abandoned(&self) -> CheckedOutContainer {
        let state = match self.state {
            ContainerState::Completed => ContainerState::Completed,
            _ => ContainerState::Failed,
        };
        CheckedOutContainer {
            id: self.id,
            endpoint: self.endpoint,
            purpose: self.purpose,
            state,
            checked_out_at: self.checked_out_at,
            on_drop: None,
        }
    }

    fn transition(&mut self, target: ContainerState) {
        if self.state == target {
            return;
        }
        if self.state.can_transition_to(&target) {
            self.state = target;
        } else {
            warn!(
                container = %self.id,
                from = ?self.state,
                to = ?target,
                "Ignoring invalid container state transition"
            );
        }
    }
}

impl Drop for CheckedOutContainer {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        match self.on_drop.take() {
            Some(replenisher) => {
                warn!(
                    container = %self.id,
                    state = ?self.state,
                    "Checked-out container abandoned mid-request, scheduling replacement"
                );
                replenisher.schedule(self.abandoned());
            }
            None => warn!(
                container = %self.id,
                state = ?self.state,
                "Checked-out container dropped without being destroyed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn idle() -> IdleContainer {
        IdleContainer::new(
            ContainerId::new(),
            Endpoint {
                ip: IpAddr::V4(Ipv4Addr::new(172, 17, 0, 2)),
                port: 8080,
            },
        )
    }

    #[test]
    fn check_out_keeps_identity_and_coordinates() {
        let container = idle();
        let id = container.id();
        let endpoint = container.endpoint();

        let mut checked = container.check_out(Purpose::Compile);
        assert_eq!(checked.id(), id);
        assert_eq!(checked.endpoint(), endpoint);
        assert_eq!(checked.state(), ContainerState::CheckedOut);
        checked.mark_destroyed();
    }

    #[test]
    fn destroyed_is_the_only_exit_from_a_finished_run() {
        let mut checked = idle().check_out(Purpose::Execute);
        checked.mark_running();
        checked.mark_completed();
        assert_eq!(checked.state(), ContainerState::Completed);

        // Completed cannot go back to running
        checked.mark_running();
        assert_eq!(checked.state(), ContainerState::Completed);

        checked.mark_destroyed();
        assert_eq!(checked.state(), ContainerState::Destroyed);
    }

    #[test]
    fn no_transition_returns_to_provisioned() {
        for state in [
            ContainerState::CheckedOut,
            ContainerState::Running,
            ContainerState::Completed,
            ContainerState::Failed,
            ContainerState::Destroyed,
        ] {
            assert!(!state.can_transition_to(&ContainerState::Provisioned));
        }
    }

    #[test]
    fn endpoint_display_brackets_ipv6() {
        let endpoint = Endpoint {
            ip: "::1".parse().unwrap(),
            port: 9000,
        };
        assert_eq!(endpoint.to_string(), "[::1]:9000");
    }
}
