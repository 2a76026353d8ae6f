// src/trigger/shell.rs

//! Trigger gate shared by every node and worker bound to one trigger.
//!
//! Nodes declare at build time that they expect to be triggered
//! ([`TriggerShell::register_trigger_it`]). The underlying source is armed only
//! once that many clients called [`TriggerShell::start`], and disarmed when
//! the last client stopped.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::plugin::Trigger;
use crate::tree::dispatch::WorkerId;
use crate::tree::NodeIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerId(pub usize);

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger#{}", self.0)
    }
}

/// Something the trigger re-runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerClient {
    Node(NodeIndex),
    Worker(WorkerId),
}

#[derive(Debug, Clone)]
pub enum TriggerSource {
    /// Externally clocked plugin (interval, file watch, ...).
    Plugin {
        plugin: String,
        trigger: Arc<dyn Trigger>,
        parameters: String,
    },
    /// Fires when `reference` dispatches one of `events`.
    Events {
        events: BTreeSet<String>,
        reference: String,
        target: Option<NodeIndex>,
    },
}

/// Outcome of a start/stop call on the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateChange {
    Unchanged,
    Armed,
    Disarmed,
}

#[derive(Debug, Clone)]
pub struct TriggerShell {
    pub name: String,
    /// Job that declared the trigger.
    pub job: String,
    pub source: TriggerSource,
    expected: usize,
    clients: BTreeSet<TriggerClient>,
    armed: bool,
}

impl TriggerShell {
    pub fn new(name: impl Into<String>, job: impl Into<String>, source: TriggerSource) -> Self {
        Self {
            name: name.into(),
            job: job.into(),
            source,
            expected: 0,
            clients: BTreeSet::new(),
            armed: false,
        }
    }

    /// Declare one more client that will call `start`.
    pub fn register_trigger_it(&mut self) {
        self.expected += 1;
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_event_sourced(&self) -> bool {
        matches!(self.source, TriggerSource::Events { .. })
    }

    pub fn clients(&self) -> impl Iterator<Item = TriggerClient> + '_ {
        self.clients.iter().copied()
    }

    pub fn has_client(&self, client: TriggerClient) -> bool {
        self.clients.contains(&client)
    }

    pub fn start(&mut self, client: TriggerClient) -> GateChange {
        self.clients.insert(client);
        if !self.armed && self.clients.len() >= self.expected.max(1) {
            self.armed = true;
            return GateChange::Armed;
        }
        GateChange::Unchanged
    }

    pub fn stop(&mut self, client: TriggerClient) -> GateChange {
        self.clients.remove(&client);
        if self.armed && self.clients.is_empty() {
            self.armed = false;
            return GateChange::Disarmed;
        }
        GateChange::Unchanged
    }

    /// Whether a dispatch of `name` by `sender` fires this (event-sourced) trigger.
    pub fn listens(&self, name: &str, sender: NodeIndex) -> bool {
        match &self.source {
            TriggerSource::Events { events, target, .. } => {
                self.armed && *target == Some(sender) && events.contains(name)
            }
            TriggerSource::Plugin { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_shell(expected: usize) -> TriggerShell {
        let mut shell = TriggerShell::new(
            "on_false",
            "Main",
            TriggerSource::Events {
                events: ["LastNotNullLogicalToFalse".to_string()].into(),
                reference: "db".into(),
                target: Some(NodeIndex(3)),
            },
        );
        for _ in 0..expected {
            shell.register_trigger_it();
        }
        shell
    }

    #[test]
    fn arms_only_after_all_declared_clients_started() {
        let mut shell = event_shell(2);
        assert_eq!(shell.start(TriggerClient::Node(NodeIndex(1))), GateChange::Unchanged);
        assert!(!shell.is_armed());
        // Starting the same client twice does not count twice.
        assert_eq!(shell.start(TriggerClient::Node(NodeIndex(1))), GateChange::Unchanged);
        assert_eq!(shell.start(TriggerClient::Node(NodeIndex(2))), GateChange::Armed);
        assert!(shell.is_armed());
    }

    #[test]
    fn stays_armed_while_any_client_remains() {
        let mut shell = event_shell(2);
        shell.start(TriggerClient::Node(NodeIndex(1)));
        shell.start(TriggerClient::Node(NodeIndex(2)));

        assert_eq!(shell.stop(TriggerClient::Node(NodeIndex(1))), GateChange::Unchanged);
        assert!(shell.is_armed());
        assert_eq!(shell.stop(TriggerClient::Node(NodeIndex(2))), GateChange::Disarmed);
        assert!(!shell.is_armed());
    }

    #[test]
    fn event_source_matches_name_and_sender() {
        let mut shell = event_shell(1);
        assert!(!shell.listens("LastNotNullLogicalToFalse", NodeIndex(3)));
        shell.start(TriggerClient::Node(NodeIndex(1)));
        assert!(shell.listens("LastNotNullLogicalToFalse", NodeIndex(3)));
        assert!(!shell.listens("LastNotNullLogicalToTrue", NodeIndex(3)));
        assert!(!shell.listens("LastNotNullLogicalToFalse", NodeIndex(4)));
    }
}
