//! Exclusive-resource inference scheduler.
//!
//! A fixed set of named worker slots share one constrained accelerator.
//! Loading or running two heavyweight workers on it at once makes them
//! collide, so the [`Scheduler`] serializes their lifecycles:
//!
//! - slots that declare an exclusive claim must hold the accelerator
//!   reservation while `Loading` or `Busy`, so at most one of them is ever in
//!   those states;
//! - heavy slots start only after light slots have finished loading;
//! - [`Scheduler::suspend_all`] tears everything down and
//!   [`Scheduler::restore`] brings it back in the same staged order, giving
//!   up cleanly if another teardown supersedes it.
//!
//! ```text
//! Unloaded ──► Loading ──► Ready ◄──► Busy
//!     ▲           │          │ ▲
//!     │           ▼          ▼ │
//!     └──────── Error      Paused
//! ```

mod controller;
mod reservation;
mod worker;

pub use controller::{RestoreOutcome, Scheduler};
pub use reservation::{Accelerator, Lease};
pub use worker::{LoadReporter, Worker, WorkerLoader};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Named worker roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotName {
    /// Speech-to-text.
    Transcription,
    /// Zero-shot classification and text generation.
    Agents,
    /// Image captioning.
    Vision,
    /// Embedding for indexing and retrieval.
    Retrieval,
}

impl SlotName {
    pub const ALL: [SlotName; 4] = [
        SlotName::Transcription,
        SlotName::Agents,
        SlotName::Vision,
        SlotName::Retrieval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotName::Transcription => "transcription",
            SlotName::Agents => "agents",
            SlotName::Vision => "vision",
            SlotName::Retrieval => "retrieval",
        }
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SlotName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transcription" | "asr" => Ok(SlotName::Transcription),
            "agents" | "generation" => Ok(SlotName::Agents),
            "vision" => Ok(SlotName::Vision),
            "retrieval" | "embedding" => Ok(SlotName::Retrieval),
            _ => Err(format!("Unknown worker slot: {}", s)),
        }
    }
}

/// Lifecycle state of a worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Unloaded,
    Loading,
    Ready,
    Busy,
    /// Loaded, but held back while a higher-priority slot owns the accelerator.
    Paused,
    Error,
}

impl SlotState {
    /// Whether the slot currently has a live worker handle.
    pub fn is_loaded(&self) -> bool {
        matches!(self, SlotState::Ready | SlotState::Busy | SlotState::Paused)
    }

    /// Whether the slot is doing accelerator work.
    pub fn is_active(&self) -> bool {
        matches!(self, SlotState::Loading | SlotState::Busy)
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotState::Unloaded => "unloaded",
            SlotState::Loading => "loading",
            SlotState::Ready => "ready",
            SlotState::Busy => "busy",
            SlotState::Paused => "paused",
            SlotState::Error => "error",
        };
        f.write_str(s)
    }
}

/// How much accelerator initialization a slot needs. Light slots start first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotWeight {
    Light,
    Heavy,
}

/// Static description of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub name: SlotName,
    /// Needs sole use of the accelerator while loading or running.
    pub exclusive: bool,
    pub weight: SlotWeight,
    /// Higher values preempt lower ones when reserving the accelerator.
    pub priority: u8,
    /// Started by [`Scheduler::start_all`].
    pub autostart: bool,
}

impl SlotSpec {
    pub fn new(name: SlotName, exclusive: bool, weight: SlotWeight, priority: u8) -> Self {
        Self {
            name,
            exclusive,
            weight,
            priority,
            autostart: true,
        }
    }

    /// The default slot table: speech loads first, the generator and vision
    /// models are heavy, and the embedder runs off-accelerator.
    pub fn defaults() -> Vec<SlotSpec> {
        vec![
            SlotSpec::new(SlotName::Transcription, true, SlotWeight::Light, 1),
            SlotSpec::new(SlotName::Agents, true, SlotWeight::Heavy, 2),
            SlotSpec::new(SlotName::Vision, true, SlotWeight::Heavy, 3),
            SlotSpec::new(SlotName::Retrieval, false, SlotWeight::Light, 0),
        ]
    }
}

/// Tunables for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on waiting for the accelerator to become quiescent.
    pub quiescence_timeout: Duration,
    /// Extra wait after light slots are ready before a heavy slot loads.
    pub settle_delay: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quiescence_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(500),
            event_capacity: 256,
        }
    }
}

/// A recorded state change.
#[derive(Debug, Clone)]
pub struct SlotTransition {
    /// Global, strictly increasing sequence number.
    pub seq: u64,
    pub slot: SlotName,
    pub from: SlotState,
    pub to: SlotState,
    pub at: Instant,
    pub detail: Option<String>,
}

/// Notifications published by the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    Transition(SlotTransition),
    /// Progress reported by a worker while it loads.
    LoadProgress {
        slot: SlotName,
        stage: String,
        done: u64,
        total: u64,
    },
}

/// Point-in-time view of a slot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotStatus {
    pub name: SlotName,
    pub state: SlotState,
    pub exclusive: bool,
    pub weight: SlotWeight,
    pub priority: u8,
    pub holds_accelerator: bool,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_name_parsing() {
        assert_eq!("ASR".parse::<SlotName>().unwrap(), SlotName::Transcription);
        assert_eq!("retrieval".parse::<SlotName>().unwrap(), SlotName::Retrieval);
        assert!("gpu".parse::<SlotName>().is_err());
        assert_eq!(SlotName::Agents.to_string(), "agents");
    }

    #[test]
    fn test_default_specs_cover_every_slot() {
        let specs = SlotSpec::defaults();
        for name in SlotName::ALL {
            assert!(specs.iter().any(|s| s.name == name));
        }
        assert!(!specs
            .iter()
            .find(|s| s.name == SlotName::Retrieval)
            .unwrap()
            .exclusive);
    }

    #[test]
    fn test_state_predicates() {
        assert!(SlotState::Paused.is_loaded());
        assert!(!SlotState::Loading.is_loaded());
        assert!(SlotState::Loading.is_active());
        assert!(!SlotState::Error.is_active());
    }
}
