// Copyright 2026 Formscout Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress event types and broadcast channel for discovery telemetry.
//!
//! The orchestrator emits `ProgressEvent`s during a run, which flow through
//! a `tokio::sync::broadcast` channel to all subscribers (CLI, callers'
//! dashboards). When no subscriber exists, events are silently dropped.

use crate::discovery::types::{PaymentStopReason, PrereqStatus, StopReason};
use serde::{Deserialize, Serialize};

/// A progress event emitted during a discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// A discovery phase has started.
    PhaseStarted { phase: DiscoveryPhase },
    /// One prerequisite gate was checked.
    PrerequisiteChecked {
        id: String,
        status: PrereqStatus,
        message: String,
    },
    /// The walker finished with this many fields collected.
    WalkCompleted {
        field_count: u32,
        iterations: u32,
        stop_reason: StopReason,
    },
    /// The payment guardrail tripped.
    GuardrailTripped {
        reason: PaymentStopReason,
        url: String,
    },
    /// The run finished and a result was assembled.
    RunCompleted {
        stop_reason: StopReason,
        field_count: u32,
        urls_visited: u32,
    },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Identifies which discovery phase is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryPhase {
    /// Prerequisite gates (membership, waiver, payment method, profile).
    Prerequisites,
    /// Multi-step walk of the program registration form.
    ProgramForm,
}

impl std::fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prerequisites => write!(f, "Prerequisites"),
            Self::ProgramForm => write!(f, "Program Form"),
        }
    }
}

/// Sender handle for emitting progress events.
///
/// Backed by a `tokio::sync::broadcast` channel so multiple listeners can
/// subscribe independently. When no listeners exist, `send()` returns an
/// error which we silently ignore.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
///
/// 64 events cover a full run: a handful of phase events plus one event
/// per prerequisite and per walker step.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(64)
}

/// Convenience helper: emit a progress event, silently ignoring send errors
/// (which occur when no receivers are listening).
pub fn emit(
    tx: &Option<ProgressSender>,
    run_id: &str,
    seq: &mut u64,
    event: ProgressEventKind,
) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent {
            run_id: run_id.to_string(),
            seq: *seq,
            event,
        });
    }
}
