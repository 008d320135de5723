//! tether engine metrics.
//!
//! Process-wide counters for transfers, bytes, and bridge activity. Exposed
//! through metriken's registry. Per-engine numbers live in
//! [`EngineStats`](crate::EngineStats).

use metriken::{Counter, Gauge, metric};

// ── Transfer lifecycle ───────────────────────────────────────────

#[metric(
    name = "tether/transfers/submitted",
    description = "Transfers accepted by the transport"
)]
pub static TRANSFERS_SUBMITTED: Counter = Counter::new();

#[metric(
    name = "tether/transfers/rejected",
    description = "Submissions refused by the engine or transport"
)]
pub static TRANSFERS_REJECTED: Counter = Counter::new();

#[metric(
    name = "tether/transfers/completed",
    description = "Transfers reaped with a complete response"
)]
pub static TRANSFERS_COMPLETED: Counter = Counter::new();

#[metric(
    name = "tether/transfers/failed",
    description = "Transfers reaped with a failure"
)]
pub static TRANSFERS_FAILED: Counter = Counter::new();

#[metric(
    name = "tether/transfers/active",
    description = "Transfers currently in flight"
)]
pub static TRANSFERS_ACTIVE: Gauge = Gauge::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(
    name = "tether/bytes/received",
    description = "Response bytes consumed by sinks"
)]
pub static BYTES_RECEIVED: Counter = Counter::new();

// ── Bridge activity ──────────────────────────────────────────────

#[metric(
    name = "tether/drive/socket",
    description = "Transport drives triggered by socket readiness"
)]
pub static SOCKET_DRIVES: Counter = Counter::new();

#[metric(
    name = "tether/drive/timeout",
    description = "Transport drives triggered by timer expiry"
)]
pub static TIMEOUT_DRIVES: Counter = Counter::new();

#[metric(name = "tether/timer/armed", description = "Timer registrations armed")]
pub static TIMERS_ARMED: Counter = Counter::new();

#[metric(
    name = "tether/sockets/watched",
    description = "Descriptors currently watched"
)]
pub static SOCKETS_WATCHED: Gauge = Gauge::new();
