//! Observability for the signal relay.
//!
//! Instrumentation logs connection, room and mesh identifiers only. Display
//! names never appear in logs or metric labels.
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `relay_connections_active` | Gauge | none | Open signaling connections |
//! | `relay_participants_active` | Gauge | none | Participants across all rooms |
//! | `relay_actor_mailbox_depth` | Gauge | none | Relay actor backpressure |
//! | `relay_events_total` | Counter | `event` | Client events applied |
//! | `relay_events_rejected_total` | Counter | `reason` | Client frames rejected |
//! | `relay_frames_dropped_total` | Counter | none | Outbound frames dropped on full queues |
//! | `relay_event_latency_seconds` | Histogram | `event` | Receipt to fan-out latency |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
