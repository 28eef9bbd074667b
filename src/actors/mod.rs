//! Actor-based queue consumption
//!
//! Each actor runs as an independent async task and is controlled through an
//! mpsc command channel wrapped in a handle.
//!
//! ```text
//!   datos_sensores        eventos_bomba
//!         │                     │
//!  ┌──────▼───────┐      ┌──────▼───────┐
//!  │ ConsumerActor│      │ ConsumerActor│
//!  └──────┬───────┘      └──────┬───────┘
//!         └──────────┬──────────┘
//!                    ▼
//!          Pipeline (shared, Arc)
//!        ┌───────────┼─────────────┐
//!        ▼           ▼             ▼
//!   BroadcastHub  Persistence   AlertFanout (detached tasks)
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: every actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels for queries such as stats

pub mod consumer;
pub mod messages;
