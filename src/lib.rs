//! Backend liveness and realtime sync for the IPL dashboard client.
//!
//! Two independent pieces: a run-once warmup that wakes a possibly suspended
//! backend and warms its hot endpoints, and a reconnecting live score channel.

pub mod config;    // layered settings (defaults, file, env)
pub mod net;       // deadline-bounded outbound calls
pub mod realtime;  // live score channel over STOMP/WebSocket
pub mod sched;     // idle-deferred work
pub mod telemetry; // tracing + metrics setup
pub mod warmup;    // probe -> settle -> prefetch, once per process

pub use config::SyncConfig;
pub use realtime::{ChannelHandle, ChannelState, ScoreSnapshot};
pub use warmup::start_warmup;
