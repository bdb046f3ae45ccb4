pub mod idle;

pub use idle::{Dispatch, IdleScheduler, IdleSignal, ScheduledTask, UNSUPPORTED_IDLE_FALLBACK};
