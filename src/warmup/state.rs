use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Run-once guard for the warmup sequence. First caller of
/// [`WarmupState::try_start`] wins; everyone after sees `false`.
#[derive(Debug, Default)]
pub struct WarmupState {
    started: AtomicBool,
}

impl WarmupState {
    pub const fn new() -> Self {
        Self { started: AtomicBool::new(false) }
    }

    /// Process-wide instance used by [`super::start_warmup`].
    pub fn global() -> Arc<WarmupState> {
        static GLOBAL: OnceLock<Arc<WarmupState>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(WarmupState::new())).clone()
    }

    /// Atomic check-and-set. Returns `true` only for the first call.
    pub fn try_start(&self) -> bool {
        self.started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Re-arm the guard. Only meant for tests and embedding hosts that
    /// genuinely restart their backend session.
    pub fn reset(&self) {
        self.started.store(false, Ordering::Release);
    }
}
