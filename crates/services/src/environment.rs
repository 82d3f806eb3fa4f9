//! Port for focus and fullscreen notifications from the host environment.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use exam_core::proctor::{FocusSignal, FullscreenSignal};

pub type FocusHandler = Box<dyn Fn(FocusSignal) + Send + Sync>;
pub type FullscreenHandler = Box<dyn Fn(FullscreenSignal) + Send + Sync>;

/// Source of the raw signals the violation monitor consumes.
///
/// Handlers may be invoked from any thread and must not block.
pub trait EnvironmentObserver: Send + Sync {
    fn on_focus_change(&self, handler: FocusHandler);

    fn on_fullscreen_change(&self, handler: FullscreenHandler);

    /// Current fullscreen state, read by the periodic safety poll.
    fn is_fullscreen(&self) -> bool;
}

/// In-process environment driven by explicit `emit_*` calls.
///
/// Clones share state, so a test can keep one handle while the runner owns
/// another. A terminal has no focus or fullscreen of its own, so the binary
/// uses one that stays focused and fullscreen.
#[derive(Clone, Default)]
pub struct SyntheticEnvironment {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    fullscreen: bool,
    focus_handlers: Vec<FocusHandler>,
    fullscreen_handlers: Vec<FullscreenHandler>,
}

impl SyntheticEnvironment {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment that is already in fullscreen.
    #[must_use]
    pub fn fullscreen() -> Self {
        let env = Self::default();
        env.lock().fullscreen = true;
        env
    }

    pub fn emit_focus(&self, signal: FocusSignal) {
        let inner = self.lock();
        for handler in &inner.focus_handlers {
            handler(signal);
        }
    }

    /// Updates the fullscreen flag to match `signal`, then notifies.
    pub fn emit_fullscreen(&self, signal: FullscreenSignal) {
        let mut inner = self.lock();
        inner.fullscreen = matches!(signal, FullscreenSignal::Entered);
        for handler in &inner.fullscreen_handlers {
            handler(signal);
        }
    }

    /// Changes the fullscreen flag without firing handlers, the way some
    /// browsers drop the change event.
    pub fn set_fullscreen_silently(&self, fullscreen: bool) {
        self.lock().fullscreen = fullscreen;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EnvironmentObserver for SyntheticEnvironment {
    fn on_focus_change(&self, handler: FocusHandler) {
        self.lock().focus_handlers.push(handler);
    }

    fn on_fullscreen_change(&self, handler: FullscreenHandler) {
        self.lock().fullscreen_handlers.push(handler);
    }

    fn is_fullscreen(&self) -> bool {
        self.lock().fullscreen
    }
}
