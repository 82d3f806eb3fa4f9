//! Proctoring: tab-focus and fullscreen violations with a strike limit.

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    Tab,
    Fullscreen,
}

/// Raw focus callbacks. A single tab switch usually fires two of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusSignal {
    Hidden,
    Visible,
    Blur,
    Focus,
}

impl FocusSignal {
    #[must_use]
    pub fn is_loss(self) -> bool {
        matches!(self, FocusSignal::Hidden | FocusSignal::Blur)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullscreenSignal {
    Entered,
    Exited,
    /// The request to enter fullscreen was refused.
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentSignal {
    Focus(FocusSignal),
    Fullscreen(FullscreenSignal),
}

/// Blocking warning shown for strikes below the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationWarning {
    pub kind: ViolationKind,
    pub count: u32,
    pub max: u32,
}

impl ViolationWarning {
    /// Strikes left before the exam is submitted automatically.
    #[must_use]
    pub fn strikes_left(&self) -> u32 {
        self.max.saturating_sub(self.count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProctorOutcome {
    /// Duplicate or irrelevant signal.
    Ignored,
    /// Condition recorded while another violation was already being handled;
    /// not counted.
    Held(ViolationKind),
    Warned(ViolationWarning),
    /// `kind` is resolved; `warning` is whatever still blocks, if anything.
    Remedied {
        kind: ViolationKind,
        warning: Option<ViolationWarning>,
    },
    /// The strike limit was reached.
    Terminated(ViolationKind),
}

/// Counts violations for one attempt.
///
/// The count never decreases. A condition stays "held" from the breach until
/// the user remedies it, and while any condition is held further breaches are
/// recorded without being counted, so a blur that also drops fullscreen costs
/// one strike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationMonitor {
    max: u32,
    count: u32,
    tab_away: bool,
    fullscreen_out: bool,
    in_fullscreen: bool,
    warning: Option<ViolationWarning>,
    terminated: bool,
}

impl ViolationMonitor {
    #[must_use]
    pub fn new(max: u32) -> Self {
        Self {
            max: max.max(1),
            count: 0,
            tab_away: false,
            fullscreen_out: false,
            in_fullscreen: false,
            warning: None,
            terminated: false,
        }
    }

    pub fn focus_lost(&mut self, active: bool) -> ProctorOutcome {
        self.breach(ViolationKind::Tab, active)
    }

    pub fn focus_regained(&mut self) -> ProctorOutcome {
        self.remedy(ViolationKind::Tab)
    }

    /// Applies a fullscreen state observation from an event or the poll.
    ///
    /// Leaving fullscreen only counts if fullscreen was entered before.
    pub fn fullscreen_changed(&mut self, in_fullscreen: bool, active: bool) -> ProctorOutcome {
        let was = self.in_fullscreen;
        self.in_fullscreen = in_fullscreen;
        match (was, in_fullscreen) {
            (false, true) => self.remedy(ViolationKind::Fullscreen),
            (true, false) => self.breach(ViolationKind::Fullscreen, active),
            _ => ProctorOutcome::Ignored,
        }
    }

    pub fn fullscreen_denied(&mut self, active: bool) -> ProctorOutcome {
        self.in_fullscreen = false;
        self.breach(ViolationKind::Fullscreen, active)
    }

    /// # Errors
    ///
    /// Returns `SessionError::ViolationUnresolved` while a condition is held.
    pub fn dismiss_warning(&mut self) -> Result<(), SessionError> {
        if self.is_blocking() {
            return Err(SessionError::ViolationUnresolved);
        }
        self.warning = None;
        Ok(())
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    #[must_use]
    pub fn warning(&self) -> Option<ViolationWarning> {
        self.warning
    }

    #[must_use]
    pub fn is_blocking(&self) -> bool {
        self.tab_away || self.fullscreen_out
    }

    /// The timer stays paused while this is true.
    #[must_use]
    pub fn is_tab_away(&self) -> bool {
        self.tab_away
    }

    #[must_use]
    pub fn in_fullscreen(&self) -> bool {
        self.in_fullscreen
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    fn held(&self, kind: ViolationKind) -> bool {
        match kind {
            ViolationKind::Tab => self.tab_away,
            ViolationKind::Fullscreen => self.fullscreen_out,
        }
    }

    fn set_held(&mut self, kind: ViolationKind, held: bool) {
        match kind {
            ViolationKind::Tab => self.tab_away = held,
            ViolationKind::Fullscreen => self.fullscreen_out = held,
        }
    }

    fn held_kind(&self) -> Option<ViolationKind> {
        if self.tab_away {
            Some(ViolationKind::Tab)
        } else if self.fullscreen_out {
            Some(ViolationKind::Fullscreen)
        } else {
            None
        }
    }

    fn breach(&mut self, kind: ViolationKind, active: bool) -> ProctorOutcome {
        if self.terminated || !active || self.held(kind) {
            return ProctorOutcome::Ignored;
        }
        let already_handling = self.is_blocking();
        self.set_held(kind, true);
        if already_handling {
            return ProctorOutcome::Held(kind);
        }

        self.count += 1;
        if self.count >= self.max {
            self.terminated = true;
            self.warning = None;
            return ProctorOutcome::Terminated(kind);
        }
        let warning = ViolationWarning {
            kind,
            count: self.count,
            max: self.max,
        };
        self.warning = Some(warning);
        ProctorOutcome::Warned(warning)
    }

    fn remedy(&mut self, kind: ViolationKind) -> ProctorOutcome {
        if !self.held(kind) {
            return ProctorOutcome::Ignored;
        }
        self.set_held(kind, false);
        if self.terminated {
            return ProctorOutcome::Ignored;
        }
        self.warning = self.held_kind().map(|other| ViolationWarning {
            kind: other,
            count: self.count,
            max: self.max,
        });
        ProctorOutcome::Remedied {
            kind,
            warning: self.warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_and_hidden_for_one_switch_count_once() {
        let mut monitor = ViolationMonitor::new(3);
        assert!(matches!(monitor.focus_lost(true), ProctorOutcome::Warned(_)));
        assert_eq!(monitor.focus_lost(true), ProctorOutcome::Ignored);
        assert_eq!(monitor.count(), 1);
        assert!(monitor.is_tab_away());
    }

    #[test]
    fn regaining_focus_clears_warning() {
        let mut monitor = ViolationMonitor::new(3);
        monitor.focus_lost(true);
        assert_eq!(monitor.dismiss_warning(), Err(SessionError::ViolationUnresolved));
        assert_eq!(
            monitor.focus_regained(),
            ProctorOutcome::Remedied {
                kind: ViolationKind::Tab,
                warning: None
            }
        );
        assert_eq!(monitor.focus_regained(), ProctorOutcome::Ignored);
        assert!(monitor.dismiss_warning().is_ok());
        assert!(!monitor.is_blocking());
    }

    #[test]
    fn third_strike_terminates_without_warning() {
        let mut monitor = ViolationMonitor::new(3);
        for expected in 1..=2 {
            match monitor.focus_lost(true) {
                ProctorOutcome::Warned(w) => {
                    assert_eq!(w.count, expected);
                    assert_eq!(w.strikes_left(), 3 - expected);
                }
                other => panic!("unexpected outcome {other:?}"),
            }
            monitor.focus_regained();
        }
        assert_eq!(
            monitor.focus_lost(true),
            ProctorOutcome::Terminated(ViolationKind::Tab)
        );
        assert!(monitor.is_terminated());
        assert_eq!(monitor.warning(), None);
        assert_eq!(monitor.focus_regained(), ProctorOutcome::Ignored);
        assert_eq!(monitor.focus_lost(true), ProctorOutcome::Ignored);
        assert_eq!(monitor.count(), 3);
    }

    #[test]
    fn fullscreen_exit_before_first_entry_is_free() {
        let mut monitor = ViolationMonitor::new(3);
        assert_eq!(monitor.fullscreen_changed(false, true), ProctorOutcome::Ignored);
        assert_eq!(monitor.fullscreen_changed(true, true), ProctorOutcome::Ignored);
        assert!(matches!(
            monitor.fullscreen_changed(false, true),
            ProctorOutcome::Warned(ViolationWarning {
                kind: ViolationKind::Fullscreen,
                count: 1,
                ..
            })
        ));
    }

    #[test]
    fn event_and_poll_for_same_exit_count_once() {
        let mut monitor = ViolationMonitor::new(3);
        monitor.fullscreen_changed(true, true);
        monitor.fullscreen_changed(false, true);
        assert_eq!(monitor.fullscreen_changed(false, true), ProctorOutcome::Ignored);
        assert_eq!(monitor.count(), 1);
        assert!(matches!(
            monitor.fullscreen_changed(true, true),
            ProctorOutcome::Remedied {
                kind: ViolationKind::Fullscreen,
                warning: None
            }
        ));
    }

    #[test]
    fn overlapping_conditions_share_one_strike() {
        let mut monitor = ViolationMonitor::new(3);
        monitor.fullscreen_changed(true, true);
        assert!(matches!(monitor.focus_lost(true), ProctorOutcome::Warned(_)));
        assert_eq!(
            monitor.fullscreen_changed(false, true),
            ProctorOutcome::Held(ViolationKind::Fullscreen)
        );
        assert_eq!(monitor.count(), 1);

        match monitor.focus_regained() {
            ProctorOutcome::Remedied { kind, warning } => {
                assert_eq!(kind, ViolationKind::Tab);
                assert_eq!(warning.map(|w| w.kind), Some(ViolationKind::Fullscreen));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(monitor.is_blocking());
        monitor.fullscreen_changed(true, true);
        assert!(!monitor.is_blocking());
    }

    #[test]
    fn denied_fullscreen_is_a_violation() {
        let mut monitor = ViolationMonitor::new(3);
        assert!(matches!(
            monitor.fullscreen_denied(true),
            ProctorOutcome::Warned(ViolationWarning {
                kind: ViolationKind::Fullscreen,
                ..
            })
        ));
        assert!(matches!(
            monitor.fullscreen_changed(true, true),
            ProctorOutcome::Remedied { .. }
        ));
    }

    #[test]
    fn inactive_session_ignores_breaches() {
        let mut monitor = ViolationMonitor::new(3);
        assert_eq!(monitor.focus_lost(false), ProctorOutcome::Ignored);
        assert_eq!(monitor.count(), 0);
    }

    #[test]
    fn limit_of_one_terminates_immediately() {
        let mut monitor = ViolationMonitor::new(1);
        assert_eq!(
            monitor.focus_lost(true),
            ProctorOutcome::Terminated(ViolationKind::Tab)
        );
    }
}
