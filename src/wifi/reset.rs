//! Polled factory-reset button.

/// Physical reset input. Polled from the network worker loop.
pub trait ResetButton: Send {
    fn is_pressed(&mut self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    Idle,
    /// Pressed, hold not yet long enough.
    Holding,
    /// Released before the hold time.
    Released,
    /// Held long enough: wipe credentials and restart.
    Triggered,
}

pub struct ResetWatcher {
    hold_ms: u64,
    pressed_since: Option<u64>,
    fired: bool,
}

impl ResetWatcher {
    pub fn new(hold_ms: u64) -> Self {
        Self {
            hold_ms,
            pressed_since: None,
            fired: false,
        }
    }

    pub fn poll(&mut self, pressed: bool, now_ms: u64) -> ResetAction {
        match (pressed, self.pressed_since) {
            (false, None) => ResetAction::Idle,
            (false, Some(_)) => {
                self.pressed_since = None;
                self.fired = false;
                ResetAction::Released
            }
            (true, None) => {
                self.pressed_since = Some(now_ms);
                ResetAction::Holding
            }
            (true, Some(since)) => {
                if !self.fired && now_ms.saturating_sub(since) >= self.hold_ms {
                    self.fired = true;
                    ResetAction::Triggered
                } else {
                    ResetAction::Holding
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_press_does_nothing() {
        let mut watcher = ResetWatcher::new(2000);
        assert_eq!(watcher.poll(true, 0), ResetAction::Holding);
        assert_eq!(watcher.poll(true, 1000), ResetAction::Holding);
        assert_eq!(watcher.poll(false, 1500), ResetAction::Released);
        assert_eq!(watcher.poll(false, 2500), ResetAction::Idle);
    }

    #[test]
    fn test_long_hold_triggers_once() {
        let mut watcher = ResetWatcher::new(2000);
        watcher.poll(true, 0);
        assert_eq!(watcher.poll(true, 2000), ResetAction::Triggered);
        assert_eq!(watcher.poll(true, 3000), ResetAction::Holding);
    }
}
