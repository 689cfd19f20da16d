// SPDX-License-Identifier: CEPL-1.0
//! Whether the window is worth drawing into.

/// Paused while the window has no area or is fully covered. Nothing is
/// drawn and no redraws are requested until both clear.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PauseState {
    minimised: bool,
    occluded: bool,
}

impl PauseState {
    /// Returns `true` when this flipped the paused state.
    pub fn resized(&mut self, width: u32, height: u32) -> bool {
        let was = self.paused();
        self.minimised = width == 0 || height == 0;
        was != self.paused()
    }

    /// Returns `true` when this flipped the paused state.
    pub fn occluded(&mut self, occluded: bool) -> bool {
        let was = self.paused();
        self.occluded = occluded;
        was != self.paused()
    }

    pub fn paused(&self) -> bool {
        self.minimised || self.occluded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        assert!(!PauseState::default().paused());
    }

    #[test]
    fn minimise_pauses_until_restored() {
        let mut p = PauseState::default();
        assert!(p.resized(0, 0));
        assert!(p.paused());
        assert!(!p.resized(800, 0));
        assert!(p.paused());
        assert!(p.resized(800, 600));
        assert!(!p.paused());
    }

    #[test]
    fn occlusion_and_size_combine() {
        let mut p = PauseState::default();
        assert!(p.occluded(true));
        // Restoring the size alone does not resume a covered window.
        assert!(!p.resized(0, 0));
        assert!(!p.resized(1024, 768));
        assert!(p.paused());
        assert!(p.occluded(false));
        assert!(!p.paused());
    }
}
