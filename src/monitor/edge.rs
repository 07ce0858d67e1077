// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rising edge detection on the cycle-ok bit
//!
//! The PLC holds cycle-ok high until the next part starts, so the monitor
//! must fire exactly once per low-to-high transition. The first observation
//! after a (re)start only initializes the detector: a bit that is already
//! high when the monitor comes up must not create a cycle record.

/// What one observation of the cycle-ok bit means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// First observation after a (re)start, never fires
    Initialized,
    /// false -> true transition, the one that creates a cycle
    Rising,
    /// true -> false transition
    Falling,
    /// No change since the previous tick
    Steady,
}

/// Per-device trigger state. `None` means uninitialized.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    last: Option<bool>,
}

impl EdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one observation and classify it.
    pub fn observe(&mut self, value: bool) -> Edge {
        let edge = match self.last {
            None => Edge::Initialized,
            Some(false) if value => Edge::Rising,
            Some(true) if !value => Edge::Falling,
            Some(_) => Edge::Steady,
        };
        self.last = Some(value);
        edge
    }

    /// Forget the previous observation, as after a monitor restart.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn last(&self) -> Option<bool> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_never_fires() {
        let mut detector = EdgeDetector::new();
        assert_eq!(detector.observe(true), Edge::Initialized);

        let mut detector = EdgeDetector::new();
        assert_eq!(detector.observe(false), Edge::Initialized);
    }

    #[test]
    fn fires_once_per_run_of_true() {
        let mut detector = EdgeDetector::new();
        detector.observe(false);
        assert_eq!(detector.observe(true), Edge::Rising);
        assert_eq!(detector.observe(true), Edge::Steady);
        assert_eq!(detector.observe(true), Edge::Steady);
        assert_eq!(detector.observe(false), Edge::Falling);
        assert_eq!(detector.observe(true), Edge::Rising);
    }

    #[test]
    fn bit_high_at_startup_does_not_fire_until_it_cycles() {
        let mut detector = EdgeDetector::new();
        assert_eq!(detector.observe(true), Edge::Initialized);
        assert_eq!(detector.observe(true), Edge::Steady);
        assert_eq!(detector.observe(false), Edge::Falling);
        assert_eq!(detector.observe(true), Edge::Rising);
    }

    #[test]
    fn reset_returns_to_uninitialized() {
        let mut detector = EdgeDetector::new();
        detector.observe(false);
        detector.reset();
        assert_eq!(detector.last(), None);
        assert_eq!(detector.observe(true), Edge::Initialized);
    }
}
