//! Per-track boundary crossing state machine.
//!
//! ```text
//! Unarmed --cross first--> Armed --cross second, elapsed > 0--> Finalized
//!                            ^                |
//!                            +-- elapsed <= 0 -+ (attempt rejected)
//! ```
//!
//! Crossing is the half-open test `prev < boundary <= curr`, so a coordinate
//! that lands exactly on a line counts as crossed once, on the update that
//! reaches it. `Finalized` is terminal: a track is measured at most once.

/// Crossing progress of one track.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CrossingState {
    #[default]
    Unarmed,
    Armed {
        /// Capture time of the frame that crossed the first boundary.
        armed_at: f64,
        /// Attribute sampled once at arming.
        attribute: String,
    },
    Finalized,
}

impl CrossingState {
    pub fn is_armed(&self) -> bool {
        matches!(self, CrossingState::Armed { .. })
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self, CrossingState::Finalized)
    }
}

/// Outcome of advancing a track by one position update.
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    None,
    Armed,
    Finalized { attribute: String, elapsed: f64 },
    /// Second boundary crossed but elapsed time was unusable; still armed.
    Rejected { elapsed: f64 },
}

/// Half-open crossing test.
pub fn crossed(prev: i32, curr: i32, boundary: i32) -> bool {
    prev < boundary && boundary <= curr
}

#[derive(Clone, Copy, Debug)]
pub struct CrossingEngine {
    first: i32,
    second: i32,
    max_elapsed: Option<f64>,
}

impl CrossingEngine {
    pub fn new(first: i32, second: i32) -> Self {
        Self {
            first,
            second,
            max_elapsed: None,
        }
    }

    /// Also reject intervals longer than `max_elapsed` seconds.
    pub fn with_max_elapsed(mut self, max_elapsed: Option<f64>) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Advance `state` for a track that moved from `prev` to `curr` in the
    /// frame captured at `capture_time`.
    ///
    /// `sample` is called only when the track arms, to obtain its attribute.
    pub fn advance<F>(
        &self,
        state: &mut CrossingState,
        prev: i32,
        curr: i32,
        capture_time: f64,
        sample: F,
    ) -> Transition
    where
        F: FnOnce() -> String,
    {
        match state {
            CrossingState::Unarmed => {
                if crossed(prev, curr, self.first) {
                    *state = CrossingState::Armed {
                        armed_at: capture_time,
                        attribute: sample(),
                    };
                    Transition::Armed
                } else {
                    Transition::None
                }
            }
            CrossingState::Armed {
                armed_at,
                attribute,
            } => {
                if !crossed(prev, curr, self.second) {
                    return Transition::None;
                }
                let elapsed = capture_time - *armed_at;
                let too_long = self.max_elapsed.is_some_and(|max| elapsed > max);
                if elapsed <= 0.0 || !elapsed.is_finite() || too_long {
                    return Transition::Rejected { elapsed };
                }
                let attribute = std::mem::take(attribute);
                *state = CrossingState::Finalized;
                Transition::Finalized { attribute, elapsed }
            }
            CrossingState::Finalized => Transition::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CrossingEngine {
        CrossingEngine::new(100, 200)
    }

    fn red() -> String {
        "Red".to_string()
    }

    #[test]
    fn landing_exactly_on_boundary_arms_once() {
        let engine = engine();
        let mut state = CrossingState::Unarmed;
        let mut samples = 0;

        let path = [99, 100, 101];
        let mut prev = path[0];
        let mut armed = 0;
        for (i, &curr) in path.iter().enumerate().skip(1) {
            let t = engine.advance(&mut state, prev, curr, i as f64, || {
                samples += 1;
                red()
            });
            if t == Transition::Armed {
                armed += 1;
            }
            prev = curr;
        }
        assert_eq!(armed, 1);
        assert_eq!(samples, 1);
        assert_eq!(
            state,
            CrossingState::Armed {
                armed_at: 1.0,
                attribute: red()
            }
        );
    }

    #[test]
    fn full_pass_finalizes_with_elapsed_time() {
        let engine = engine();
        let mut state = CrossingState::Unarmed;
        assert_eq!(engine.advance(&mut state, 90, 110, 10.0, red), Transition::Armed);
        assert_eq!(engine.advance(&mut state, 110, 150, 10.5, red), Transition::None);
        assert_eq!(
            engine.advance(&mut state, 150, 205, 12.0, red),
            Transition::Finalized {
                attribute: red(),
                elapsed: 2.0
            }
        );
        assert!(state.is_finalized());
    }

    #[test]
    fn finalized_track_never_measures_again() {
        let engine = engine();
        let mut state = CrossingState::Unarmed;
        engine.advance(&mut state, 90, 110, 1.0, red);
        engine.advance(&mut state, 190, 210, 2.0, red);
        assert!(state.is_finalized());

        assert_eq!(engine.advance(&mut state, 90, 110, 3.0, red), Transition::None);
        assert_eq!(engine.advance(&mut state, 190, 210, 4.0, red), Transition::None);
    }

    #[test]
    fn non_positive_elapsed_is_rejected_and_stays_armed() {
        let engine = engine();
        let mut state = CrossingState::Unarmed;
        engine.advance(&mut state, 90, 110, 5.0, red);

        let t = engine.advance(&mut state, 190, 210, 4.0, red);
        assert_eq!(t, Transition::Rejected { elapsed: -1.0 });
        assert!(state.is_armed());

        let t = engine.advance(&mut state, 190, 200, 5.0, red);
        assert_eq!(t, Transition::Rejected { elapsed: 0.0 });
        assert!(state.is_armed());

        let t = engine.advance(&mut state, 199, 200, 6.5, red);
        assert_eq!(
            t,
            Transition::Finalized {
                attribute: red(),
                elapsed: 1.5
            }
        );
    }

    #[test]
    fn jumping_both_lines_in_one_update_only_arms() {
        let engine = engine();
        let mut state = CrossingState::Unarmed;
        assert_eq!(engine.advance(&mut state, 50, 250, 1.0, red), Transition::Armed);
        assert!(state.is_armed());
    }

    #[test]
    fn moving_backwards_does_not_cross() {
        let engine = engine();
        let mut state = CrossingState::Unarmed;
        assert_eq!(engine.advance(&mut state, 110, 90, 1.0, red), Transition::None);
        assert_eq!(state, CrossingState::Unarmed);
    }

    #[test]
    fn optional_max_elapsed_rejects_stale_intervals() {
        let engine = engine().with_max_elapsed(Some(30.0));
        let mut state = CrossingState::Unarmed;
        engine.advance(&mut state, 90, 110, 0.0, red);
        assert_eq!(
            engine.advance(&mut state, 190, 210, 31.0, red),
            Transition::Rejected { elapsed: 31.0 }
        );
        assert!(state.is_armed());
    }
}
