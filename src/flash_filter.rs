//! Flash filter: the cut-confirmation state machine
//!
//! A single bright frame (camera flash, flicker, a corrupt frame) produces a
//! short burst of above-threshold scores. The filter only confirms a cut once
//! the score has stayed above the threshold for `flicker_frames` consecutive
//! frames, and after a confirmed cut it waits for `flicker_frames` quiet frames
//! before it can confirm another one.
//!
//! The rule only looks at run length, not at what caused the run. A hard cut
//! between two static shots scores above the threshold on a single frame, so
//! with `flicker_frames >= 2` it is dropped like any other short excursion. A
//! one-frame flash scores high on the way in and on the way out, a run of two,
//! so with `flicker_frames == 2` it survives as one cut at the flash frame.
//! Callers who need instantaneous cuts kept should use `flicker_frames <= 1`.

use tracing::{debug, instrument, trace};

/// Where the filter is in the current excursion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterState {
    /// Below threshold, ready to start a new excursion
    #[default]
    Stable,
    /// Above threshold for `run` consecutive frames starting at `first`
    Pending { run: u32, first: u32 },
    /// A cut was confirmed; `quiet` consecutive frames have been below threshold since
    Confirmed { quiet: u32 },
}

/// Debounces threshold crossings into confirmed cuts
///
/// With `flicker_frames == 0` every above-threshold frame is a cut.
#[derive(Debug)]
pub struct FlashFilter {
    flicker_frames: u32,
    state: FilterState,
}

impl FlashFilter {
    /// Create a new FlashFilter
    ///
    /// # Arguments
    /// * `flicker_frames` - Consecutive above-threshold frames required to confirm a cut (0 disables)
    #[instrument]
    pub fn new(flicker_frames: u32) -> Self {
        debug!("Created FlashFilter with flicker_frames: {}", flicker_frames);

        Self {
            flicker_frames,
            state: FilterState::Stable,
        }
    }

    /// Feed one scored frame
    ///
    /// # Arguments
    /// * `frame` - Index of the scored frame
    /// * `above_threshold` - Whether its score strictly exceeded the threshold
    ///
    /// # Returns
    /// * `Option<u32>` - The frame where the confirmed scene starts, if this frame confirmed one
    pub fn filter(&mut self, frame: u32, above_threshold: bool) -> Option<u32> {
        trace!("Filter input: frame={}, above_threshold={}, state={:?}", frame, above_threshold, self.state);

        if self.flicker_frames == 0 {
            return above_threshold.then_some(frame);
        }

        let (next, cut) = match (self.state, above_threshold) {
            (FilterState::Stable, false) => (FilterState::Stable, None),
            (FilterState::Stable, true) => self.advance_run(1, frame),
            (FilterState::Pending { run, first }, true) => self.advance_run(run + 1, first),
            (FilterState::Pending { run, first }, false) => {
                debug!("Suppressing {}-frame excursion starting at frame {}", run, first);
                (FilterState::Stable, None)
            }
            (FilterState::Confirmed { .. }, true) => (FilterState::Confirmed { quiet: 0 }, None),
            (FilterState::Confirmed { quiet }, false) => {
                let quiet = quiet + 1;
                if quiet >= self.flicker_frames {
                    trace!("Re-armed after {} quiet frames at frame {}", quiet, frame);
                    (FilterState::Stable, None)
                } else {
                    (FilterState::Confirmed { quiet }, None)
                }
            }
        };

        self.state = next;
        cut
    }

    fn advance_run(&self, run: u32, first: u32) -> (FilterState, Option<u32>) {
        if run >= self.flicker_frames {
            debug!("Scene cut confirmed at frame {} after {} frames above threshold", first, run);
            (FilterState::Confirmed { quiet: 0 }, Some(first))
        } else {
            (FilterState::Pending { run, first }, None)
        }
    }

    /// Get the flicker frames setting
    pub fn flicker_frames(&self) -> u32 {
        self.flicker_frames
    }

    /// Get the current state
    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Whether an unconfirmed excursion is in progress
    pub fn is_pending(&self) -> bool {
        matches!(self.state, FilterState::Pending { .. })
    }

    /// Reset the filter state; an unconfirmed excursion is discarded
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        if let FilterState::Pending { run, first } = self.state {
            debug!("Discarding unconfirmed {}-frame excursion starting at frame {}", run, first);
        }
        self.state = FilterState::Stable;
    }
}
