//! Growth detection for virtualized lists. This is the only place stagnation
//! logic lives; both the search panel and the review feed go through it.

use log::debug;

use crate::error::ExtractResult;
use crate::page::ScrollFeed;

/// Termination policy for a scroll run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPolicy {
    /// Consecutive unchanged measurements that count as stagnation.
    pub stall_rounds: usize,
    /// Hard cap on scroll rounds against infinitely loading or broken feeds.
    pub max_rounds: usize,
}

impl ScrollPolicy {
    pub fn new(stall_rounds: usize, max_rounds: usize) -> Self {
        ScrollPolicy {
            stall_rounds: stall_rounds.max(1),
            max_rounds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    /// Last measured item count.
    pub final_count: usize,
    /// Scroll rounds actually performed.
    pub rounds: usize,
    /// True when the round cap was hit before the feed stagnated; the result
    /// is best-effort partial and accepted as final.
    pub possibly_incomplete: bool,
}

pub struct StagnationScroller {
    policy: ScrollPolicy,
}

impl StagnationScroller {
    pub fn new(policy: ScrollPolicy) -> Self {
        StagnationScroller { policy }
    }

    /// Drives `advance` + `measure` cycles until the measurement stops
    /// changing for `stall_rounds` consecutive rounds, or `max_rounds` is
    /// reached.
    pub fn run(&self, feed: &mut dyn ScrollFeed) -> ExtractResult<ScrollOutcome> {
        let mut last = feed.measure()?;
        let mut unchanged = 0usize;
        let mut rounds = 0usize;

        while rounds < self.policy.max_rounds {
            feed.advance()?;
            let current = feed.measure()?;
            rounds += 1;

            if current == last {
                unchanged += 1;
            } else {
                unchanged = 0;
                last = current;
            }

            if unchanged >= self.policy.stall_rounds {
                debug!("feed stagnant at {} items after {} rounds", last, rounds);
                return Ok(ScrollOutcome {
                    final_count: last,
                    rounds,
                    possibly_incomplete: false,
                });
            }
        }

        debug!(
            "scroll cap {} reached with {} items still loading",
            self.policy.max_rounds, last
        );
        Ok(ScrollOutcome {
            final_count: last,
            rounds,
            possibly_incomplete: true,
        })
    }
}
