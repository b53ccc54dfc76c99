//! Next-run computation.

use chrono::{DateTime, Duration, Timelike, Utc};

use botfleet_core::rng::RandomSource;
use botfleet_core::types::RhythmProfile;

use crate::window::ActiveWindow;

/// Jitter band applied to the base gap between posts.
const JITTER_LOW: f64 = 0.55;
const JITTER_HIGH: f64 = 1.45;
/// Chance that a Bursty agent collapses the gap into a run-burst.
const BURST_CHANCE: f64 = 0.25;
/// Burst gap as a fraction of the normal gap.
const BURST_FACTOR: f64 = 0.15;
/// How strongly a profile pulls the time of day toward its preferred hour.
const TOD_BIAS: f64 = 0.35;
/// Spread after snapping to a window opening, minutes. Keeps a fleet of
/// agents with the same window from stampeding at the exact opening tick.
const OPEN_JITTER_MIN: i64 = 30;

/// The scheduling-relevant slice of an agent.
#[derive(Debug, Clone)]
pub struct AgentCadence {
    /// Desired units of content per day.
    pub posting_frequency: f64,
    pub profile: Option<RhythmProfile>,
    pub window: ActiveWindow,
}

/// How the run that just finished went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure,
}

/// Compute when the agent's next content run should fire.
///
/// Success spreads `posting_frequency` across the active window with
/// jittered, profile-biased spacing; failure returns a short fixed horizon
/// so transient problems self-heal quickly. Either way the result lands
/// inside the active window and strictly after `now`.
pub fn next_run_at(
    cadence: &AgentCadence,
    outcome: RunOutcome,
    now: DateTime<Utc>,
    failure_retry: Duration,
    rng: &RandomSource,
) -> DateTime<Utc> {
    let candidate = match outcome {
        RunOutcome::Failure => now + failure_retry,
        RunOutcome::Success => {
            let freq = cadence.posting_frequency.clamp(0.1, 48.0);
            let base_gap_hours = cadence.window.len_hours() / freq;

            let mut gap_hours = base_gap_hours * rng.range(JITTER_LOW, JITTER_HIGH);
            if cadence.profile == Some(RhythmProfile::Bursty) && rng.unit() < BURST_CHANCE {
                gap_hours *= BURST_FACTOR;
            }
            // Floor so back-to-back runs can't pile onto the same minute
            gap_hours = gap_hours.max(2.0 / 60.0);

            let raw = now + Duration::seconds((gap_hours * 3600.0) as i64);
            bias_time_of_day(raw, cadence, now)
        }
    };

    snap_into_window(candidate, &cadence.window, now, rng)
}

/// Pull the candidate's time of day toward the profile's preferred hour.
/// Bursty and Steady profiles carry no time-of-day preference.
fn bias_time_of_day(
    candidate: DateTime<Utc>,
    cadence: &AgentCadence,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let preferred = match cadence.profile {
        Some(RhythmProfile::EarlyRiser) => (cadence.window.start_hour as f64 + 1.0) % 24.0,
        Some(RhythmProfile::NightOwl) => {
            let end = if cadence.window.start_hour == cadence.window.end_hour {
                24.0
            } else {
                cadence.window.end_hour as f64
            };
            (end + 22.0) % 24.0 // two hours before close
        }
        _ => return candidate,
    };

    let tod = candidate.hour() as f64
        + candidate.minute() as f64 / 60.0
        + candidate.second() as f64 / 3600.0;
    // Signed wrap-aware hour distance in [-12, 12)
    let distance = (preferred - tod + 36.0).rem_euclid(24.0) - 12.0;
    let shifted = candidate + Duration::seconds((distance * TOD_BIAS * 3600.0) as i64);

    // Bias may not drag the run into the past
    if shifted <= now { candidate } else { shifted }
}

/// Snap a candidate that fell at a dead hour forward to the next window
/// opening, spread by a little jitter, and keep it strictly after `now`.
fn snap_into_window(
    candidate: DateTime<Utc>,
    window: &ActiveWindow,
    now: DateTime<Utc>,
    rng: &RandomSource,
) -> DateTime<Utc> {
    let mut at = candidate.max(now + Duration::minutes(1));
    if !window.contains(at) {
        at = window.next_open(at) + Duration::minutes(rng.index(OPEN_JITTER_MIN as usize) as i64);
    }
    at
}
