//! Lap validity rules.

/// Upper sanity bound for a lap time (10 hours).
pub const MAX_LAP_TIME_MS: u32 = 36_000_000;

/// Shortest line-crossing interval accepted as a real lap. Anything shorter
/// is a re-trigger of the same crossing.
pub const MIN_MANUAL_LAP_MS: u32 = 10_000;

/// Client event types treated as a start/finish line crossing.
pub const LINE_CROSSING_EVENTS: [u8; 2] = [5, 9];

/// How completed laps are detected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimingMode {
    /// Use the server's lap-completed packets.
    #[default]
    ServerLaps,
    /// Time laps from consecutive line-crossing client events. Server lap
    /// packets are ignored so laps are not counted twice.
    LineCrossing,
}

/// Classification of a reported lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LapVerdict {
    /// Outside `(0, MAX_LAP_TIME_MS]`; must not touch any state.
    Rejected,
    /// Clean lap, eligible for best time and persistence.
    Valid,
    /// Lap with track cuts; counted but never a best or persisted.
    Invalid,
}

impl LapVerdict {
    pub fn assess(lap_time_ms: u32, cuts: u8) -> Self {
        if lap_time_ms == 0 || lap_time_ms > MAX_LAP_TIME_MS {
            Self::Rejected
        } else if cuts == 0 {
            Self::Valid
        } else {
            Self::Invalid
        }
    }

    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

/// Whether `lap_time_ms` beats the current best (0 meaning unset).
pub fn improves_best(best_lap_ms: u32, lap_time_ms: u32) -> bool {
    best_lap_ms == 0 || lap_time_ms < best_lap_ms
}

/// Elapsed time between two line crossings, if it is long enough to be a
/// lap and fits the sanity bound.
pub fn manual_lap_time(started_ms: i64, now_ms: i64) -> Option<u32> {
    let elapsed = u32::try_from(now_ms.checked_sub(started_ms)?).ok()?;
    (elapsed > MIN_MANUAL_LAP_MS && elapsed <= MAX_LAP_TIME_MS).then_some(elapsed)
}
