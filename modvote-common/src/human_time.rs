//! Human-readable elapsed time formatting
//!
//! Used for "resolved after ..." notices posted when an escalation closes.

const SECS_PER_MINUTE: i64 = 60;
const SECS_PER_HOUR: i64 = 3600;
const SECS_PER_DAY: i64 = 86_400;

/// Format an elapsed duration in seconds using the two most significant units.
///
/// # Examples
///
/// ```
/// use modvote_common::human_time::format_elapsed;
///
/// assert_eq!(format_elapsed(42), "42s");
/// assert_eq!(format_elapsed(125), "2m 5s");
/// assert_eq!(format_elapsed(7_260), "2h 1m");
/// assert_eq!(format_elapsed(93_600), "1d 2h");
/// ```
pub fn format_elapsed(seconds: i64) -> String {
    // Negative values mean the clock moved backwards; show zero
    let secs = seconds.max(0);

    if secs < SECS_PER_MINUTE {
        format!("{}s", secs)
    } else if secs < SECS_PER_HOUR {
        format!("{}m {}s", secs / SECS_PER_MINUTE, secs % SECS_PER_MINUTE)
    } else if secs < SECS_PER_DAY {
        format!(
            "{}h {}m",
            secs / SECS_PER_HOUR,
            (secs % SECS_PER_HOUR) / SECS_PER_MINUTE
        )
    } else {
        format!("{}d {}h", secs / SECS_PER_DAY, (secs % SECS_PER_DAY) / SECS_PER_HOUR)
    }
}
