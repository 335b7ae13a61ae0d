//! Expansion of a lawyer's weekly availability into bookable work slots.
//!
//! Availability arrives as two comma-separated strings: days
//! (`"Mon,Tue"`) and time ranges (`"09:00-11:00,14:00-16:00"`). Each range
//! is cut into hour-aligned sub-intervals, one work slot per day per
//! sub-interval.

use chrono::NaiveTime;

/// Fallback slots used when the work time string is missing, unparseable,
/// or yields no full-hour intervals. A lenient default, not an error.
pub const DEFAULT_SLOTS: [&str; 4] = [
    "09:00-10:00",
    "10:00-11:00",
    "14:00-15:00",
    "15:00-16:00",
];

/// One work slot to create: a day name and an hour interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    pub day: String,
    pub slot: String,
}

/// Expands `day_of_week` and `work_time` into one assignment per day per
/// hour interval.
pub fn expand(day_of_week: &str, work_time: &str) -> Vec<SlotAssignment> {
    let days: Vec<&str> = day_of_week
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect();

    let slots = hour_slots(work_time);

    let mut assignments = Vec::with_capacity(days.len() * slots.len());
    for day in &days {
        for slot in &slots {
            assignments.push(SlotAssignment {
                day: (*day).to_string(),
                slot: slot.clone(),
            });
        }
    }
    assignments
}

/// Cuts the comma-separated time ranges into "HH:MM-HH:MM" hour slots,
/// substituting [`DEFAULT_SLOTS`] when nothing parses.
pub fn hour_slots(work_time: &str) -> Vec<String> {
    let mut slots = Vec::new();

    for range in work_time.split(',') {
        let Some((start, end)) = parse_range(range) else {
            continue;
        };

        let mut cursor = start;
        loop {
            let (next, wrapped) = cursor.overflowing_add_signed(chrono::Duration::hours(1));
            if wrapped != 0 || next > end {
                break;
            }
            slots.push(format!(
                "{}-{}",
                cursor.format("%H:%M"),
                next.format("%H:%M")
            ));
            cursor = next;
        }
    }

    if slots.is_empty() {
        DEFAULT_SLOTS.iter().map(|s| (*s).to_string()).collect()
    } else {
        slots
    }
}

fn parse_range(range: &str) -> Option<(NaiveTime, NaiveTime)> {
    let (start, end) = range.split_once('-')?;
    let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").ok()?;
    (start < end).then_some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_range_cut_into_hours() {
        let slots = hour_slots("09:00-12:00");
        assert_eq!(slots, vec!["09:00-10:00", "10:00-11:00", "11:00-12:00"]);
    }

    #[test]
    fn multiple_ranges() {
        let slots = hour_slots("08:00-10:00,13:00-14:00");
        assert_eq!(slots, vec!["08:00-09:00", "09:00-10:00", "13:00-14:00"]);
    }

    #[test]
    fn sub_hour_remainder_is_dropped() {
        // 09:00-10:30 has only one full hour-aligned interval.
        let slots = hour_slots("09:00-10:30");
        assert_eq!(slots, vec!["09:00-10:00"]);
    }

    #[test]
    fn empty_work_time_uses_defaults() {
        let slots = hour_slots("");
        assert_eq!(slots, DEFAULT_SLOTS.map(String::from).to_vec());
    }

    #[test]
    fn unparseable_work_time_uses_defaults() {
        let slots = hour_slots("morning-ish");
        assert_eq!(slots.len(), 4);
        assert_eq!(slots[0], "09:00-10:00");
    }

    #[test]
    fn inverted_range_uses_defaults() {
        let slots = hour_slots("17:00-09:00");
        assert_eq!(slots.len(), 4);
    }

    #[test]
    fn expand_combines_days_and_slots() {
        let assignments = expand("Mon,Tue", "09:00-11:00");
        assert_eq!(assignments.len(), 4);
        assert_eq!(
            assignments[0],
            SlotAssignment {
                day: "Mon".to_string(),
                slot: "09:00-10:00".to_string()
            }
        );
        assert_eq!(assignments[3].day, "Tue");
        assert_eq!(assignments[3].slot, "10:00-11:00");
    }

    #[test]
    fn expand_trims_day_whitespace() {
        let assignments = expand(" Mon , Tue ", "09:00-10:00");
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].day, "Mon");
        assert_eq!(assignments[1].day, "Tue");
    }

    #[test]
    fn no_days_yields_no_assignments() {
        assert!(expand("", "09:00-11:00").is_empty());
    }
}
