use std::{collections::HashSet, fmt};

use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::{
    error::ScheduleError,
    expr::{Bindings, ExprError, Expression},
    types::HvacMode,
};

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn index(self) -> usize {
        match self {
            Self::Mon => 0,
            Self::Tue => 1,
            Self::Wed => 2,
            Self::Thu => 3,
            Self::Fri => 4,
            Self::Sat => 5,
            Self::Sun => 6,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index % 7 {
            0 => Self::Mon,
            1 => Self::Tue,
            2 => Self::Wed,
            3 => Self::Thu,
            4 => Self::Fri,
            5 => Self::Sat,
            _ => Self::Sun,
        }
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        Self::from_index(weekday.num_days_from_monday() as usize)
    }

    pub fn previous(self) -> Self {
        Self::from_index(self.index() + 6)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mon => "MON",
            Self::Tue => "TUE",
            Self::Wed => "WED",
            Self::Thu => "THU",
            Self::Fri => "FRI",
            Self::Sat => "SAT",
            Self::Sun => "SUN",
        }
    }
}

/// Conditional attributes attached to a schedule entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub climate_target_temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hvac_mode: Option<HvacMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_if: Option<String>,
    #[serde(default)]
    pub keep_on: bool,
}

/// Sparse overlay: only the fields present replace the entry's attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributePatch {
    #[serde(default)]
    pub target_temperature: Option<f32>,
    #[serde(default)]
    pub climate_target_temperature: Option<f32>,
    #[serde(default)]
    pub hvac_mode: Option<HvacMode>,
    #[serde(default)]
    pub run_if: Option<String>,
    #[serde(default)]
    pub keep_on: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeUpdate {
    pub entity_id: String,
    pub data: AttributePatch,
}

impl AttributeSet {
    pub fn overlay(&mut self, patch: &AttributePatch) {
        if let Some(value) = patch.target_temperature {
            self.target_temperature = Some(value);
        }
        if let Some(value) = patch.climate_target_temperature {
            self.climate_target_temperature = Some(value);
        }
        if let Some(mode) = patch.hvac_mode {
            self.hvac_mode = Some(mode);
        }
        if let Some(run_if) = &patch.run_if {
            self.run_if = Some(run_if.clone());
        }
        if let Some(keep_on) = patch.keep_on {
            self.keep_on = keep_on;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleEntry {
    pub id: String,
    pub days: Vec<DayOfWeek>,
    #[serde(rename = "startMinutes")]
    pub start_minutes: u16,
    /// Exclusive. An end at or before the start continues into the next day.
    #[serde(rename = "endMinutes")]
    pub end_minutes: u16,
    #[serde(default)]
    pub attributes: AttributeSet,
}

impl ScheduleEntry {
    pub fn validate(&self) -> bool {
        let temperature_ok = |value: Option<f32>| value.map(f32::is_finite).unwrap_or(true);

        !self.id.is_empty()
            && !self.days.is_empty()
            && self.start_minutes < MINUTES_PER_DAY
            && self.end_minutes <= MINUTES_PER_DAY
            && self.start_minutes != self.end_minutes
            && temperature_ok(self.attributes.target_temperature)
            && temperature_ok(self.attributes.climate_target_temperature)
    }

    pub fn is_overnight(&self) -> bool {
        self.end_minutes <= self.start_minutes
    }

    /// Start of the window covering `minute` on `day`, in minutes relative to
    /// that day's midnight (negative when the window began the day before).
    fn effective_start(&self, day: DayOfWeek, minute: u16) -> Option<i32> {
        let start = self.start_minutes as i32;

        if !self.is_overnight() {
            let covers = self.days.contains(&day)
                && self.start_minutes <= minute
                && minute < self.end_minutes;
            return covers.then_some(start);
        }

        if self.days.contains(&day) && minute >= self.start_minutes {
            return Some(start);
        }
        if self.days.contains(&day.previous()) && minute < self.end_minutes {
            return Some(start - MINUTES_PER_DAY as i32);
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub enabled: bool,
    pub entries: Vec<ScheduleEntry>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: false,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionWarning {
    pub entry_id: String,
    pub error: ExprError,
}

impl fmt::Display for ConditionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run_if of entry '{}' failed: {}", self.entry_id, self.error)
    }
}

/// Outcome of one evaluation pass; recomputed every tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResult {
    pub active_entry: Option<ScheduleEntry>,
    pub condition_passed: bool,
    pub rolls_into_next: bool,
    pub warnings: Vec<ConditionWarning>,
}

impl EvaluationResult {
    /// The active entry when its condition passed.
    pub fn applying_entry(&self) -> Option<&ScheduleEntry> {
        self.active_entry
            .as_ref()
            .filter(|_| self.condition_passed)
    }
}

impl Schedule {
    /// Drops invalid entries and later entries repeating an id, then sorts by start.
    pub fn normalize(&mut self) {
        let mut seen = HashSet::new();
        self.entries
            .retain(|entry| entry.validate() && seen.insert(entry.id.clone()));
        self.entries
            .sort_by(|a, b| (a.start_minutes, &a.id).cmp(&(b.start_minutes, &b.id)));
    }

    pub fn entry(&self, id: &str) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Applies a `set attributes` call to the entry named by `entity_id`.
    pub fn apply_update(&mut self, update: &AttributeUpdate) -> Result<(), ScheduleError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == update.entity_id)
            .ok_or_else(|| ScheduleError::UnknownEntry(update.entity_id.clone()))?;

        let invalid = |field| ScheduleError::InvalidAttribute {
            id: update.entity_id.clone(),
            field,
        };
        if update
            .data
            .target_temperature
            .is_some_and(|value| !value.is_finite())
        {
            return Err(invalid("target_temperature"));
        }
        if update
            .data
            .climate_target_temperature
            .is_some_and(|value| !value.is_finite())
        {
            return Err(invalid("climate_target_temperature"));
        }

        entry.attributes.overlay(&update.data);
        Ok(())
    }

    /// Selects the entry covering `now` (latest start wins on overlap), checks
    /// its `run_if`, and, when `previous` names an entry that no longer
    /// applies, whether it rolls into an adjoining entry.
    pub fn evaluate(
        &self,
        now: DateTime<FixedOffset>,
        bindings: &Bindings,
        previous: Option<&str>,
    ) -> EvaluationResult {
        let mut result = EvaluationResult::default();
        if !self.enabled || self.entries.is_empty() {
            return result;
        }

        let day = DayOfWeek::from_chrono(now.weekday());
        let minute = now.hour() as u16 * 60 + now.minute() as u16;

        let active = self
            .entries
            .iter()
            .filter_map(|entry| entry.effective_start(day, minute).map(|start| (start, entry)))
            .max_by_key(|(start, _)| *start)
            .map(|(_, entry)| entry);

        if let Some(entry) = active {
            result.condition_passed = condition_holds(entry, bindings, &mut result.warnings);
            result.active_entry = Some(entry.clone());
        }

        let applying = result.applying_entry().map(|entry| entry.id.clone());
        let ended = previous
            .filter(|id| applying.as_deref() != Some(*id))
            .and_then(|id| self.entry(id));

        if let Some(ended) = ended {
            let boundary = ended.end_minutes % MINUTES_PER_DAY;
            let boundary_day = if minute >= boundary { day } else { day.previous() };

            let active_passed = result.condition_passed;
            let mut warnings = Vec::new();

            result.rolls_into_next = self
                .entries
                .iter()
                .filter(|next| {
                    next.id != ended.id
                        && next.start_minutes == boundary
                        && next.days.contains(&boundary_day)
                })
                .any(|next| match active {
                    Some(entry) if entry.id == next.id => active_passed,
                    _ => condition_holds(next, bindings, &mut warnings),
                });
            result.warnings.extend(warnings);
        }

        result
    }

    /// Next start or end boundary of any entry within the coming week. The scan
    /// begins yesterday so an overnight entry already running reports its end.
    pub fn next_event_epoch(&self, now: DateTime<FixedOffset>) -> Option<i64> {
        if !self.enabled || self.entries.is_empty() {
            return None;
        }

        let now_day = DayOfWeek::from_chrono(now.weekday());
        let now_minute = now.hour() as i64 * 60 + now.minute() as i64;

        let mut best: Option<DateTime<FixedOffset>> = None;

        for day_offset in -1..8i64 {
            let day =
                DayOfWeek::from_index((now_day.index() as i64 + day_offset).rem_euclid(7) as usize);
            for entry in self.entries.iter().filter(|entry| entry.days.contains(&day)) {
                let end_offset = if entry.is_overnight() {
                    MINUTES_PER_DAY as i64
                } else {
                    0
                };
                let boundaries = [
                    entry.start_minutes as i64,
                    entry.end_minutes as i64 + end_offset,
                ];

                for boundary in boundaries {
                    let absolute = day_offset * MINUTES_PER_DAY as i64 + boundary;
                    if absolute <= now_minute {
                        continue;
                    }

                    let date = now.date_naive()
                        + Duration::days(absolute.div_euclid(MINUTES_PER_DAY as i64));
                    let minute_of_day = absolute.rem_euclid(MINUTES_PER_DAY as i64);
                    let Some(naive) =
                        date.and_hms_opt((minute_of_day / 60) as u32, (minute_of_day % 60) as u32, 0)
                    else {
                        continue;
                    };

                    let Some(candidate) = now.offset().from_local_datetime(&naive).single() else {
                        continue;
                    };

                    if best.map(|current| candidate < current).unwrap_or(true) {
                        best = Some(candidate);
                    }
                }
            }
        }

        best.map(|dt| dt.timestamp())
    }
}

fn condition_holds(
    entry: &ScheduleEntry,
    bindings: &Bindings,
    warnings: &mut Vec<ConditionWarning>,
) -> bool {
    let Some(source) = entry.attributes.run_if.as_deref() else {
        return true;
    };

    match Expression::parse(source).and_then(|expr| expr.evaluate_bool(bindings)) {
        Ok(passed) => passed,
        Err(error) => {
            warnings.push(ConditionWarning {
                entry_id: entry.id.clone(),
                error,
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::expr::Value;

    const WEEKDAYS: [DayOfWeek; 5] = [
        DayOfWeek::Mon,
        DayOfWeek::Tue,
        DayOfWeek::Wed,
        DayOfWeek::Thu,
        DayOfWeek::Fri,
    ];

    // Jan 5, 2026 is a Monday.
    fn fixed_time(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, day, hour, minute, 0)
            .unwrap()
    }

    fn entry(id: &str, days: &[DayOfWeek], start: (u16, u16), end: (u16, u16)) -> ScheduleEntry {
        ScheduleEntry {
            id: id.to_string(),
            days: days.to_vec(),
            start_minutes: start.0 * 60 + start.1,
            end_minutes: end.0 * 60 + end.1,
            attributes: AttributeSet::default(),
        }
    }

    fn schedule(entries: Vec<ScheduleEntry>) -> Schedule {
        let mut schedule = Schedule {
            enabled: true,
            entries,
        };
        schedule.normalize();
        schedule
    }

    fn morning() -> Schedule {
        let mut a = entry("morning", &WEEKDAYS, (6, 0), (7, 25));
        a.attributes.target_temperature = Some(21.0);
        let mut b = entry("commute", &WEEKDAYS, (7, 25), (9, 0));
        b.attributes.keep_on = true;
        schedule(vec![a, b])
    }

    #[test]
    fn selects_entry_whose_window_contains_now() {
        let schedule = morning();
        let result = schedule.evaluate(fixed_time(5, 6, 30), &Bindings::new(), None);

        assert_eq!(
            result.active_entry.as_ref().map(|e| e.id.as_str()),
            Some("morning")
        );
        assert!(result.condition_passed);
        assert!(!result.rolls_into_next);

        // End is exclusive; Saturday is not listed.
        let result = schedule.evaluate(fixed_time(5, 9, 0), &Bindings::new(), None);
        assert_eq!(result.active_entry, None);
        let result = schedule.evaluate(fixed_time(10, 6, 30), &Bindings::new(), None);
        assert_eq!(result.active_entry, None);
    }

    #[test]
    fn contiguous_entry_rolls_over_at_boundary() {
        let schedule = morning();
        let result = schedule.evaluate(fixed_time(5, 7, 25), &Bindings::new(), Some("morning"));

        assert_eq!(
            result.applying_entry().map(|e| e.id.as_str()),
            Some("commute")
        );
        assert!(result.rolls_into_next);
    }

    #[test]
    fn failing_next_condition_does_not_roll_over() {
        let mut schedule = morning();
        schedule.entries[1].attributes.run_if = Some("room_temperature < 19".to_string());

        let mut bindings = Bindings::new();
        bindings.insert("room_temperature".to_string(), Value::Number(22.0));

        let result = schedule.evaluate(fixed_time(5, 7, 25), &bindings, Some("morning"));
        assert_eq!(
            result.active_entry.as_ref().map(|e| e.id.as_str()),
            Some("commute")
        );
        assert!(!result.condition_passed);
        assert!(!result.rolls_into_next);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn later_start_wins_on_overlap() {
        let mut all_day = entry("all-day", &WEEKDAYS, (0, 0), (24, 0));
        all_day.attributes.target_temperature = Some(18.0);
        let mut evening = entry("evening", &WEEKDAYS, (18, 0), (22, 0));
        evening.attributes.target_temperature = Some(22.0);
        let schedule = schedule(vec![evening, all_day]);

        let result = schedule.evaluate(fixed_time(6, 19, 0), &Bindings::new(), None);
        assert_eq!(
            result.active_entry.as_ref().map(|e| e.id.as_str()),
            Some("evening")
        );

        let result = schedule.evaluate(fixed_time(6, 23, 0), &Bindings::new(), None);
        assert_eq!(
            result.active_entry.as_ref().map(|e| e.id.as_str()),
            Some("all-day")
        );
    }

    #[test]
    fn overnight_entry_continues_into_next_day() {
        let schedule = schedule(vec![entry("night", &[DayOfWeek::Sun], (22, 0), (6, 30))]);

        // Sunday 23:00 and Monday 05:00 are covered, Monday 22:30 is not.
        let sunday = schedule.evaluate(fixed_time(4, 23, 0), &Bindings::new(), None);
        assert!(sunday.active_entry.is_some());
        let monday = schedule.evaluate(fixed_time(5, 5, 0), &Bindings::new(), None);
        assert!(monday.active_entry.is_some());
        let later = schedule.evaluate(fixed_time(5, 22, 30), &Bindings::new(), None);
        assert!(later.active_entry.is_none());
    }

    #[test]
    fn malformed_condition_is_a_warning_not_a_failure() {
        let mut broken = entry("broken", &WEEKDAYS, (6, 0), (12, 0));
        broken.attributes.run_if = Some("room_temperature <".to_string());
        let schedule = schedule(vec![broken]);

        let result = schedule.evaluate(fixed_time(5, 8, 0), &Bindings::new(), None);
        assert!(result.active_entry.is_some());
        assert!(!result.condition_passed);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].entry_id, "broken");
        assert_eq!(result.warnings[0].error, ExprError::UnexpectedEnd);
    }

    #[test]
    fn missing_variable_fails_condition() {
        let mut gated = entry("gated", &WEEKDAYS, (6, 0), (12, 0));
        gated.attributes.run_if = Some("outside_temperature < 5".to_string());
        let schedule = schedule(vec![gated]);

        let result = schedule.evaluate(fixed_time(5, 8, 0), &Bindings::new(), None);
        assert!(!result.condition_passed);
        assert_eq!(
            result.warnings[0].error,
            ExprError::UnknownVariable("outside_temperature".to_string())
        );
    }

    #[test]
    fn disabled_schedule_has_no_active_entry() {
        let mut schedule = morning();
        schedule.enabled = false;

        let result = schedule.evaluate(fixed_time(5, 6, 30), &Bindings::new(), Some("morning"));
        assert_eq!(result, EvaluationResult::default());
    }

    #[test]
    fn update_overlays_only_present_fields() {
        let mut schedule = morning();
        let update: AttributeUpdate = serde_json::from_str(
            r#"{"entity_id":"morning","data":{"run_if":"room_temperature < 20","keep_on":true}}"#,
        )
        .unwrap();

        schedule.apply_update(&update).unwrap();
        let attributes = &schedule.entry("morning").unwrap().attributes;

        assert_eq!(attributes.target_temperature, Some(21.0));
        assert_eq!(attributes.run_if.as_deref(), Some("room_temperature < 20"));
        assert!(attributes.keep_on);
        assert_eq!(attributes.hvac_mode, None);
    }

    #[test]
    fn update_rejects_unknown_entry_and_non_finite_values() {
        let mut schedule = morning();
        let unknown = AttributeUpdate {
            entity_id: "nope".to_string(),
            data: AttributePatch::default(),
        };
        assert_eq!(
            schedule.apply_update(&unknown),
            Err(ScheduleError::UnknownEntry("nope".to_string()))
        );

        let invalid = AttributeUpdate {
            entity_id: "morning".to_string(),
            data: AttributePatch {
                target_temperature: Some(f32::NAN),
                ..AttributePatch::default()
            },
        };
        assert!(matches!(
            schedule.apply_update(&invalid),
            Err(ScheduleError::InvalidAttribute { .. })
        ));
        assert_eq!(
            schedule.entry("morning").unwrap().attributes.target_temperature,
            Some(21.0)
        );
    }

    #[test]
    fn normalize_drops_invalid_and_duplicate_entries() {
        let schedule = schedule(vec![
            entry("a", &WEEKDAYS, (6, 0), (6, 0)),
            entry("b", &[], (6, 0), (7, 0)),
            entry("c", &WEEKDAYS, (25, 0), (26, 0)),
            entry("d", &WEEKDAYS, (8, 0), (9, 0)),
            entry("d", &WEEKDAYS, (8, 0), (9, 0)),
            entry("e", &WEEKDAYS, (7, 0), (8, 0)),
            entry("d", &WEEKDAYS, (5, 0), (6, 0)),
        ]);

        let ids: Vec<_> = schedule.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e", "d"]);
        assert_eq!(schedule.entry("d").unwrap().start_minutes, 8 * 60);
    }

    #[test]
    fn finds_next_boundary() {
        let schedule = morning();

        let next = schedule.next_event_epoch(fixed_time(5, 6, 1)).unwrap();
        assert_eq!(next, fixed_time(5, 7, 25).timestamp());

        // Friday evening: next boundary is Monday 06:00.
        let next = schedule.next_event_epoch(fixed_time(9, 20, 0)).unwrap();
        assert_eq!(next, fixed_time(12, 6, 0).timestamp());
    }

    #[test]
    fn running_overnight_entry_reports_its_end() {
        let schedule = schedule(vec![entry("night", &[DayOfWeek::Sun], (22, 0), (6, 30))]);

        let next = schedule.next_event_epoch(fixed_time(5, 5, 0)).unwrap();
        assert_eq!(next, fixed_time(5, 6, 30).timestamp());

        // Past the end, the next boundary is the following Sunday's start.
        let next = schedule.next_event_epoch(fixed_time(5, 7, 0)).unwrap();
        assert_eq!(next, fixed_time(11, 22, 0).timestamp());
    }

    #[test]
    fn deserializes_entries() {
        let raw = r#"{
            "enabled": true,
            "entries": [{
                "id": "morning",
                "days": ["MON", "TUE"],
                "startMinutes": 360,
                "endMinutes": 445,
                "attributes": {"target_temperature": 21, "hvac_mode": "HEAT"}
            }]
        }"#;
        let schedule: Schedule = serde_json::from_str(raw).unwrap();

        assert_eq!(schedule.entries[0].attributes.hvac_mode, Some(HvacMode::Heat));
        assert_eq!(schedule.entries[0].attributes.target_temperature, Some(21.0));
        assert!(!schedule.entries[0].attributes.keep_on);
    }
}
