use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::types::Source;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DiagnosticsRecord {
    #[serde(rename = "lastTurnOnTime")]
    pub last_turn_on_time: Option<DateTime<FixedOffset>>,
    #[serde(rename = "lastTurnOnSource")]
    pub last_turn_on_source: Option<Source>,
}

/// Latest-value store, written only on OFF → ON transitions.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsRecorder {
    record: DiagnosticsRecord,
}

impl DiagnosticsRecorder {
    pub fn record_turn_on(&mut self, now: DateTime<FixedOffset>, source: Source) {
        self.record = DiagnosticsRecord {
            last_turn_on_time: Some(now),
            last_turn_on_source: Some(source),
        };
    }

    pub fn snapshot(&self) -> DiagnosticsRecord {
        self.record
    }
}
