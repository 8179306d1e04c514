use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{Result, WhoopError};
use crate::sports::sport_name;

/// Timestamp format used for every `created_at`, `updated_at`, `start` and
/// `end` field on the wire. Always UTC.
pub const WHOOP_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Parses a wire timestamp into a timezone-aware UTC datetime.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<FixedOffset>> {
    match NaiveDateTime::parse_from_str(raw, WHOOP_DATE_FORMAT) {
        Ok(naive) => Ok(utc().from_utc_datetime(&naive)),
        // some payloads carry an explicit offset instead of the Z suffix
        Err(_) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| WhoopError::validation(format!("invalid timestamp '{raw}': {e}"))),
    }
}

/// Parses a signed `HH:MM` offset such as `-05:00` or `+05:30`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    if raw == "Z" {
        return Ok(utc());
    }
    let re = offset_regex()
        .as_ref()
        .map_err(|e| WhoopError::validation(e.to_string()))?;
    let caps = re
        .captures(raw)
        .ok_or_else(|| WhoopError::validation(format!("invalid timezone offset '{raw}'")))?;

    let hours: i32 = caps[2].parse().unwrap_or_default();
    let minutes: i32 = caps[3].parse().unwrap_or_default();
    let mut seconds = hours * 3600 + minutes * 60;
    if &caps[1] == "-" {
        seconds = -seconds;
    }
    FixedOffset::east_opt(seconds)
        .ok_or_else(|| WhoopError::validation(format!("timezone offset out of range '{raw}'")))
}

fn offset_regex() -> &'static std::result::Result<Regex, regex::Error> {
    static OFFSET_RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    OFFSET_RE.get_or_init(|| Regex::new(r"^([+-])(\d{2}):(\d{2})$"))
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn whoop_datetime<'de, D>(deserializer: D) -> std::result::Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn whoop_datetime_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UserMeasurements {
    pub height_meter: f64,
    pub weight_kilogram: f64,
    pub max_heart_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreState {
    Scored,
    PendingScore,
    Unscorable,
    /// Any state this client does not know about yet.
    #[serde(other)]
    Unknown,
}

/// Fields shared by every cycle, sleep, recovery and workout record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecordMeta {
    pub user_id: i64,
    #[serde(deserialize_with = "whoop_datetime")]
    pub created_at: DateTime<FixedOffset>,
    #[serde(deserialize_with = "whoop_datetime")]
    pub updated_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub timezone_offset: Option<String>,
    pub score_state: ScoreState,
}

impl RecordMeta {
    /// The record's own UTC offset, if it carries one.
    pub fn utc_offset(&self) -> Result<Option<FixedOffset>> {
        self.timezone_offset
            .as_deref()
            .map(parse_utc_offset)
            .transpose()
    }
}

/// A record returned by one of the collection endpoints.
///
/// Parsing goes through serde: timestamps are normalised by the shared
/// [`RecordMeta`] fields, nested score objects are built by each record's
/// own derive. A `null` or absent score, or nested score part, becomes `None`.
pub trait UserData: DeserializeOwned + Serialize + Sized {
    fn meta(&self) -> &RecordMeta;

    /// Every timestamp on the record, for timezone localisation.
    fn timestamps_mut(&mut self) -> Vec<&mut DateTime<FixedOffset>>;

    fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Re-expresses all timestamps in the record's `timezone_offset`. The
    /// instants are unchanged, only the wall clock moves.
    fn localize(&mut self) -> Result<()> {
        let Some(offset) = self.meta().utc_offset()? else {
            return Ok(());
        };
        for ts in self.timestamps_mut() {
            *ts = ts.with_timezone(&offset);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CycleScore {
    pub strain: f64,
    pub kilojoule: f64,
    pub average_heart_rate: u32,
    pub max_heart_rate: u32,
}

impl CycleScore {
    pub fn calories(&self) -> f64 {
        self.kilojoule / 4.184
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Cycle {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub id: i64,
    #[serde(deserialize_with = "whoop_datetime")]
    pub start: DateTime<FixedOffset>,
    #[serde(default, deserialize_with = "whoop_datetime_opt")]
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub score: Option<CycleScore>,
}

impl UserData for Cycle {
    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn timestamps_mut(&mut self) -> Vec<&mut DateTime<FixedOffset>> {
        let mut stamps = vec![
            &mut self.meta.created_at,
            &mut self.meta.updated_at,
            &mut self.start,
        ];
        stamps.extend(self.end.as_mut());
        stamps
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SleepStages {
    pub total_in_bed_time_milli: i64,
    pub total_awake_time_milli: i64,
    pub total_no_data_time_milli: i64,
    pub total_light_sleep_time_milli: i64,
    pub total_slow_wave_sleep_time_milli: i64,
    pub total_rem_sleep_time_milli: i64,
    pub sleep_cycle_count: u32,
    pub disturbance_count: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SleepNeed {
    pub baseline_milli: i64,
    pub need_from_sleep_debt_milli: i64,
    pub need_from_recent_strain_milli: i64,
    pub need_from_recent_nap_milli: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SleepScore {
    #[serde(default)]
    pub stage_summary: Option<SleepStages>,
    #[serde(default)]
    pub sleep_needed: Option<SleepNeed>,
    #[serde(default)]
    pub respiratory_rate: Option<f64>,
    #[serde(default)]
    pub sleep_performance_percentage: Option<f64>,
    #[serde(default)]
    pub sleep_consistency_percentage: Option<f64>,
    #[serde(default)]
    pub sleep_efficiency_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sleep {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub id: i64,
    pub nap: bool,
    #[serde(deserialize_with = "whoop_datetime")]
    pub start: DateTime<FixedOffset>,
    #[serde(default, deserialize_with = "whoop_datetime_opt")]
    pub end: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub score: Option<SleepScore>,
}

impl UserData for Sleep {
    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn timestamps_mut(&mut self) -> Vec<&mut DateTime<FixedOffset>> {
        let mut stamps = vec![
            &mut self.meta.created_at,
            &mut self.meta.updated_at,
            &mut self.start,
        ];
        stamps.extend(self.end.as_mut());
        stamps
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecoveryScore {
    pub user_calibrating: bool,
    pub recovery_score: f64,
    pub resting_heart_rate: f64,
    pub hrv_rmssd_milli: f64,
    #[serde(default)]
    pub spo2_percentage: Option<f64>,
    #[serde(default)]
    pub skin_temp_celsius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Recovery {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub cycle_id: i64,
    pub sleep_id: i64,
    #[serde(default)]
    pub score: Option<RecoveryScore>,
}

impl UserData for Recovery {
    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn timestamps_mut(&mut self) -> Vec<&mut DateTime<FixedOffset>> {
        vec![&mut self.meta.created_at, &mut self.meta.updated_at]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ZoneDuration {
    pub zone_zero_milli: i64,
    pub zone_one_milli: i64,
    pub zone_two_milli: i64,
    pub zone_three_milli: i64,
    pub zone_four_milli: i64,
    pub zone_five_milli: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkoutScore {
    pub strain: f64,
    pub average_heart_rate: u32,
    pub max_heart_rate: u32,
    pub kilojoule: f64,
    pub percent_recorded: f64,
    #[serde(default)]
    pub distance_meter: Option<f64>,
    #[serde(default)]
    pub altitude_gain_meter: Option<f64>,
    #[serde(default)]
    pub altitude_change_meter: Option<f64>,
    #[serde(default)]
    pub zone_duration: Option<ZoneDuration>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Workout {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub id: i64,
    #[serde(deserialize_with = "whoop_datetime")]
    pub start: DateTime<FixedOffset>,
    #[serde(default, deserialize_with = "whoop_datetime_opt")]
    pub end: Option<DateTime<FixedOffset>>,
    pub sport_id: i64,
    #[serde(default)]
    pub score: Option<WorkoutScore>,
}

impl Workout {
    pub fn sport_name(&self) -> Option<&'static str> {
        sport_name(self.sport_id)
    }
}

impl UserData for Workout {
    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn timestamps_mut(&mut self) -> Vec<&mut DateTime<FixedOffset>> {
        let mut stamps = vec![
            &mut self.meta.created_at,
            &mut self.meta.updated_at,
            &mut self.start,
        ];
        stamps.extend(self.end.as_mut());
        stamps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cycle_json() -> Value {
        json!({
            "id": 93845,
            "user_id": 10129,
            "created_at": "2022-04-24T11:25:44.774Z",
            "updated_at": "2022-04-24T14:25:44.774Z",
            "start": "2022-04-24T02:25:44.774Z",
            "end": "2022-04-24T10:25:44.774Z",
            "timezone_offset": "-05:00",
            "score_state": "SCORED",
            "score": {
                "strain": 5.2951527,
                "kilojoule": 8288.297,
                "average_heart_rate": 68,
                "max_heart_rate": 141
            }
        })
    }

    #[test]
    fn parse_timestamp_test() {
        let ts = parse_timestamp("2022-04-24T11:25:44.774Z").unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 0);
        assert_eq!(ts.timestamp_millis(), 1650799544774);

        let whole = parse_timestamp("2022-04-24T11:25:44Z").unwrap();
        assert_eq!(whole.timestamp(), 1650799544);

        assert!(parse_timestamp("yesterday").unwrap_err().is_validation());
    }

    #[test]
    fn parse_utc_offset_test() {
        assert_eq!(parse_utc_offset("-05:00").unwrap().local_minus_utc(), -5 * 3600);
        assert_eq!(parse_utc_offset("+05:30").unwrap().local_minus_utc(), 5 * 3600 + 1800);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("0500").unwrap_err().is_validation());

        // compiled once, reused across calls
        assert!(std::ptr::eq(offset_regex(), offset_regex()));
        assert_eq!(parse_utc_offset("-05:00").unwrap(), parse_utc_offset("-05:00").unwrap());
    }

    #[test]
    fn cycle_from_value_test() {
        let cycle = Cycle::from_value(cycle_json()).unwrap();
        assert_eq!(cycle.id, 93845);
        assert_eq!(cycle.meta.user_id, 10129);
        assert_eq!(cycle.meta.score_state, ScoreState::Scored);
        assert!(cycle.end.is_some());

        let score = cycle.score.unwrap();
        assert_eq!(score.max_heart_rate, 141);
        assert!((score.calories() - 8288.297 / 4.184).abs() < 1e-9);
    }

    #[test]
    fn parse_twice_identical_test() {
        let raw = cycle_json();
        let first = Cycle::from_value(raw.clone()).unwrap();
        let second = Cycle::from_value(raw).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn null_score_is_none_test() {
        let mut raw = cycle_json();
        raw["score"] = Value::Null;
        raw["score_state"] = json!("PENDING_SCORE");
        let cycle = Cycle::from_value(raw).unwrap();
        assert!(cycle.score.is_none());
        assert_eq!(cycle.meta.score_state, ScoreState::PendingScore);
    }

    #[test]
    fn unknown_score_state_test() {
        let mut raw = cycle_json();
        raw["score_state"] = json!("RESCORING");
        let cycle = Cycle::from_value(raw).unwrap();
        assert_eq!(cycle.meta.score_state, ScoreState::Unknown);
        assert!(cycle.score.is_some());
    }

    #[test]
    fn missing_optional_fields_test() {
        let mut raw = cycle_json();
        let obj = raw.as_object_mut().unwrap();
        obj.remove("end");
        obj.remove("score");
        obj.remove("timezone_offset");
        obj.insert("unexpected".to_string(), json!(true));

        let cycle = Cycle::from_value(raw).unwrap();
        assert!(cycle.end.is_none());
        assert!(cycle.score.is_none());
        assert!(cycle.meta.timezone_offset.is_none());
    }

    #[test]
    fn missing_required_field_test() {
        let mut raw = cycle_json();
        raw.as_object_mut().unwrap().remove("start");
        assert!(matches!(Cycle::from_value(raw), Err(WhoopError::Json(_))));
    }

    #[test]
    fn partial_sleep_score_test() {
        let raw = json!({
            "id": 93845,
            "user_id": 10129,
            "created_at": "2022-04-24T11:25:44.774Z",
            "updated_at": "2022-04-24T14:25:44.774Z",
            "start": "2022-04-24T02:25:44.774Z",
            "end": "2022-04-24T10:25:44.774Z",
            "timezone_offset": "-05:00",
            "nap": false,
            "score_state": "SCORED",
            "score": {
                "stage_summary": null,
                "respiratory_rate": 16.11328125,
                "sleep_performance_percentage": 98
            }
        });
        let sleep = Sleep::from_value(raw).unwrap();
        let score = sleep.score.unwrap();
        assert!(score.stage_summary.is_none());
        assert!(score.sleep_needed.is_none());
        assert_eq!(score.sleep_performance_percentage, Some(98.0));
        assert!(score.sleep_efficiency_percentage.is_none());
    }

    #[test]
    fn recovery_from_value_test() {
        let raw = json!({
            "cycle_id": 93845,
            "sleep_id": 10235,
            "user_id": 10129,
            "created_at": "2022-04-24T11:25:44.774Z",
            "updated_at": "2022-04-24T14:25:44.774Z",
            "score_state": "SCORED",
            "score": {
                "user_calibrating": false,
                "recovery_score": 44,
                "resting_heart_rate": 64,
                "hrv_rmssd_milli": 31.813562,
                "spo2_percentage": 95.6875
            }
        });
        let recovery = Recovery::from_value(raw).unwrap();
        let score = recovery.score.unwrap();
        assert_eq!(score.recovery_score, 44.0);
        assert_eq!(score.spo2_percentage, Some(95.6875));
        assert!(score.skin_temp_celsius.is_none());
    }

    #[test]
    fn workout_from_value_test() {
        let raw = json!({
            "id": 1043,
            "user_id": 9012,
            "created_at": "2022-04-24T11:25:44.774Z",
            "updated_at": "2022-04-24T14:25:44.774Z",
            "start": "2022-04-24T02:25:44.774Z",
            "end": "2022-04-24T10:25:44.774Z",
            "timezone_offset": "-05:00",
            "sport_id": 1,
            "score_state": "SCORED",
            "score": {
                "strain": 8.2463,
                "average_heart_rate": 123,
                "max_heart_rate": 146,
                "kilojoule": 1569.34033203125,
                "percent_recorded": 100,
                "distance_meter": 1772.77035916,
                "altitude_gain_meter": 46.64384460449,
                "altitude_change_meter": -0.781372010707855,
                "zone_duration": {
                    "zone_zero_milli": 13458,
                    "zone_one_milli": 389370,
                    "zone_two_milli": 388367,
                    "zone_three_milli": 71137,
                    "zone_four_milli": 0,
                    "zone_five_milli": 0
                }
            }
        });
        let workout = Workout::from_value(raw).unwrap();
        assert_eq!(workout.sport_name(), Some("Cycling"));
        let zones = workout.score.unwrap().zone_duration.unwrap();
        assert_eq!(zones.zone_one_milli, 389370);
    }

    #[test]
    fn localize_test() {
        let mut cycle = Cycle::from_value(cycle_json()).unwrap();
        let before = cycle.start;
        cycle.localize().unwrap();

        assert_eq!(cycle.start, before);
        assert_eq!(cycle.start.offset().local_minus_utc(), -5 * 3600);
        assert_eq!(cycle.start.format("%H:%M").to_string(), "21:25");
        assert_eq!(cycle.end.unwrap().offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn localize_without_offset_test() {
        let mut raw = cycle_json();
        raw["timezone_offset"] = Value::Null;
        let mut cycle = Cycle::from_value(raw).unwrap();
        cycle.localize().unwrap();
        assert_eq!(cycle.start.offset().local_minus_utc(), 0);
    }
}
