//! Field-name mapping for the datasheet backend.
//!
//! The hosted sheets went through two schema generations: the original
//! deployment used zh-CN column names for schedule fields, the later one
//! uses snake_case. Rather than probing multiple keys per field at every
//! call site, the active schema is declared once in configuration and this
//! module translates records to the one canonical shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value, json};

use crate::types::{Schedule, SchedulePatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldSchema {
    /// zh-CN schedule columns from the first sheet generation.
    #[default]
    Legacy,
    /// snake_case columns, matching the relational backend.
    V2,
}

impl FieldSchema {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" => Some(Self::Legacy),
            "v2" => Some(Self::V2),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::V2 => "v2",
        }
    }

    #[must_use]
    pub fn schedule(&self) -> &'static ScheduleColumns {
        match self {
            Self::Legacy => &LEGACY_SCHEDULE,
            Self::V2 => &V2_SCHEDULE,
        }
    }
}

pub struct ScheduleColumns {
    pub username: &'static str,
    pub work_store: &'static str,
    pub work_date: &'static str,
    pub start_time: &'static str,
    pub end_time: &'static str,
    pub duration: &'static str,
    pub notes: &'static str,
    pub created_at: &'static str,
    pub updated_at: &'static str,
}

static LEGACY_SCHEDULE: ScheduleColumns = ScheduleColumns {
    username: "username",
    work_store: "工作店铺",
    work_date: "工作日期",
    start_time: "开始时间",
    end_time: "结束时间",
    duration: "工作时长",
    notes: "备注",
    created_at: "created_at",
    updated_at: "updated_at",
};

static V2_SCHEDULE: ScheduleColumns = ScheduleColumns {
    username: "username",
    work_store: "work_store",
    work_date: "work_date",
    start_time: "start_time",
    end_time: "end_time",
    duration: "duration",
    notes: "notes",
    created_at: "created_at",
    updated_at: "updated_at",
};

/// Normalizes anything date-like the sheet may return (epoch millis, ISO
/// timestamp, plain date) to YYYY-MM-DD. Unparseable values map to "".
#[must_use]
pub fn to_ymd(value: &Value) -> String {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return dt.format("%Y-%m-%d").to_string();
            }
            if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
                return s.clone();
            }
            String::new()
        }
        _ => String::new(),
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> String {
    fields
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn datetime_field(fields: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// The sheet stores single-select and multi-select shop fields across
/// generations; both coerce to a string list.
fn store_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

pub fn schedule_from_record(
    schema: FieldSchema,
    record_id: &str,
    fields: &Map<String, Value>,
) -> Schedule {
    let cols = schema.schedule();
    Schedule {
        id: record_id.to_string(),
        username: string_field(fields, cols.username),
        work_store: store_list(fields.get(cols.work_store)),
        work_date: fields.get(cols.work_date).map(to_ymd).unwrap_or_default(),
        start_time: string_field(fields, cols.start_time),
        end_time: string_field(fields, cols.end_time),
        duration: fields
            .get(cols.duration)
            .and_then(Value::as_f64)
            .unwrap_or_default(),
        notes: string_field(fields, cols.notes),
        created_at: datetime_field(fields, cols.created_at),
        updated_at: datetime_field(fields, cols.updated_at),
    }
}

pub fn schedule_to_fields(schema: FieldSchema, schedule: &Schedule) -> Value {
    let cols = schema.schedule();
    let mut fields = Map::new();
    if !schedule.username.is_empty() {
        fields.insert(cols.username.into(), json!(schedule.username));
    }
    fields.insert(cols.work_store.into(), json!(schedule.work_store));
    fields.insert(cols.work_date.into(), json!(schedule.work_date));
    fields.insert(cols.start_time.into(), json!(schedule.start_time));
    fields.insert(cols.end_time.into(), json!(schedule.end_time));
    fields.insert(cols.duration.into(), json!(schedule.duration));
    fields.insert(cols.notes.into(), json!(schedule.notes));
    if let Some(created_at) = schedule.created_at {
        fields.insert(cols.created_at.into(), json!(created_at.to_rfc3339()));
    }
    Value::Object(fields)
}

pub fn schedule_patch_to_fields(schema: FieldSchema, patch: &SchedulePatch) -> Value {
    let cols = schema.schedule();
    let mut fields = Map::new();
    if let Some(username) = &patch.username {
        fields.insert(cols.username.into(), json!(username));
    }
    if let Some(work_store) = &patch.work_store {
        fields.insert(cols.work_store.into(), json!(work_store));
    }
    if let Some(work_date) = &patch.work_date {
        fields.insert(cols.work_date.into(), json!(work_date));
    }
    if let Some(start_time) = &patch.start_time {
        fields.insert(cols.start_time.into(), json!(start_time));
    }
    if let Some(end_time) = &patch.end_time {
        fields.insert(cols.end_time.into(), json!(end_time));
    }
    if let Some(duration) = patch.duration {
        fields.insert(cols.duration.into(), json!(duration));
    }
    if let Some(notes) = &patch.notes {
        fields.insert(cols.notes.into(), json!(notes));
    }
    fields.insert(cols.updated_at.into(), json!(Utc::now().to_rfc3339()));
    Value::Object(fields)
}
