use std::collections::HashMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::retry::RetryPolicy;

/// Metadata keys carrying framework identity across the backend boundary.
/// `JOB_CLASS` is authoritative for dispatch; the type-string heuristic is
/// a fallback only.
pub mod meta {
    pub const JOB_CLASS: &str = "job_class";
    pub const JOB_ID: &str = "job_id";
    pub const EXECUTIONS: &str = "executions";
    pub const LOCALE: &str = "locale";
    pub const QUEUE_NAME: &str = "queue_name";
}

/// Handle returned by the backend when a job is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
}

/// Normalized job envelope exchanged with the backend.
///
/// Invariants: `job_type` is a non-empty routing key and `queue` always
/// resolves to a non-empty string, even when the caller supplied none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    /// Backend-assigned id; absent until the backend accepts the job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub job_type: String,

    pub args: Vec<Value>,

    pub queue: String,

    /// Backend-scale priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// UTC, truncated to whole seconds
    #[serde(default, with = "iso8601_seconds", skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,

    #[serde(rename = "retry", default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
}

impl JobEnvelope {
    pub fn new(job_type: impl Into<String>, args: Vec<Value>, queue: impl Into<String>) -> Self {
        Self {
            id: None,
            job_type: job_type.into(),
            args,
            queue: queue.into(),
            priority: None,
            scheduled_at: None,
            retry: None,
            meta: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the execution instant, normalized to UTC at second precision
    pub fn with_scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at.trunc_subsecs(0));
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

mod iso8601_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_str(&at.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|at| at.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn scheduled_at_truncates_to_whole_seconds() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(750);
        let envelope = JobEnvelope::new("email.send", vec![], "default").with_scheduled_at(at);

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["scheduled_at"], "2024-05-01T12:30:45Z");
    }

    #[test]
    fn optional_fields_are_omitted_from_the_wire() {
        let envelope = JobEnvelope::new("email.send", vec![serde_json::json!(42)], "default");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["type"], "email.send");
        assert_eq!(json["queue"], "default");
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("priority"));
        assert!(!object.contains_key("scheduled_at"));
        assert!(!object.contains_key("retry"));
        assert!(!object.contains_key("meta"));
    }

    #[test]
    fn round_trips_through_json() {
        let envelope = JobEnvelope::new("billing.charge", vec![serde_json::json!("user-1")], "billing")
            .with_priority(8)
            .with_meta(meta::JOB_CLASS, "Billing::ChargeJob");

        let json = serde_json::to_string(&envelope).unwrap();
        let back: JobEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(back.job_type, "billing.charge");
        assert_eq!(back.priority, Some(8));
        assert_eq!(back.meta.get(meta::JOB_CLASS).unwrap(), "Billing::ChargeJob");
    }
}
