//! Conversion of records into HEC wire fragments

use crate::config::HecConfig;
use crate::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// A structured log record as supplied by the caller
pub type Record = Map<String, Value>;

/// Epoch timestamp attached to a record
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventTime {
    seconds: i64,
    nanos: u32,
}

impl EventTime {
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self {
            seconds: seconds.saturating_add(i64::from(nanos / 1_000_000_000)),
            nanos: nanos % 1_000_000_000,
        }
    }

    pub fn now() -> Self {
        Utc::now().into()
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn nanos(&self) -> u32 {
        self.nanos
    }
}

impl From<i64> for EventTime {
    fn from(seconds: i64) -> Self {
        Self { seconds, nanos: 0 }
    }
}

impl From<DateTime<Utc>> for EventTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::new(dt.timestamp(), dt.timestamp_subsec_nanos())
    }
}

impl Serialize for EventTime {
    /// Whole seconds go out as an integer, anything finer as seconds with millisecond precision.
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let millis = i64::from(self.nanos / 1_000_000);
        if millis == 0 {
            serializer.serialize_i64(self.seconds)
        } else {
            let seconds = match self.seconds.checked_mul(1000).and_then(|ms| ms.checked_add(millis)) {
                Some(total_millis) => total_millis as f64 / 1000.0,
                None => self.seconds as f64 + millis as f64 / 1000.0,
            };
            serializer.serialize_f64(seconds)
        }
    }
}

/// A borrowed value placed into an event envelope
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventValue<'a> {
    Field(&'a Value),
    Record(&'a Record),
    Text(&'a str),
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: EventValue<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<EventTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sourcetype: Option<EventValue<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<EventValue<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<EventValue<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<EventValue<'a>>,
}

/// Look up `key` in the record; null and `false` count as absent.
pub fn field_value<'a>(record: &'a Record, key: Option<&str>) -> Option<&'a Value> {
    record
        .get(key?)
        .filter(|value| !matches!(value, Value::Null | Value::Bool(false)))
}

/// Per-record value when present, otherwise the configured default.
pub fn resolve_metadata<'a>(
    record: &'a Record,
    key: Option<&str>,
    default: Option<&'a str>,
) -> Option<EventValue<'a>> {
    field_value(record, key)
        .map(EventValue::Field)
        .or_else(|| default.map(EventValue::Text))
}

/// Format one record for whichever endpoint the config targets
pub fn format_record(time: EventTime, record: &Record, config: &HecConfig) -> Result<String> {
    if config.raw {
        Ok(format_event_raw(record, config))
    } else {
        format_event(time, record, config)
    }
}

/// One JSON envelope terminated by the line breaker
pub fn format_event(time: EventTime, record: &Record, config: &HecConfig) -> Result<String> {
    let event_key = config.event_key.as_deref();

    let event = match event_key {
        Some(_) => field_value(record, event_key)
            .map(EventValue::Field)
            .unwrap_or(EventValue::Text("")),
        None => EventValue::Record(record),
    };

    // The collector stamps its own ingestion time when we send only a field of the record.
    let time = if event_key.is_some() && !config.use_caller_time {
        None
    } else {
        Some(time)
    };

    let envelope = Envelope {
        event,
        time,
        sourcetype: config.sourcetype.as_deref().map(EventValue::Text),
        host: resolve_metadata(record, config.host_key.as_deref(), config.default_host.as_deref()),
        source: resolve_metadata(
            record,
            config.source_key.as_deref(),
            config.default_source.as_deref(),
        ),
        index: resolve_metadata(record, config.index_key.as_deref(), config.default_index.as_deref()),
    };

    let mut line = serde_json::to_string(&envelope)?;
    line.push_str(&config.line_breaker);
    Ok(line)
}

/// The event field as plain text terminated by the line breaker
pub fn format_event_raw(record: &Record, config: &HecConfig) -> String {
    let mut line = match field_value(record, config.event_key.as_deref()) {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    line.push_str(&config.line_breaker);
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("test records must be objects"),
        }
    }

    fn config() -> HecConfig {
        HecConfig {
            token: "T".to_string(),
            ..HecConfig::default()
        }
    }

    fn parse(line: &str) -> Map<String, Value> {
        assert!(line.ends_with('\n'));
        record(serde_json::from_str(line.trim_end()).unwrap())
    }

    #[test]
    fn test_structured_event_with_whole_record() {
        let line = format_event(EventTime::from(1000), &record(json!({"msg": "hello"})), &config()).unwrap();
        assert_eq!(line, "{\"event\":{\"msg\":\"hello\"},\"time\":1000}\n");
    }

    #[test]
    fn test_event_key_selects_body() {
        let mut config = config();
        config.event_key = Some("msg".to_string());

        let line = format_event(EventTime::from(1), &record(json!({"msg": "hi", "x": 1})), &config).unwrap();
        assert_eq!(parse(&line)["event"], json!("hi"));

        let line = format_event(EventTime::from(1), &record(json!({"x": 1})), &config).unwrap();
        assert_eq!(parse(&line)["event"], json!(""));

        let line = format_event(EventTime::from(1), &record(json!({"msg": null})), &config).unwrap();
        assert_eq!(parse(&line)["event"], json!(""));
    }

    #[test]
    fn test_event_key_keeps_structured_value() {
        let mut config = config();
        config.event_key = Some("payload".to_string());

        let line = format_event(
            EventTime::from(1),
            &record(json!({"payload": {"status": 200}})),
            &config,
        )
        .unwrap();
        assert_eq!(parse(&line)["event"], json!({"status": 200}));
    }

    #[test]
    fn test_time_depends_on_event_key_and_caller_time() {
        let rec = record(json!({"msg": "hi"}));
        let mut config = config();

        let parsed = parse(&format_event(EventTime::from(5), &rec, &config).unwrap());
        assert_eq!(parsed["time"], json!(5));

        config.event_key = Some("msg".to_string());
        let parsed = parse(&format_event(EventTime::from(5), &rec, &config).unwrap());
        assert!(!parsed.contains_key("time"));

        config.use_caller_time = true;
        let parsed = parse(&format_event(EventTime::from(5), &rec, &config).unwrap());
        assert_eq!(parsed["time"], json!(5));
    }

    #[test]
    fn test_exact_keys_with_sourcetype_only() {
        let mut config = config();
        config.sourcetype = Some("access".to_string());

        let parsed = parse(&format_event(EventTime::from(1), &record(json!({"a": 1})), &config).unwrap());
        let keys: Vec<&str> = parsed.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["event", "time", "sourcetype"]);
        assert_eq!(parsed["sourcetype"], json!("access"));
    }

    #[test]
    fn test_record_values_take_precedence_over_defaults() {
        let mut config = config();
        config.host_key = Some("h".to_string());
        config.source_key = Some("s".to_string());
        config.index_key = Some("i".to_string());
        config.default_host = Some("default-host".to_string());
        config.default_source = Some("default-source".to_string());
        config.default_index = Some("default-index".to_string());

        let rec = record(json!({"h": "web-1", "s": "/var/log/app", "i": "prod"}));
        let parsed = parse(&format_event(EventTime::from(1), &rec, &config).unwrap());
        assert_eq!(parsed["host"], json!("web-1"));
        assert_eq!(parsed["source"], json!("/var/log/app"));
        assert_eq!(parsed["index"], json!("prod"));

        // Each field falls back on its own
        let rec = record(json!({"s": "/var/log/app"}));
        let parsed = parse(&format_event(EventTime::from(1), &rec, &config).unwrap());
        assert_eq!(parsed["host"], json!("default-host"));
        assert_eq!(parsed["source"], json!("/var/log/app"));
        assert_eq!(parsed["index"], json!("default-index"));
    }

    #[test]
    fn test_metadata_omitted_when_unresolved() {
        let mut config = config();
        config.host_key = Some("h".to_string());

        let parsed = parse(&format_event(EventTime::from(1), &record(json!({"a": 1})), &config).unwrap());
        assert!(!parsed.contains_key("host"));
        assert!(!parsed.contains_key("source"));
        assert!(!parsed.contains_key("index"));
        assert!(!parsed.contains_key("sourcetype"));
    }

    #[test]
    fn test_resolve_metadata() {
        let rec = record(json!({"host": "a", "off": false, "port": 8080}));

        assert_eq!(
            resolve_metadata(&rec, Some("host"), Some("b")),
            Some(EventValue::Field(&json!("a")))
        );
        assert_eq!(resolve_metadata(&rec, Some("off"), Some("b")), Some(EventValue::Text("b")));
        assert_eq!(resolve_metadata(&rec, None, Some("b")), Some(EventValue::Text("b")));
        assert_eq!(resolve_metadata(&rec, Some("missing"), None), None);
        assert_eq!(
            resolve_metadata(&rec, Some("port"), None),
            Some(EventValue::Field(&json!(8080)))
        );
    }

    #[test]
    fn test_raw_event() {
        let mut config = config();
        config.raw = true;
        config.event_key = Some("msg".to_string());
        config.default_index = Some("main".to_string());

        assert_eq!(format_event_raw(&record(json!({"msg": "hi"})), &config), "hi\n");
        assert_eq!(format_event_raw(&record(json!({"other": "hi"})), &config), "\n");
        assert_eq!(format_event_raw(&record(json!({"msg": 42})), &config), "42\n");
        assert_eq!(
            format_record(EventTime::from(1), &record(json!({"msg": "hi"})), &config).unwrap(),
            "hi\n"
        );
    }

    #[test]
    fn test_custom_line_breaker() {
        let mut config = config();
        config.line_breaker = "\r\n".to_string();
        let line = format_event(EventTime::from(1), &record(json!({})), &config).unwrap();
        assert_eq!(line, "{\"event\":{},\"time\":1}\r\n");
    }

    #[test]
    fn test_event_time_serialization() {
        assert_eq!(serde_json::to_string(&EventTime::from(1000)).unwrap(), "1000");
        assert_eq!(serde_json::to_string(&EventTime::new(1000, 123_456_789)).unwrap(), "1000.123");
        assert_eq!(serde_json::to_string(&EventTime::new(1000, 500)).unwrap(), "1000");

        let dt = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        let time = EventTime::from(dt);
        assert_eq!(time.seconds(), 1_700_000_000);
        assert_eq!(serde_json::to_string(&time).unwrap(), "1700000000.25");
    }

    #[test]
    fn test_event_time_at_extreme_seconds() {
        let time = EventTime::new(i64::MAX, 1_500_000_000);
        assert_eq!(time.seconds(), i64::MAX);
        assert_eq!(time.nanos(), 500_000_000);

        let json = serde_json::to_string(&time).unwrap();
        let parsed: f64 = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, i64::MAX as f64);

        let json = serde_json::to_string(&EventTime::new(i64::MIN, 250_000_000)).unwrap();
        let parsed: f64 = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, i64::MIN as f64);
    }

    #[test]
    fn test_event_time_carries_whole_seconds() {
        let time = EventTime::new(10, 2_500_000_000);
        assert_eq!(time.seconds(), 12);
        assert_eq!(time.nanos(), 500_000_000);
    }
}
