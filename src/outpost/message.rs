//! Wire messages exchanged with the deep-slumber server.
//!
//! Every frame is a JSON object carrying a numeric `msgType` tag next to the
//! fields of its kind. Decoding reads the tag first and only then interprets
//! the rest of the object, so an unknown kind never produces a half-built
//! message.

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::fmt;
use thiserror::Error;

/// Format of event timestamps on the wire.
pub const EVENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format of settings dates. The fraction is optional when parsing.
pub const SETTINGS_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const SETTINGS_DATE_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Largest magnitude below which every integral f64 is exactly representable.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Kind of a frame, carried in its `msgType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    Settings,
    Command,
    Event,
    Heartbeat,
}

impl MessageType {
    pub fn code(self) -> u64 {
        match self {
            MessageType::Hello => 1,
            MessageType::Settings => 2,
            MessageType::Command => 3,
            MessageType::Event => 4,
            MessageType::Heartbeat => 100,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(MessageType::Hello),
            2 => Some(MessageType::Settings),
            3 => Some(MessageType::Command),
            4 => Some(MessageType::Event),
            100 => Some(MessageType::Heartbeat),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Hello => "HELLO",
            MessageType::Settings => "SETTINGS",
            MessageType::Command => "COMMAND",
            MessageType::Event => "EVENT",
            MessageType::Heartbeat => "HEARTBEAT",
        };
        write!(f, "{name}")
    }
}

/// Domain event kinds reported to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Ignore,
    StartRec,
    StopRec,
    PauseRec,
    ResumeRec,
    StartWaking,
    UserAbortWaking,
    EndWaking,
    Movement,
    Temperature,
    Pressure,
    Humidity,
    StateChange,
}

impl EventType {
    pub fn code(self) -> u64 {
        match self {
            EventType::Ignore => 0,
            EventType::StartRec => 1,
            EventType::StopRec => 2,
            EventType::PauseRec => 3,
            EventType::ResumeRec => 4,
            EventType::StartWaking => 10,
            EventType::UserAbortWaking => 11,
            EventType::EndWaking => 12,
            EventType::Movement => 1000,
            EventType::Temperature => 1001,
            EventType::Pressure => 1002,
            EventType::Humidity => 1003,
            EventType::StateChange => 2000,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        let kind = match code {
            0 => EventType::Ignore,
            1 => EventType::StartRec,
            2 => EventType::StopRec,
            3 => EventType::PauseRec,
            4 => EventType::ResumeRec,
            10 => EventType::StartWaking,
            11 => EventType::UserAbortWaking,
            12 => EventType::EndWaking,
            1000 => EventType::Movement,
            1001 => EventType::Temperature,
            1002 => EventType::Pressure,
            1003 => EventType::Humidity,
            2000 => EventType::StateChange,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            EventType::Ignore => "IGNORE",
            EventType::StartRec => "START_REC",
            EventType::StopRec => "STOP_REC",
            EventType::PauseRec => "PAUSE_REC",
            EventType::ResumeRec => "RESUME_REC",
            EventType::StartWaking => "START_WAKING",
            EventType::UserAbortWaking => "USER_ABORT_WAKING",
            EventType::EndWaking => "END_WAKING",
            EventType::Movement => "MOVEMENT",
            EventType::Temperature => "TEMPERATURE",
            EventType::Pressure => "PRESSURE",
            EventType::Humidity => "HUMIDITY",
            EventType::StateChange => "STATE_CHANGE",
        }
    }
}

/// Why a frame could not be turned into a [`Message`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame carries no numeric msgType")]
    MissingType,

    #[error("unknown msgType {0}")]
    UnknownType(u64),

    #[error("malformed {kind} frame: {source}")]
    Body {
        kind: MessageType,
        #[source]
        source: serde_json::Error,
    },

    #[error("field {field} holds an invalid date {value:?}: {source}")]
    Date {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("unknown event_type {0}")]
    UnknownEventType(u64),
}

/// First frame of every connection, identifying the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub hwid: String,
}

/// A domain event reported by the device.
///
/// Everything except `hwid` is fixed at construction; the transport stamps the
/// hardware id when the event is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub hwid: Option<String>,
    pub event_type: EventType,
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

impl Event {
    pub fn new(event_type: EventType, value: f64, timestamp: NaiveDateTime) -> Self {
        Self {
            hwid: None,
            event_type,
            timestamp,
            value,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event {}@{}: {}",
            self.event_type.name(),
            self.timestamp.format(EVENT_TIMESTAMP_FORMAT),
            self.value
        )
    }
}

/// Sleep-schedule settings pushed by the server.
///
/// Only the wake times and `wake_max_span` drive behaviour; the remaining
/// fields are kept so they can be inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub earliest_wake_time: Option<NaiveDateTime>,
    pub latest_wake_time: Option<NaiveDateTime>,
    /// Maximum wake window in seconds. 0 selects the default duration and
    /// negative values are rejected when the window is computed.
    pub wake_max_span: i64,
    pub wake_offset_estimator: Option<Value>,
    pub acc_sensitivity: f64,
    pub gyr_sensitivity: f64,
    pub ir_sensitivity: f64,
    pub data_density: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            earliest_wake_time: None,
            latest_wake_time: None,
            wake_max_span: 0,
            wake_offset_estimator: None,
            acc_sensitivity: 0.0,
            gyr_sensitivity: 0.0,
            ir_sensitivity: 0.0,
            data_density: 1.0,
        }
    }
}

/// Any frame the codec understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(Hello),
    Settings(Settings),
    /// Commands are opaque; listeners receive the whole frame.
    Command(Value),
    Event(Event),
    Heartbeat,
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello(_) => MessageType::Hello,
            Message::Settings(_) => MessageType::Settings,
            Message::Command(_) => MessageType::Command,
            Message::Event(_) => MessageType::Event,
            Message::Heartbeat => MessageType::Heartbeat,
        }
    }

    /// Serialize into a JSON text frame.
    pub fn encode(&self) -> String {
        let msg_type = self.message_type().code();
        let frame = match self {
            Message::Hello(hello) => json!({ "msgType": msg_type, "hwid": hello.hwid }),
            Message::Event(event) => json!({
                "hwid": event.hwid,
                "msgType": msg_type,
                "event_type": event.event_type.code(),
                "timestamp": event.timestamp.format(EVENT_TIMESTAMP_FORMAT).to_string(),
                "value": number_value(event.value),
            }),
            Message::Settings(settings) => json!({
                "msgType": msg_type,
                "earliestWakeTime": settings.earliest_wake_time.map(date_value),
                "latestWakeTime": settings.latest_wake_time.map(date_value),
                "wakeMaxSpan": settings.wake_max_span,
                "wakeOffsetEstimator": settings.wake_offset_estimator,
                "accSensitivity": number_value(settings.acc_sensitivity),
                "gyrSensitivity": number_value(settings.gyr_sensitivity),
                "irSensitivity": number_value(settings.ir_sensitivity),
                "dataDensity": number_value(settings.data_density),
            }),
            Message::Command(payload) => {
                let mut object = match payload {
                    Value::Object(map) => map.clone(),
                    other => {
                        let mut map = Map::new();
                        map.insert("payload".to_string(), other.clone());
                        map
                    }
                };
                object.insert("msgType".to_string(), json!(msg_type));
                Value::Object(object)
            }
            Message::Heartbeat => json!({ "msgType": msg_type }),
        };
        frame.to_string()
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Message::Event(event)
    }
}

/// Integral values go out as JSON integers, everything else as floats.
fn number_value(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < MAX_EXACT_INTEGER {
        json!(value as i64)
    } else {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn date_value(date: NaiveDateTime) -> Value {
    json!({ "date": date.format(SETTINGS_DATE_OUTPUT_FORMAT).to_string() })
}

#[derive(Deserialize)]
struct WireDate {
    date: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFrame {
    #[serde(default)]
    earliest_wake_time: Option<WireDate>,
    #[serde(default)]
    latest_wake_time: Option<WireDate>,
    #[serde(default)]
    wake_max_span: Option<f64>,
    #[serde(default)]
    wake_offset_estimator: Option<Value>,
    #[serde(default)]
    acc_sensitivity: Option<f64>,
    #[serde(default)]
    gyr_sensitivity: Option<f64>,
    #[serde(default)]
    ir_sensitivity: Option<f64>,
    #[serde(default)]
    data_density: Option<f64>,
}

#[derive(Deserialize)]
struct HelloFrame {
    hwid: String,
}

#[derive(Deserialize)]
struct EventFrame {
    #[serde(default)]
    hwid: Option<String>,
    event_type: u64,
    timestamp: String,
    #[serde(default)]
    value: f64,
}

fn parse_date(field: &'static str, wire: Option<WireDate>) -> Result<Option<NaiveDateTime>, DecodeError> {
    wire.map(|w| {
        NaiveDateTime::parse_from_str(&w.date, SETTINGS_DATE_FORMAT).map_err(|source| {
            DecodeError::Date {
                field,
                value: w.date,
                source,
            }
        })
    })
    .transpose()
}

fn body<T: for<'de> Deserialize<'de>>(kind: MessageType, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Body { kind, source })
}

/// Decode one text frame.
pub fn decode_frame(text: &str) -> Result<Message, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let object = value.as_object().ok_or(DecodeError::NotAnObject)?;
    let code = object
        .get("msgType")
        .and_then(Value::as_u64)
        .ok_or(DecodeError::MissingType)?;
    let kind = MessageType::from_code(code).ok_or(DecodeError::UnknownType(code))?;

    match kind {
        MessageType::Hello => {
            let frame: HelloFrame = body(kind, value)?;
            Ok(Message::Hello(Hello { hwid: frame.hwid }))
        }
        MessageType::Settings => {
            let frame: SettingsFrame = body(kind, value)?;
            let defaults = Settings::default();
            Ok(Message::Settings(Settings {
                earliest_wake_time: parse_date("earliestWakeTime", frame.earliest_wake_time)?,
                latest_wake_time: parse_date("latestWakeTime", frame.latest_wake_time)?,
                wake_max_span: frame.wake_max_span.map_or(defaults.wake_max_span, |s| s.round() as i64),
                wake_offset_estimator: frame.wake_offset_estimator.filter(|v| !v.is_null()),
                acc_sensitivity: frame.acc_sensitivity.unwrap_or(defaults.acc_sensitivity),
                gyr_sensitivity: frame.gyr_sensitivity.unwrap_or(defaults.gyr_sensitivity),
                ir_sensitivity: frame.ir_sensitivity.unwrap_or(defaults.ir_sensitivity),
                data_density: frame.data_density.unwrap_or(defaults.data_density),
            }))
        }
        MessageType::Command => Ok(Message::Command(value)),
        MessageType::Event => {
            let frame: EventFrame = body(kind, value)?;
            let event_type = EventType::from_code(frame.event_type)
                .ok_or(DecodeError::UnknownEventType(frame.event_type))?;
            let timestamp = NaiveDateTime::parse_from_str(&frame.timestamp, EVENT_TIMESTAMP_FORMAT)
                .map_err(|source| DecodeError::Date {
                    field: "timestamp",
                    value: frame.timestamp.clone(),
                    source,
                })?;
            Ok(Message::Event(Event {
                hwid: frame.hwid,
                event_type,
                timestamp,
                value: frame.value,
            }))
        }
        MessageType::Heartbeat => Ok(Message::Heartbeat),
    }
}
