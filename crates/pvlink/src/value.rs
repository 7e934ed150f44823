// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Values, metadata and alarm information carried by a channel.

use std::str::FromStr;
use std::time::SystemTime;

/// Native field type reported by the transport when a channel connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    /// No connection metadata has arrived yet.
    #[default]
    Unknown,
    String,
    Short,
    Float,
    Enum,
    Char,
    Long,
    Double,
}

impl DataType {
    /// True once a connection has delivered the field type.
    pub fn is_known(self) -> bool {
        self != DataType::Unknown
    }
}

/// A process value, either received or to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Double(f64),
    Long(i64),
    Unsigned(u64),
    Text(String),
    Enum(u16),
    Array(Vec<f64>),
}

impl Value {
    /// Field type a record holding this value would report.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Double(_) | Value::Array(_) => DataType::Double,
            Value::Long(_) | Value::Unsigned(_) => DataType::Long,
            Value::Text(_) => DataType::String,
            Value::Enum(_) => DataType::Enum,
        }
    }

    /// Number of elements (arrays report their length, scalars 1).
    pub fn element_count(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            _ => 1,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::Long(v) => Some(*v as f64),
            Value::Unsigned(v) => Some(*v as f64),
            Value::Enum(v) => Some(f64::from(*v)),
            Value::Array(items) => items.first().copied(),
            Value::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Double(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Enum(v) => write!(f, "enum({})", v),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Parses command-line style literals: integers, then floats, then
/// comma-separated float arrays, falling back to text.
impl FromStr for Value {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return Ok(Value::Long(v));
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return Ok(Value::Double(v));
        }
        if trimmed.contains(',') {
            let parsed: Option<Vec<f64>> = trimmed
                .split(',')
                .map(|item| item.trim().parse::<f64>().ok())
                .collect();
            if let Some(items) = parsed {
                return Ok(Value::Array(items));
            }
        }
        Ok(Value::Text(s.to_string()))
    }
}

/// Alarm severity attached to every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlarmSeverity {
    #[default]
    NoAlarm,
    Minor,
    Major,
    Invalid,
}

/// Metadata delivered with a connection-up notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelInfo {
    /// Native field type.
    pub data_type: DataType,
    /// Element count (1 for scalars).
    pub element_count: usize,
    /// Host serving the variable, when the transport knows it.
    pub host: Option<String>,
    /// State labels of an enumerated field, indexed by `Value::Enum`.
    /// Empty for every other type.
    pub enum_strings: Vec<String>,
}

impl ChannelInfo {
    /// Attach enumeration labels. A blank label is replaced by its index so
    /// every state stays addressable by name.
    pub fn with_enum_strings<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_strings = labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| {
                let label = label.into();
                if label.trim().is_empty() {
                    i.to_string()
                } else {
                    label
                }
            })
            .collect();
        self
    }

    /// Label for an enumerated value, if the server supplied one.
    pub fn enum_label(&self, value: &Value) -> Option<&str> {
        match value {
            Value::Enum(index) => self.enum_strings.get(usize::from(*index)).map(String::as_str),
            _ => None,
        }
    }
}

/// A value together with its alarm state and display metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueUpdate {
    pub value: Value,
    pub severity: AlarmSeverity,
    /// Transport-specific alarm status code.
    pub status: u16,
    pub timestamp: Option<SystemTime>,
    pub units: Option<String>,
    pub precision: Option<u16>,
}

impl ValueUpdate {
    /// Update with no alarm, stamped now.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            severity: AlarmSeverity::NoAlarm,
            status: 0,
            timestamp: Some(SystemTime::now()),
            units: None,
            precision: None,
        }
    }

    /// Attach alarm severity and status.
    pub fn with_alarm(mut self, severity: AlarmSeverity, status: u16) -> Self {
        self.severity = severity;
        self.status = status;
        self
    }

    /// Attach engineering units.
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_precision(mut self, precision: u16) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn is_alarmed(&self) -> bool {
        self.severity != AlarmSeverity::NoAlarm
    }
}
