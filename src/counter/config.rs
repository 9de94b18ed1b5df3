use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::counter::params::QueryParams;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("this key ({0}) is not supported on the counter configuration")]
    UnsupportedField(String),
    #[error("value for {value} cannot be stored under key {key}")]
    FieldMismatch { key: Field, value: Field },
}

/// A time unit the counter can display.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Digit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl Digit {
    pub const ALL: [Digit; 4] = [Digit::Days, Digit::Hours, Digit::Minutes, Digit::Seconds];

    pub fn token(self) -> &'static str {
        match self {
            Digit::Days => "d",
            Digit::Hours => "h",
            Digit::Minutes => "m",
            Digit::Seconds => "s",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "d" => Some(Digit::Days),
            "h" => Some(Digit::Hours),
            "m" => Some(Digit::Minutes),
            "s" => Some(Digit::Seconds),
            _ => None,
        }
    }

    pub fn unit_name(self) -> &'static str {
        match self {
            Digit::Days => "days",
            Digit::Hours => "hours",
            Digit::Minutes => "minutes",
            Digit::Seconds => "seconds",
        }
    }
}

/// The closed set of keys the configuration is stored under.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Field {
    EndDate,
    Digits,
    Title,
    ImageId,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::EndDate, Field::Digits, Field::Title, Field::ImageId];

    pub fn key(self) -> &'static str {
        match self {
            Field::EndDate => "endDate",
            Field::Digits => "digits",
            Field::Title => "title",
            Field::ImageId => "imageId",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Field {
    type Err = ConfigError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|field| field.key() == key)
            .ok_or_else(|| ConfigError::UnsupportedField(key.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub end_date: DateTime<FixedOffset>,
    pub digits: Vec<Digit>,
    pub title: String,
    pub image_id: String,
}

impl Configuration {
    /// Builds a configuration from query parameters. Never fails: absent or
    /// unreadable values resolve to their defaults, `now` for the end date.
    pub fn decode(params: &QueryParams, now: DateTime<Utc>) -> Self {
        Self {
            end_date: decode_end_date(params.get(Field::EndDate.key()), now),
            digits: decode_digits(params.get(Field::Digits.key())),
            title: decode_text(params.get(Field::Title.key())),
            image_id: decode_text(params.get(Field::ImageId.key())),
        }
    }

    pub fn field(&self, field: Field) -> FieldValue {
        match field {
            Field::EndDate => FieldValue::EndDate(self.end_date),
            Field::Digits => FieldValue::Digits(self.digits.clone()),
            Field::Title => FieldValue::Title(self.title.clone()),
            Field::ImageId => FieldValue::ImageId(self.image_id.clone()),
        }
    }

    pub fn shows(&self, digit: Digit) -> bool {
        self.digits.contains(&digit)
    }
}

/// A single typed configuration value tagged with the field it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    EndDate(DateTime<FixedOffset>),
    Digits(Vec<Digit>),
    Title(String),
    ImageId(String),
}

impl FieldValue {
    pub fn field(&self) -> Field {
        match self {
            FieldValue::EndDate(_) => Field::EndDate,
            FieldValue::Digits(_) => Field::Digits,
            FieldValue::Title(_) => Field::Title,
            FieldValue::ImageId(_) => Field::ImageId,
        }
    }
}

/// Partial configuration; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub end_date: Option<DateTime<FixedOffset>>,
    pub digits: Option<Vec<Digit>>,
    pub title: Option<String>,
    pub image_id: Option<String>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// Present fields in key order.
    pub fn values(&self) -> Vec<FieldValue> {
        let mut values = Vec::with_capacity(4);
        if let Some(end_date) = self.end_date {
            values.push(FieldValue::EndDate(end_date));
        }
        if let Some(digits) = &self.digits {
            values.push(FieldValue::Digits(digits.clone()));
        }
        if let Some(title) = &self.title {
            values.push(FieldValue::Title(title.clone()));
        }
        if let Some(image_id) = &self.image_id {
            values.push(FieldValue::ImageId(image_id.clone()));
        }
        values
    }

    /// Overlays the patch on `base`, field by field.
    pub fn apply_to(&self, base: &Configuration) -> Configuration {
        Configuration {
            end_date: self.end_date.unwrap_or(base.end_date),
            digits: self.digits.clone().unwrap_or_else(|| base.digits.clone()),
            title: self.title.clone().unwrap_or_else(|| base.title.clone()),
            image_id: self.image_id.clone().unwrap_or_else(|| base.image_id.clone()),
        }
    }
}

pub fn decode_field(params: &QueryParams, field: Field, now: DateTime<Utc>) -> FieldValue {
    let raw = params.get(field.key());
    match field {
        Field::EndDate => FieldValue::EndDate(decode_end_date(raw, now)),
        Field::Digits => FieldValue::Digits(decode_digits(raw)),
        Field::Title => FieldValue::Title(decode_text(raw)),
        Field::ImageId => FieldValue::ImageId(decode_text(raw)),
    }
}

/// Decodes a field named at runtime; unknown keys are rejected.
pub fn decode_key(
    params: &QueryParams,
    key: &str,
    now: DateTime<Utc>,
) -> Result<FieldValue, ConfigError> {
    let field = key.parse::<Field>()?;
    Ok(decode_field(params, field, now))
}

/// String form of a value. An empty result means "leave the key out".
pub fn encode(value: &FieldValue) -> String {
    match value {
        FieldValue::EndDate(end_date) => format_basic_instant(end_date),
        FieldValue::Digits(digits) => digits
            .iter()
            .map(|digit| digit.token())
            .collect::<Vec<_>>()
            .join(","),
        FieldValue::Title(text) | FieldValue::ImageId(text) => text.clone(),
    }
}

pub fn encode_key(key: &str, value: &FieldValue) -> Result<String, ConfigError> {
    let field = key.parse::<Field>()?;
    if field != value.field() {
        return Err(ConfigError::FieldMismatch {
            key: field,
            value: value.field(),
        });
    }
    Ok(encode(value))
}

/// `20240101T000000Z` / `20240101T000000+0100`, whole seconds only.
pub fn format_basic_instant(instant: &DateTime<FixedOffset>) -> String {
    let base = instant.format("%Y%m%dT%H%M%S");
    if instant.offset().local_minus_utc() == 0 {
        format!("{base}Z")
    } else {
        format!("{base}{}", instant.format("%z"))
    }
}

/// Accepts basic and extended ISO-8601 instants. Offset-less values and bare
/// dates are read in the local zone.
pub fn parse_instant(input: &str) -> Option<DateTime<FixedOffset>> {
    let input = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Some(parsed);
    }

    let with_offset = match input.strip_suffix('Z').or_else(|| input.strip_suffix('z')) {
        Some(head) => format!("{head}+0000"),
        None => input.to_string(),
    };
    for format in [
        "%Y%m%dT%H%M%S%.f%z",
        "%Y%m%dT%H%M%S%z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M%z",
    ] {
        if let Ok(parsed) = DateTime::parse_from_str(&with_offset, format) {
            return Some(parsed);
        }
    }

    for format in [
        "%Y%m%dT%H%M%S%.f",
        "%Y%m%dT%H%M%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return resolve_local(naive);
        }
    }

    for format in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return resolve_local(date.and_hms_opt(0, 0, 0)?);
        }
    }

    None
}

fn resolve_local(naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.fixed_offset()),
        LocalResult::Ambiguous(first, _second) => Some(first.fixed_offset()),
        LocalResult::None => None,
    }
}

fn decode_end_date(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<FixedOffset> {
    let Some(raw) = raw.filter(|value| !value.is_empty()) else {
        return now.fixed_offset();
    };
    match parse_instant(raw) {
        Some(parsed) => parsed,
        None => {
            warn!("unreadable endDate '{raw}', falling back to now");
            now.fixed_offset()
        }
    }
}

fn decode_digits(raw: Option<&str>) -> Vec<Digit> {
    let Some(raw) = raw.filter(|value| !value.is_empty()) else {
        return Digit::ALL.to_vec();
    };
    let mut digits = Vec::with_capacity(4);
    for token in raw.split(',') {
        match Digit::from_token(token.trim()) {
            Some(digit) if !digits.contains(&digit) => digits.push(digit),
            Some(_) => {}
            None => debug!("ignoring unknown digit token '{token}'"),
        }
    }
    digits
}

fn decode_text(raw: Option<&str>) -> String {
    raw.unwrap_or_default().to_string()
}

/// Truncates to whole seconds, the precision the encoded form keeps.
pub fn truncate_subsec(instant: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    instant.with_nanosecond(0).unwrap_or(instant)
}
