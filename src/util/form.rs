//! Serde helpers shared by HTML form posts and JSON bodies.
//!
//! Browsers submit every field as a string, blank when left empty, while JSON
//! clients send typed values or `null`. These accept both.

use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Loose {
    fn into_text(self) -> String {
        match self {
            Loose::Text(s) => s,
            Loose::Int(i) => i.to_string(),
            Loose::Float(f) => f.to_string(),
            Loose::Bool(b) => b.to_string(),
        }
    }
}

/// Blank strings and `null` become `None`; anything else is parsed.
pub fn empty_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw = Option::<Loose>::deserialize(de)?.map(Loose::into_text);
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

/// [`empty_as_none`] for enums and other types without `FromStr`.
pub fn choice<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: de::DeserializeOwned,
{
    let raw = Option::<Loose>::deserialize(de)?.map(Loose::into_text);
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => T::deserialize(de::value::StrDeserializer::<de::value::Error>::new(value))
            .map(Some)
            .map_err(de::Error::custom),
    }
}

/// Blank strings become `None`, other text is trimmed.
pub fn trimmed<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Loose>::deserialize(de)?.map(Loose::into_text);
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// HTML checkboxes post `on` when ticked and nothing otherwise.
pub fn checkbox<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Loose>::deserialize(de)?.map(Loose::into_text);
    Ok(matches!(
        raw.as_deref().map(str::trim),
        Some("on" | "true" | "1" | "yes")
    ))
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Accepts `datetime-local` input values (no seconds) as well as ISO-8601.
pub fn datetime<'de, D>(de: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(de)?;
    parse_datetime(&raw).ok_or_else(|| de::Error::custom(format!("invalid date/time: {raw}")))
}

pub fn datetime_opt<'de, D>(de: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_datetime(value)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date/time: {value}"))),
    }
}

/// Parses a currency amount such as `12`, `12.5`, `$1,200.00` into cents.
pub fn parse_cents(value: &str) -> Option<i64> {
    let cleaned: String = value
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    let (whole, fraction) = match cleaned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (cleaned.as_str(), ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit())
        || !fraction.chars().all(|c| c.is_ascii_digit())
        || fraction.len() > 2
    {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(fraction)
}

/// Money entered in whole units with optional cents.
pub fn money<'de, D>(de: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Loose::deserialize(de)?.into_text();
    parse_cents(&raw).ok_or_else(|| de::Error::custom(format!("invalid amount: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "empty_as_none")]
        family_id: Option<i32>,
        #[serde(default, deserialize_with = "empty_as_none")]
        birth_date: Option<NaiveDate>,
        #[serde(default, deserialize_with = "trimmed")]
        phone: Option<String>,
        #[serde(default, deserialize_with = "checkbox")]
        is_public: bool,
        #[serde(deserialize_with = "datetime")]
        starts_at: NaiveDateTime,
    }

    #[test]
    fn parses_browser_form_values() {
        let sample: Sample = serde_json::from_value(serde_json::json!({
            "family_id": "",
            "birth_date": "1990-04-02",
            "phone": "  555-0100 ",
            "is_public": "on",
            "starts_at": "2025-03-01T10:30",
        }))
        .unwrap();

        assert_eq!(sample.family_id, None);
        assert_eq!(sample.birth_date, NaiveDate::from_ymd_opt(1990, 4, 2));
        assert_eq!(sample.phone.as_deref(), Some("555-0100"));
        assert!(sample.is_public);
        assert_eq!(sample.starts_at.format("%H:%M").to_string(), "10:30");
    }

    #[test]
    fn parses_typed_json_values() {
        let sample: Sample = serde_json::from_value(serde_json::json!({
            "family_id": 7,
            "birth_date": null,
            "is_public": true,
            "starts_at": "2025-03-01T10:30:00",
        }))
        .unwrap();

        assert_eq!(sample.family_id, Some(7));
        assert_eq!(sample.birth_date, None);
        assert_eq!(sample.phone, None);
        assert!(sample.is_public);
    }

    #[test]
    fn money_amounts() {
        assert_eq!(parse_cents("12"), Some(1200));
        assert_eq!(parse_cents("12.5"), Some(1250));
        assert_eq!(parse_cents("$1,200.05"), Some(120005));
        assert_eq!(parse_cents(".75"), Some(75));
        assert_eq!(parse_cents("1.234"), None);
        assert_eq!(parse_cents("-5"), None);
        assert_eq!(parse_cents("abc"), None);
        assert_eq!(parse_cents(""), None);

        #[derive(Deserialize)]
        struct Gift {
            #[serde(deserialize_with = "money")]
            amount: i64,
        }
        let gift: Gift = serde_json::from_value(serde_json::json!({ "amount": 25.5 })).unwrap();
        assert_eq!(gift.amount, 2550);
    }

    #[test]
    fn blank_choices_are_none() {
        use crate::entities::sea_orm_active_enums::MembershipStatus;

        #[derive(Deserialize)]
        struct Filter {
            #[serde(default, deserialize_with = "choice")]
            status: Option<MembershipStatus>,
        }
        let blank: Filter = serde_json::from_value(serde_json::json!({ "status": "" })).unwrap();
        assert_eq!(blank.status, None);
        let picked: Filter =
            serde_json::from_value(serde_json::json!({ "status": "in_training" })).unwrap();
        assert_eq!(picked.status, Some(MembershipStatus::InTraining));
        assert!(serde_json::from_value::<Filter>(serde_json::json!({ "status": "pope" })).is_err());
    }

    #[test]
    fn unchecked_box_is_false() {
        let sample: Sample = serde_json::from_value(serde_json::json!({
            "starts_at": "2025-03-01 09:00",
        }))
        .unwrap();
        assert!(!sample.is_public);
    }
}
