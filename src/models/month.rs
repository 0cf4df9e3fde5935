//! Year-month values, persisted as the first day of their month.
//!
//! Wire format is `MM/yy`, e.g. `12/28` for December 2028.

use chrono::{Datelike, NaiveDate};

/// Normalizes a date to the first day of its month.
pub fn truncate(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

/// Parses `MM/yy` into the first day of that month.
pub fn parse(raw: &str) -> Option<NaiveDate> {
    let (month, year) = raw.split_once('/')?;
    if month.len() != 2 || year.len() != 2 {
        return None;
    }
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, 1)
}

/// Formats a date as the `MM/yy` of its month.
pub fn format(date: NaiveDate) -> String {
    format!("{:02}/{:02}", date.month(), date.year() % 100)
}

/// Serde codec for `MM/yy` month fields.
pub mod mm_yy {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid month, expected MM/yy: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_mm_yy() {
        let date = parse("12/28").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2028, 12, 1).unwrap());
        assert_eq!(format(date), "12/28");
    }

    #[test]
    fn rejects_malformed_months() {
        assert!(parse("13/28").is_none());
        assert!(parse("00/28").is_none());
        assert!(parse("1/28").is_none());
        assert!(parse("12/2028").is_none());
        assert!(parse("december").is_none());
    }

    #[test]
    fn truncates_to_first_of_month() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 19).unwrap();
        assert_eq!(truncate(date), NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
    }
}
