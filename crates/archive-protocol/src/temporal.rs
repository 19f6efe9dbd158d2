//! Temporal extent validation and encoding.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::errors::ProtocolError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// An inclusive date-time window for archive queries.
///
/// Built from a `[start-date, end-date]` pair of `YYYY-MM-DD` strings plus
/// optional `HH:MM:SS` bounds for each day. When no times are given the
/// window spans whole days (00:00:00 through 23:59:59). Discontinuous date
/// lists are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalExtent {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TemporalExtent {
    /// Validate a `[start, end]` date pair with optional times of day.
    pub fn from_date_range<S: AsRef<str>>(
        date_range: [S; 2],
        start_time: Option<&str>,
        end_time: Option<&str>,
    ) -> Result<Self, ProtocolError> {
        let start_date = parse_date(date_range[0].as_ref())?;
        let end_date = parse_date(date_range[1].as_ref())?;

        let start_time = match start_time {
            Some(t) => parse_time(t)?,
            None => NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        };
        let end_time = match end_time {
            Some(t) => parse_time(t)?,
            None => NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        };

        let start = start_date.and_time(start_time);
        let end = end_date.and_time(end_time);

        if start > end {
            return Err(ProtocolError::Validation(format!(
                "temporal range inverted: {} > {}",
                start, end
            )));
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Start and end dates as `YYYY-MM-DD` strings.
    pub fn dates(&self) -> [String; 2] {
        [
            self.start.format(DATE_FORMAT).to_string(),
            self.end.format(DATE_FORMAT).to_string(),
        ]
    }

    /// Start time of day as `HH:MM:SS`.
    pub fn start_time(&self) -> String {
        self.start.format(TIME_FORMAT).to_string()
    }

    /// End time of day as `HH:MM:SS`.
    pub fn end_time(&self) -> String {
        self.end.format(TIME_FORMAT).to_string()
    }

    /// Window encoding for the discovery endpoint: ISO8601 with trailing
    /// `Z`, comma-joined.
    pub fn discovery_window(&self) -> String {
        format!(
            "{}Z,{}Z",
            self.start.format("%Y-%m-%dT%H:%M:%S"),
            self.end.format("%Y-%m-%dT%H:%M:%S")
        )
    }

    /// Window encoding for the subsetting endpoint: comma-joined ISO8601
    /// without the `Z` suffix.
    pub fn subset_window(&self) -> String {
        format!(
            "{},{}",
            self.start.format("%Y-%m-%dT%H:%M:%S"),
            self.end.format("%Y-%m-%dT%H:%M:%S")
        )
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, ProtocolError> {
    // chrono accepts unpadded fields, so pin the fixed-width layout first.
    if s.len() != 10 {
        return Err(ProtocolError::Validation(format!(
            "invalid date '{}', expected YYYY-MM-DD",
            s
        )));
    }
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|_| ProtocolError::Validation(format!("invalid date '{}', expected YYYY-MM-DD", s)))
}

fn parse_time(s: &str) -> Result<NaiveTime, ProtocolError> {
    if s.len() != 8 {
        return Err(ProtocolError::Validation(format!(
            "invalid time '{}', expected HH:MM:SS",
            s
        )));
    }
    NaiveTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|_| ProtocolError::Validation(format!("invalid time '{}', expected HH:MM:SS", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_default_times() {
        let window =
            TemporalExtent::from_date_range(["2019-02-20", "2019-02-28"], None, None).unwrap();

        assert_eq!(window.start().to_string(), "2019-02-20 00:00:00");
        assert_eq!(window.end().to_string(), "2019-02-28 23:59:59");
        assert_eq!(window.dates(), ["2019-02-20".to_string(), "2019-02-28".to_string()]);
        assert_eq!(window.start_time(), "00:00:00");
        assert_eq!(window.end_time(), "23:59:59");
    }

    #[test]
    fn test_explicit_times() {
        let window = TemporalExtent::from_date_range(
            ["2019-02-20", "2019-02-28"],
            Some("12:30:30"),
            Some("10:20:20"),
        )
        .unwrap();

        assert_eq!(window.start().hour(), 12);
        assert_eq!(window.end().second(), 20);
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(
            TemporalExtent::from_date_range(["2019-03-01", "2019-02-01"], None, None).is_err()
        );
        // Same day, inverted times.
        assert!(TemporalExtent::from_date_range(
            ["2019-02-20", "2019-02-20"],
            Some("13:00:00"),
            Some("12:00:00"),
        )
        .is_err());
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        assert!(TemporalExtent::from_date_range(["2019-2-20", "2019-02-28"], None, None).is_err());
        assert!(TemporalExtent::from_date_range(["20190220", "20190228"], None, None).is_err());
        assert!(TemporalExtent::from_date_range(
            ["2019-02-20", "2019-02-28"],
            Some("12:30"),
            None,
        )
        .is_err());
    }

    #[test]
    fn test_wire_encodings_differ() {
        let window =
            TemporalExtent::from_date_range(["2019-02-20", "2019-02-28"], None, None).unwrap();

        assert_eq!(
            window.discovery_window(),
            "2019-02-20T00:00:00Z,2019-02-28T23:59:59Z"
        );
        assert_eq!(
            window.subset_window(),
            "2019-02-20T00:00:00,2019-02-28T23:59:59"
        );
    }
}
