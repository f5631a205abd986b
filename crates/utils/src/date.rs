//! 计息日
//!
//! 计息以自然日为粒度：任何时间点先丢弃时分秒，得到 UTC 日期。写入 MongoDB 时
//! 统一存成当天 00:00:00 UTC 的 BSON DateTime，按日期相等查询才能命中。

use crate::{AppError, AppResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mongodb::bson::{self, Bson};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessDate(NaiveDate);

impl ProcessDate {
    pub fn new(date: NaiveDate) -> Self {
        ProcessDate(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(ProcessDate)
    }

    /// 丢弃时分秒
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        ProcessDate(datetime.date_naive())
    }

    pub fn today() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
            .map(ProcessDate)
            .map_err(|e| AppError::BadRequest(format!("Invalid process date '{}': {}", value, e)))
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }

    pub fn next_day(&self) -> Self {
        ProcessDate(self.0.succ_opt().unwrap_or(self.0))
    }

    pub fn previous_day(&self) -> Self {
        ProcessDate(self.0.pred_opt().unwrap_or(self.0))
    }

    pub fn start_of_day_millis(&self) -> i64 {
        self.0.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
    }

    pub fn to_bson_datetime(&self) -> bson::DateTime {
        bson::DateTime::from_millis(self.start_of_day_millis())
    }

    pub fn from_bson_datetime(value: bson::DateTime) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(value.timestamp_millis()).map(Self::from_datetime)
    }
}

impl From<ProcessDate> for Bson {
    fn from(date: ProcessDate) -> Self {
        Bson::DateTime(date.to_bson_datetime())
    }
}

impl fmt::Display for ProcessDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl Serialize for ProcessDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_bson_datetime().serialize(serializer)
    }
}

/// 兼容 BSON 日期对象和 `YYYY-MM-DD` / RFC3339 字符串
impl<'de> Deserialize<'de> for ProcessDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Bson::deserialize(deserializer)?;

        match value {
            Bson::DateTime(dt) => {
                ProcessDate::from_bson_datetime(dt).ok_or_else(|| serde::de::Error::custom("Invalid timestamp"))
            }
            Bson::String(s) => match NaiveDate::parse_from_str(&s, DATE_FORMAT) {
                Ok(date) => Ok(ProcessDate(date)),
                Err(_) => s
                    .parse::<DateTime<Utc>>()
                    .map(ProcessDate::from_datetime)
                    .map_err(|e| serde::de::Error::custom(format!("Failed to parse date string '{}': {}", s, e))),
            },
            other => Err(serde::de::Error::custom(format!(
                "Expected date string or BSON DateTime, found: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_of_day_is_discarded() {
        let late = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 1).unwrap();

        assert_eq!(ProcessDate::from_datetime(late), ProcessDate::from_datetime(early));
        assert_eq!(ProcessDate::from_datetime(late).to_string(), "2024-03-01");
    }

    #[test]
    fn test_stored_as_midnight_utc() {
        let noon = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let date = ProcessDate::from_datetime(noon);
        let midnight = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        assert_eq!(date.start_of_day_millis(), midnight.timestamp_millis());

        let stored = bson::to_bson(&date).unwrap();
        assert_eq!(stored, Bson::DateTime(bson::DateTime::from_millis(midnight.timestamp_millis())));

        let restored: ProcessDate = bson::from_bson(stored).unwrap();
        assert_eq!(restored, date);
    }

    #[test]
    fn test_parse_and_neighbours() {
        let date = ProcessDate::parse("2024-02-29").unwrap();
        assert_eq!(date.next_day(), ProcessDate::from_ymd(2024, 3, 1).unwrap());
        assert_eq!(date.previous_day(), ProcessDate::from_ymd(2024, 2, 28).unwrap());
        assert!(ProcessDate::parse("2024-02-30").is_err());
        assert!(ProcessDate::parse("yesterday").is_err());
    }

    #[test]
    fn test_deserialize_from_string() {
        let restored: ProcessDate = bson::from_bson(Bson::String("2024-03-01".to_string())).unwrap();
        assert_eq!(restored, ProcessDate::from_ymd(2024, 3, 1).unwrap());
    }
}
