use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

use crate::ValidationError;

/// Calendar date a snapshot is filed under, normally the first day of a quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotDate(Date);

impl SnapshotDate {
    pub fn new(date: Date) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u8, day: u8) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidDate {
            value: format!("{year:04}-{month:02}-{day:02}"),
        };
        let month = Month::try_from(month).map_err(|_| invalid())?;
        Date::from_calendar_date(year, month, day)
            .map(Self)
            .map_err(|_| invalid())
    }

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let format = format_description!("[year]-[month]-[day]");
        Date::parse(input.trim(), format)
            .map(Self)
            .map_err(|_| ValidationError::InvalidDate {
                value: input.to_owned(),
            })
    }

    pub fn today() -> Self {
        Self(OffsetDateTime::now_utc().date())
    }

    /// First day of the calendar quarter containing `self`.
    pub fn quarter_start(self) -> Self {
        let month = match self.0.month() {
            Month::January | Month::February | Month::March => Month::January,
            Month::April | Month::May | Month::June => Month::April,
            Month::July | Month::August | Month::September => Month::July,
            Month::October | Month::November | Month::December => Month::October,
        };
        // Day 1 exists in every month.
        Date::from_calendar_date(self.0.year(), month, 1)
            .map(Self)
            .unwrap_or(self)
    }

    /// Start of the quarter containing today (UTC).
    pub fn current_quarter_start() -> Self {
        Self::today().quarter_start()
    }

    /// Whether the date falls on Jan 1, Apr 1, Jul 1 or Oct 1.
    pub fn is_quarter_start(self) -> bool {
        self.quarter_start() == self
    }

    /// Same calendar day one year earlier; Feb 29 maps to Feb 28.
    pub fn one_year_earlier(self) -> Self {
        let year = self.0.year() - 1;
        self.0
            .replace_year(year)
            .or_else(|_| Date::from_calendar_date(year, self.0.month(), 28))
            .map(Self)
            .unwrap_or(self)
    }

    pub fn into_inner(self) -> Date {
        self.0
    }

    pub fn format(self) -> String {
        let format = format_description!("[year]-[month]-[day]");
        self.0.format(format).unwrap_or_default()
    }
}

impl Display for SnapshotDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

impl FromStr for SnapshotDate {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for SnapshotDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format())
    }
}

impl<'de> Deserialize<'de> for SnapshotDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
