use std::fmt;

use time::{Date, Month, OffsetDateTime};

use crate::error::DomainError;

/// One calendar month, with its first and last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u8,
    pub start_date: Date,
    pub end_date: Date,
}

impl Period {
    /// Resolve a period relative to `today`.
    ///
    /// Without a month the previous calendar month is used. If that month is
    /// December and no year was given, the year rolls back as well.
    pub fn resolve(year: Option<i32>, month: Option<u8>, today: Date) -> Result<Self, DomainError> {
        if let Some(m) = month {
            if !(1..=12).contains(&m) {
                return Err(DomainError::InvalidMonth(m));
            }
        }

        let mut year = year;
        let month = match month {
            Some(m) => m,
            None => {
                let previous = today.month().previous();
                if previous == Month::December && year.is_none() {
                    year = Some(today.year() - 1);
                }
                previous as u8
            }
        };
        let year = year.unwrap_or_else(|| today.year());

        Self::for_month(year, month)
    }

    /// Resolve against the current UTC date.
    pub fn resolve_now(year: Option<i32>, month: Option<u8>) -> Result<Self, DomainError> {
        Self::resolve(year, month, OffsetDateTime::now_utc().date())
    }

    pub fn for_month(year: i32, month: u8) -> Result<Self, DomainError> {
        let m = Month::try_from(month).map_err(|_| DomainError::InvalidMonth(month))?;
        let start_date =
            Date::from_calendar_date(year, m, 1).map_err(|_| DomainError::InvalidYear(year))?;

        let next_start = if m == Month::December {
            Date::from_calendar_date(year + 1, Month::January, 1)
        } else {
            Date::from_calendar_date(year, m.next(), 1)
        }
        .map_err(|_| DomainError::InvalidYear(year))?;

        let end_date = next_start
            .previous_day()
            .ok_or(DomainError::InvalidYear(year))?;

        Ok(Self {
            year,
            month,
            start_date,
            end_date,
        })
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn explicit_period_spans_whole_month() {
        let p = Period::resolve(Some(2024), Some(3), date!(2025 - 06 - 10)).unwrap();
        assert_eq!((p.year, p.month), (2024, 3));
        assert_eq!(p.start_date, date!(2024 - 03 - 01));
        assert_eq!(p.end_date, date!(2024 - 03 - 31));
        assert_eq!(p.to_string(), "2024-03");
    }

    #[test]
    fn february_respects_leap_years() {
        let leap = Period::for_month(2024, 2).unwrap();
        assert_eq!(leap.end_date, date!(2024 - 02 - 29));

        let common = Period::for_month(2023, 2).unwrap();
        assert_eq!(common.end_date, date!(2023 - 02 - 28));
    }

    #[test]
    fn defaults_to_previous_month_of_current_year() {
        let p = Period::resolve(None, None, date!(2025 - 06 - 10)).unwrap();
        assert_eq!((p.year, p.month), (2025, 5));
        assert_eq!(p.end_date, date!(2025 - 05 - 31));
    }

    #[test]
    fn january_defaults_to_december_of_previous_year() {
        let p = Period::resolve(None, None, date!(2025 - 01 - 15)).unwrap();
        assert_eq!((p.year, p.month), (2024, 12));
        assert_eq!(p.start_date, date!(2024 - 12 - 01));
        assert_eq!(p.end_date, date!(2024 - 12 - 31));
    }

    #[test]
    fn explicit_year_is_kept_when_month_defaults_to_december() {
        let p = Period::resolve(Some(2022), None, date!(2025 - 01 - 15)).unwrap();
        assert_eq!((p.year, p.month), (2022, 12));
    }

    #[test]
    fn month_only_uses_current_year() {
        let p = Period::resolve(None, Some(11), date!(2025 - 01 - 15)).unwrap();
        assert_eq!((p.year, p.month), (2025, 11));
        assert_eq!(p.end_date, date!(2025 - 11 - 30));
    }

    #[test]
    fn rejects_out_of_range_month() {
        let today = date!(2025 - 01 - 15);
        assert_eq!(Period::resolve(None, Some(0), today), Err(DomainError::InvalidMonth(0)));
        assert_eq!(
            Period::resolve(Some(2024), Some(13), today),
            Err(DomainError::InvalidMonth(13))
        );
    }
}
