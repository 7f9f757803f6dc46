//! Trading calendar gate.
//!
//! Answers "is the venue open right now" from weekday, holiday, and
//! session-hour rules evaluated in the venue's local timezone.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use common::config::CalendarConfig;
use common::Error;
use tracing::debug;

/// Open and close instants of one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub open: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl Session {
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.open <= now && now <= self.close
    }
}

/// Exchange calendar with fixed daily hours.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    tz: Tz,
    open: NaiveTime,
    close: NaiveTime,
    nyse_holidays: bool,
    extra_closures: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    /// Build from config. Fails only on an unknown timezone or inverted hours.
    pub fn from_config(cfg: &CalendarConfig) -> Result<Self, Error> {
        let tz: Tz = cfg
            .timezone
            .parse()
            .map_err(|e| Error::Calendar(format!("unknown timezone {}: {}", cfg.timezone, e)))?;
        if cfg.open >= cfg.close {
            return Err(Error::Calendar(format!(
                "open {} must be before close {}",
                cfg.open, cfg.close
            )));
        }

        Ok(Self {
            tz,
            open: cfg.open,
            close: cfg.close,
            nyse_holidays: cfg.nyse_holidays,
            extra_closures: cfg.extra_closures.iter().copied().collect(),
        })
    }

    /// NYSE regular session, 09:30-16:00 America/New_York.
    pub fn nyse() -> Self {
        Self {
            tz: chrono_tz::America::New_York,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
            nyse_holidays: true,
            extra_closures: BTreeSet::new(),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Weekday that is not a holiday.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        if self.extra_closures.contains(&date) {
            return false;
        }
        !(self.nyse_holidays && is_nyse_holiday(date))
    }

    /// Session for the local trading day containing `now`, if there is one.
    ///
    /// Local times that are skipped or repeated by a DST transition yield
    /// `None`, so callers treat them as closed.
    pub fn session(&self, now: DateTime<Utc>) -> Option<Session> {
        let date = now.with_timezone(&self.tz).date_naive();
        if !self.is_trading_day(date) {
            return None;
        }

        let open = self.tz.from_local_datetime(&date.and_time(self.open)).single();
        let close = self.tz.from_local_datetime(&date.and_time(self.close)).single();
        match (open, close) {
            (Some(open), Some(close)) => Some(Session {
                open: open.with_timezone(&Utc),
                close: close.with_timezone(&Utc),
            }),
            _ => {
                debug!("{}: session hours not representable in {}", date, self.tz);
                None
            }
        }
    }

    /// True when `now` falls inside the day's session (both ends inclusive).
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.session(now).is_some_and(|s| s.contains(now))
    }
}

// ── NYSE holiday rules ────────────────────────────────────────────────

/// Full-day NYSE closures for `year`, sorted.
pub fn nyse_holidays(year: i32) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(10);

    // New Year's Day: Sunday moves to Monday, Saturday is not observed.
    if let Some(jan1) = NaiveDate::from_ymd_opt(year, 1, 1) {
        match jan1.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => days.push(jan1 + Duration::days(1)),
            _ => days.push(jan1),
        }
    }

    days.extend(nth_weekday(year, 1, Weekday::Mon, 3)); // Martin Luther King Jr. Day
    days.extend(nth_weekday(year, 2, Weekday::Mon, 3)); // Washington's Birthday
    days.extend(easter_sunday(year).map(|d| d - Duration::days(2))); // Good Friday
    days.extend(last_weekday(year, 5, Weekday::Mon)); // Memorial Day
    if year >= 2022 {
        days.extend(NaiveDate::from_ymd_opt(year, 6, 19).map(observed));
    }
    days.extend(NaiveDate::from_ymd_opt(year, 7, 4).map(observed));
    days.extend(nth_weekday(year, 9, Weekday::Mon, 1)); // Labor Day
    days.extend(nth_weekday(year, 11, Weekday::Thu, 4)); // Thanksgiving
    days.extend(NaiveDate::from_ymd_opt(year, 12, 25).map(observed));

    days.sort();
    days
}

fn is_nyse_holiday(date: NaiveDate) -> bool {
    nyse_holidays(date.year()).contains(&date)
}

/// Saturday holidays are observed Friday, Sunday holidays Monday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let mut day = NaiveDate::from_ymd_opt(next_year, next_month, 1)? - Duration::days(1);
    while day.weekday() != weekday {
        day -= Duration::days(1);
    }
    Some(day)
}

/// Gregorian Easter Sunday (anonymous computus).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ny(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        chrono_tz::America::New_York
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn nyse_2024_holidays() {
        let expected = vec![
            date(2024, 1, 1),
            date(2024, 1, 15),
            date(2024, 2, 19),
            date(2024, 3, 29),
            date(2024, 5, 27),
            date(2024, 6, 19),
            date(2024, 7, 4),
            date(2024, 9, 2),
            date(2024, 11, 28),
            date(2024, 12, 25),
        ];
        assert_eq!(nyse_holidays(2024), expected);
    }

    #[test]
    fn weekend_holidays_are_observed() {
        // 2021-12-25 was a Saturday, 2022-06-19 a Sunday.
        assert!(nyse_holidays(2021).contains(&date(2021, 12, 24)));
        assert!(nyse_holidays(2022).contains(&date(2022, 6, 20)));
        // 2022-01-01 was a Saturday: no observance on Friday 2021-12-31.
        assert!(!nyse_holidays(2021).contains(&date(2021, 12, 31)));
        assert!(!nyse_holidays(2022).iter().any(|d| d.month() == 1 && d.day() <= 3));
    }

    #[test]
    fn easter_dates() {
        assert_eq!(easter_sunday(2024), Some(date(2024, 3, 31)));
        assert_eq!(easter_sunday(2025), Some(date(2025, 4, 20)));
        assert_eq!(easter_sunday(2019), Some(date(2019, 4, 21)));
    }

    #[test]
    fn session_hours_gate() {
        let cal = TradingCalendar::nyse();
        // Thursday 2024-11-14.
        assert!(!cal.is_open(ny(2024, 11, 14, 9, 29)));
        assert!(cal.is_open(ny(2024, 11, 14, 9, 30)));
        assert!(cal.is_open(ny(2024, 11, 14, 12, 0)));
        assert!(cal.is_open(ny(2024, 11, 14, 16, 0)));
        assert!(!cal.is_open(ny(2024, 11, 14, 16, 1)));
    }

    #[test]
    fn closed_on_weekends_and_holidays() {
        let cal = TradingCalendar::nyse();
        assert!(!cal.is_open(ny(2024, 11, 16, 12, 0))); // Saturday
        assert!(!cal.is_open(ny(2024, 11, 28, 12, 0))); // Thanksgiving
        assert!(cal.is_open(ny(2024, 11, 29, 12, 0)));
    }

    #[test]
    fn extra_closures_from_config() {
        let cfg = CalendarConfig {
            extra_closures: vec![date(2025, 1, 9)],
            ..CalendarConfig::default()
        };
        let cal = TradingCalendar::from_config(&cfg).unwrap();
        assert!(!cal.is_open(ny(2025, 1, 9, 12, 0)));
        assert!(cal.is_open(ny(2025, 1, 10, 12, 0)));
    }

    #[test]
    fn session_tracks_daylight_saving() {
        let cal = TradingCalendar::nyse();
        let summer = cal.session(ny(2024, 7, 10, 12, 0)).unwrap();
        let winter = cal.session(ny(2024, 12, 10, 12, 0)).unwrap();
        assert_eq!(summer.open.format("%H:%M").to_string(), "13:30");
        assert_eq!(winter.open.format("%H:%M").to_string(), "14:30");
    }

    #[test]
    fn bad_config_is_rejected() {
        let cfg = CalendarConfig {
            timezone: "Mars/Olympus".into(),
            ..CalendarConfig::default()
        };
        assert!(TradingCalendar::from_config(&cfg).is_err());

        let cfg = CalendarConfig {
            open: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            ..CalendarConfig::default()
        };
        assert!(TradingCalendar::from_config(&cfg).is_err());
    }
}
