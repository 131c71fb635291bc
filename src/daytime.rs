//! Time of day buckets from fixed sunrise and sunset times.

use chrono::{NaiveTime, Timelike};

use crate::config::TimeBucket;

const MINUTES_PER_DAY: i64 = 24 * 60;

fn minutes(t: NaiveTime) -> i64 {
    i64::from(t.num_seconds_from_midnight() / 60)
}

/// Minutes between two times of day, going around midnight if shorter.
fn distance(a: NaiveTime, b: NaiveTime) -> i64 {
    let d = (minutes(a) - minutes(b)).abs();
    d.min(MINUTES_PER_DAY - d)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Daytime {
    sunrise: NaiveTime,
    sunset: NaiveTime,
    /// Half width of the event window around sunrise and sunset, in minutes.
    event_duration: i64,
}

impl Daytime {
    pub fn new(sunrise: NaiveTime, sunset: NaiveTime, event_duration: u32) -> Self {
        Self {
            sunrise,
            sunset,
            event_duration: i64::from(event_duration),
        }
    }

    pub fn bucket(&self, now: NaiveTime) -> TimeBucket {
        let day = if self.sunrise <= self.sunset {
            self.sunrise <= now && now < self.sunset
        } else {
            now >= self.sunrise || now < self.sunset
        };
        if day {
            TimeBucket::Day
        } else {
            TimeBucket::Night
        }
    }

    pub fn in_event(&self, now: NaiveTime) -> bool {
        distance(now, self.sunrise) < self.event_duration
            || distance(now, self.sunset) < self.event_duration
    }
}
