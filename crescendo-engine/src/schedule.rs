use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Tirages horaires, à heure pleine, de `first_hour` à `last_hour` inclus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawSchedule {
    pub first_hour: u32,
    pub last_hour: u32,
}

impl Default for DrawSchedule {
    fn default() -> Self {
        Self {
            first_hour: 13,
            last_hour: 19,
        }
    }
}

impl DrawSchedule {
    /// Prochain tirage strictement après `now`.
    pub fn next_draw_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        let date = now.date();
        let at = |hour: u32| NaiveTime::from_hms_opt(hour, 0, 0).map(|t| date.and_time(t));

        let today = (self.first_hour..=self.last_hour)
            .filter_map(at)
            .find(|slot| *slot > now);
        match today {
            Some(slot) => slot,
            None => {
                let first = NaiveTime::from_hms_opt(self.first_hour, 0, 0).unwrap_or(NaiveTime::MIN);
                (date + Duration::days(1)).and_time(first)
            }
        }
    }

    /// Libellé court : « 15h00 », ou « demain 13h00 » si le tirage est le lendemain.
    pub fn next_draw_label(&self, now: NaiveDateTime) -> String {
        let next = self.next_draw_after(now);
        let hour = format!("{}h{:02}", next.hour(), next.minute());
        if next.date() > now.date() {
            format!("demain {}", hour)
        } else {
            hour
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_morning_waits_for_first_draw() {
        let s = DrawSchedule::default();
        assert_eq!(s.next_draw_after(at(9, 30)), at(13, 0));
        assert_eq!(s.next_draw_label(at(9, 30)), "13h00");
    }

    #[test]
    fn test_afternoon_next_hour() {
        let s = DrawSchedule::default();
        assert_eq!(s.next_draw_after(at(14, 10)), at(15, 0));
        assert_eq!(s.next_draw_after(at(15, 0)), at(16, 0));
        assert_eq!(s.next_draw_label(at(18, 59)), "19h00");
    }

    #[test]
    fn test_evening_rolls_to_tomorrow() {
        let s = DrawSchedule::default();
        let next = s.next_draw_after(at(19, 0));
        assert_eq!(next, at(13, 0) + Duration::days(1));
        assert_eq!(s.next_draw_label(at(21, 0)), "demain 13h00");
    }
}
