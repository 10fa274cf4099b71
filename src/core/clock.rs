use std::sync::{Arc, Mutex};

use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

/// Time source for the orchestrator and the expiration sweep. Production uses
/// the system clock; tests use a manual clock advanced explicitly so nothing
/// ever sleeps to simulate expiry.
#[derive(Clone)]
pub(crate) enum Clock {
    System,
    Manual(Arc<Mutex<OffsetDateTime>>),
}

impl Clock {
    pub(crate) fn system() -> Self {
        Clock::System
    }

    pub(crate) fn manual(start: OffsetDateTime) -> Self {
        Clock::Manual(Arc::new(Mutex::new(start)))
    }

    pub(crate) fn now(&self) -> OffsetDateTime {
        match self {
            Clock::System => OffsetDateTime::now_utc(),
            Clock::Manual(inner) => {
                *inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
            }
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        if let Clock::Manual(inner) = self {
            let mut guard = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard += by;
        }
    }
}

pub(crate) fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, PrimitiveDateTime, Time};

    #[test]
    fn manual_clock_advances() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let clock = Clock::manual(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(45));
        assert_eq!(clock.now(), start + Duration::minutes(45));
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = Clock::manual(OffsetDateTime::UNIX_EPOCH);
        let other = clock.clone();
        clock.advance(Duration::seconds(10));
        assert_eq!(other.now(), OffsetDateTime::UNIX_EPOCH + Duration::seconds(10));
    }

    #[test]
    fn format_offset_outputs_rfc3339() {
        let date = Date::from_calendar_date(2025, time::Month::January, 2).unwrap();
        let time = Time::from_hms(10, 20, 30).unwrap();
        let value = PrimitiveDateTime::new(date, time).assume_utc();
        assert_eq!(format_offset(value), "2025-01-02T10:20:30Z");
    }
}
