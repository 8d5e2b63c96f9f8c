//! Process-wide statistics counters with smoothed rates.
//!
//! Modeled as an explicit service passed by reference so tests can use a
//! fresh instance. Rates are recomputed at most every five seconds by
//! interpolating towards the most recent interval rate.

use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Connections,
    Requests,
    Commands,
    LogMessages,
    Overflows,
    Forks,
}

const NUM_COUNTERS: usize = 6;

impl Counter {
    fn index(self) -> usize {
        match self {
            Counter::Connections => 0,
            Counter::Requests => 1,
            Counter::Commands => 2,
            Counter::LogMessages => 3,
            Counter::Overflows => 4,
            Counter::Forks => 5,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    value: f64,
    last_value: f64,
    rate: f64,
}

const STATISTICS_INTERVAL_SECS: f64 = 5.0;
const RATING_WEIGHT: f64 = 0.25;

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    (1.0 - t) * a + t * b
}

#[derive(Debug)]
pub struct Counters {
    slots: [Mutex<Slot>; NUM_COUNTERS],
    last_update: Mutex<Option<Instant>>,
}

impl Default for Counters {
    fn default() -> Self {
        Counters::new()
    }
}

impl Counters {
    pub fn new() -> Counters {
        Counters {
            slots: std::array::from_fn(|_| Mutex::new(Slot::default())),
            last_update: Mutex::new(None),
        }
    }

    pub fn increment(&self, which: Counter) {
        self.slots[which.index()].lock().unwrap().value += 1.0;
    }

    pub fn increment_by(&self, which: Counter, amount: usize) {
        self.slots[which.index()].lock().unwrap().value += amount as f64;
    }

    pub fn value(&self, which: Counter) -> f64 {
        self.slots[which.index()].lock().unwrap().value
    }

    pub fn rate(&self, which: Counter) -> f64 {
        self.slots[which.index()].lock().unwrap().rate
    }

    /// Recompute rates if the statistics interval has elapsed.
    pub fn do_statistics(&self) {
        let now = Instant::now();
        let mut last = self.last_update.lock().unwrap();
        let Some(prev) = *last else {
            *last = Some(now);
            return;
        };
        let age = now.duration_since(prev).as_secs_f64();
        if age < STATISTICS_INTERVAL_SECS {
            return;
        }
        *last = Some(now);
        drop(last);
        for slot in &self.slots {
            let mut s = slot.lock().unwrap();
            let old_rate = s.rate;
            let new_rate = (s.value - s.last_value) / age;
            s.rate = lerp(old_rate, new_rate, if old_rate == 0.0 { 1.0 } else { RATING_WEIGHT });
            s.last_value = s.value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate() {
        let c = Counters::new();
        c.increment(Counter::Requests);
        c.increment(Counter::Requests);
        c.increment_by(Counter::LogMessages, 40);
        assert_eq!(c.value(Counter::Requests), 2.0);
        assert_eq!(c.value(Counter::LogMessages), 40.0);
        assert_eq!(c.value(Counter::Connections), 0.0);
    }

    #[test]
    fn rate_stays_zero_before_first_interval() {
        let c = Counters::new();
        c.increment(Counter::Requests);
        c.do_statistics();
        assert_eq!(c.rate(Counter::Requests), 0.0);
    }
}
