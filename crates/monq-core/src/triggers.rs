//! Named wait channels.
//!
//! A query with a `WaitCondition` blocks on one of these channels until the
//! core signals the matching event category, its predicate holds, the
//! timeout elapses, or the process is asked to terminate. Spurious wakeups
//! are fine; the predicate is re-evaluated on every wakeup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    All,
    Check,
    State,
    Log,
    Downtime,
    Comment,
    Command,
    Program,
}

pub const ALL_TRIGGERS: [Trigger; 8] = [
    Trigger::All,
    Trigger::Check,
    Trigger::State,
    Trigger::Log,
    Trigger::Downtime,
    Trigger::Comment,
    Trigger::Command,
    Trigger::Program,
];

impl Trigger {
    pub fn from_name(name: &str) -> Result<Trigger, String> {
        match name {
            "all" => Ok(Trigger::All),
            "check" => Ok(Trigger::Check),
            "state" => Ok(Trigger::State),
            "log" => Ok(Trigger::Log),
            "downtime" => Ok(Trigger::Downtime),
            "comment" => Ok(Trigger::Comment),
            "command" => Ok(Trigger::Command),
            "program" => Ok(Trigger::Program),
            _ => Err(format!(
                "invalid trigger '{name}', allowed are all, check, state, log, downtime, comment, command and program"
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Trigger::All => "all",
            Trigger::Check => "check",
            Trigger::State => "state",
            Trigger::Log => "log",
            Trigger::Downtime => "downtime",
            Trigger::Comment => "comment",
            Trigger::Command => "command",
            Trigger::Program => "program",
        }
    }

    fn index(self) -> usize {
        match self {
            Trigger::All => 0,
            Trigger::Check => 1,
            Trigger::State => 2,
            Trigger::Log => 3,
            Trigger::Downtime => 4,
            Trigger::Comment => 5,
            Trigger::Command => 6,
            Trigger::Program => 7,
        }
    }
}

struct Channel {
    generation: Mutex<u64>,
    condvar: Condvar,
}

/// How long a waiter sleeps at most between termination-flag polls.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Triggers {
    channels: [Channel; 8],
}

impl Default for Triggers {
    fn default() -> Self {
        Triggers::new()
    }
}

impl Triggers {
    pub fn new() -> Triggers {
        Triggers {
            channels: std::array::from_fn(|_| Channel {
                generation: Mutex::new(0),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Signal one event category. Waiters on that category and on `all`
    /// are woken.
    pub fn notify(&self, trigger: Trigger) {
        self.notify_one(trigger);
        if trigger != Trigger::All {
            self.notify_one(Trigger::All);
        }
    }

    fn notify_one(&self, trigger: Trigger) {
        let channel = &self.channels[trigger.index()];
        *channel.generation.lock().unwrap() += 1;
        channel.condvar.notify_all();
    }

    /// Block until `predicate` holds, `timeout` elapses (zero means no
    /// deadline) or `should_terminate` is set.
    pub fn wait_for(
        &self,
        trigger: Trigger,
        timeout: Duration,
        should_terminate: &AtomicBool,
        predicate: impl Fn() -> bool,
    ) {
        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };
        let channel = &self.channels[trigger.index()];
        let mut generation = channel.generation.lock().unwrap();
        loop {
            if predicate() || should_terminate.load(Ordering::Relaxed) {
                return;
            }
            let wait = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return;
                    }
                    POLL_INTERVAL.min(d - now)
                }
                None => POLL_INTERVAL,
            };
            let (guard, _timeout_result) = channel.condvar.wait_timeout(generation, wait).unwrap();
            generation = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn trigger_names_roundtrip() {
        for t in ALL_TRIGGERS {
            assert_eq!(Trigger::from_name(t.name()).unwrap(), t);
        }
        assert!(Trigger::from_name("bogus").is_err());
    }

    #[test]
    fn wait_returns_when_predicate_already_holds() {
        let triggers = Triggers::new();
        let terminate = AtomicBool::new(false);
        triggers.wait_for(Trigger::All, Duration::from_secs(60), &terminate, || true);
    }

    #[test]
    fn wait_times_out_when_predicate_never_holds() {
        let triggers = Triggers::new();
        let terminate = AtomicBool::new(false);
        let start = Instant::now();
        triggers.wait_for(
            Trigger::Log,
            Duration::from_millis(50),
            &terminate,
            || false,
        );
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn notify_wakes_a_blocked_waiter() {
        let triggers = Arc::new(Triggers::new());
        let flag = Arc::new(AtomicUsize::new(0));
        let t2 = Arc::clone(&triggers);
        let f2 = Arc::clone(&flag);
        let handle = std::thread::spawn(move || {
            let terminate = AtomicBool::new(false);
            t2.wait_for(Trigger::Comment, Duration::from_secs(10), &terminate, || {
                f2.load(Ordering::SeqCst) == 1
            });
        });
        std::thread::sleep(Duration::from_millis(20));
        flag.store(1, Ordering::SeqCst);
        triggers.notify(Trigger::Comment);
        handle.join().unwrap();
    }

    #[test]
    fn termination_flag_breaks_an_endless_wait() {
        let triggers = Arc::new(Triggers::new());
        let terminate = Arc::new(AtomicBool::new(false));
        let t2 = Arc::clone(&triggers);
        let term2 = Arc::clone(&terminate);
        let handle = std::thread::spawn(move || {
            t2.wait_for(Trigger::All, Duration::ZERO, &term2, || false);
        });
        std::thread::sleep(Duration::from_millis(20));
        terminate.store(true, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
