//! Licensing state and the trial-period service cap.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Trial length after the state file was first created.
pub const TRIAL_PERIOD_SECS: i64 = 30 * 24 * 60 * 60;

/// Hard service cap once the trial has expired.
pub const MAX_SERVICES_IN_TRIAL: usize = 750;

#[derive(Debug, Error)]
pub enum LicenseError {
    #[error("cannot access timestamp file {path}: {source}")]
    StateFile {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("{0}")]
    TrialExceeded(String),
}

/// Timestamps are stored scrambled so a plainly edited file is detected as
/// corrupt rather than silently honored. The transform is a self-inverse
/// pair: rotate and xor with a fixed pattern.
const MANGLE_PATTERN: u64 = 0xA5A5_5A5A_C3C3_3C3C;

pub fn mangle_timestamp(epoch_micros: u64) -> u64 {
    (epoch_micros ^ MANGLE_PATTERN).rotate_left(17)
}

pub fn demangle_timestamp(mangled: u64) -> u64 {
    mangled.rotate_right(17) ^ MANGLE_PATTERN
}

#[derive(Debug, Clone, Copy)]
pub struct TrialManager {
    state_file_created: i64,
    is_licensed: bool,
}

impl TrialManager {
    pub fn new(state_file_created: i64, is_licensed: bool) -> TrialManager {
        TrialManager {
            state_file_created,
            is_licensed,
        }
    }

    pub fn is_trial_expired(&self, now: i64) -> bool {
        now > self.state_file_created + TRIAL_PERIOD_SECS
    }

    pub fn state(&self, now: i64) -> &'static str {
        if self.is_licensed {
            "licensed"
        } else if self.is_trial_expired(now) {
            "expired trial"
        } else {
            "active trial"
        }
    }

    /// Reject over-limit installations once the trial is over.
    pub fn validate_service_count(&self, now: i64, num_services: usize) -> Result<(), LicenseError> {
        if self.is_licensed || !self.is_trial_expired(now) {
            return Ok(());
        }
        if num_services > MAX_SERVICES_IN_TRIAL {
            return Err(LicenseError::TrialExceeded(format!(
                "The {}-day trial is over and only max. {} services are possible, not {}. \
                 Please apply a valid license or adjust your configuration.",
                TRIAL_PERIOD_SECS / 86400,
                MAX_SERVICES_IN_TRIAL,
                num_services
            )));
        }
        Ok(())
    }
}

/// Read the state-file creation timestamp, writing `default_creation_time`
/// on first use. The file holds one mangled little-endian u64 of epoch
/// microseconds.
pub fn state_file_created(path: &Path, default_creation_time: i64) -> Result<i64, LicenseError> {
    let wrap = |source: io::Error| LicenseError::StateFile {
        path: path.display().to_string(),
        source,
    };
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut buf = [0u8; 8];
            file.read_exact(&mut buf).map_err(wrap)?;
            let micros = demangle_timestamp(u64::from_le_bytes(buf));
            Ok((micros / 1_000_000) as i64)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(wrap)?;
            }
            let mut file = fs::File::create(path).map_err(wrap)?;
            let mangled = mangle_timestamp(default_creation_time as u64 * 1_000_000);
            file.write_all(&mangled.to_le_bytes()).map_err(wrap)?;
            Ok(default_creation_time)
        }
        Err(e) => Err(wrap(e)),
    }
}

/// A licensed installation marks its state file with a single `'1'` byte.
pub fn is_licensed(licensed_state_file: &Path) -> bool {
    let mut state = [0u8; 1];
    match fs::File::open(licensed_state_file) {
        Ok(mut file) => file.read(&mut state).map(|n| n == 1 && state[0] == b'1').unwrap_or(false),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangling_identity() {
        for micros in [0u64, 1_234_000, 123_456_789_012_000] {
            assert_eq!(demangle_timestamp(mangle_timestamp(micros)), micros);
        }
    }

    #[test]
    fn mangling_reproducibility() {
        for micros in [0u64, 1_234_000, 123_456_789_012_000] {
            let x = mangle_timestamp(micros);
            assert_eq!(mangle_timestamp(demangle_timestamp(x)), x);
        }
    }

    #[test]
    fn trial_state_transitions() {
        let tm = TrialManager::new(1_000_000, false);
        assert_eq!(tm.state(1_000_000 + 100), "active trial");
        assert_eq!(tm.state(1_000_000 + TRIAL_PERIOD_SECS + 1), "expired trial");
        let licensed = TrialManager::new(0, true);
        assert_eq!(licensed.state(i64::MAX), "licensed");
    }

    #[test]
    fn expired_trial_rejects_only_over_limit_counts() {
        let tm = TrialManager::new(0, false);
        let now = TRIAL_PERIOD_SECS + 1;
        assert!(tm.validate_service_count(now, MAX_SERVICES_IN_TRIAL).is_ok());
        assert!(tm.validate_service_count(now, MAX_SERVICES_IN_TRIAL + 1).is_err());
    }

    #[test]
    fn state_file_is_created_on_first_read_and_reread_identically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state_file_created");
        let first = state_file_created(&path, 1_700_000_000).unwrap();
        assert_eq!(first, 1_700_000_000);
        let second = state_file_created(&path, 42).unwrap();
        assert_eq!(second, 1_700_000_000);
    }

    #[test]
    fn licensed_marker_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("licensed");
        assert!(!is_licensed(&path));
        fs::write(&path, b"1").unwrap();
        assert!(is_licensed(&path));
        fs::write(&path, b"0").unwrap();
        assert!(!is_licensed(&path));
    }
}
