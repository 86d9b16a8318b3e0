//! Time-ordered version tokens.
//!
//! A [`Version`] is a 128-bit value whose high 64 bits hold a microsecond timestamp and whose low
//! 64 bits hold the node value of the generator that issued it. The big-endian byte form sorts the
//! same way as the value, so versions can be used directly as column names in descending scans.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{VersionError, VersionResult};
use crate::time::TimeService;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Version(Uuid);

impl Version {
    /// Sorts before every issued version.
    pub const MIN: Version = Version(Uuid::nil());
    /// Sorts after every issued version.
    pub const MAX: Version = Version(Uuid::from_u128(u128::MAX));

    #[inline]
    pub const fn from_parts(timestamp: u64, node: u64) -> Self {
        Self(Uuid::from_u64_pair(timestamp, node))
    }

    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn from_slice(bytes: &[u8]) -> VersionResult<Self> {
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|_| VersionError::InvalidLength(bytes.len()))?;
        Ok(Self(Uuid::from_bytes(bytes)))
    }

    /// Microseconds since the unix epoch at which this version was issued.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.0.as_u64_pair().0
    }

    #[inline]
    pub fn node(&self) -> u64 {
        self.0.as_u64_pair().1
    }

    #[inline]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; 16] {
        *self.0.as_bytes()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Issues versions that are strictly increasing for the lifetime of the generator.
///
/// The timestamp part follows the injected clock but never moves backwards: when the clock stalls
/// or goes back, the previous timestamp plus one is used instead.
pub struct VersionGenerator {
    last: AtomicU64,
    node: u64,
    clock: Arc<dyn TimeService>,
}

impl VersionGenerator {
    pub fn new(clock: Arc<dyn TimeService>) -> Self {
        Self::with_node(clock, rand_node())
    }

    pub fn with_node(clock: Arc<dyn TimeService>, node: u64) -> Self {
        Self {
            last: AtomicU64::new(0),
            node,
            clock,
        }
    }

    /// Generate the next version
    pub fn next(&self) -> VersionResult<Version> {
        let mut cur = self.last.load(Ordering::SeqCst);
        loop {
            if cur == u64::MAX {
                return Err(VersionError::ClockOverflow(cur));
            }
            let candidate = self.clock.current_time_micros().max(cur + 1);
            match self
                .last
                .compare_exchange_weak(cur, candidate, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Ok(Version::from_parts(candidate, self.node)),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Get the timestamp of the last issued version
    pub fn current(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }

    /// Make sure later versions sort after `version`, e.g. after reading one written elsewhere.
    pub fn update_if_greater(&self, version: Version) {
        self.last.fetch_max(version.timestamp(), Ordering::SeqCst);
    }
}

fn rand_node() -> u64 {
    Uuid::new_v4().as_u64_pair().1
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;
    use crate::time::ManualTimeService;

    #[test]
    fn test_versions_increase_when_clock_stalls() {
        let clock = Arc::new(ManualTimeService::new(1_000));
        let generator = VersionGenerator::with_node(clock, 7);
        let v1 = generator.next().unwrap();
        let v2 = generator.next().unwrap();
        assert!(v2 > v1);
        assert_eq!(v1.timestamp(), 1_000_000);
        assert_eq!(v2.timestamp(), 1_000_001);
        assert_eq!(v2.node(), 7);
    }

    #[test]
    fn test_versions_follow_clock() {
        let clock = Arc::new(ManualTimeService::new(1_000));
        let generator = VersionGenerator::with_node(clock.clone(), 1);
        let v1 = generator.next().unwrap();
        clock.advance_millis(5);
        let v2 = generator.next().unwrap();
        assert_eq!(v2.timestamp() - v1.timestamp(), 5_000);
    }

    #[test]
    fn test_update_if_greater() {
        let clock = Arc::new(ManualTimeService::new(0));
        let generator = VersionGenerator::with_node(clock, 1);
        generator.update_if_greater(Version::from_parts(100, 9));
        assert_eq!(generator.next().unwrap().timestamp(), 101);
        generator.update_if_greater(Version::from_parts(50, 9));
        assert_eq!(generator.next().unwrap().timestamp(), 102); // Should not decrease
    }

    #[test]
    fn test_byte_order_matches_version_order() {
        let older = Version::from_parts(10, u64::MAX);
        let newer = Version::from_parts(11, 0);
        assert!(older < newer);
        assert!(older.to_bytes() < newer.to_bytes());
        assert_eq!(Version::from_slice(&newer.to_bytes()).unwrap(), newer);
        assert!(Version::from_slice(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_concurrent_generation_is_unique() {
        let clock = Arc::new(ManualTimeService::new(42));
        let generator = Arc::new(VersionGenerator::with_node(clock, 3));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                thread::spawn(move || {
                    (0..1_000)
                        .map(|_| generator.next().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for version in handle.join().unwrap() {
                assert!(seen.insert(version));
            }
        }
        assert_eq!(seen.len(), 4_000);
    }
}
