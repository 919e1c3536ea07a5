use ahash::AHashMap;
use parking_lot::Mutex;

use crate::errors::BenchTrailError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Before the store hands a document to its backend.
    PersistDocument,
    /// Inside the SQLite transaction, right before `COMMIT`.
    SqliteBeforeCommit,
    /// Before each publish attempt.
    Publish,
}

/// Per-store fault registry. Each configured point fails the next
/// `failures` checks with a retryable `StoreIo` error, then clears itself.
#[derive(Debug, Default)]
pub struct FaultInjector {
    registry: Mutex<AHashMap<FaultPoint, usize>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, point: FaultPoint, failures: usize) {
        let mut guard = self.registry.lock();
        if failures == 0 {
            guard.remove(&point);
        } else {
            guard.insert(point, failures);
        }
    }

    pub fn remaining(&self, point: FaultPoint) -> usize {
        self.registry.lock().get(&point).copied().unwrap_or(0)
    }

    pub(crate) fn check(&self, point: FaultPoint) -> Result<(), BenchTrailError> {
        let mut guard = self.registry.lock();
        if let Some(remaining) = guard.get_mut(&point)
            && *remaining > 0
        {
            *remaining -= 1;
            if *remaining == 0 {
                guard.remove(&point);
            }
            return Err(BenchTrailError::store_io(format!("fault injected: {point:?}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_fires_configured_number_of_times() {
        let faults = FaultInjector::new();
        faults.configure(FaultPoint::Publish, 2);
        assert!(faults.check(FaultPoint::Publish).is_err());
        assert_eq!(faults.remaining(FaultPoint::Publish), 1);
        assert!(faults.check(FaultPoint::Publish).is_err());
        assert!(faults.check(FaultPoint::Publish).is_ok());
        assert!(faults.check(FaultPoint::PersistDocument).is_ok());
    }

    #[test]
    fn zero_failures_clears_point() {
        let faults = FaultInjector::new();
        faults.configure(FaultPoint::PersistDocument, 3);
        faults.configure(FaultPoint::PersistDocument, 0);
        assert!(faults.check(FaultPoint::PersistDocument).is_ok());
    }
}
