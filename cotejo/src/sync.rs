//! Synchronization primitives with conditional compilation.
//!
//! Uses `parking_lot::Mutex` when the `fast-lock` feature is enabled and
//! `std::sync::Mutex` otherwise. Engine state shared across runs (the weight
//! table and the feedback tracker) goes through these.

#[cfg(feature = "fast-lock")]
use parking_lot::Mutex as ParkingLotMutex;

#[cfg(not(feature = "fast-lock"))]
use std::sync::Mutex as StdMutex;

/// Mutex type that conditionally uses parking_lot or std::sync::Mutex.
///
/// ```rust
/// use cotejo::sync::{lock, Mutex};
///
/// let weights = Mutex::new(vec![0.5, 0.5]);
/// lock(&weights)[0] = 0.45;
/// assert_eq!(lock(&weights)[0], 0.45);
/// ```
#[cfg(feature = "fast-lock")]
pub type Mutex<T> = ParkingLotMutex<T>;

#[cfg(not(feature = "fast-lock"))]
pub type Mutex<T> = StdMutex<T>;

/// Lock a mutex, recovering the guard if a previous holder panicked.
#[cfg(feature = "fast-lock")]
pub fn lock<T>(mutex: &Mutex<T>) -> parking_lot::MutexGuard<'_, T> {
    mutex.lock()
}

#[cfg(not(feature = "fast-lock"))]
pub fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Attempt to acquire a mutex lock without blocking.
#[cfg(feature = "fast-lock")]
pub fn try_lock<T>(mutex: &Mutex<T>) -> crate::Result<parking_lot::MutexGuard<'_, T>> {
    mutex
        .try_lock()
        .ok_or_else(|| crate::Error::WeightsLocked("lock would block".to_string()))
}

#[cfg(not(feature = "fast-lock"))]
pub fn try_lock<T>(mutex: &Mutex<T>) -> crate::Result<std::sync::MutexGuard<'_, T>> {
    mutex.try_lock().map_err(|e| match e {
        std::sync::TryLockError::Poisoned(poison) => {
            crate::Error::WeightsLocked(format!("lock poisoned: {poison}"))
        }
        std::sync::TryLockError::WouldBlock => {
            crate::Error::WeightsLocked("lock would block".to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_lock_while_held() {
        let m = Mutex::new(1);
        let guard = lock(&m);
        assert!(try_lock(&m).is_err());
        drop(guard);
        assert_eq!(*try_lock(&m).unwrap(), 1);
    }
}
