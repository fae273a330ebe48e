//! Double-buffered particle storage and the readiness flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Largest supported population.
pub const MAX_PARTICLES: u32 = 100_000;

/// Population used when none is configured.
pub const DEFAULT_PARTICLE_COUNT: u32 = 60_000;

/// Clamp a requested population into `1..=MAX_PARTICLES`.
pub fn clamp_particle_count(requested: u32) -> u32 {
    requested.clamp(1, MAX_PARTICLES)
}

/// Two equally sized buffers: one is read during a tick, the other written.
///
/// [`PingPong::swap`] flips the roles in O(1), so the buffer written this tick
/// becomes the one read next tick.
#[derive(Clone, Debug)]
pub struct PingPong<T> {
    buffers: [Vec<T>; 2],
    current: usize,
}

impl<T: Clone> PingPong<T> {
    /// Both buffers start as copies of `initial`.
    pub fn new(initial: Vec<T>) -> Self {
        Self {
            buffers: [initial.clone(), initial],
            current: 0,
        }
    }

    /// Replace both buffers with `data`, resetting the orientation.
    pub fn reset(&mut self, data: Vec<T>) {
        *self = Self::new(data);
    }
}

impl<T> PingPong<T> {
    /// The buffer holding the latest state.
    #[inline]
    pub fn current(&self) -> &[T] {
        &self.buffers[self.current]
    }

    /// `(current, next)`: read one, write the other.
    pub fn split_mut(&mut self) -> (&[T], &mut [T]) {
        let (a, b) = self.buffers.split_at_mut(1);
        if self.current == 0 {
            (a[0].as_slice(), b[0].as_mut_slice())
        } else {
            (b[0].as_slice(), a[0].as_mut_slice())
        }
    }

    #[inline]
    pub fn swap(&mut self) {
        self.current ^= 1;
    }

    /// Index (0 or 1) of the buffer currently designated "current".
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.buffers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers[0].is_empty()
    }
}

/// Shared "safe to read" signal for consumers outside the simulation.
///
/// Cleared while storage is being reallocated and set again only once the
/// new buffers hold a complete population.
#[derive(Clone, Debug, Default)]
pub struct ReadyFlag(Arc<AtomicBool>);

impl ReadyFlag {
    pub fn new(ready: bool) -> Self {
        Self(Arc::new(AtomicBool::new(ready)))
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_particle_count() {
        assert_eq!(clamp_particle_count(0), 1);
        assert_eq!(clamp_particle_count(500), 500);
        assert_eq!(clamp_particle_count(150_000), MAX_PARTICLES);
    }

    #[test]
    fn test_ping_pong_swap() {
        let mut pp = PingPong::new(vec![0u32; 4]);
        {
            let (cur, next) = pp.split_mut();
            assert_eq!(cur, &[0, 0, 0, 0]);
            for (n, c) in next.iter_mut().zip(cur) {
                *n = c + 1;
            }
        }
        pp.swap();
        assert_eq!(pp.current(), &[1, 1, 1, 1]);
        assert_eq!(pp.current_index(), 1);

        {
            let (cur, next) = pp.split_mut();
            for (n, c) in next.iter_mut().zip(cur) {
                *n = c * 10;
            }
        }
        pp.swap();
        assert_eq!(pp.current(), &[10, 10, 10, 10]);
    }

    #[test]
    fn test_ready_flag_shared() {
        let flag = ReadyFlag::new(false);
        let observer = flag.clone();
        assert!(!observer.is_ready());
        flag.set(true);
        assert!(observer.is_ready());
    }
}
