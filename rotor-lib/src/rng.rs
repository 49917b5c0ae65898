//! Injectable randomness for endpoint selection (spec §9: "randomization
//! should be injectable for tests").

use rand::Rng as _;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Picks a uniformly random index in `0..len`. Abstracted so tests can swap
/// in a seeded, deterministic implementation.
pub trait Rng: Send + Sync {
    fn pick_index(&self, len: usize) -> usize;
}

pub struct OsRng;

impl Rng for OsRng {
    fn pick_index(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Deterministic RNG for tests: wraps a seeded `StdRng` behind a mutex so it
/// can be shared across the `&self` trait method.
pub struct SeededRng(std::sync::Mutex<StdRng>);

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self(std::sync::Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl Rng for SeededRng {
    fn pick_index(&self, len: usize) -> usize {
        self.0.lock().unwrap().gen_range(0..len)
    }
}

/// Picks one element uniformly at random from `items`, or `None` if empty.
pub fn choose<'a, T>(rng: &dyn Rng, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        None
    } else {
        items.get(rng.pick_index(items.len()))
    }
}
