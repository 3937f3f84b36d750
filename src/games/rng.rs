//! Random sources for the game engines
//!
//! Engines are generic over `rand::Rng`. Production sessions seed a `StdRng`
//! from the OS; simulations and tests pass a fixed seed, or a `ScriptedRng`
//! when a test needs an exact sequence of uniform draws.

use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use std::collections::VecDeque;

/// Default random source for engines
pub type GameRng = StdRng;

pub fn from_entropy() -> GameRng {
    StdRng::from_entropy()
}

pub fn seeded(seed: u64) -> GameRng {
    StdRng::seed_from_u64(seed)
}

/// Uniform index into a collection of `len` items, from a single `f64` draw
pub fn pick_index<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let index = (rng.gen::<f64>() * len as f64) as usize;
    Some(index.min(len - 1))
}

/// Replays a fixed list of uniform `[0, 1)` draws.
///
/// `rng.gen::<f64>()` returns the scripted values in order; the script then
/// wraps around. Integer range sampling consumes the same words, so only
/// `f64` draws map one-to-one onto the script.
#[derive(Debug, Clone)]
pub struct ScriptedRng {
    script: VecDeque<f64>,
    cursor: usize,
}

impl ScriptedRng {
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let script: VecDeque<f64> = values.into_iter().collect();
        assert!(!script.is_empty(), "script must contain at least one value");
        assert!(
            script.iter().all(|v| (0.0..1.0).contains(v)),
            "scripted draws must lie in [0, 1)"
        );
        Self { script, cursor: 0 }
    }

    fn next_draw(&mut self) -> f64 {
        let value = self.script[self.cursor % self.script.len()];
        self.cursor += 1;
        value
    }
}

impl RngCore for ScriptedRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        // rand's Standard f64 keeps the top 53 bits of the word
        let mantissa = (self.next_draw() * (1u64 << 53) as f64) as u64;
        mantissa << 11
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
