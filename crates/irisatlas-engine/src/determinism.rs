//! Process-wide determinism controls.
//!
//! The runtime has no ambient global RNG to reseed, so determinism is an
//! explicit hook: the executor calls [`reset`] immediately before every stage
//! invocation and hands the returned seed to the stage through its context.
//! Stages that need randomness draw it from [`stage_rng`] (exposed as
//! `ContextSnapshot::rng`), never from an OS-seeded source.

use rand::SeedableRng;
use rand_pcg::Pcg32;

/// Seed every stage invocation starts from.
pub const DETERMINISTIC_SEED: u64 = 0;

/// Resets incidental nondeterminism and returns the seed to use.
pub fn reset() -> u64 {
    tracing::trace!(seed = DETERMINISTIC_SEED, "determinism reset");
    DETERMINISTIC_SEED
}

/// Creates the PCG32 stream for a stage invocation.
pub fn stage_rng(seed: u64) -> Pcg32 {
    Pcg32::seed_from_u64(seed)
}
