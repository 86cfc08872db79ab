use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::signal::SimObject;

pub async fn clock_cycles(signal: SimObject, n_cycles: u64) -> Result<()> {
    for _ in 0..n_cycles {
        signal.rising_edge().await?;
    }
    Ok(())
}

/// Independent generator derived from a parent one, so each task owns its own stream.
pub fn fork_rng(parent: &mut StdRng) -> StdRng {
    StdRng::seed_from_u64(parent.gen())
}
