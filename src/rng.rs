/*
Counter based random streams.

Every stochastic per-particle update draws from a generator seeded only by
(seed, timestep, tag), so the same particle sees the same numbers regardless of
its storage slot, the backend that runs the kernel, or the order particles are
visited in.
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::constants::Scalar;
use nalgebra::Vector3;

// splitmix64 finalizer
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub fn stream_key(seed: u64, timestep: u64, tag: u64) -> u64 {
    mix(mix(mix(seed) ^ timestep) ^ tag)
}

pub fn particle_rng(seed: u64, timestep: u64, tag: u64) -> StdRng {
    StdRng::seed_from_u64(stream_key(seed, timestep, tag))
}

/// Gaussian variate with mean zero. A zero width returns zero without touching the stream.
pub fn gaussian<R: Rng>(rng: &mut R, sigma: Scalar) -> Scalar {
    match Normal::new(0.0, sigma) {
        Ok(normal) if sigma > 0.0 => normal.sample(rng),
        _ => 0.0,
    }
}

/// Uniformly distributed point on the unit sphere.
pub fn unit_vector<R: Rng>(rng: &mut R) -> Vector3<Scalar> {
    let u: Scalar = rng.random();
    let v: Scalar = rng.random();
    let theta = 2.0 * std::f64::consts::PI * u;
    let phi = (2.0 * v - 1.0).acos();
    Vector3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos())
}
