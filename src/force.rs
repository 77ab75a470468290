/*
Force computes.

A force compute owns a per-slot buffer of (force, energy) that it refreshes at
most once per timestep. The integrator sums the buffers of all computes into
the net force. Buffers are indexed by storage slot, so anything a compute keeps
per particle across steps (the active force state, for instance) must be keyed
by tag and translated through rtags when written out.
 */

pub mod active;
mod active_kernels;
pub mod potential_pair;
pub mod potential_triplet;

pub use active::{ActiveBackend, ActiveForceCompute};
pub use potential_pair::{PotentialPair, ShiftMode};
pub use potential_triplet::{DensityPass, FinalDensity, PotentialTriplet};

use log::trace;
use nalgebra::Vector3;
use rayon::prelude::*;

use crate::constants::Scalar;
use crate::error::MdResult;
use crate::particle_data::{GlobalArray, Host, ParticleData};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ForceEnergy {
    pub force: Vector3<Scalar>,
    pub energy: Scalar,
}

pub type ForceBuffer = GlobalArray<ForceEnergy>;

pub(crate) fn force_buffer(n: usize) -> ForceBuffer {
    GlobalArray::from_vec("force", vec![ForceEnergy::default(); n])
}

/// Replace the buffer if the particle count changed.
pub(crate) fn ensure_force_buffer(buffer: &mut ForceBuffer, n: usize) {
    if buffer.len() != n {
        trace!("force buffer resized {} -> {n}", buffer.len());
        *buffer = force_buffer(n);
    }
}

pub trait ForceCompute: Send {
    fn name(&self) -> &str;

    fn compute(&mut self, pdata: &ParticleData, timestep: u64) -> MdResult<()>;

    fn forces(&self) -> &ForceBuffer;

    /// Only computes that integrate something of their own care about the step size.
    fn set_dt(&mut self, _dt: Scalar) {}

    fn total_energy(&self) -> Scalar {
        self.forces().read::<Host>().par_iter().map(|fe| fe.energy).sum()
    }
}

/// Once-per-timestep gate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComputeCache {
    last_computed: Option<u64>,
}

impl ComputeCache {
    pub fn should_compute(&mut self, timestep: u64) -> bool {
        if self.last_computed == Some(timestep) {
            return false;
        }
        self.last_computed = Some(timestep);
        true
    }

    /// Force the next call to compute, e.g. after parameters changed.
    pub fn invalidate(&mut self) {
        self.last_computed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_once_per_timestep() {
        let mut cache = ComputeCache::default();
        assert!(cache.should_compute(0));
        assert!(!cache.should_compute(0));
        assert!(cache.should_compute(1));
        assert!(cache.should_compute(0));
        cache.invalidate();
        assert!(cache.should_compute(0));
    }

    #[test]
    fn test_buffer_follows_particle_count() {
        let mut buffer = force_buffer(3);
        buffer.read_write::<Host>()[0].energy = 1.0;
        ensure_force_buffer(&mut buffer, 3);
        assert_eq!(buffer.read::<Host>()[0].energy, 1.0);
        ensure_force_buffer(&mut buffer, 5);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.read::<Host>()[0], ForceEnergy::default());
    }
}
