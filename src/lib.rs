/*

=========================================================
 Force and constraint core for particle dynamics (Rust)
=========================================================

Particle Model
--------------
Per-particle columns (position, velocity, orientation, mass, type, tag) live
in `particle_data::ParticleData`, each behind a `GlobalArray` that is only
reachable through scoped host/device access handles. Storage order may change
at any time; tags give particles a stable identity.

Execution
---------
`execution::ExecutionConfiguration` says whether a device is available. The
device is emulated by a dedicated worker pool that runs "kernels" over blocks
of threads, so host and device code paths can be compared for bitwise parity.

Forces
------
- Pair potentials (Lennard-Jones, Gaussian, Yukawa) with none/shift/xplor
  smoothing, driven by `force::PotentialPair` over a cell-list neighbor list.
- Three-body / density dependent potentials (van der Waals style) driven by
  `force::PotentialTriplet` in two passes: densities first, then forces.
- Active (self-propelled) forces with rotational diffusion and an optional
  ellipsoidal constraint, on host or device, `force::ActiveForceCompute`.

Manifolds
---------
Implicit surfaces F(r) = 0 (plane, sphere, cylinder, ellipsoid) with
projection onto the surface and derivative of F.

Integration
-----------
Velocity-Verlet (NVE), summing every force compute into the net force:
    T = (2/d) * (KE / N)

Long range support
------------------
`fft` is a local batched 1D FFT backend (rustfft) with strided layouts and
64-byte aligned buffers.

=========================================================

*/

pub mod config;
pub mod constants;
pub mod error;
pub mod evaluator;
pub mod execution;
pub mod fft;
pub mod force;
pub mod integrator;
pub mod manifold;
pub mod neighbor;
pub mod particle_data;
pub mod pbc;
pub mod rng;

pub use error::{MdError, MdResult};
