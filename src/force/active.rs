/*
Active force compute.

Every particle carries a self-propulsion force of fixed magnitude along a unit
direction that belongs to the particle (indexed by tag, not storage slot).
Each timestep runs up to three strictly ordered steps:

    1. constraint            if rx != 0       direction -> tangent of the ellipsoid
    2. rotational diffusion  if D_r != 0      direction -> small random rotation
    3. set forces            always           force[rtag[tag]] = mag * direction

On the device backend each step is one kernel launch with a thread per
particle, followed by a non-finite scan of what it wrote when error checking is
on. The host backend runs the same kernel bodies over rayon.
 */

use std::sync::Arc;

use log::{debug, trace, warn};
use nalgebra::Vector3;
use rayon::prelude::*;

use super::active_kernels::{rotational_diffusion_one, set_constraint_one, set_force_one, DiffusionStep};
use super::{ensure_force_buffer, force_buffer, ComputeCache, ForceBuffer, ForceCompute};
use crate::config::ActiveForceConfig;
use crate::constants::{Scalar, DEFAULT_DT};
use crate::error::{MdError, MdResult};
use crate::execution::{DeviceContext, ExecutionConfiguration, ExecutionContext};
use crate::manifold::EllipsoidManifold;
use crate::particle_data::{Device, GlobalArray, Host, ParticleData};

fn device_of(exec_conf: &ExecutionConfiguration) -> MdResult<&DeviceContext> {
    exec_conf
        .device()
        .ok_or_else(|| MdError::Configuration("device backend selected but the device is gone".to_string()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveBackend {
    Host,
    Device,
}

pub struct ActiveForceCompute {
    exec_conf: Arc<ExecutionConfiguration>,
    backend: ActiveBackend,
    seed: u64,
    orientation_link: bool,
    rotation_diff: Scalar,
    constraint: Option<EllipsoidManifold>,
    dt: Scalar,
    active_vec: GlobalArray<Vector3<Scalar>>,
    active_mag: GlobalArray<Scalar>,
    forces: ForceBuffer,
    cache: ComputeCache,
}

impl ActiveForceCompute {
    /// Picks the device backend when the execution configuration has one.
    pub fn new(
        exec_conf: Arc<ExecutionConfiguration>,
        pdata: &ParticleData,
        f_lst: &[Vector3<Scalar>],
        config: &ActiveForceConfig,
    ) -> MdResult<Self> {
        let backend = if exec_conf.is_gpu_enabled() {
            ActiveBackend::Device
        } else {
            ActiveBackend::Host
        };
        Self::with_backend(exec_conf, backend, pdata, f_lst, config)
    }

    /// `f_lst[tag]` is the initial active force of particle `tag`.
    pub fn with_backend(
        exec_conf: Arc<ExecutionConfiguration>,
        backend: ActiveBackend,
        pdata: &ParticleData,
        f_lst: &[Vector3<Scalar>],
        config: &ActiveForceConfig,
    ) -> MdResult<Self> {
        if backend == ActiveBackend::Device && !exec_conf.is_gpu_enabled() {
            return Err(MdError::Configuration(
                "creating a device active force compute with no device in the execution configuration".to_string(),
            ));
        }
        if f_lst.len() != pdata.n() {
            return Err(MdError::InvalidParameter(format!(
                "active force list has {} entries for {} particles",
                f_lst.len(),
                pdata.n()
            )));
        }
        if pdata.n_dimensions() == 2 && f_lst.iter().any(|f| f.z != 0.0) {
            return Err(MdError::InvalidParameter(
                "active forces in a 2D system must lie in the xy plane".to_string(),
            ));
        }
        if !(config.rotation_diff >= 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "rotational diffusion must be non-negative, got {}",
                config.rotation_diff
            )));
        }
        let constraint = config.constraint()?;

        let mut directions = Vec::with_capacity(f_lst.len());
        let mut magnitudes = Vec::with_capacity(f_lst.len());
        for (tag, f) in f_lst.iter().enumerate() {
            let magnitude = f.norm();
            if magnitude > 0.0 {
                directions.push(f / magnitude);
                magnitudes.push(magnitude);
            } else {
                warn!("active force of particle {tag} has zero length, it will not propel");
                directions.push(Vector3::x());
                magnitudes.push(0.0);
            }
        }

        debug!(
            "ActiveForceCompute: {} particles, backend {backend:?}, D_r {}, constraint {}",
            f_lst.len(),
            config.rotation_diff,
            if constraint.is_some() { "ellipsoid" } else { "none" }
        );

        Ok(ActiveForceCompute {
            exec_conf,
            backend,
            seed: config.seed,
            orientation_link: config.orientation_link,
            rotation_diff: config.rotation_diff,
            constraint,
            dt: DEFAULT_DT,
            active_vec: GlobalArray::from_vec("active_vec", directions),
            active_mag: GlobalArray::from_vec("active_mag", magnitudes),
            forces: force_buffer(f_lst.len()),
            cache: ComputeCache::default(),
        })
    }

    pub fn backend(&self) -> ActiveBackend {
        self.backend
    }

    /// Active directions, indexed by tag.
    pub fn directions(&self) -> Vec<Vector3<Scalar>> {
        self.active_vec.read::<Host>().to_vec()
    }

    /// Active magnitudes, indexed by tag.
    pub fn magnitudes(&self) -> Vec<Scalar> {
        self.active_mag.read::<Host>().to_vec()
    }

    pub fn set_rotation_diffusion(&mut self, rotation_diff: Scalar) -> MdResult<()> {
        if !(rotation_diff >= 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "rotational diffusion must be non-negative, got {rotation_diff}"
            )));
        }
        self.rotation_diff = rotation_diff;
        self.cache.invalidate();
        Ok(())
    }

    fn set_constraint(&mut self, pdata: &ParticleData, ellipsoid: &EllipsoidManifold) -> MdResult<()> {
        let is_2d = pdata.n_dimensions() == 2;
        match self.backend {
            ActiveBackend::Host => {
                let positions = pdata.positions().read::<Host>();
                let rtags = pdata.rtags().read::<Host>();
                let mut active_vec = self.active_vec.read_write::<Host>();
                active_vec.par_iter_mut().enumerate().for_each(|(tag, v)| {
                    set_constraint_one(ellipsoid, is_2d, &positions[rtags[tag]], v);
                });
            }
            ActiveBackend::Device => {
                let device = device_of(&self.exec_conf)?;
                let block_size = self.exec_conf.block_size();
                let positions = pdata.positions().read::<Device>();
                let rtags = pdata.rtags().read::<Device>();
                let mut active_vec = self.active_vec.read_write::<Device>();
                device.launch("active_force_set_constraint", block_size, &mut active_vec[..], |tag, v| {
                    set_constraint_one(ellipsoid, is_2d, &positions[rtags[tag]], v);
                })?;
                device.check("active_force_set_constraint", &active_vec[..], |v| {
                    v.iter().all(|c| c.is_finite())
                })?;
            }
        }
        Ok(())
    }

    fn rotational_diffusion(&mut self, pdata: &ParticleData, timestep: u64) -> MdResult<()> {
        let step = DiffusionStep {
            seed: self.seed,
            timestep,
            sigma: (2.0 * self.rotation_diff * self.dt).sqrt(),
            is_2d: pdata.n_dimensions() == 2,
            constraint: self.constraint.as_ref(),
        };
        match self.backend {
            ActiveBackend::Host => {
                let positions = pdata.positions().read::<Host>();
                let rtags = pdata.rtags().read::<Host>();
                let mut active_vec = self.active_vec.read_write::<Host>();
                active_vec.par_iter_mut().enumerate().for_each(|(tag, v)| {
                    rotational_diffusion_one(&step, tag, &positions[rtags[tag]], v);
                });
            }
            ActiveBackend::Device => {
                let device = device_of(&self.exec_conf)?;
                let block_size = self.exec_conf.block_size();
                let positions = pdata.positions().read::<Device>();
                let rtags = pdata.rtags().read::<Device>();
                let mut active_vec = self.active_vec.read_write::<Device>();
                device.launch("active_force_rotational_diffusion", block_size, &mut active_vec[..], |tag, v| {
                    rotational_diffusion_one(&step, tag, &positions[rtags[tag]], v);
                })?;
                device.check("active_force_rotational_diffusion", &active_vec[..], |v| {
                    v.iter().all(|c| c.is_finite())
                })?;
            }
        }
        Ok(())
    }

    // one thread per storage slot, each pulling the state of the tag it holds
    fn set_forces(&mut self, pdata: &ParticleData) -> MdResult<()> {
        let link = self.orientation_link;
        match self.backend {
            ActiveBackend::Host => {
                let tags = pdata.tags().read::<Host>();
                let orientations = pdata.orientations().read::<Host>();
                let active_vec = self.active_vec.read::<Host>();
                let active_mag = self.active_mag.read::<Host>();
                let mut forces = self.forces.overwrite::<Host>();
                forces.par_iter_mut().enumerate().for_each(|(idx, slot)| {
                    let tag = tags[idx];
                    *slot = set_force_one(&active_vec[tag], active_mag[tag], link.then(|| &orientations[idx]));
                });
            }
            ActiveBackend::Device => {
                let device = device_of(&self.exec_conf)?;
                let block_size = self.exec_conf.block_size();
                let tags = pdata.tags().read::<Device>();
                let orientations = pdata.orientations().read::<Device>();
                let active_vec = self.active_vec.read::<Device>();
                let active_mag = self.active_mag.read::<Device>();
                let mut forces = self.forces.overwrite::<Device>();
                device.launch("active_force_set_forces", block_size, &mut forces[..], |idx, slot| {
                    let tag = tags[idx];
                    *slot = set_force_one(&active_vec[tag], active_mag[tag], link.then(|| &orientations[idx]));
                })?;
                device.check("active_force_set_forces", &forces[..], |fe| {
                    fe.force.iter().all(|c| c.is_finite())
                })?;
            }
        }
        Ok(())
    }
}

impl ForceCompute for ActiveForceCompute {
    fn name(&self) -> &str {
        "active"
    }

    fn compute(&mut self, pdata: &ParticleData, timestep: u64) -> MdResult<()> {
        if !self.cache.should_compute(timestep) {
            return Ok(());
        }
        if pdata.n() != self.active_vec.len() {
            return Err(MdError::InvalidParameter(format!(
                "active force compute built for {} particles, system has {}",
                self.active_vec.len(),
                pdata.n()
            )));
        }
        ensure_force_buffer(&mut self.forces, pdata.n());
        trace!("active force step {timestep} on {:?}", self.backend);

        if let Some(ellipsoid) = self.constraint.clone() {
            self.set_constraint(pdata, &ellipsoid)?;
        }
        if self.rotation_diff != 0.0 {
            self.rotational_diffusion(pdata, timestep)?;
        }
        self.set_forces(pdata)
    }

    fn forces(&self) -> &ForceBuffer {
        &self.forces
    }

    fn set_dt(&mut self, dt: Scalar) {
        self.dt = dt;
    }
}
