/*
Velocity-Verlet (NVE) driver.

One step from t to t + dt:

    v(t + dt/2) = v(t) + dt/2 F(t) / m
    r(t + dt)   = r(t) + dt v(t + dt/2)          wrapped back into the box
    F(t + dt)   = sum of every force compute at timestep + 1
    v(t + dt)   = v(t + dt/2) + dt/2 F(t + dt) / m

Computes that keep a neighbor list refresh it themselves when they are asked
for the new timestep, so a rebuild happens between the drift and the force
evaluation whenever some particle has used up half the skin.
 */

use log::{debug, info};
use nalgebra::Vector3;
use rayon::prelude::*;

use crate::constants::Scalar;
use crate::error::{MdError, MdResult};
use crate::force::{ForceBuffer, ForceCompute, ForceEnergy};
use crate::particle_data::{GlobalArray, Host, ParticleData};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thermo {
    pub timestep: u64,
    pub kinetic_energy: Scalar,
    pub potential_energy: Scalar,
    pub temperature: Scalar,
}

impl Thermo {
    pub fn total_energy(&self) -> Scalar {
        self.kinetic_energy + self.potential_energy
    }
}

pub fn kinetic_energy(pdata: &ParticleData) -> Scalar {
    let velocities = pdata.velocities().read::<Host>();
    let masses = pdata.masses().read::<Host>();
    velocities
        .par_iter()
        .zip(masses.par_iter())
        .map(|(v, m)| 0.5 * m * v.norm_squared())
        .sum()
}

pub fn compute_temperature(pdata: &ParticleData) -> Scalar {
    /*
    Equipartition: every degree of freedom carries kT/2, so in d dimensions

        T = (2/d) * (KE / N)
     */
    if pdata.n() == 0 {
        return 0.0;
    }
    (2.0 / pdata.n_dimensions() as Scalar) * kinetic_energy(pdata) / pdata.n() as Scalar
}

pub struct Integrator {
    dt: Scalar,
    timestep: u64,
    log_period: u64,
    forces: Vec<Box<dyn ForceCompute>>,
    net_force: ForceBuffer,
    net_force_timestep: Option<u64>,
}

impl Integrator {
    pub fn new(dt: Scalar) -> MdResult<Self> {
        if !(dt > 0.0) {
            return Err(MdError::InvalidParameter(format!("dt must be positive, got {dt}")));
        }
        Ok(Integrator {
            dt,
            timestep: 0,
            log_period: 0,
            forces: Vec::new(),
            net_force: GlobalArray::from_vec("net_force", Vec::new()),
            net_force_timestep: None,
        })
    }

    /// Log thermodynamic quantities every `log_period` steps (0 disables).
    pub fn with_log_period(mut self, log_period: u64) -> Self {
        self.log_period = log_period;
        self
    }

    pub fn add_force(&mut self, mut compute: Box<dyn ForceCompute>) {
        compute.set_dt(self.dt);
        debug!("integrator: added force compute {}", compute.name());
        self.forces.push(compute);
        self.net_force_timestep = None;
    }

    pub fn dt(&self) -> Scalar {
        self.dt
    }

    pub fn timestep(&self) -> u64 {
        self.timestep
    }

    pub fn force_computes(&self) -> &[Box<dyn ForceCompute>] {
        &self.forces
    }

    pub fn net_force(&self) -> &ForceBuffer {
        &self.net_force
    }

    /// Run every force compute for `timestep` and sum their buffers slot by slot.
    pub fn compute_net_force(&mut self, pdata: &ParticleData, timestep: u64) -> MdResult<()> {
        for compute in self.forces.iter_mut() {
            compute.compute(pdata, timestep)?;
        }
        if self.net_force.len() != pdata.n() {
            self.net_force = GlobalArray::from_vec("net_force", vec![ForceEnergy::default(); pdata.n()]);
        }

        let handles: Vec<_> = self.forces.iter().map(|c| c.forces().read::<Host>()).collect();
        let mut net = self.net_force.overwrite::<Host>();
        net.par_iter_mut().enumerate().for_each(|(idx, slot)| {
            for h in &handles {
                slot.force += h[idx].force;
                slot.energy += h[idx].energy;
            }
        });
        self.net_force_timestep = Some(timestep);
        Ok(())
    }

    pub fn potential_energy(&self) -> Scalar {
        self.net_force.read::<Host>().par_iter().map(|fe| fe.energy).sum()
    }

    pub fn thermo(&self, pdata: &ParticleData) -> Thermo {
        Thermo {
            timestep: self.timestep,
            kinetic_energy: kinetic_energy(pdata),
            potential_energy: self.potential_energy(),
            temperature: compute_temperature(pdata),
        }
    }

    pub fn step(&mut self, pdata: &mut ParticleData) -> MdResult<()> {
        if self.net_force_timestep != Some(self.timestep) {
            self.compute_net_force(pdata, self.timestep)?;
        }
        let dt = self.dt;
        let half_dt = 0.5 * dt;
        let sim_box = *pdata.sim_box();

        {
            let net = self.net_force.read::<Host>();
            let (mut positions, mut velocities, masses) = pdata.kinematics_mut();
            positions
                .par_iter_mut()
                .zip(velocities.par_iter_mut())
                .zip(masses.par_iter())
                .zip(net.par_iter())
                .for_each(|(((r, v), m), fe)| {
                    *v += fe.force * (half_dt / m);
                    *r = sim_box.wrap(*r + *v * dt);
                });
        }

        self.timestep += 1;
        self.compute_net_force(pdata, self.timestep)?;

        let net = self.net_force.read::<Host>();
        let (_, mut velocities, masses) = pdata.kinematics_mut();
        velocities
            .par_iter_mut()
            .zip(masses.par_iter())
            .zip(net.par_iter())
            .for_each(|((v, m), fe)| {
                *v += fe.force * (half_dt / m);
            });
        Ok(())
    }

    pub fn run(&mut self, pdata: &mut ParticleData, steps: u64) -> MdResult<Thermo> {
        if self.net_force_timestep != Some(self.timestep) {
            self.compute_net_force(pdata, self.timestep)?;
        }
        let start = self.thermo(pdata);
        info!(
            "run: {steps} steps from timestep {}, E = {:.6} (KE {:.6}, PE {:.6}), T = {:.4}",
            start.timestep,
            start.total_energy(),
            start.kinetic_energy,
            start.potential_energy,
            start.temperature
        );

        for _ in 0..steps {
            self.step(pdata)?;
            if self.log_period > 0 && self.timestep % self.log_period == 0 {
                let thermo = self.thermo(pdata);
                info!(
                    "step {}: E = {:.6} (KE {:.6}, PE {:.6}), T = {:.4}",
                    thermo.timestep,
                    thermo.total_energy(),
                    thermo.kinetic_energy,
                    thermo.potential_energy,
                    thermo.temperature
                );
            }
        }

        let end = self.thermo(pdata);
        info!(
            "run finished at timestep {}: E = {:.6}, drift {:.3e}",
            end.timestep,
            end.total_energy(),
            end.total_energy() - start.total_energy()
        );
        Ok(end)
    }
}

/// Net force on every particle, by tag.
pub fn net_forces_by_tag(integrator: &Integrator, pdata: &ParticleData) -> Vec<Vector3<Scalar>> {
    let rtags = pdata.rtags().read::<Host>();
    let net = integrator.net_force().read::<Host>();
    (0..pdata.n()).map(|tag| net[rtags[tag]].force).collect()
}
