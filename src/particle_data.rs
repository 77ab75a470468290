/*

Particle data storage.

Each per-particle column is a `GlobalArray`, and the only way to look at one is
through a scoped handle that states, in its type, where the data is needed
(`Host` or `Device`) and how it will be used (`Read`, `ReadWrite`, `Overwrite`).
Handles release automatically when they go out of scope, and the borrow checker
guarantees that a writer never coexists with any other handle on the same array.

Storage order is not stable: `tags[idx]` is the logical identity of the particle
in slot `idx`, and `rtags[tag]` is the slot currently holding that particle.

 */

mod array;

pub use array::{
    AccessLocation, AccessMode, ArrayHandle, ArrayHandleMut, Device, GlobalArray, Host, Location,
    Overwrite, Read, ReadWrite,
};

use log::debug;
use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::constants::Scalar;
use crate::error::{MdError, MdResult};
use crate::pbc::SimulationBox;
use crate::rng::particle_rng;

pub struct ParticleData {
    positions: GlobalArray<Vector3<Scalar>>,
    velocities: GlobalArray<Vector3<Scalar>>,
    orientations: GlobalArray<UnitQuaternion<Scalar>>,
    masses: GlobalArray<Scalar>,
    types: GlobalArray<usize>,
    tags: GlobalArray<usize>,
    rtags: GlobalArray<usize>,
    type_names: Vec<String>,
    sim_box: SimulationBox,
    n_dimensions: usize,
}

impl ParticleData {
    pub fn new(
        positions: Vec<Vector3<Scalar>>,
        sim_box: SimulationBox,
        n_dimensions: usize,
    ) -> MdResult<Self> {
        if n_dimensions != 2 && n_dimensions != 3 {
            return Err(MdError::InvalidParameter(format!(
                "dimensions must be 2 or 3, got {n_dimensions}"
            )));
        }
        let n = positions.len();
        let identity: Vec<usize> = (0..n).collect();
        debug!("ParticleData: {n} particles in {n_dimensions}D");

        Ok(ParticleData {
            positions: GlobalArray::from_vec("positions", positions),
            velocities: GlobalArray::from_vec("velocities", vec![Vector3::zeros(); n]),
            orientations: GlobalArray::from_vec("orientations", vec![UnitQuaternion::identity(); n]),
            masses: GlobalArray::from_vec("masses", vec![1.0; n]),
            types: GlobalArray::from_vec("types", vec![0; n]),
            tags: GlobalArray::from_vec("tags", identity.clone()),
            rtags: GlobalArray::from_vec("rtags", identity),
            type_names: vec!["A".to_string()],
            sim_box,
            n_dimensions,
        })
    }

    /*
    Place n particles on a simple cubic (square in 2D) lattice filling the box and
    draw Maxwell-Boltzmann velocities at the requested temperature.

    At thermal equilibrium each velocity component is normal with sigma = sqrt(T/m).
    The centre of mass drift is removed afterwards.
     */
    pub fn lattice(
        number_of_particles: usize,
        sim_box: SimulationBox,
        n_dimensions: usize,
        temperature: Scalar,
        seed: u64,
    ) -> MdResult<Self> {
        if number_of_particles == 0 {
            return Err(MdError::InvalidParameter("cannot build an empty lattice".to_string()));
        }
        let per_side = (number_of_particles as Scalar)
            .powf(1.0 / n_dimensions as Scalar)
            .ceil() as usize;
        let lengths = sim_box.lengths();
        let spacing = lengths / per_side as Scalar;

        let mut positions = Vec::with_capacity(number_of_particles);
        'fill: for i in 0..per_side {
            for j in 0..per_side {
                let k_max = if n_dimensions == 3 { per_side } else { 1 };
                for k in 0..k_max {
                    if positions.len() == number_of_particles {
                        break 'fill;
                    }
                    let z = if n_dimensions == 3 {
                        (k as Scalar + 0.5) * spacing[2] - 0.5 * lengths[2]
                    } else {
                        0.0
                    };
                    positions.push(Vector3::new(
                        (i as Scalar + 0.5) * spacing[0] - 0.5 * lengths[0],
                        (j as Scalar + 0.5) * spacing[1] - 0.5 * lengths[1],
                        z,
                    ));
                }
            }
        }

        let mut pdata = ParticleData::new(positions, sim_box, n_dimensions)?;
        if temperature > 0.0 {
            pdata.thermalize(temperature, seed)?;
        }
        Ok(pdata)
    }

    pub fn thermalize(&mut self, temperature: Scalar, seed: u64) -> MdResult<()> {
        let n_dimensions = self.n_dimensions;
        let masses = self.masses.read::<Host>().to_vec();
        let tags = self.tags.read::<Host>().to_vec();
        let mut velocities = self.velocities.read_write::<Host>();

        for (idx, v) in velocities.iter_mut().enumerate() {
            let sigma_mb = (temperature / masses[idx]).sqrt();
            let normal = Normal::new(0.0, sigma_mb).map_err(|e| {
                MdError::InvalidParameter(format!("bad Maxwell-Boltzmann width {sigma_mb}: {e}"))
            })?;
            // velocities keyed by tag so a reordered system thermalizes identically
            let mut rng = particle_rng(seed, 0, tags[idx] as u64);
            *v = Vector3::new(
                normal.sample(&mut rng),
                normal.sample(&mut rng),
                if n_dimensions == 3 { normal.sample(&mut rng) } else { 0.0 },
            );
        }

        // remove centre of mass drift
        let total_mass: Scalar = masses.iter().sum();
        let momentum = velocities
            .iter()
            .zip(masses.iter())
            .fold(Vector3::zeros(), |acc, (v, m)| acc + v * *m);
        let drift = momentum / total_mass;
        for v in velocities.iter_mut() {
            *v -= drift;
        }
        Ok(())
    }

    pub fn n(&self) -> usize {
        self.positions.len()
    }

    pub fn n_dimensions(&self) -> usize {
        self.n_dimensions
    }

    pub fn sim_box(&self) -> &SimulationBox {
        &self.sim_box
    }

    pub fn n_types(&self) -> usize {
        self.type_names.len()
    }

    pub fn type_names(&self) -> &[String] {
        &self.type_names
    }

    pub fn type_id(&self, name: &str) -> Option<usize> {
        self.type_names.iter().position(|t| t == name)
    }

    pub fn set_types(&mut self, type_names: Vec<String>, types_by_tag: &[usize]) -> MdResult<()> {
        if types_by_tag.len() != self.n() {
            return Err(MdError::InvalidParameter(format!(
                "{} type ids given for {} particles",
                types_by_tag.len(),
                self.n()
            )));
        }
        if let Some(bad) = types_by_tag.iter().find(|t| **t >= type_names.len()) {
            return Err(MdError::InvalidParameter(format!(
                "type id {bad} out of range for {} types",
                type_names.len()
            )));
        }
        let rtags = self.rtags.read::<Host>().to_vec();
        let mut types = self.types.read_write::<Host>();
        for (tag, type_id) in types_by_tag.iter().enumerate() {
            types[rtags[tag]] = *type_id;
        }
        self.type_names = type_names;
        Ok(())
    }

    pub fn set_masses(&mut self, mass: Scalar) -> MdResult<()> {
        if !(mass > 0.0) {
            return Err(MdError::InvalidParameter(format!("mass must be positive, got {mass}")));
        }
        self.masses.overwrite::<Host>().fill(mass);
        Ok(())
    }

    pub fn positions(&self) -> &GlobalArray<Vector3<Scalar>> {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut GlobalArray<Vector3<Scalar>> {
        &mut self.positions
    }

    pub fn velocities(&self) -> &GlobalArray<Vector3<Scalar>> {
        &self.velocities
    }

    pub fn velocities_mut(&mut self) -> &mut GlobalArray<Vector3<Scalar>> {
        &mut self.velocities
    }

    pub fn orientations(&self) -> &GlobalArray<UnitQuaternion<Scalar>> {
        &self.orientations
    }

    pub fn orientations_mut(&mut self) -> &mut GlobalArray<UnitQuaternion<Scalar>> {
        &mut self.orientations
    }

    pub fn masses(&self) -> &GlobalArray<Scalar> {
        &self.masses
    }

    pub fn types(&self) -> &GlobalArray<usize> {
        &self.types
    }

    pub fn tags(&self) -> &GlobalArray<usize> {
        &self.tags
    }

    pub fn rtags(&self) -> &GlobalArray<usize> {
        &self.rtags
    }

    /// Velocity-Verlet style split borrow: positions and velocities writable together.
    pub fn kinematics_mut(
        &mut self,
    ) -> (
        ArrayHandleMut<'_, Vector3<Scalar>, Host, ReadWrite>,
        ArrayHandleMut<'_, Vector3<Scalar>, Host, ReadWrite>,
        ArrayHandle<'_, Scalar, Host>,
    ) {
        (
            self.positions.read_write::<Host>(),
            self.velocities.read_write::<Host>(),
            self.masses.read::<Host>(),
        )
    }

    /// Move the particle in slot `order[i]` into slot `i`, keeping tags and rtags consistent.
    pub fn reorder(&mut self, order: &[usize]) -> MdResult<()> {
        let n = self.n();
        let mut seen = vec![false; n];
        if order.len() != n || !order.iter().all(|&o| o < n && !std::mem::replace(&mut seen[o], true)) {
            return Err(MdError::InvalidParameter(
                "reorder expects a permutation of the storage slots".to_string(),
            ));
        }

        self.positions.permute(order);
        self.velocities.permute(order);
        self.orientations.permute(order);
        self.masses.permute(order);
        self.types.permute(order);
        self.tags.permute(order);

        let tags = self.tags.read::<Host>().to_vec();
        let mut rtags = self.rtags.overwrite::<Host>();
        for (idx, tag) in tags.iter().enumerate() {
            rtags[*tag] = idx;
        }
        debug!("ParticleData: reordered {n} particles");
        Ok(())
    }

    /// Random permutation of storage order, mostly useful for exercising tag bookkeeping.
    pub fn shuffle(&mut self, seed: u64) -> MdResult<()> {
        let mut rng = particle_rng(seed, u64::MAX, 0);
        let mut order: Vec<usize> = (0..self.n()).collect();
        for i in (1..order.len()).rev() {
            let j = rng.random_range(0..=i);
            order.swap(i, j);
        }
        self.reorder(&order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn three_particles() -> ParticleData {
        ParticleData::new(
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.0, 0.0, 0.0),
                Vector3::new(2.0, 0.0, 0.0),
            ],
            SimulationBox::cube(10.0).unwrap(),
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_reorder_keeps_rtags_consistent() {
        let mut pdata = three_particles();
        pdata.reorder(&[2, 0, 1]).unwrap();

        let tags = pdata.tags().read::<Host>();
        let rtags = pdata.rtags().read::<Host>();
        let positions = pdata.positions().read::<Host>();
        assert_eq!(&tags[..], &[2, 0, 1]);
        for tag in 0..3 {
            assert_eq!(tags[rtags[tag]], tag);
            assert_relative_eq!(positions[rtags[tag]].x, tag as f64);
        }
    }

    #[test]
    fn test_reorder_rejects_non_permutation() {
        let mut pdata = three_particles();
        assert!(pdata.reorder(&[0, 0, 1]).is_err());
        assert!(pdata.reorder(&[0, 1]).is_err());
    }

    #[test]
    fn test_lattice_fills_requested_count_without_overlap() {
        let sim_box = SimulationBox::cube(6.0).unwrap();
        let pdata = ParticleData::lattice(20, sim_box, 3, 1.0, 3).unwrap();
        assert_eq!(pdata.n(), 20);

        let positions = pdata.positions().read::<Host>();
        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                assert!(sim_box.min_image(positions[j] - positions[i]).norm() > 1.0);
            }
        }
    }

    #[test]
    fn test_thermalize_removes_drift() {
        let sim_box = SimulationBox::cube(8.0).unwrap();
        let pdata = ParticleData::lattice(64, sim_box, 3, 2.0, 11).unwrap();
        let velocities = pdata.velocities().read::<Host>();
        let momentum = velocities.iter().fold(Vector3::zeros(), |acc, v| acc + v);
        assert_relative_eq!(momentum.norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_two_dimensional_lattice_is_flat() {
        let sim_box = SimulationBox::new(5.0, 5.0, 1.0).unwrap();
        let pdata = ParticleData::lattice(9, sim_box, 2, 1.0, 1).unwrap();
        assert!(pdata.positions().read::<Host>().iter().all(|p| p.z == 0.0));
        assert!(pdata.velocities().read::<Host>().iter().all(|v| v.z == 0.0));
    }
}
