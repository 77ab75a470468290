/*
Generic pair potential compute.

For every neighbor pair within the type-pair cutoff the evaluator gives the
force divided by r and the pair energy, optionally modified by the shift mode:

    none    V(r)
    shift   V(r) - V(r_cut)
    xplor   S(r) V(r)              when r_on < r_cut
            V(r) - V(r_cut)        when r_on >= r_cut

with the XPLOR smoothing function, written in r^2,

    S(r) = (rc^2 - r^2)^2 (rc^2 + 2 r^2 - 3 ron^2) / (rc^2 - ron^2)^3      ron <= r < rc

The neighbor list is full, so particle i sums over all its neighbors without
writing anything but its own slot, and keeps half of every pair energy.
 */

use std::marker::PhantomData;

use log::{debug, trace};
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{ensure_force_buffer, force_buffer, ComputeCache, ForceBuffer, ForceCompute, ForceEnergy};
use crate::constants::{Scalar, DEFAULT_R_BUFF};
use crate::error::{MdError, MdResult};
use crate::evaluator::PairEvaluator;
use crate::neighbor::NeighborList;
use crate::particle_data::{Host, ParticleData};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftMode {
    #[default]
    None,
    Shift,
    Xplor,
}

#[derive(Clone, Copy, Debug)]
struct PairCoefficients<P> {
    param: P,
    rcutsq: Scalar,
    ronsq: Scalar,
}

pub struct PotentialPair<E: PairEvaluator> {
    name: String,
    type_names: Vec<String>,
    table: Vec<Option<PairCoefficients<E::Param>>>,
    shift_mode: ShiftMode,
    r_buff: Scalar,
    nlist: Option<NeighborList>,
    forces: ForceBuffer,
    cache: ComputeCache,
    _evaluator: PhantomData<fn() -> E>,
}

/// Force divided by r and energy of one pair, with the shift mode applied.
fn pair_force_energy<E: PairEvaluator>(
    rsq: Scalar,
    coeff: &PairCoefficients<E::Param>,
    shift_mode: ShiftMode,
) -> Option<(Scalar, Scalar)> {
    let smooth = shift_mode == ShiftMode::Xplor && coeff.ronsq < coeff.rcutsq;
    let energy_shift = match shift_mode {
        ShiftMode::None => false,
        ShiftMode::Shift => true,
        ShiftMode::Xplor => !smooth,
    };
    let (mut force_divr, mut pair_eng) =
        E::new(rsq, coeff.rcutsq, &coeff.param).eval_force_and_energy(energy_shift)?;

    if smooth && rsq >= coeff.ronsq {
        let (rcutsq, ronsq) = (coeff.rcutsq, coeff.ronsq);
        let denom = (rcutsq - ronsq).powi(3);
        let s = (rcutsq - rsq) * (rcutsq - rsq) * (rcutsq + 2.0 * rsq - 3.0 * ronsq) / denom;
        let ds_dr_divr = 12.0 * (rcutsq - rsq) * (ronsq - rsq) / denom;

        // product rule on S(r) V(r)
        force_divr = s * force_divr - ds_dr_divr * pair_eng;
        pair_eng *= s;
    }
    Some((force_divr, pair_eng))
}

impl<E: PairEvaluator> PotentialPair<E> {
    pub fn new(pdata: &ParticleData, shift_mode: ShiftMode) -> Self {
        let n_types = pdata.n_types();
        debug!("PotentialPair<{}>: {n_types} types, mode {shift_mode:?}", E::NAME);
        PotentialPair {
            name: format!("pair_{}", E::NAME),
            type_names: pdata.type_names().to_vec(),
            table: vec![None; n_types * n_types],
            shift_mode,
            r_buff: DEFAULT_R_BUFF,
            nlist: None,
            forces: force_buffer(pdata.n()),
            cache: ComputeCache::default(),
            _evaluator: PhantomData,
        }
    }

    pub fn with_r_buff(mut self, r_buff: Scalar) -> Self {
        self.r_buff = r_buff;
        self.nlist = None;
        self
    }

    fn type_index(&self, name: &str) -> MdResult<usize> {
        self.type_names
            .iter()
            .position(|t| t == name)
            .ok_or_else(|| MdError::InvalidParameter(format!("unknown particle type {name:?}")))
    }

    fn pair_slots(&self, a: &str, b: &str) -> MdResult<(usize, usize)> {
        let n_types = self.type_names.len();
        let (ta, tb) = (self.type_index(a)?, self.type_index(b)?);
        Ok((ta * n_types + tb, tb * n_types + ta))
    }

    pub fn set_params(&mut self, a: &str, b: &str, param: E::Param, r_cut: Scalar) -> MdResult<()> {
        if !(r_cut > 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "r_cut for ({a}, {b}) must be positive, got {r_cut}"
            )));
        }
        let (ab, ba) = self.pair_slots(a, b)?;
        let ronsq = self.table[ab].map_or(0.0, |c| c.ronsq);
        let coeff = PairCoefficients {
            param,
            rcutsq: r_cut * r_cut,
            ronsq,
        };
        self.table[ab] = Some(coeff);
        self.table[ba] = Some(coeff);
        self.cache.invalidate();
        Ok(())
    }

    /// Turn-on radius of the XPLOR smoothing; must follow `set_params` for the pair.
    pub fn set_r_on(&mut self, a: &str, b: &str, r_on: Scalar) -> MdResult<()> {
        if !(r_on >= 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "r_on for ({a}, {b}) must be non-negative, got {r_on}"
            )));
        }
        let (ab, ba) = self.pair_slots(a, b)?;
        for slot in [ab, ba] {
            match self.table[slot].as_mut() {
                Some(coeff) => coeff.ronsq = r_on * r_on,
                None => {
                    return Err(MdError::InvalidParameter(format!(
                        "set parameters for ({a}, {b}) before r_on"
                    )))
                }
            }
        }
        self.cache.invalidate();
        Ok(())
    }

    pub fn set_shift_mode(&mut self, shift_mode: ShiftMode) {
        self.shift_mode = shift_mode;
        self.cache.invalidate();
    }

    pub fn shift_mode(&self) -> ShiftMode {
        self.shift_mode
    }

    pub fn max_r_cut(&self) -> Scalar {
        self.table
            .iter()
            .flatten()
            .map(|c| c.rcutsq.sqrt())
            .fold(0.0, Scalar::max)
    }

    fn check_table(&self, pdata: &ParticleData) -> MdResult<()> {
        if pdata.type_names() != &self.type_names[..] {
            return Err(MdError::InvalidParameter(format!(
                "{}: particle types changed since construction",
                self.name
            )));
        }
        let n_types = self.type_names.len();
        if let Some(missing) = self.table.iter().position(|c| c.is_none()) {
            return Err(MdError::InvalidParameter(format!(
                "{}: no parameters for type pair ({}, {})",
                self.name,
                self.type_names[missing / n_types],
                self.type_names[missing % n_types]
            )));
        }
        Ok(())
    }

    // build, rebuild or keep the neighbor list
    fn update_nlist(&mut self, pdata: &ParticleData) -> MdResult<&NeighborList> {
        let r_cut = self.max_r_cut();
        let stale = match &self.nlist {
            Some(nlist) => nlist.r_cut() != r_cut || nlist.needs_rebuild(pdata),
            None => true,
        };
        if stale {
            self.nlist = Some(NeighborList::build(pdata, r_cut, self.r_buff)?);
        }
        self.nlist
            .as_ref()
            .ok_or_else(|| MdError::InvalidParameter(format!("{}: neighbor list missing", self.name)))
    }

    pub fn neighbor_list(&self) -> Option<&NeighborList> {
        self.nlist.as_ref()
    }

    /*
    Total pair energy between two groups of tags. The groups are assumed
    disjoint and free of duplicates, so every pair is counted exactly once.
     */
    pub fn compute_energy_between_sets(
        &mut self,
        pdata: &ParticleData,
        tags1: &[usize],
        tags2: &[usize],
    ) -> MdResult<Scalar> {
        self.check_table(pdata)?;
        let n = pdata.n();
        if let Some(bad) = tags1.iter().chain(tags2.iter()).find(|t| **t >= n) {
            return Err(MdError::InvalidParameter(format!("tag {bad} out of range for {n} particles")));
        }
        let n_types = self.type_names.len();
        let shift_mode = self.shift_mode;
        let table = self.table.clone();
        let nlist = self.update_nlist(pdata)?;

        let mut in_second = vec![false; n];
        for &tag in tags2 {
            in_second[tag] = true;
        }

        let positions = pdata.positions().read::<Host>();
        let types = pdata.types().read::<Host>();
        let tags = pdata.tags().read::<Host>();
        let rtags = pdata.rtags().read::<Host>();
        let sim_box = pdata.sim_box();

        let energy = tags1
            .par_iter()
            .map(|&tag| {
                let i = rtags[tag];
                nlist
                    .neighbors_of(i)
                    .iter()
                    .filter(|&&j| in_second[tags[j]])
                    .filter_map(|&j| {
                        let Some(coeff) = &table[types[i] * n_types + types[j]] else {
                            return None;
                        };
                        let rsq = sim_box.min_image(positions[i] - positions[j]).norm_squared();
                        pair_force_energy::<E>(rsq, coeff, shift_mode).map(|(_, e)| e)
                    })
                    .sum::<Scalar>()
            })
            .sum();
        Ok(energy)
    }
}

impl<E: PairEvaluator> ForceCompute for PotentialPair<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&mut self, pdata: &ParticleData, timestep: u64) -> MdResult<()> {
        if !self.cache.should_compute(timestep) {
            return Ok(());
        }
        self.check_table(pdata)?;
        ensure_force_buffer(&mut self.forces, pdata.n());
        trace!("{} step {timestep}", self.name);

        let n_types = self.type_names.len();
        let shift_mode = self.shift_mode;
        let table = self.table.clone();
        self.update_nlist(pdata)?;
        let Some(nlist) = self.nlist.as_ref() else {
            return Err(MdError::InvalidParameter(format!("{}: neighbor list missing", self.name)));
        };

        let positions = pdata.positions().read::<Host>();
        let types = pdata.types().read::<Host>();
        let sim_box = pdata.sim_box();
        let mut forces = self.forces.overwrite::<Host>();

        forces.par_iter_mut().enumerate().for_each(|(i, slot)| {
            let mut force = Vector3::zeros();
            let mut energy = 0.0;
            for &j in nlist.neighbors_of(i) {
                let Some(coeff) = &table[types[i] * n_types + types[j]] else {
                    continue;
                };
                // dx points from j to i, so a positive force_divr pushes i away
                let dx = sim_box.min_image(positions[i] - positions[j]);
                let Some((force_divr, pair_eng)) = pair_force_energy::<E>(dx.norm_squared(), coeff, shift_mode)
                else {
                    continue;
                };
                force += dx * force_divr;
                energy += 0.5 * pair_eng;
            }
            *slot = ForceEnergy { force, energy };
        });
        Ok(())
    }

    fn forces(&self) -> &ForceBuffer {
        &self.forces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvaluatorLennardJones, LennardJonesParams};
    use crate::pbc::SimulationBox;
    use approx::assert_relative_eq;

    const LJ: LennardJonesParams = LennardJonesParams {
        epsilon: 1.0,
        sigma: 1.0,
    };

    fn dimer(r: Scalar) -> ParticleData {
        ParticleData::new(
            vec![Vector3::new(-0.5 * r, 0.0, 0.0), Vector3::new(0.5 * r, 0.0, 0.0)],
            SimulationBox::cube(12.0).unwrap(),
            3,
        )
        .unwrap()
    }

    fn lj_pair(pdata: &ParticleData, mode: ShiftMode, r_on: Scalar) -> PotentialPair<EvaluatorLennardJones> {
        let mut pair = PotentialPair::<EvaluatorLennardJones>::new(pdata, mode);
        pair.set_params("A", "A", LJ, 3.0).unwrap();
        pair.set_r_on("A", "A", r_on).unwrap();
        pair
    }

    fn dimer_energy(r: Scalar, mode: ShiftMode, r_on: Scalar) -> Scalar {
        let pdata = dimer(r);
        let mut pair = lj_pair(&pdata, mode, r_on);
        pair.compute(&pdata, 0).unwrap();
        pair.total_energy()
    }

    #[test]
    fn test_dimer_matches_evaluator() {
        let r = 1.3;
        let pdata = dimer(r);
        let mut pair = lj_pair(&pdata, ShiftMode::None, 0.0);
        pair.compute(&pdata, 0).unwrap();

        let (force_divr, pair_eng) = EvaluatorLennardJones::new(r * r, 9.0, &LJ)
            .eval_force_and_energy(false)
            .unwrap();
        let forces = pair.forces().read::<Host>();
        assert_relative_eq!(forces[1].force.x, force_divr * r, epsilon = 1e-12);
        assert_relative_eq!(forces[0].force.x, -force_divr * r, epsilon = 1e-12);
        assert_relative_eq!(forces[0].energy, 0.5 * pair_eng, epsilon = 1e-12);
        assert_relative_eq!(forces[0].energy + forces[1].energy, pair_eng, epsilon = 1e-12);
    }

    #[test]
    fn test_shift_zeroes_energy_at_cutoff() {
        assert_relative_eq!(dimer_energy(3.0 - 1e-9, ShiftMode::Shift, 0.0), 0.0, epsilon = 1e-8);
        assert!(dimer_energy(3.0 - 1e-9, ShiftMode::None, 0.0) < -1e-3);
    }

    #[test]
    fn test_xplor_vanishes_smoothly_at_cutoff() {
        let r = 3.0 - 1e-9;
        let pdata = dimer(r);
        let mut pair = lj_pair(&pdata, ShiftMode::Xplor, 2.0);
        pair.compute(&pdata, 0).unwrap();
        let forces = pair.forces().read::<Host>();
        assert_relative_eq!(forces[0].force.norm(), 0.0, epsilon = 1e-8);
        assert_relative_eq!(forces[0].energy, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_xplor_leaves_inner_region_alone() {
        assert_relative_eq!(
            dimer_energy(1.5, ShiftMode::Xplor, 2.0),
            dimer_energy(1.5, ShiftMode::None, 0.0),
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_xplor_beyond_cutoff_acts_as_shift() {
        assert_relative_eq!(
            dimer_energy(2.2, ShiftMode::Xplor, 3.5),
            dimer_energy(2.2, ShiftMode::Shift, 0.0),
            epsilon = 1e-14
        );
    }

    #[test]
    fn test_xplor_force_is_energy_gradient() {
        let h = 1e-6;
        for r in [2.1, 2.5, 2.9] {
            let pdata = dimer(r);
            let mut pair = lj_pair(&pdata, ShiftMode::Xplor, 2.0);
            pair.compute(&pdata, 0).unwrap();
            let fx = pair.forces().read::<Host>()[1].force.x;
            let numeric =
                -(dimer_energy(r + h, ShiftMode::Xplor, 2.0) - dimer_energy(r - h, ShiftMode::Xplor, 2.0)) / (2.0 * h);
            assert_relative_eq!(fx, numeric, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_missing_pair_parameters() {
        let mut pdata = dimer(1.2);
        pdata.set_types(vec!["A".to_string(), "B".to_string()], &[0, 1]).unwrap();
        let mut pair = PotentialPair::<EvaluatorLennardJones>::new(&pdata, ShiftMode::None);
        pair.set_params("A", "A", LJ, 2.5).unwrap();
        pair.set_params("B", "B", LJ, 2.5).unwrap();
        assert!(matches!(pair.compute(&pdata, 0), Err(MdError::InvalidParameter(_))));
        assert!(pair.set_params("A", "C", LJ, 2.5).is_err());

        pair.set_params("A", "B", LJ, 2.5).unwrap();
        assert!(pair.compute(&pdata, 0).is_ok());
    }

    #[test]
    fn test_forces_sum_to_zero() {
        let sim_box = SimulationBox::cube(8.0).unwrap();
        let mut pdata = ParticleData::lattice(64, sim_box, 3, 1.0, 2).unwrap();
        pdata.shuffle(4).unwrap();
        let mut pair = PotentialPair::<EvaluatorLennardJones>::new(&pdata, ShiftMode::Shift);
        pair.set_params("A", "A", LJ, 2.5).unwrap();
        pair.compute(&pdata, 0).unwrap();
        let total = pair
            .forces()
            .read::<Host>()
            .iter()
            .fold(Vector3::zeros(), |acc, fe| acc + fe.force);
        assert_relative_eq!(total.norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_energy_between_sets() {
        let pdata = ParticleData::new(
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(1.2, 0.0, 0.0),
                Vector3::new(0.0, 1.5, 0.0),
            ],
            SimulationBox::cube(12.0).unwrap(),
            3,
        )
        .unwrap();
        let mut pair = lj_pair(&pdata, ShiftMode::None, 0.0);

        let v = |r: Scalar| EvaluatorLennardJones::new(r * r, 9.0, &LJ).eval_force_and_energy(false).unwrap().1;
        let r12 = (1.2f64 * 1.2 + 1.5 * 1.5).sqrt();

        let u = pair.compute_energy_between_sets(&pdata, &[0], &[1, 2]).unwrap();
        assert_relative_eq!(u, v(1.2) + v(1.5), epsilon = 1e-12);
        let u = pair.compute_energy_between_sets(&pdata, &[1], &[2]).unwrap();
        assert_relative_eq!(u, v(r12), epsilon = 1e-12);
    }
}
