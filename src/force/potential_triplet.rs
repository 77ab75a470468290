/*
Generic three-body potential compute.

Evaluators of this family need a per-particle quantity (a local density phi,
and for some a per-pair cross term chi) summed over every neighbor before any
force can be evaluated, so each step is two passes over the full neighbor list
with a barrier in between:

    pass 1   phi[i] = sum_j eval_phi(ij)                HAS_PER_PARTICLE_ENERGY
             chi[ij] = sum_k eval_chi(ijk)              NEEDS_CHI
    ------   DensityPass::finish() -> FinalDensity
    pass 2   F_i = sum_j dx_ij (fd(ij; phi_i) + fd(ji; phi_j))
             E_i = eval_self_energy(phi_i) + sum_j potential_eng(ij)
             ik forces                                  HAS_IK_FORCE

`eval_force_ij` gives the force coefficient of the first particle's own terms,
so the force on i adds both sides of every pair. Each particle only writes its
own slot in the ij part; ik forces touch three particles and are reduced
through per-thread buffers.
 */

use std::marker::PhantomData;

use log::{debug, trace};
use nalgebra::Vector3;
use rayon::prelude::*;

use super::{ensure_force_buffer, force_buffer, ComputeCache, ForceBuffer, ForceCompute, ForceEnergy};
use crate::constants::{Scalar, DEFAULT_R_BUFF};
use crate::error::{MdError, MdResult};
use crate::evaluator::TripletEvaluator;
use crate::neighbor::NeighborList;
use crate::particle_data::{Host, ParticleData};
use crate::pbc::SimulationBox;

/// Pass 1 output that has not been sealed yet.
pub struct DensityPass {
    phi: Vec<Scalar>,
    chi: Vec<Scalar>,
}

impl DensityPass {
    /// Barrier between the passes: after this no density changes.
    pub fn finish(self) -> FinalDensity {
        FinalDensity {
            phi: self.phi,
            chi: self.chi,
        }
    }
}

/**
Fully accumulated per-particle densities; the only input pass 2 accepts.

A `DensityPass` cannot stand in for it:

```compile_fail
use hoomd_md::evaluator::{EvaluatorVanDerWaals, VanDerWaalsParams};
use hoomd_md::force::{ForceEnergy, PotentialTriplet};
use hoomd_md::neighbor::NeighborList;
use hoomd_md::particle_data::ParticleData;
use hoomd_md::pbc::SimulationBox;

let pdata = ParticleData::lattice(8, SimulationBox::cube(8.0).unwrap(), 3, 0.0, 1).unwrap();
let nlist = NeighborList::build(&pdata, 1.5, 0.0).unwrap();
let mut vdw = PotentialTriplet::<EvaluatorVanDerWaals>::new(&pdata);
let params = VanDerWaalsParams { a: 1.0, b: 0.1, alpha: 0.5, temperature: 1.0 };
vdw.set_params("A", "A", params, 1.5).unwrap();

let mut forces = vec![ForceEnergy::default(); pdata.n()];
let pass = vdw.density_pass(&pdata, &nlist);
vdw.force_pass(&pdata, &nlist, &pass, &mut forces);
```
 */
pub struct FinalDensity {
    phi: Vec<Scalar>,
    chi: Vec<Scalar>,
}

impl FinalDensity {
    pub fn phi(&self) -> &[Scalar] {
        &self.phi
    }

    /// Per neighbor list entry, empty unless the evaluator needs chi.
    pub fn chi(&self) -> &[Scalar] {
        &self.chi
    }
}

#[derive(Clone, Copy, Debug)]
struct TripletCoefficients<P> {
    param: P,
    rcutsq: Scalar,
}

// read-only view of everything a pass needs
struct Geometry<'a> {
    positions: &'a [Vector3<Scalar>],
    types: &'a [usize],
    sim_box: &'a SimulationBox,
    nlist: &'a NeighborList,
}

pub struct PotentialTriplet<E: TripletEvaluator> {
    name: String,
    type_names: Vec<String>,
    table: Vec<Option<TripletCoefficients<E::Param>>>,
    r_buff: Scalar,
    nlist: Option<NeighborList>,
    forces: ForceBuffer,
    cache: ComputeCache,
    _evaluator: PhantomData<fn() -> E>,
}

impl<E: TripletEvaluator> PotentialTriplet<E> {
    pub fn new(pdata: &ParticleData) -> Self {
        let n_types = pdata.n_types();
        debug!(
            "PotentialTriplet<{}>: {n_types} types, chi {} angle {} ik {}",
            E::NAME,
            E::NEEDS_CHI,
            E::NEEDS_ANGLE,
            E::HAS_IK_FORCE
        );
        PotentialTriplet {
            name: format!("triplet_{}", E::NAME),
            type_names: pdata.type_names().to_vec(),
            table: vec![None; n_types * n_types],
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

    pub fn set_params(&mut self, a: &str, b: &str, param: E::Param, r_cut: Scalar) -> MdResult<()> {
        if !(r_cut > 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "r_cut for ({a}, {b}) must be positive, got {r_cut}"
            )));
        }
        let n_types = self.type_names.len();
        let index = |name: &str| {
            self.type_names
                .iter()
                .position(|t| t == name)
                .ok_or_else(|| MdError::InvalidParameter(format!("unknown particle type {name:?}")))
        };
        let (ta, tb) = (index(a)?, index(b)?);
        let coeff = TripletCoefficients {
            param,
            rcutsq: r_cut * r_cut,
        };
        self.table[ta * n_types + tb] = Some(coeff);
        self.table[tb * n_types + ta] = Some(coeff);
        self.cache.invalidate();
        Ok(())
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

    fn coeff(&self, ti: usize, tj: usize) -> Option<&TripletCoefficients<E::Param>> {
        self.table[ti * self.type_names.len() + tj].as_ref()
    }

    // evaluator for the ij pair, None when the pair is outside the cutoff or not interactive
    fn pair_evaluator(&self, geo: &Geometry<'_>, i: usize, j: usize) -> Option<(E, Vector3<Scalar>)> {
        let coeff = self.coeff(geo.types[i], geo.types[j])?;
        let dx = geo.sim_box.min_image(geo.positions[i] - geo.positions[j]);
        let rij_sq = dx.norm_squared();
        if rij_sq >= coeff.rcutsq {
            return None;
        }
        let eval = E::new(rij_sq, coeff.rcutsq, &coeff.param);
        eval.are_interactive().then_some((eval, dx))
    }

    // visit every k that closes a triplet with the ij pair, in neighbor list order
    fn for_each_k<F>(&self, geo: &Geometry<'_>, i: usize, j: usize, dx_ij: &Vector3<Scalar>, eval: &mut E, mut visit: F)
    where
        F: FnMut(&mut E, usize, &Vector3<Scalar>),
    {
        let rij_sq = dx_ij.norm_squared();
        for &k in geo.nlist.neighbors_of(i) {
            if k == j {
                continue;
            }
            let Some(coeff_ik) = self.coeff(geo.types[i], geo.types[k]) else {
                continue;
            };
            let dx_ik = geo.sim_box.min_image(geo.positions[i] - geo.positions[k]);
            let rik_sq = dx_ik.norm_squared();
            if rik_sq >= coeff_ik.rcutsq {
                continue;
            }
            eval.set_rik(rik_sq);
            if E::NEEDS_ANGLE {
                eval.set_angle(dx_ij.dot(&dx_ik) / (rij_sq * rik_sq).sqrt());
            }
            visit(eval, k, &dx_ik);
        }
    }

    fn chi_ij(&self, geo: &Geometry<'_>, i: usize, j: usize) -> Scalar {
        let Some((mut eval, dx_ij)) = self.pair_evaluator(geo, i, j) else {
            return 0.0;
        };
        let mut chi = 0.0;
        self.for_each_k(geo, i, j, &dx_ij, &mut eval, |eval, _, _| eval.eval_chi(&mut chi));
        chi
    }

    /// Pass 1: accumulate phi (and chi) for every particle.
    pub fn density_pass(&self, pdata: &ParticleData, nlist: &NeighborList) -> DensityPass {
        let positions = pdata.positions().read::<Host>();
        let types = pdata.types().read::<Host>();
        let geo = Geometry {
            positions: &positions,
            types: &types,
            sim_box: pdata.sim_box(),
            nlist,
        };
        let n = pdata.n();

        let phi = if E::HAS_PER_PARTICLE_ENERGY {
            (0..n)
                .into_par_iter()
                .map(|i| {
                    let mut phi = 0.0;
                    for &j in nlist.neighbors_of(i) {
                        if let Some((eval, _)) = self.pair_evaluator(&geo, i, j) {
                            eval.eval_phi(&mut phi);
                        }
                    }
                    phi
                })
                .collect()
        } else {
            vec![0.0; n]
        };

        let chi = if E::NEEDS_CHI {
            let per_particle: Vec<Vec<Scalar>> = (0..n)
                .into_par_iter()
                .map(|i| nlist.neighbors_of(i).iter().map(|&j| self.chi_ij(&geo, i, j)).collect())
                .collect();
            per_particle.concat()
        } else {
            Vec::new()
        };

        DensityPass { phi, chi }
    }

    // force coefficient and energy share of the ij pair from i's side
    fn side(&self, geo: &Geometry<'_>, density: &FinalDensity, i: usize, j: usize) -> Option<(E, Scalar, Scalar, Vector3<Scalar>, crate::evaluator::IjForce)> {
        let (eval, dx) = self.pair_evaluator(geo, i, j)?;
        let (fr, fa) = eval.eval_repulsive_and_attractive()?;
        let chi = if E::NEEDS_CHI {
            let offset = geo.nlist.neighbors_of(i).binary_search(&j).ok()?;
            density.chi[geo.nlist.head()[i] + offset]
        } else {
            0.0
        };
        let ij = eval.eval_force_ij(fr, fa, chi, density.phi[i]);
        Some((eval, fr, fa, dx, ij))
    }

    /// Pass 2: forces and energies from the sealed densities, one slot per particle.
    pub fn force_pass(
        &self,
        pdata: &ParticleData,
        nlist: &NeighborList,
        density: &FinalDensity,
        out: &mut [ForceEnergy],
    ) {
        let positions = pdata.positions().read::<Host>();
        let types = pdata.types().read::<Host>();
        let geo = Geometry {
            positions: &positions,
            types: &types,
            sim_box: pdata.sim_box(),
            nlist,
        };
        let n = pdata.n();

        out.par_iter_mut().enumerate().for_each(|(i, slot)| {
            let mut force = Vector3::zeros();
            let mut energy = 0.0;
            for &j in nlist.neighbors_of(i) {
                let Some((_, _, _, dx, ij)) = self.side(&geo, density, i, j) else {
                    continue;
                };
                let ji_divr = self.side(&geo, density, j, i).map_or(0.0, |(.., ji)| ji.force_divr);
                force += dx * (ij.force_divr + ji_divr);
                energy += ij.potential_eng;
            }
            if E::HAS_PER_PARTICLE_ENERGY {
                if let Some(coeff) = self.coeff(types[i], types[i]) {
                    energy += E::new(0.0, coeff.rcutsq, &coeff.param).eval_self_energy(density.phi[i]);
                }
            }
            *slot = ForceEnergy { force, energy };
        });

        if E::HAS_IK_FORCE {
            let ik_forces = (0..n)
                .into_par_iter()
                .fold(
                    || vec![Vector3::zeros(); n],
                    |mut acc, i| {
                        for &j in nlist.neighbors_of(i) {
                            let Some((mut eval, fr, fa, dx_ij, ij)) = self.side(&geo, density, i, j) else {
                                continue;
                            };
                            let chi = if E::NEEDS_CHI {
                                self.chi_ij(&geo, i, j)
                            } else {
                                0.0
                            };
                            self.for_each_k(&geo, i, j, &dx_ij, &mut eval, |eval, k, dx_ik| {
                                if let Some(ik) = eval.eval_force_ik(fr, fa, chi, ij.bij, &dx_ij, dx_ik) {
                                    acc[i] += ik.force_i;
                                    acc[j] += ik.force_j;
                                    acc[k] += ik.force_k;
                                }
                            });
                        }
                        acc
                    },
                )
                .reduce(
                    || vec![Vector3::zeros(); n],
                    |mut a, b| {
                        for (x, y) in a.iter_mut().zip(b) {
                            *x += y;
                        }
                        a
                    },
                );
            for (slot, f) in out.iter_mut().zip(ik_forces) {
                slot.force += f;
            }
        }
    }

    fn update_nlist(&mut self, pdata: &ParticleData) -> MdResult<()> {
        let r_cut = self.max_r_cut();
        let stale = match &self.nlist {
            Some(nlist) => nlist.r_cut() != r_cut || nlist.needs_rebuild(pdata),
            None => true,
        };
        if stale {
            self.nlist = Some(NeighborList::build(pdata, r_cut, self.r_buff)?);
        }
        Ok(())
    }

    /// Per-particle phi of the last step, recomputed on demand.
    pub fn densities(&mut self, pdata: &ParticleData) -> MdResult<Vec<Scalar>> {
        self.check_table(pdata)?;
        self.update_nlist(pdata)?;
        let nlist = self
            .nlist
            .as_ref()
            .ok_or_else(|| MdError::InvalidParameter(format!("{}: neighbor list missing", self.name)))?;
        Ok(self.density_pass(pdata, nlist).finish().phi)
    }
}

impl<E: TripletEvaluator> ForceCompute for PotentialTriplet<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&mut self, pdata: &ParticleData, timestep: u64) -> MdResult<()> {
        if !self.cache.should_compute(timestep) {
            return Ok(());
        }
        self.check_table(pdata)?;
        ensure_force_buffer(&mut self.forces, pdata.n());
        self.update_nlist(pdata)?;
        trace!("{} step {timestep}", self.name);

        let mut forces = std::mem::replace(&mut self.forces, force_buffer(0));
        let result = match self.nlist.as_ref() {
            Some(nlist) => {
                let density = self.density_pass(pdata, nlist).finish();
                self.force_pass(pdata, nlist, &density, &mut forces.overwrite::<Host>());
                Ok(())
            }
            None => Err(MdError::InvalidParameter(format!("{}: neighbor list missing", self.name))),
        };
        self.forces = forces;
        result
    }

    fn forces(&self) -> &ForceBuffer {
        &self.forces
    }
}
