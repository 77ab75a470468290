/*
Van der Waals three-body (density functional) potential.

Each particle carries a local density built from a normalized weight function

    w(r) = 15 / (2 pi rc^3) * (1 - r/rc)^2

    rho_i = w(0) + sum_j w(r_ij)

and a per-particle excess free energy from the van der Waals equation of state

    f(rho) = T ln(b rho / (1 - b rho)) - a rho - 1/2 alpha a b rho^2

See I. Pagonabarraga and D. Frenkel, "Dissipative particle dynamics for
interacting systems", J. Chem. Phys. 115, 5015 (2001).
 */

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::triplet::{IjForce, IkForce, TripletEvaluator};
use crate::constants::Scalar;
use std::f64::consts::PI;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VanDerWaalsParams {
    pub a: Scalar,
    pub b: Scalar,
    pub alpha: Scalar,
    #[serde(rename = "T")]
    pub temperature: Scalar,
}

pub struct EvaluatorVanDerWaals {
    rij_sq: Scalar,
    rcutsq: Scalar,
    a: Scalar,
    b: Scalar,
    alpha: Scalar,
    temperature: Scalar,
}

impl EvaluatorVanDerWaals {
    fn norm(&self) -> Scalar {
        let rcut = self.rcutsq.sqrt();
        15.0 / (2.0 * PI) / (self.rcutsq * rcut)
    }
}

impl TripletEvaluator for EvaluatorVanDerWaals {
    type Param = VanDerWaalsParams;

    const NAME: &'static str = "van_der_waals";
    const HAS_PER_PARTICLE_ENERGY: bool = true;
    const NEEDS_CHI: bool = false;
    const HAS_IK_FORCE: bool = false;
    const NEEDS_ANGLE: bool = false;

    fn new(rij_sq: Scalar, rcutsq: Scalar, param: &VanDerWaalsParams) -> Self {
        EvaluatorVanDerWaals {
            rij_sq,
            rcutsq,
            a: param.a,
            b: param.b,
            alpha: param.alpha,
            temperature: param.temperature,
        }
    }

    fn set_rij(&mut self, rsq: Scalar) {
        self.rij_sq = rsq;
    }

    fn set_rik(&mut self, _rsq: Scalar) {}

    fn set_angle(&mut self, _cos_th: Scalar) {}

    fn are_interactive(&self) -> bool {
        true
    }

    // nothing to split, this is only the cutoff test
    fn eval_repulsive_and_attractive(&self) -> Option<(Scalar, Scalar)> {
        (self.rij_sq < self.rcutsq).then_some((0.0, 0.0))
    }

    fn eval_chi(&self, _chi: &mut Scalar) {}

    fn eval_phi(&self, phi: &mut Scalar) {
        if self.rij_sq < self.rcutsq {
            let rcut = self.rcutsq.sqrt();
            let fac = 1.0 - self.rij_sq.sqrt() / rcut;
            *phi += fac * fac * self.norm();
        }
    }

    fn eval_force_ij(&self, _fr: Scalar, _fa: Scalar, _chi: Scalar, phi: Scalar) -> IjForce {
        if self.rij_sq >= self.rcutsq {
            return IjForce::default();
        }
        let norm = self.norm();
        let rcut = self.rcutsq.sqrt();
        let rij = self.rij_sq.sqrt();
        let fac = 1.0 - rij / rcut;

        // add self-weight
        let rho_i = phi + norm;

        // f'(rho) * (-w'(r)) / r
        let df_drho = self.temperature / rho_i / (1.0 - self.b * rho_i)
            - self.a
            - self.alpha * self.a * self.b * rho_i;
        IjForce {
            bij: 0.0,
            force_divr: df_drho * 2.0 * norm * fac / rcut / rij,
            potential_eng: 0.0,
        }
    }

    fn eval_self_energy(&self, phi: Scalar) -> Scalar {
        let rho_i = phi + self.norm();
        self.temperature * (self.b * rho_i / (1.0 - self.b * rho_i)).ln()
            - self.a * rho_i
            - 0.5 * self.alpha * self.a * self.b * rho_i * rho_i
    }

    fn eval_force_ik(
        &self,
        _fr: Scalar,
        _fa: Scalar,
        _chi: Scalar,
        _bij: Scalar,
        _dx_ij: &Vector3<Scalar>,
        _dx_ik: &Vector3<Scalar>,
    ) -> Option<IkForce> {
        None
    }
}
