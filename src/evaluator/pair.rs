use serde::{Deserialize, Serialize};

use crate::constants::Scalar;

pub trait PairEvaluator {
    type Param: Copy + Send + Sync + std::fmt::Debug;

    /// Short lowercase name, used as the log key for this potential's energy.
    const NAME: &'static str;

    fn new(rsq: Scalar, rcutsq: Scalar, param: &Self::Param) -> Self;

    /*
    Force divided by r and the pair energy, or None at and beyond the cutoff.

    Dividing the force by r up front saves a square root in the caller, which
    scales the (unnormalized) displacement vector by force_divr directly. With
    `energy_shift` the energy is offset so that V(r_cut) = 0.
     */
    fn eval_force_and_energy(&self, energy_shift: bool) -> Option<(Scalar, Scalar)>;
}

// -- lennard jones potential and force

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LennardJonesParams {
    pub epsilon: Scalar,
    pub sigma: Scalar,
}

pub struct EvaluatorLennardJones {
    rsq: Scalar,
    rcutsq: Scalar,
    lj1: Scalar,
    lj2: Scalar,
}

impl EvaluatorLennardJones {
    // 4 eps [ (sigma/r)^12 - (sigma/r)^6 ] written in terms of r^-6
    fn energy(&self, rsq: Scalar) -> Scalar {
        let r6inv = 1.0 / (rsq * rsq * rsq);
        r6inv * (self.lj1 * r6inv - self.lj2)
    }
}

impl PairEvaluator for EvaluatorLennardJones {
    type Param = LennardJonesParams;
    const NAME: &'static str = "lj";

    fn new(rsq: Scalar, rcutsq: Scalar, param: &LennardJonesParams) -> Self {
        let sigma6 = param.sigma.powi(6);
        EvaluatorLennardJones {
            rsq,
            rcutsq,
            lj1: 4.0 * param.epsilon * sigma6 * sigma6,
            lj2: 4.0 * param.epsilon * sigma6,
        }
    }

    fn eval_force_and_energy(&self, energy_shift: bool) -> Option<(Scalar, Scalar)> {
        if self.rsq >= self.rcutsq || self.lj1 == 0.0 || self.rsq < 1e-18 {
            return None; // Prevent singularity
        }
        let r2inv = 1.0 / self.rsq;
        let r6inv = r2inv * r2inv * r2inv;
        let force_divr = r2inv * r6inv * (12.0 * self.lj1 * r6inv - 6.0 * self.lj2);

        let mut pair_eng = self.energy(self.rsq);
        if energy_shift {
            pair_eng -= self.energy(self.rcutsq);
        }
        Some((force_divr, pair_eng))
    }
}

// -- gaussian potential and force

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussParams {
    pub epsilon: Scalar,
    pub sigma: Scalar,
}

pub struct EvaluatorGauss {
    rsq: Scalar,
    rcutsq: Scalar,
    epsilon: Scalar,
    sigma: Scalar,
}

impl PairEvaluator for EvaluatorGauss {
    type Param = GaussParams;
    const NAME: &'static str = "gauss";

    fn new(rsq: Scalar, rcutsq: Scalar, param: &GaussParams) -> Self {
        EvaluatorGauss {
            rsq,
            rcutsq,
            epsilon: param.epsilon,
            sigma: param.sigma,
        }
    }

    fn eval_force_and_energy(&self, energy_shift: bool) -> Option<(Scalar, Scalar)> {
        if self.rsq >= self.rcutsq || self.sigma <= 0.0 {
            return None;
        }
        let sigma_sq = self.sigma * self.sigma;
        let exp_val = (-0.5 * self.rsq / sigma_sq).exp();
        let force_divr = self.epsilon / sigma_sq * exp_val;

        let mut pair_eng = self.epsilon * exp_val;
        if energy_shift {
            pair_eng -= self.epsilon * (-0.5 * self.rcutsq / sigma_sq).exp();
        }
        Some((force_divr, pair_eng))
    }
}

// -- screened coulomb (yukawa) potential and force

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct YukawaParams {
    pub epsilon: Scalar,
    pub kappa: Scalar,
}

pub struct EvaluatorYukawa {
    rsq: Scalar,
    rcutsq: Scalar,
    epsilon: Scalar,
    kappa: Scalar,
}

impl PairEvaluator for EvaluatorYukawa {
    type Param = YukawaParams;
    const NAME: &'static str = "yukawa";

    fn new(rsq: Scalar, rcutsq: Scalar, param: &YukawaParams) -> Self {
        EvaluatorYukawa {
            rsq,
            rcutsq,
            epsilon: param.epsilon,
            kappa: param.kappa,
        }
    }

    fn eval_force_and_energy(&self, energy_shift: bool) -> Option<(Scalar, Scalar)> {
        if self.rsq >= self.rcutsq || self.rsq < 1e-18 {
            return None;
        }
        let r = self.rsq.sqrt();
        let screening = (-self.kappa * r).exp();
        // F = eps exp(-kr) (1 + kr) / r^2, divided once more by r
        let force_divr = self.epsilon * screening * (1.0 + self.kappa * r) / (self.rsq * r);

        let mut pair_eng = self.epsilon * screening / r;
        if energy_shift {
            let rcut = self.rcutsq.sqrt();
            pair_eng -= self.epsilon * (-self.kappa * rcut).exp() / rcut;
        }
        Some((force_divr, pair_eng))
    }
}
