use nalgebra::Vector3;

use crate::constants::Scalar;

/// Second pass result for one ij pair.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IjForce {
    pub bij: Scalar,
    /// Radial force coefficient; the force on i is `dx_ij * force_divr`.
    pub force_divr: Scalar,
    pub potential_eng: Scalar,
}

/// Forces on the three members of an ijk triplet.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IkForce {
    pub force_i: Vector3<Scalar>,
    pub force_j: Vector3<Scalar>,
    pub force_k: Vector3<Scalar>,
}

/*
Three-body evaluator contract.

The capability constants are checked by the orchestrator before any per-triplet
work, and since they are associated constants the disabled branches vanish at
monomorphization:

    HAS_PER_PARTICLE_ENERGY -> run the density pass (eval_phi / eval_self_energy)
    NEEDS_CHI               -> loop over k for every ij to accumulate chi
    NEEDS_ANGLE             -> compute cos(theta_jik) and call set_angle
    HAS_IK_FORCE            -> loop over k again in the force pass for eval_force_ik

`eval_phi` is called once per ij (never per ijk) and must be additive: the
orchestrator zeroes phi once per particle and sums every neighbor before any
`eval_force_ij` sees it.
 */
pub trait TripletEvaluator: Sized {
    type Param: Copy + Send + Sync + std::fmt::Debug;

    const NAME: &'static str;
    const HAS_PER_PARTICLE_ENERGY: bool;
    const NEEDS_CHI: bool;
    const HAS_IK_FORCE: bool;
    const NEEDS_ANGLE: bool;

    fn new(rij_sq: Scalar, rcutsq: Scalar, param: &Self::Param) -> Self;

    fn set_rij(&mut self, rsq: Scalar);

    fn set_rik(&mut self, rsq: Scalar);

    fn set_angle(&mut self, cos_th: Scalar);

    fn are_interactive(&self) -> bool;

    /// Repulsive and attractive terms, or None outside the cutoff.
    fn eval_repulsive_and_attractive(&self) -> Option<(Scalar, Scalar)>;

    fn eval_chi(&self, chi: &mut Scalar);

    fn eval_phi(&self, phi: &mut Scalar);

    fn eval_force_ij(&self, fr: Scalar, fa: Scalar, chi: Scalar, phi: Scalar) -> IjForce;

    fn eval_self_energy(&self, phi: Scalar) -> Scalar;

    fn eval_force_ik(
        &self,
        fr: Scalar,
        fa: Scalar,
        chi: Scalar,
        bij: Scalar,
        dx_ij: &Vector3<Scalar>,
        dx_ik: &Vector3<Scalar>,
    ) -> Option<IkForce>;
}
