/*
Evaluators: the per pair / per triplet physics of an interaction.

An evaluator is built for one ij pair from precomputed geometric scalars
(squared distances, angle cosines) and the parameter block of the type pair,
and it answers force and energy questions about that pair only. The
orchestrating force computes own the loops, the neighbor lists and the
accumulation; evaluators never see particle arrays.

Two families:

* `PairEvaluator`    - radial pair potentials (Lennard-Jones, Gaussian, Yukawa)
* `TripletEvaluator` - three-body / density dependent potentials, with
                       capability constants the orchestrator checks at compile
                       time to skip angle, chi and ik-force work entirely
 */

mod pair;
mod triplet;
mod van_der_waals;

pub use pair::{
    EvaluatorGauss, EvaluatorLennardJones, EvaluatorYukawa, GaussParams, LennardJonesParams,
    PairEvaluator, YukawaParams,
};
pub use triplet::{IjForce, IkForce, TripletEvaluator};
pub use van_der_waals::{EvaluatorVanDerWaals, VanDerWaalsParams};
