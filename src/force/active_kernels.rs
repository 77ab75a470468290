/*
Per-particle bodies of the three active force steps.

These are shared verbatim by the host loop and the device launch, so both
backends produce bit-identical directions for the same (seed, timestep, tag).
None of them touch anything but the slot they are handed.
 */

use nalgebra::{UnitQuaternion, Vector3};

use super::ForceEnergy;
use crate::constants::Scalar;
use crate::manifold::{EllipsoidManifold, Manifold};
use crate::rng::{gaussian, particle_rng, unit_vector};

pub(crate) struct DiffusionStep<'a> {
    pub seed: u64,
    pub timestep: u64,
    pub sigma: Scalar,
    pub is_2d: bool,
    pub constraint: Option<&'a EllipsoidManifold>,
}

// tangent to the constraint surface at the particle, kept in the xy plane in 2D
pub(crate) fn set_constraint_one(
    ellipsoid: &EllipsoidManifold,
    is_2d: bool,
    position: &Vector3<Scalar>,
    direction: &mut Vector3<Scalar>,
) {
    let mut tangent = ellipsoid.project_tangent(position, direction);
    if is_2d {
        tangent.z = 0.0;
        match tangent.try_normalize(Scalar::EPSILON) {
            Some(planar) => tangent = planar,
            // the in-plane part of the tangent vanished, keep the old direction
            None => return,
        }
    }
    *direction = tangent;
}

pub(crate) fn rotational_diffusion_one(
    step: &DiffusionStep<'_>,
    tag: usize,
    position: &Vector3<Scalar>,
    direction: &mut Vector3<Scalar>,
) {
    let mut rng = particle_rng(step.seed, step.timestep, tag as u64);

    if step.is_2d {
        let theta = direction.y.atan2(direction.x) + gaussian(&mut rng, step.sigma);
        *direction = Vector3::new(theta.cos(), theta.sin(), 0.0);
        return;
    }

    /*
    In 3D the direction is rotated by a small gaussian angle about an axis
    perpendicular to it. With a constraint the rotation axis is the surface
    normal, so the direction stays in the tangent plane; without one the axis
    is random.
     */
    let aux = match step.constraint {
        Some(ellipsoid) => match ellipsoid.unit_normal(position) {
            Some(normal) => direction.cross(&normal),
            None => return,
        },
        None => {
            let random = unit_vector(&mut rng);
            match direction.cross(&random).try_normalize(Scalar::EPSILON) {
                Some(aux) => aux,
                None => return,
            }
        }
    };
    let delta = gaussian(&mut rng, step.sigma);
    *direction = *direction * delta.cos() + aux * delta.sin();
}

pub(crate) fn set_force_one(
    direction: &Vector3<Scalar>,
    magnitude: Scalar,
    orientation: Option<&UnitQuaternion<Scalar>>,
) -> ForceEnergy {
    let body = direction * magnitude;
    let force = match orientation {
        Some(q) => q * body,
        None => body,
    };
    ForceEnergy { force, energy: 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step(is_2d: bool, constraint: Option<&EllipsoidManifold>) -> DiffusionStep<'_> {
        DiffusionStep {
            seed: 7,
            timestep: 100,
            sigma: 0.3,
            is_2d,
            constraint,
        }
    }

    #[test]
    fn test_2d_diffusion_stays_in_plane() {
        let mut v = Vector3::new(0.6, 0.8, 0.0);
        for tag in 0..20 {
            rotational_diffusion_one(&step(true, None), tag, &Vector3::zeros(), &mut v);
            assert_eq!(v.z, 0.0);
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_3d_free_diffusion_keeps_unit_length() {
        let mut v = Vector3::new(0.0, 0.0, 1.0);
        for tag in 0..20 {
            rotational_diffusion_one(&step(false, None), tag, &Vector3::zeros(), &mut v);
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constrained_diffusion_stays_tangent() {
        let sphere = EllipsoidManifold::new(Vector3::zeros(), 2.0, 2.0, 2.0).unwrap();
        let position = Vector3::new(2.0, 0.0, 0.0);
        let mut v = Vector3::new(0.0, 1.0, 0.0);
        for tag in 0..20 {
            rotational_diffusion_one(&step(false, Some(&sphere)), tag, &position, &mut v);
            assert_relative_eq!(v.x, 0.0, epsilon = 1e-12);
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_constraint_projects_out_normal() {
        let ellipsoid = EllipsoidManifold::new(Vector3::zeros(), 1.0, 2.0, 3.0).unwrap();
        let position = Vector3::new(0.0, 0.0, 3.0);
        let mut v = Vector3::new(1.0, 1.0, 1.0).normalize();
        set_constraint_one(&ellipsoid, false, &position, &mut v);
        assert_relative_eq!(v.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constraint_stays_planar_in_2d() {
        // centre above the plane, so the surface normal has a z component
        let ellipsoid = EllipsoidManifold::new(Vector3::new(0.0, 0.0, 1.0), 3.0, 3.0, 3.0).unwrap();
        for position in [Vector3::new(2.0, 1.0, 0.0), Vector3::new(-1.5, 2.5, 0.0)] {
            let mut v = Vector3::new(0.6, 0.8, 0.0);
            set_constraint_one(&ellipsoid, true, &position, &mut v);
            assert_eq!(v.z, 0.0);
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-12);
        }

    }

    #[test]
    fn test_force_follows_orientation() {
        let v = Vector3::new(1.0, 0.0, 0.0);
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2);
        let fe = set_force_one(&v, 2.0, Some(&q));
        assert_relative_eq!(fe.force, Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-12);
        assert_eq!(set_force_one(&v, 2.0, None).force, Vector3::new(2.0, 0.0, 0.0));
    }
}
