/*
Manifolds: implicit constraint surfaces f(point) = 0.

Every manifold exposes the implicit function and its gradient, both evaluated in
the native frame of the point. `derivative` must be the exact gradient of
`implicit_function` wherever it is evaluated. The closed `ManifoldKind` enum
holds any one of the surfaces behind a match for callers that pick the shape at
run time; the active force constraint is always an ellipsoid and stores that
type directly.
 */

mod cylinder;
mod ellipsoid;
mod flat;
mod sphere;

pub use cylinder::CylinderManifold;
pub use ellipsoid::EllipsoidManifold;
pub use flat::{FlatManifold, PlaneAxis};
pub use sphere::SphereManifold;

use crate::constants::Scalar;
use nalgebra::Vector3;

pub trait Manifold {
    fn implicit_function(&self, point: &Vector3<Scalar>) -> Scalar;

    fn derivative(&self, point: &Vector3<Scalar>) -> Vector3<Scalar>;

    fn name(&self) -> &'static str;

    /// Unit surface normal, `None` where the gradient vanishes.
    fn unit_normal(&self, point: &Vector3<Scalar>) -> Option<Vector3<Scalar>> {
        self.derivative(point).try_normalize(Scalar::EPSILON)
    }

    /// Remove the normal component of `v` at `point` and renormalize.
    /// Falls back to `v` unchanged if either the normal or the projection degenerates.
    fn project_tangent(&self, point: &Vector3<Scalar>, v: &Vector3<Scalar>) -> Vector3<Scalar> {
        let Some(normal) = self.unit_normal(point) else {
            return *v;
        };
        let tangent = v - normal * v.dot(&normal);
        tangent.try_normalize(Scalar::EPSILON).unwrap_or(*v)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ManifoldKind {
    Flat(FlatManifold),
    Sphere(SphereManifold),
    Cylinder(CylinderManifold),
    Ellipsoid(EllipsoidManifold),
}

impl Manifold for ManifoldKind {
    fn implicit_function(&self, point: &Vector3<Scalar>) -> Scalar {
        match self {
            ManifoldKind::Flat(m) => m.implicit_function(point),
            ManifoldKind::Sphere(m) => m.implicit_function(point),
            ManifoldKind::Cylinder(m) => m.implicit_function(point),
            ManifoldKind::Ellipsoid(m) => m.implicit_function(point),
        }
    }

    fn derivative(&self, point: &Vector3<Scalar>) -> Vector3<Scalar> {
        match self {
            ManifoldKind::Flat(m) => m.derivative(point),
            ManifoldKind::Sphere(m) => m.derivative(point),
            ManifoldKind::Cylinder(m) => m.derivative(point),
            ManifoldKind::Ellipsoid(m) => m.derivative(point),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ManifoldKind::Flat(m) => m.name(),
            ManifoldKind::Sphere(m) => m.name(),
            ManifoldKind::Cylinder(m) => m.name(),
            ManifoldKind::Ellipsoid(m) => m.name(),
        }
    }
}

impl From<FlatManifold> for ManifoldKind {
    fn from(m: FlatManifold) -> Self {
        ManifoldKind::Flat(m)
    }
}

impl From<SphereManifold> for ManifoldKind {
    fn from(m: SphereManifold) -> Self {
        ManifoldKind::Sphere(m)
    }
}

impl From<CylinderManifold> for ManifoldKind {
    fn from(m: CylinderManifold) -> Self {
        ManifoldKind::Cylinder(m)
    }
}

impl From<EllipsoidManifold> for ManifoldKind {
    fn from(m: EllipsoidManifold) -> Self {
        ManifoldKind::Ellipsoid(m)
    }
}

/// Central difference gradient, used to check `derivative` against `implicit_function`.
pub fn numerical_gradient<M: Manifold + ?Sized>(manifold: &M, point: &Vector3<Scalar>, h: Scalar) -> Vector3<Scalar> {
    let mut grad = Vector3::zeros();
    for dim in 0..3 {
        let mut plus = *point;
        let mut minus = *point;
        plus[dim] += h;
        minus[dim] -= h;
        grad[dim] = (manifold.implicit_function(&plus) - manifold.implicit_function(&minus)) / (2.0 * h);
    }
    grad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FD_STEP;
    use approx::assert_relative_eq;

    fn sample_points() -> Vec<Vector3<Scalar>> {
        vec![
            Vector3::new(5.0, 5.0, 7.0),
            Vector3::new(-1.5, 0.25, 3.0),
            Vector3::new(0.3, -2.2, -0.9),
            Vector3::new(10.0, -7.0, 0.01),
        ]
    }

    fn all_manifolds() -> Vec<ManifoldKind> {
        vec![
            FlatManifold::new("XY", 2.0).unwrap().into(),
            FlatManifold::new("zx", -1.0).unwrap().into(),
            FlatManifold::new("Yz", 0.5).unwrap().into(),
            SphereManifold::new(3.0, Vector3::new(0.5, -0.5, 1.0)).unwrap().into(),
            CylinderManifold::new(2.0, Vector3::new(1.0, 1.0, 0.0)).unwrap().into(),
            EllipsoidManifold::new(Vector3::new(0.0, 1.0, -1.0), 2.0, 3.0, 1.5).unwrap().into(),
        ]
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        for manifold in all_manifolds() {
            for p in sample_points() {
                let analytic = manifold.derivative(&p);
                let numeric = numerical_gradient(&manifold, &p, FD_STEP);
                assert_relative_eq!(analytic, numeric, epsilon = 1e-5, max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn test_project_tangent_is_orthogonal_to_normal() {
        let sphere: ManifoldKind = SphereManifold::new(2.0, Vector3::zeros()).unwrap().into();
        let p = Vector3::new(0.0, 0.0, 2.0);
        let v = Vector3::new(1.0, 0.0, 1.0).normalize();
        let t = sphere.project_tangent(&p, &v);
        assert_relative_eq!(t.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(t.dot(&Vector3::z()), 0.0, epsilon = 1e-12);
        assert_relative_eq!(t, Vector3::x(), epsilon = 1e-12);
    }

    #[test]
    fn test_project_tangent_degenerate_normal_keeps_vector() {
        // gradient vanishes at the centre of the sphere
        let sphere = SphereManifold::new(2.0, Vector3::zeros()).unwrap();
        let v = Vector3::new(0.0, 1.0, 0.0);
        assert_eq!(sphere.project_tangent(&Vector3::zeros(), &v), v);
    }

    #[test]
    fn test_dispatch_names() {
        let names: Vec<_> = all_manifolds().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["flat", "flat", "flat", "sphere", "cylinder", "ellipsoid"]);
    }
}
