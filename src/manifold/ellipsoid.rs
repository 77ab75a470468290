use log::debug;
use nalgebra::Vector3;

use super::Manifold;
use crate::constants::Scalar;
use crate::error::{MdError, MdResult};

/*
Axis aligned ellipsoid centred at P with semi-axes (rx, ry, rz):

    ((x-Px)/rx)^2 + ((y-Py)/ry)^2 + ((z-Pz)/rz)^2 - 1 = 0

This is the surface active particles are confined to when a constraint is set.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct EllipsoidManifold {
    center: Vector3<Scalar>,
    rx: Scalar,
    ry: Scalar,
    rz: Scalar,
}

impl EllipsoidManifold {
    pub fn new(center: Vector3<Scalar>, rx: Scalar, ry: Scalar, rz: Scalar) -> MdResult<Self> {
        if !(rx > 0.0 && ry > 0.0 && rz > 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "ellipsoid radii must be positive, got ({rx}, {ry}, {rz})"
            )));
        }
        debug!("Constructing EllipsoidManifold ({rx}, {ry}, {rz}) at {center:?}");
        Ok(EllipsoidManifold { center, rx, ry, rz })
    }

    fn inv_radii_sq(&self) -> Vector3<Scalar> {
        Vector3::new(
            1.0 / (self.rx * self.rx),
            1.0 / (self.ry * self.ry),
            1.0 / (self.rz * self.rz),
        )
    }
}

impl Manifold for EllipsoidManifold {
    fn implicit_function(&self, point: &Vector3<Scalar>) -> Scalar {
        let d = point - self.center;
        d.component_mul(&d).dot(&self.inv_radii_sq()) - 1.0
    }

    fn derivative(&self, point: &Vector3<Scalar>) -> Vector3<Scalar> {
        2.0 * (point - self.center).component_mul(&self.inv_radii_sq())
    }

    fn name(&self) -> &'static str {
        "ellipsoid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_poles_are_roots() {
        let e = EllipsoidManifold::new(Vector3::new(1.0, 1.0, 1.0), 2.0, 3.0, 4.0).unwrap();
        assert_relative_eq!(e.implicit_function(&Vector3::new(3.0, 1.0, 1.0)), 0.0, epsilon = 1e-12);
        assert_relative_eq!(e.implicit_function(&Vector3::new(1.0, -2.0, 1.0)), 0.0, epsilon = 1e-12);
        assert_relative_eq!(e.implicit_function(&Vector3::new(1.0, 1.0, 5.0)), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_normal_at_pole_is_axis() {
        let e = EllipsoidManifold::new(Vector3::zeros(), 2.0, 3.0, 4.0).unwrap();
        let n = e.unit_normal(&Vector3::new(0.0, 3.0, 0.0)).unwrap();
        assert_relative_eq!(n, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_zero_radius() {
        assert!(EllipsoidManifold::new(Vector3::zeros(), 1.0, 0.0, 1.0).is_err());
        assert!(EllipsoidManifold::new(Vector3::zeros(), 1.0, 1.0, Scalar::NAN).is_err());
    }
}
