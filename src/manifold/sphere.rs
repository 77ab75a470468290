use log::debug;
use nalgebra::Vector3;

use super::Manifold;
use crate::constants::Scalar;
use crate::error::{MdError, MdResult};

/// Sphere |p - c|^2 - r^2 = 0.
#[derive(Clone, Debug, PartialEq)]
pub struct SphereManifold {
    radius: Scalar,
    center: Vector3<Scalar>,
}

impl SphereManifold {
    pub fn new(radius: Scalar, center: Vector3<Scalar>) -> MdResult<Self> {
        if !(radius > 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "sphere radius must be positive, got {radius}"
            )));
        }
        debug!("Constructing SphereManifold r={radius} at {center:?}");
        Ok(SphereManifold { radius, center })
    }

    pub fn radius(&self) -> Scalar {
        self.radius
    }
}

impl Manifold for SphereManifold {
    fn implicit_function(&self, point: &Vector3<Scalar>) -> Scalar {
        (point - self.center).norm_squared() - self.radius * self.radius
    }

    fn derivative(&self, point: &Vector3<Scalar>) -> Vector3<Scalar> {
        2.0 * (point - self.center)
    }

    fn name(&self) -> &'static str {
        "sphere"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_surface_point_is_root() {
        let sphere = SphereManifold::new(2.0, Vector3::new(1.0, 0.0, 0.0)).unwrap();
        assert_relative_eq!(sphere.implicit_function(&Vector3::new(3.0, 0.0, 0.0)), 0.0);
        assert_relative_eq!(sphere.implicit_function(&Vector3::new(1.0, 0.0, 0.0)), -4.0);
    }

    #[test]
    fn test_rejects_bad_radius() {
        assert!(SphereManifold::new(0.0, Vector3::zeros()).is_err());
        assert!(SphereManifold::new(-1.0, Vector3::zeros()).is_err());
        assert!(SphereManifold::new(Scalar::NAN, Vector3::zeros()).is_err());
    }
}
