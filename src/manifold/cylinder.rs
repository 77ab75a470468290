use log::debug;
use nalgebra::Vector3;

use super::Manifold;
use crate::constants::Scalar;
use crate::error::{MdError, MdResult};

/// Cylinder around the z axis through `center`: (x-cx)^2 + (y-cy)^2 - r^2 = 0.
#[derive(Clone, Debug, PartialEq)]
pub struct CylinderManifold {
    radius: Scalar,
    center: Vector3<Scalar>,
}

impl CylinderManifold {
    pub fn new(radius: Scalar, center: Vector3<Scalar>) -> MdResult<Self> {
        if !(radius > 0.0) {
            return Err(MdError::InvalidParameter(format!(
                "cylinder radius must be positive, got {radius}"
            )));
        }
        debug!("Constructing CylinderManifold r={radius} at {center:?}");
        Ok(CylinderManifold { radius, center })
    }
}

impl Manifold for CylinderManifold {
    fn implicit_function(&self, point: &Vector3<Scalar>) -> Scalar {
        let dx = point.x - self.center.x;
        let dy = point.y - self.center.y;
        dx * dx + dy * dy - self.radius * self.radius
    }

    fn derivative(&self, point: &Vector3<Scalar>) -> Vector3<Scalar> {
        Vector3::new(2.0 * (point.x - self.center.x), 2.0 * (point.y - self.center.y), 0.0)
    }

    fn name(&self) -> &'static str {
        "cylinder"
    }
}
