pub mod periodic_boundary_conditions {
    /*
    How do we handle periodic boundaries and minimum image convention in a simulation program?

    An orthorhombic box centred on the origin, each coordinate lives in [-L/2, L/2).
    Displacements are folded back with the minimum image convention and positions
    are wrapped when particles leave through a face.
     */
    use crate::constants::Scalar;
    use crate::error::{MdError, MdResult};
    use nalgebra::Vector3;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
    pub struct SimulationBox {
        pub x_dimension: Scalar,
        pub y_dimension: Scalar,
        pub z_dimension: Scalar,
    }

    impl SimulationBox {
        pub fn new(x_dimension: Scalar, y_dimension: Scalar, z_dimension: Scalar) -> MdResult<Self> {
            if !(x_dimension > 0.0 && y_dimension > 0.0 && z_dimension > 0.0) {
                return Err(MdError::InvalidParameter(format!(
                    "box lengths must be positive, got ({x_dimension}, {y_dimension}, {z_dimension})"
                )));
            }
            Ok(SimulationBox {
                x_dimension,
                y_dimension,
                z_dimension,
            })
        }

        pub fn cube(box_length: Scalar) -> MdResult<Self> {
            SimulationBox::new(box_length, box_length, box_length)
        }

        pub fn lengths(&self) -> Vector3<Scalar> {
            Vector3::new(self.x_dimension, self.y_dimension, self.z_dimension)
        }

        pub fn volume(&self) -> Scalar {
            self.x_dimension * self.y_dimension * self.z_dimension
        }

        pub fn min_image(&self, rij: Vector3<Scalar>) -> Vector3<Scalar> {
            let l = self.lengths();
            Vector3::new(
                rij[0] - l[0] * (rij[0] / l[0]).round(),
                rij[1] - l[1] * (rij[1] / l[1]).round(),
                rij[2] - l[2] * (rij[2] / l[2]).round(),
            )
        }

        pub fn wrap(&self, position: Vector3<Scalar>) -> Vector3<Scalar> {
            let l = self.lengths();
            let mut wrapped = position;
            for i in 0..3 {
                // shift into [0, L), then back to the centred frame
                wrapped[i] = (position[i] + 0.5 * l[i]).rem_euclid(l[i]) - 0.5 * l[i];
            }
            wrapped
        }
    }
}

pub use periodic_boundary_conditions::SimulationBox;
