use std::str::FromStr;

use log::debug;
use nalgebra::Vector3;

use super::Manifold;
use crate::constants::Scalar;
use crate::error::{MdError, MdResult};

/// Coordinate plane of a flat manifold; the normal is the remaining axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneAxis {
    XY,
    XZ,
    YZ,
}

impl PlaneAxis {
    pub fn normal_axis(&self) -> usize {
        match self {
            PlaneAxis::XY => 2,
            PlaneAxis::XZ => 1,
            PlaneAxis::YZ => 0,
        }
    }
}

impl FromStr for PlaneAxis {
    type Err = MdError;

    // "XY", "yx", "Xy" all name the same plane
    fn from_str(surf: &str) -> MdResult<Self> {
        let mut letters: Vec<char> = surf.trim().chars().map(|c| c.to_ascii_uppercase()).collect();
        letters.sort_unstable();
        match letters.as_slice() {
            ['X', 'Y'] => Ok(PlaneAxis::XY),
            ['X', 'Z'] => Ok(PlaneAxis::XZ),
            ['Y', 'Z'] => Ok(PlaneAxis::YZ),
            _ => Err(MdError::UnrecognizedManifoldAxis(surf.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlatManifold {
    surf: PlaneAxis,
    shift: Scalar,
}

impl FlatManifold {
    pub fn new(surf: &str, shift: Scalar) -> MdResult<Self> {
        let surf = surf.parse::<PlaneAxis>()?;
        debug!("Constructing FlatManifold {surf:?} shifted by {shift}");
        Ok(FlatManifold { surf, shift })
    }

    pub fn from_axis(surf: PlaneAxis, shift: Scalar) -> Self {
        FlatManifold { surf, shift }
    }

    pub fn surf(&self) -> PlaneAxis {
        self.surf
    }

    pub fn shift(&self) -> Scalar {
        self.shift
    }
}

impl Manifold for FlatManifold {
    fn implicit_function(&self, point: &Vector3<Scalar>) -> Scalar {
        point[self.surf.normal_axis()] - self.shift
    }

    fn derivative(&self, _point: &Vector3<Scalar>) -> Vector3<Scalar> {
        let mut normal = Vector3::zeros();
        normal[self.surf.normal_axis()] = 1.0;
        normal
    }

    fn name(&self) -> &'static str {
        "flat"
    }
}
