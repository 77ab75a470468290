/*
Run configuration.

Everything is optional in the JSON input; missing fields take the defaults
below, so `{}` is a valid (small, 2D, host only) run.

    {
      "number_of_particles": 256,
      "n_dimensions": 2,
      "density": 0.4,
      "dt": 0.005,
      "steps": 2000,
      "execution": "gpu",
      "active": { "rotation_diff": 0.1, "magnitude": 2.0 }
    }
 */

use std::fs;
use std::path::Path;

use log::debug;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::constants::{Scalar, DEFAULT_BLOCK_SIZE, DEFAULT_DT, DEFAULT_R_BUFF, MAX_BLOCK_SIZE};
use crate::error::{MdError, MdResult};
use crate::execution::ExecutionMode;
use crate::manifold::EllipsoidManifold;
use crate::pbc::SimulationBox;
use crate::rng::{particle_rng, unit_vector};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveForceConfig {
    pub seed: u64,
    pub orientation_link: bool,
    pub rotation_diff: Scalar,
    /// Centre of the ellipsoidal constraint surface.
    #[serde(rename = "P")]
    pub constraint_center: [Scalar; 3],
    /// Constraint radii; `rx == 0` disables the constraint.
    pub rx: Scalar,
    pub ry: Scalar,
    pub rz: Scalar,
    /// Magnitude used by `random_forces`.
    pub magnitude: Scalar,
}

impl Default for ActiveForceConfig {
    fn default() -> Self {
        ActiveForceConfig {
            seed: 1,
            orientation_link: false,
            rotation_diff: 0.0,
            constraint_center: [0.0; 3],
            rx: 0.0,
            ry: 0.0,
            rz: 0.0,
            magnitude: 1.0,
        }
    }
}

impl ActiveForceConfig {
    pub fn constraint(&self) -> MdResult<Option<EllipsoidManifold>> {
        if self.rx == 0.0 {
            return Ok(None);
        }
        let [px, py, pz] = self.constraint_center;
        EllipsoidManifold::new(Vector3::new(px, py, pz), self.rx, self.ry, self.rz).map(Some)
    }

    /// One force per tag, `magnitude` long, pointing in a random direction (in plane for 2D).
    pub fn random_forces(&self, number_of_particles: usize, n_dimensions: usize) -> Vec<Vector3<Scalar>> {
        (0..number_of_particles)
            .map(|tag| {
                let mut rng = particle_rng(self.seed, u64::MAX - 1, tag as u64);
                let mut direction = unit_vector(&mut rng);
                if n_dimensions == 2 {
                    direction.z = 0.0;
                    direction = direction.try_normalize(Scalar::EPSILON).unwrap_or_else(Vector3::x);
                }
                direction * self.magnitude
            })
            .collect()
    }

    pub fn validate(&self) -> MdResult<()> {
        if !(self.rotation_diff >= 0.0) {
            return Err(MdError::Configuration(format!(
                "rotation_diff must be non-negative, got {}",
                self.rotation_diff
            )));
        }
        self.constraint().map(|_| ())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub number_of_particles: usize,
    pub n_dimensions: usize,
    /// Number density used to size the box when `box_length` is absent.
    pub density: Scalar,
    pub box_length: Option<Scalar>,
    pub temperature: Scalar,
    pub seed: u64,
    pub dt: Scalar,
    pub steps: u64,
    pub log_period: u64,
    pub r_cut: Scalar,
    pub r_buff: Scalar,
    pub epsilon: Scalar,
    pub sigma: Scalar,
    pub execution: ExecutionMode,
    pub num_workers: usize,
    pub block_size: usize,
    pub error_checking: bool,
    pub active: Option<ActiveForceConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            number_of_particles: 100,
            n_dimensions: 2,
            density: 0.5,
            box_length: None,
            temperature: 1.0,
            seed: 42,
            dt: DEFAULT_DT,
            steps: 1000,
            log_period: 100,
            r_cut: 2.0_f64.powf(1.0 / 6.0),
            r_buff: DEFAULT_R_BUFF,
            epsilon: 1.0,
            sigma: 1.0,
            execution: ExecutionMode::Cpu,
            num_workers: 2,
            block_size: DEFAULT_BLOCK_SIZE,
            error_checking: true,
            active: Some(ActiveForceConfig::default()),
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> MdResult<Self> {
        let config: SimulationConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> MdResult<Self> {
        let path = path.as_ref();
        debug!("loading run configuration from {}", path.display());
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> MdResult<()> {
        if self.number_of_particles == 0 {
            return Err(MdError::Configuration("number_of_particles must be positive".to_string()));
        }
        if self.n_dimensions != 2 && self.n_dimensions != 3 {
            return Err(MdError::Configuration(format!(
                "n_dimensions must be 2 or 3, got {}",
                self.n_dimensions
            )));
        }
        if !(self.dt > 0.0) {
            return Err(MdError::Configuration(format!("dt must be positive, got {}", self.dt)));
        }
        match self.box_length {
            Some(l) if !(l > 0.0) => {
                return Err(MdError::Configuration(format!("box_length must be positive, got {l}")));
            }
            None if !(self.density > 0.0) => {
                return Err(MdError::Configuration(format!(
                    "density must be positive, got {}",
                    self.density
                )));
            }
            _ => {}
        }
        if !(self.r_cut > 0.0 && self.r_buff >= 0.0) {
            return Err(MdError::Configuration(format!(
                "need r_cut > 0 and r_buff >= 0, got {} and {}",
                self.r_cut, self.r_buff
            )));
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(MdError::Configuration(format!(
                "block_size must be in 1..={MAX_BLOCK_SIZE}, got {}",
                self.block_size
            )));
        }
        if let Some(active) = &self.active {
            active.validate()?;
        }
        Ok(())
    }

    /// Square (2D) or cubic box; the z extent of a 2D box is nominal.
    pub fn sim_box(&self) -> MdResult<SimulationBox> {
        let side = match self.box_length {
            Some(l) => l,
            None => (self.number_of_particles as Scalar / self.density).powf(1.0 / self.n_dimensions as Scalar),
        };
        if self.n_dimensions == 2 {
            SimulationBox::new(side, side, 1.0)
        } else {
            SimulationBox::cube(side)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = SimulationConfig::from_json_str("{}").unwrap();
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn test_partial_json() {
        let config = SimulationConfig::from_json_str(
            r#"{"number_of_particles": 64, "n_dimensions": 3, "execution": "gpu",
                "active": {"rotation_diff": 0.5, "P": [1.0, 0.0, 0.0], "rx": 2.0, "ry": 2.0, "rz": 3.0}}"#,
        )
        .unwrap();
        assert_eq!(config.number_of_particles, 64);
        assert_eq!(config.execution, ExecutionMode::Gpu);
        let active = config.active.unwrap();
        assert_eq!(active.rotation_diff, 0.5);
        assert_eq!(active.constraint_center, [1.0, 0.0, 0.0]);
        assert!(active.constraint().unwrap().is_some());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            SimulationConfig::from_json_str(r#"{"dt": 0.0}"#),
            Err(MdError::Configuration(_))
        ));
        assert!(matches!(
            SimulationConfig::from_json_str(r#"{"box_length": -3.0}"#),
            Err(MdError::Configuration(_))
        ));
        assert!(matches!(
            SimulationConfig::from_json_str(r#"{"active": {"rx": 1.0}}"#),
            Err(MdError::InvalidParameter(_))
        ));
        assert!(matches!(
            SimulationConfig::from_json_str("[1, 2]"),
            Err(MdError::Json(_))
        ));
    }

    #[test]
    fn test_box_from_density() {
        let config = SimulationConfig {
            number_of_particles: 100,
            n_dimensions: 2,
            density: 0.25,
            ..Default::default()
        };
        let sim_box = config.sim_box().unwrap();
        assert_relative_eq!(sim_box.x_dimension, 20.0, epsilon = 1e-12);
        assert_relative_eq!(sim_box.y_dimension, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn test_random_forces_in_plane() {
        let active = ActiveForceConfig {
            magnitude: 3.0,
            ..Default::default()
        };
        let forces = active.random_forces(50, 2);
        assert_eq!(forces.len(), 50);
        for f in forces {
            assert_eq!(f.z, 0.0);
            assert_relative_eq!(f.norm(), 3.0, epsilon = 1e-12);
        }
    }
}
