/*
Error taxonomy for the force/constraint core.

Configuration and kernel failures are fatal for the caller (construction or
the current step), FFT failures are recoverable by whoever owns the plan, and
bad user input (manifold axes, radii, list lengths) fails fast.
*/

use thiserror::Error;

use crate::fft::Direction;

#[derive(Debug, Error)]
pub enum MdError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("fft plan creation failed (code {code}): {reason}")]
    PlanCreation { code: i32, reason: String },
    #[error("aligned allocation of {bytes} bytes failed: {reason}")]
    Allocation { bytes: usize, reason: String },
    #[error("plan configured for {planned:?} cannot execute {requested:?}")]
    DirectionMismatch {
        planned: Direction,
        requested: Direction,
    },
    #[error("buffer holds {got} samples but the plan layout needs {needed}")]
    BufferSize { needed: usize, got: usize },
    #[error("unrecognized manifold axis {0:?} (expected XY, XZ or YZ)")]
    UnrecognizedManifoldAxis(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("kernel launch failed: {0}")]
    KernelLaunch(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type MdResult<T> = Result<T, MdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_creation_carries_code() {
        let err = MdError::PlanCreation {
            code: 3,
            reason: "length must be positive".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("code 3"));
        assert!(msg.contains("length must be positive"));
    }

    #[test]
    fn test_direction_mismatch_display() {
        let err = MdError::DirectionMismatch {
            planned: Direction::Forward,
            requested: Direction::Inverse,
        };
        assert_eq!(
            err.to_string(),
            "plan configured for Forward cannot execute Inverse"
        );
    }

    #[test]
    fn test_io_conversion() {
        fn open_missing() -> MdResult<String> {
            Ok(std::fs::read_to_string("/definitely/not/here.json")?)
        }
        assert!(matches!(open_missing(), Err(MdError::Io(_))));
    }
}
