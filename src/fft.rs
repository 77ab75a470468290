/*
Local 1D FFT backend.

A thin adapter over rustfft exposing the plan / execute / aligned-alloc
contract the distributed long-range solvers build on:

    init            -> LocalFftContext::init
    teardown        -> LocalFftContext::teardown
    create_plan     -> LocalFftContext::create_plan
    destroy_plan    -> LocalFftContext::destroy_plan
    allocate_aligned/free_aligned -> AlignedBuffer
    execute         -> LocalFftContext::execute / execute_in_place

Plans describe `howmany` independent complex transforms of length `dim`, with
separate element stride and batch distance for input and output. Element k of
batch b is read from `input[b * idist + k * istride]` and written to
`output[b * odist + k * ostride]`. Inverse transforms are not normalized.

Plans borrow the context they came from, so the context cannot be torn down
while any plan is alive. Execution takes the plan mutably: one plan is never
run from two threads at once, but distinct plans may run concurrently
(FFT1D_SUPPORTS_THREADS).
 */

mod aligned;
mod plan;

pub use aligned::AlignedBuffer;
pub use plan::FftPlan;

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, warn};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::error::{MdError, MdResult};

pub const FFT1D_SUPPORTS_THREADS: bool = true;

// diagnostic codes carried by MdError::PlanCreation
pub const PLAN_ERR_LENGTH: i32 = 1;
pub const PLAN_ERR_BATCH: i32 = 2;
pub const PLAN_ERR_STRIDE: i32 = 3;
pub const PLAN_ERR_LAYOUT: i32 = 4;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Sample precision of a transform. All-zero bits must be a valid zero.
pub trait FftScalar: rustfft::FftNum + sealed::Sealed {}
impl FftScalar for f32 {}
impl FftScalar for f64 {}

pub type Cpx<T> = Complex<T>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Inverse,
}

impl TryFrom<i32> for Direction {
    type Error = MdError;

    // sign convention of the C interface: 0 forward, 1 inverse
    fn try_from(sign: i32) -> MdResult<Self> {
        match sign {
            0 => Ok(Direction::Forward),
            1 => Ok(Direction::Inverse),
            other => Err(MdError::InvalidParameter(format!(
                "fft direction must be 0 or 1, got {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FftBackendOptions {
    /// Allow a plan to run in the direction it was not created for.
    pub allow_direction_reuse: bool,
}

impl Default for FftBackendOptions {
    fn default() -> Self {
        FftBackendOptions {
            allow_direction_reuse: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanLayout {
    pub dim: usize,
    pub howmany: usize,
    pub istride: usize,
    pub idist: usize,
    pub ostride: usize,
    pub odist: usize,
}

impl PlanLayout {
    // extent of one batch, None if it does not fit in usize
    fn batch_span(dim: usize, stride: usize) -> Option<usize> {
        dim.checked_sub(1)?.checked_mul(stride)?.checked_add(1)
    }

    fn span(dim: usize, howmany: usize, stride: usize, dist: usize) -> Option<usize> {
        howmany
            .checked_sub(1)?
            .checked_mul(dist)?
            .checked_add(Self::batch_span(dim, stride)?)
    }

    /// Samples the input buffer must hold (saturates for layouts `create_plan` rejects).
    pub fn input_len(&self) -> usize {
        Self::span(self.dim, self.howmany, self.istride, self.idist).unwrap_or(usize::MAX)
    }

    /// Samples the output buffer must hold.
    pub fn output_len(&self) -> usize {
        Self::span(self.dim, self.howmany, self.ostride, self.odist).unwrap_or(usize::MAX)
    }

    // batches are disjoint if they are either blocked or interleaved
    fn batches_disjoint(dim: usize, howmany: usize, stride: usize, dist: usize) -> bool {
        let blocked = Self::batch_span(dim, stride).is_some_and(|span| dist >= span);
        let interleaved = dist >= 1 && howmany.checked_mul(dist).is_some_and(|extent| stride >= extent);
        howmany == 1 || blocked || interleaved
    }

    fn validate(&self) -> MdResult<()> {
        if self.dim == 0 {
            return Err(MdError::PlanCreation {
                code: PLAN_ERR_LENGTH,
                reason: "transform length must be positive".to_string(),
            });
        }
        if self.howmany == 0 {
            return Err(MdError::PlanCreation {
                code: PLAN_ERR_BATCH,
                reason: "batch count must be positive".to_string(),
            });
        }
        if self.istride == 0 || self.ostride == 0 {
            return Err(MdError::PlanCreation {
                code: PLAN_ERR_STRIDE,
                reason: format!("strides must be positive (in {}, out {})", self.istride, self.ostride),
            });
        }
        if !Self::batches_disjoint(self.dim, self.howmany, self.istride, self.idist)
            || !Self::batches_disjoint(self.dim, self.howmany, self.ostride, self.odist)
        {
            return Err(MdError::PlanCreation {
                code: PLAN_ERR_LAYOUT,
                reason: format!(
                    "overlapping batches: {} x {} with in (stride {}, dist {}) out (stride {}, dist {})",
                    self.howmany, self.dim, self.istride, self.idist, self.ostride, self.odist
                ),
            });
        }
        let in_span = Self::span(self.dim, self.howmany, self.istride, self.idist);
        let out_span = Self::span(self.dim, self.howmany, self.ostride, self.odist);
        if in_span.is_none() || out_span.is_none() {
            return Err(MdError::PlanCreation {
                code: PLAN_ERR_LAYOUT,
                reason: format!(
                    "layout does not fit in memory: {} x {} with in (stride {}, dist {}) out (stride {}, dist {})",
                    self.howmany, self.dim, self.istride, self.idist, self.ostride, self.odist
                ),
            });
        }
        Ok(())
    }
}

pub struct LocalFftContext {
    options: FftBackendOptions,
    plans_created: AtomicUsize,
    live_plans: AtomicUsize,
}

impl LocalFftContext {
    pub fn init() -> MdResult<Self> {
        Self::with_options(FftBackendOptions::default())
    }

    pub fn with_options(options: FftBackendOptions) -> MdResult<Self> {
        debug!("local fft backend up (rustfft), direction reuse {}", options.allow_direction_reuse);
        Ok(LocalFftContext {
            options,
            plans_created: AtomicUsize::new(0),
            live_plans: AtomicUsize::new(0),
        })
    }

    pub fn options(&self) -> FftBackendOptions {
        self.options
    }

    pub fn live_plans(&self) -> usize {
        self.live_plans.load(Ordering::Acquire)
    }

    pub fn teardown(self) {
        let live = self.live_plans();
        if live != 0 {
            warn!("local fft teardown with {live} plans still registered");
        }
        debug!(
            "local fft backend down after {} plans",
            self.plans_created.load(Ordering::Acquire)
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_plan<T: FftScalar>(
        &self,
        dim: usize,
        howmany: usize,
        istride: usize,
        idist: usize,
        ostride: usize,
        odist: usize,
        direction: Direction,
    ) -> MdResult<FftPlan<'_, T>> {
        let layout = PlanLayout {
            dim,
            howmany,
            istride,
            idist,
            ostride,
            odist,
        };
        layout.validate()?;
        let plan = FftPlan::new(self, layout, direction)?;
        self.plans_created.fetch_add(1, Ordering::AcqRel);
        self.live_plans.fetch_add(1, Ordering::AcqRel);
        Ok(plan)
    }

    pub(crate) fn release_plan(&self) {
        self.live_plans.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn destroy_plan<T: FftScalar>(&self, plan: FftPlan<'_, T>) {
        drop(plan);
    }

    pub fn allocate_aligned<T: FftScalar>(&self, byte_size: usize) -> MdResult<AlignedBuffer<T>> {
        AlignedBuffer::allocate(byte_size)
    }

    pub fn free_aligned<T: FftScalar>(&self, buffer: AlignedBuffer<T>) {
        drop(buffer);
    }

    pub fn execute<T: FftScalar>(
        &self,
        input: &[Cpx<T>],
        output: &mut [Cpx<T>],
        plan: &mut FftPlan<'_, T>,
        direction: Direction,
    ) -> MdResult<()> {
        plan.execute(input, output, direction)
    }

    pub fn execute_in_place<T: FftScalar>(
        &self,
        data: &mut [Cpx<T>],
        plan: &mut FftPlan<'_, T>,
        direction: Direction,
    ) -> MdResult<()> {
        plan.execute_in_place(data, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_length_plan_reports_code() {
        let ctx = LocalFftContext::init().unwrap();
        let err = ctx
            .create_plan::<f32>(0, 1, 1, 1, 1, 1, Direction::Forward)
            .err()
            .unwrap();
        assert!(matches!(err, MdError::PlanCreation { code: PLAN_ERR_LENGTH, .. }));
    }

    #[test]
    fn test_overlapping_batches_rejected() {
        let ctx = LocalFftContext::init().unwrap();
        // 4 batches of 8 elements, only 2 apart
        let err = ctx
            .create_plan::<f64>(8, 4, 1, 2, 1, 8, Direction::Forward)
            .err()
            .unwrap();
        assert!(matches!(err, MdError::PlanCreation { code: PLAN_ERR_LAYOUT, .. }));
    }

    #[test]
    fn test_interleaved_and_blocked_layouts_accepted() {
        let ctx = LocalFftContext::init().unwrap();
        assert!(ctx.create_plan::<f64>(8, 4, 4, 1, 1, 8, Direction::Forward).is_ok());
        assert!(ctx.create_plan::<f64>(8, 4, 2, 16, 2, 16, Direction::Inverse).is_ok());
        assert!(ctx.create_plan::<f32>(8, 1, 3, 0, 1, 0, Direction::Forward).is_ok());
    }

    #[test]
    fn test_zero_stride_rejected() {
        let ctx = LocalFftContext::init().unwrap();
        let err = ctx
            .create_plan::<f64>(8, 2, 0, 8, 1, 8, Direction::Forward)
            .err()
            .unwrap();
        assert!(matches!(err, MdError::PlanCreation { code: PLAN_ERR_STRIDE, .. }));
    }

    #[test]
    fn test_overflowing_layout_is_an_error() {
        let ctx = LocalFftContext::init().unwrap();
        let huge_stride = ctx
            .create_plan::<f64>(2, 2, usize::MAX, 1, 1, 2, Direction::Forward)
            .err()
            .unwrap();
        assert!(matches!(huge_stride, MdError::PlanCreation { code: PLAN_ERR_LAYOUT, .. }));

        let huge_dist = ctx
            .create_plan::<f64>(4, 3, 1, usize::MAX / 2, 1, 4, Direction::Forward)
            .err()
            .unwrap();
        assert!(matches!(huge_dist, MdError::PlanCreation { code: PLAN_ERR_LAYOUT, .. }));
        assert_eq!(ctx.live_plans(), 0);
    }

    #[test]
    fn test_unallocatable_length_is_an_error() {
        let ctx = LocalFftContext::init().unwrap();
        let dim = usize::MAX / 8;
        let err = ctx
            .create_plan::<f64>(dim, 1, 1, dim, 1, dim, Direction::Forward)
            .err()
            .unwrap();
        assert!(matches!(err, MdError::PlanCreation { code: PLAN_ERR_LENGTH, .. }));
        assert_eq!(ctx.live_plans(), 0);
    }

    #[test]
    fn test_live_plan_bookkeeping() {
        let ctx = LocalFftContext::init().unwrap();
        let a = ctx.create_plan::<f64>(4, 1, 1, 4, 1, 4, Direction::Forward).unwrap();
        let b = ctx.create_plan::<f64>(4, 1, 1, 4, 1, 4, Direction::Inverse).unwrap();
        assert_eq!(ctx.live_plans(), 2);
        ctx.destroy_plan(a);
        assert_eq!(ctx.live_plans(), 1);
        ctx.destroy_plan(b);
        assert_eq!(ctx.live_plans(), 0);
        ctx.teardown();
    }

    #[test]
    fn test_direction_sign_convention() {
        assert_eq!(Direction::try_from(0).unwrap(), Direction::Forward);
        assert_eq!(Direction::try_from(1).unwrap(), Direction::Inverse);
        assert!(Direction::try_from(-1).is_err());
    }
}
