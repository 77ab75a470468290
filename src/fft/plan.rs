use std::sync::Arc;

use log::trace;
use num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{Fft, FftPlanner};

use super::{Cpx, Direction, FftScalar, LocalFftContext, PlanLayout, PLAN_ERR_LENGTH};
use crate::error::{MdError, MdResult};

fn zeroed_samples<T: FftScalar>(len: usize) -> MdResult<Vec<Cpx<T>>> {
    let mut samples = Vec::new();
    samples.try_reserve_exact(len).map_err(|e| MdError::PlanCreation {
        code: PLAN_ERR_LENGTH,
        reason: format!("cannot hold {len} samples: {e}"),
    })?;
    samples.resize(len, Complex::zero());
    Ok(samples)
}

pub struct FftPlan<'ctx, T: FftScalar> {
    ctx: &'ctx LocalFftContext,
    layout: PlanLayout,
    direction: Direction,
    forward: Arc<dyn Fft<T>>,
    inverse: Arc<dyn Fft<T>>,
    work: Vec<Cpx<T>>,
    scratch: Vec<Cpx<T>>,
}

impl<'ctx, T: FftScalar> FftPlan<'ctx, T> {
    pub(super) fn new(ctx: &'ctx LocalFftContext, layout: PlanLayout, direction: Direction) -> MdResult<Self> {
        // a length we cannot buffer is refused before the planner tries to allocate for it
        let work = zeroed_samples(layout.dim)?;
        let mut planner = FftPlanner::<T>::new();
        let forward = planner.plan_fft_forward(layout.dim);
        let inverse = planner.plan_fft_inverse(layout.dim);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());
        let scratch = zeroed_samples(scratch_len)?;
        trace!("fft plan: {layout:?} {direction:?}");

        Ok(FftPlan {
            ctx,
            layout,
            direction,
            forward,
            inverse,
            work,
            scratch,
        })
    }

    pub fn layout(&self) -> PlanLayout {
        self.layout
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn transform_for(&self, requested: Direction) -> MdResult<Arc<dyn Fft<T>>> {
        if requested != self.direction && !self.ctx.options().allow_direction_reuse {
            return Err(MdError::DirectionMismatch {
                planned: self.direction,
                requested,
            });
        }
        Ok(match requested {
            Direction::Forward => Arc::clone(&self.forward),
            Direction::Inverse => Arc::clone(&self.inverse),
        })
    }

    fn check_len(needed: usize, got: usize) -> MdResult<()> {
        if got < needed {
            return Err(MdError::BufferSize { needed, got });
        }
        Ok(())
    }

    /// Out of place: `input` is left untouched.
    pub fn execute(&mut self, input: &[Cpx<T>], output: &mut [Cpx<T>], direction: Direction) -> MdResult<()> {
        let fft = self.transform_for(direction)?;
        let PlanLayout {
            dim,
            howmany,
            istride,
            idist,
            ostride,
            odist,
        } = self.layout;
        Self::check_len(self.layout.input_len(), input.len())?;
        Self::check_len(self.layout.output_len(), output.len())?;

        for batch in 0..howmany {
            for (k, w) in self.work.iter_mut().enumerate() {
                *w = input[batch * idist + k * istride];
            }
            fft.process_with_scratch(&mut self.work, &mut self.scratch);
            for k in 0..dim {
                output[batch * odist + k * ostride] = self.work[k];
            }
        }
        Ok(())
    }

    /// In place: input and output layouts of the plan must agree.
    pub fn execute_in_place(&mut self, data: &mut [Cpx<T>], direction: Direction) -> MdResult<()> {
        let fft = self.transform_for(direction)?;
        let PlanLayout {
            dim,
            howmany,
            istride,
            idist,
            ostride,
            odist,
        } = self.layout;
        if istride != ostride || (howmany > 1 && idist != odist) {
            return Err(MdError::InvalidParameter(format!(
                "in-place execution needs matching layouts (in {istride}/{idist}, out {ostride}/{odist})"
            )));
        }
        Self::check_len(self.layout.input_len(), data.len())?;

        for batch in 0..howmany {
            let base = batch * idist;
            for (k, w) in self.work.iter_mut().enumerate() {
                *w = data[base + k * istride];
            }
            fft.process_with_scratch(&mut self.work, &mut self.scratch);
            for k in 0..dim {
                data[base + k * istride] = self.work[k];
            }
        }
        Ok(())
    }
}

impl<T: FftScalar> Drop for FftPlan<'_, T> {
    fn drop(&mut self) {
        trace!("fft plan released: {:?}", self.layout);
        self.ctx.release_plan();
    }
}
