/*
Execution configuration.

Reports whether device-parallel execution is available and whether device
side error checking is enabled. The device itself is a block scheduled kernel
launcher: a kernel is a pure function of the global thread index, one logical
thread per particle, and blocks of `block_size` threads are the unit handed to
the worker pool.
 */

use log::{debug, trace};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use crate::error::{MdError, MdResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Cpu,
    Gpu,
}

pub trait ExecutionContext {
    fn is_gpu_enabled(&self) -> bool;
    fn is_error_checking_enabled(&self) -> bool;
}

pub struct DeviceContext {
    pool: ThreadPool,
    error_checking: bool,
}

impl DeviceContext {
    fn new(num_threads: usize, error_checking: bool) -> MdResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("device-sm-{i}"))
            .build()
            .map_err(|e| MdError::Configuration(format!("cannot start device workers: {e}")))?;
        Ok(DeviceContext {
            pool,
            error_checking,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn error_checking(&self) -> bool {
        self.error_checking
    }

    /// Launch `kernel` over `out`, one thread per element; thread `i` writes `out[i]`.
    pub fn launch<T, K>(&self, name: &str, block_size: usize, out: &mut [T], kernel: K) -> MdResult<()>
    where
        T: Send,
        K: Fn(usize, &mut T) + Sync,
    {
        if block_size == 0 || block_size > MAX_BLOCK_SIZE {
            return Err(MdError::KernelLaunch(format!(
                "{name}: block size {block_size} outside 1..={MAX_BLOCK_SIZE}"
            )));
        }
        let n = out.len();
        let grid = n.div_ceil(block_size);
        trace!("launch {name}: grid {grid} x block {block_size} ({n} threads)");

        self.pool.install(|| {
            out.par_chunks_mut(block_size)
                .enumerate()
                .for_each(|(block_idx, block)| {
                    let offset = block_idx * block_size;
                    for (thread_idx, slot) in block.iter_mut().enumerate() {
                        kernel(offset + thread_idx, slot);
                    }
                });
        });
        Ok(())
    }

    /// Post-launch check, only active with error checking on.
    pub fn check<T, F>(&self, name: &str, out: &[T], is_valid: F) -> MdResult<()>
    where
        T: Sync,
        F: Fn(&T) -> bool + Sync,
    {
        if !self.error_checking {
            return Ok(());
        }
        match out.par_iter().position_any(|v| !is_valid(v)) {
            Some(i) => Err(MdError::KernelLaunch(format!(
                "{name}: non-finite result written by thread {i}"
            ))),
            None => Ok(()),
        }
    }
}

pub struct ExecutionConfiguration {
    mode: ExecutionMode,
    block_size: usize,
    error_checking: bool,
    device: Option<DeviceContext>,
}

impl ExecutionConfiguration {
    pub fn cpu() -> Self {
        debug!("execution configuration: cpu, {} host threads", rayon::current_num_threads());
        ExecutionConfiguration {
            mode: ExecutionMode::Cpu,
            block_size: DEFAULT_BLOCK_SIZE,
            error_checking: false,
            device: None,
        }
    }

    pub fn gpu(num_workers: usize, error_checking: bool) -> MdResult<Self> {
        let device = DeviceContext::new(num_workers, error_checking)?;
        debug!(
            "execution configuration: device with {} workers, error checking {}",
            device.num_workers(),
            error_checking
        );
        Ok(ExecutionConfiguration {
            mode: ExecutionMode::Gpu,
            block_size: DEFAULT_BLOCK_SIZE,
            error_checking,
            device: Some(device),
        })
    }

    pub fn from_mode(mode: ExecutionMode, num_workers: usize, error_checking: bool) -> MdResult<Self> {
        match mode {
            ExecutionMode::Cpu => Ok(ExecutionConfiguration::cpu()),
            ExecutionMode::Gpu => ExecutionConfiguration::gpu(num_workers, error_checking),
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn device(&self) -> Option<&DeviceContext> {
        self.device.as_ref()
    }
}

impl ExecutionContext for ExecutionConfiguration {
    fn is_gpu_enabled(&self) -> bool {
        self.device.is_some()
    }

    fn is_error_checking_enabled(&self) -> bool {
        self.error_checking
    }
}
