use std::alloc::{self, Layout};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use log::trace;
use num_complex::Complex;

use super::FftScalar;
use crate::constants::FFT_ALIGNMENT;
use crate::error::{MdError, MdResult};

/// Zero-initialized complex sample buffer on a 64 byte boundary.
pub struct AlignedBuffer<T: FftScalar> {
    ptr: NonNull<Complex<T>>,
    len: usize,
    layout: Layout,
}

impl<T: FftScalar> AlignedBuffer<T> {
    pub fn allocate(byte_size: usize) -> MdResult<Self> {
        let sample = mem::size_of::<Complex<T>>();
        if byte_size == 0 {
            return Err(MdError::Allocation {
                bytes: byte_size,
                reason: "zero-sized buffer".to_string(),
            });
        }
        if byte_size % sample != 0 {
            return Err(MdError::Allocation {
                bytes: byte_size,
                reason: format!("not a multiple of the {sample} byte complex sample"),
            });
        }
        let layout = Layout::from_size_align(byte_size, FFT_ALIGNMENT).map_err(|e| MdError::Allocation {
            bytes: byte_size,
            reason: e.to_string(),
        })?;

        // SAFETY: layout has non-zero size, checked above.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw.cast::<Complex<T>>()).ok_or_else(|| MdError::Allocation {
            bytes: byte_size,
            reason: "allocator returned null".to_string(),
        })?;
        trace!("aligned fft buffer: {byte_size} bytes");

        Ok(AlignedBuffer {
            ptr,
            len: byte_size / sample,
            layout,
        })
    }

    pub fn byte_size(&self) -> usize {
        self.layout.size()
    }
}

impl<T: FftScalar> Deref for AlignedBuffer<T> {
    type Target = [Complex<T>];

    fn deref(&self) -> &[Complex<T>] {
        // SAFETY: ptr is a live allocation of len zeroed samples, and zero bits are 0.0 for f32/f64.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: FftScalar> DerefMut for AlignedBuffer<T> {
    fn deref_mut(&mut self) -> &mut [Complex<T>] {
        // SAFETY: as in deref, and &mut self guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: FftScalar> Drop for AlignedBuffer<T> {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` with this exact layout, freed once.
        unsafe { alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) }
    }
}

// SAFETY: the buffer uniquely owns its allocation, like a Vec<Complex<T>>.
unsafe impl<T: FftScalar> Send for AlignedBuffer<T> {}
// SAFETY: shared access only hands out &[Complex<T>].
unsafe impl<T: FftScalar> Sync for AlignedBuffer<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_and_zeroing() {
        let buf = AlignedBuffer::<f64>::allocate(16 * 64).unwrap();
        assert_eq!(buf.len(), 64);
        assert_eq!(buf.byte_size(), 1024);
        assert_eq!(buf.as_ptr() as usize % FFT_ALIGNMENT, 0);
        assert!(buf.iter().all(|c| c.re == 0.0 && c.im == 0.0));
    }

    #[test]
    fn test_bad_sizes_rejected() {
        assert!(matches!(
            AlignedBuffer::<f32>::allocate(0),
            Err(MdError::Allocation { bytes: 0, .. })
        ));
        // complex f32 is 8 bytes
        assert!(matches!(
            AlignedBuffer::<f32>::allocate(12),
            Err(MdError::Allocation { bytes: 12, .. })
        ));
    }

    #[test]
    fn test_buffer_feeds_a_plan() {
        let ctx = crate::fft::LocalFftContext::init().unwrap();
        let mut buf = ctx.allocate_aligned::<f32>(8 * 8).unwrap();
        buf[0] = Complex::new(2.0, 0.0);
        let mut plan = ctx
            .create_plan::<f32>(8, 1, 1, 8, 1, 8, crate::fft::Direction::Forward)
            .unwrap();
        ctx.execute_in_place(&mut buf, &mut plan, crate::fft::Direction::Forward)
            .unwrap();
        assert!(buf.iter().all(|c| (c.re - 2.0).abs() < 1e-6));
        ctx.destroy_plan(plan);
        ctx.free_aligned(buf);
    }
}
