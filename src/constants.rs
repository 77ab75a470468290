pub type Scalar = f64;

pub const DEFAULT_BLOCK_SIZE: usize = 256; // threads per block for device kernels
pub const MAX_BLOCK_SIZE: usize = 1024; // largest block a device launch accepts
pub const FFT_ALIGNMENT: usize = 64; // byte alignment of complex sample buffers
pub const DEFAULT_DT: Scalar = 0.005; // Time step
pub const DEFAULT_R_BUFF: Scalar = 0.4; // neighbor list skin
pub const FD_STEP: Scalar = 1e-6; // finite difference step used by gradient checks
