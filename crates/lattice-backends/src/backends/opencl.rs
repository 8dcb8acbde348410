//! OpenCL backend
//!
//! Holds the platform, device, context and command queue; each accessor owns
//! an `ocl::Buffer<u8>`. As with CUDA, kernel bodies run on host workers
//! over the accessor's mirror and the buffer is staged around each region.

use crate::backend::{Backend, BackendKind};
use crate::error::{BackendError, Result};
use ocl::{Buffer as OclBuffer, Context as OclContext, Device as OclDevice, Platform, Queue};
use std::fmt;
use std::sync::Arc;

/// Device memory of one accessor
pub struct OpenClBuffer {
    buffer: OclBuffer<u8>,
}

// SAFETY: OpenCL memory objects are reference counted by the runtime and
// safe to hand between threads; transfers are serialized by the accessor.
unsafe impl Send for OpenClBuffer {}
unsafe impl Sync for OpenClBuffer {}

impl OpenClBuffer {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }
}

/// OpenCL execution on one device
#[derive(Clone)]
pub struct OpenClBackend {
    device: OclDevice,
    context: Arc<OclContext>,
    queue: Arc<Queue>,
}

// SAFETY: context and queue are thread-safe OpenCL handles.
unsafe impl Send for OpenClBackend {}
unsafe impl Sync for OpenClBackend {}

impl OpenClBackend {
    /// Open the first device of the default platform
    pub fn new() -> Result<Self> {
        Self::with_device(0)
    }

    pub fn with_device(device_index: usize) -> Result<Self> {
        let platform = Platform::default();

        let devices = OclDevice::list_all(platform).map_err(unavailable)?;
        if devices.is_empty() {
            return Err(BackendError::DeviceUnavailable("no OpenCL devices found".into()));
        }
        let device = *devices.get(device_index).ok_or_else(|| {
            BackendError::DeviceUnavailable(format!(
                "OpenCL device {device_index} out of range ({} available)",
                devices.len()
            ))
        })?;

        let context = OclContext::builder()
            .platform(platform)
            .devices(device)
            .build()
            .map_err(unavailable)?;
        let queue = Queue::new(&context, device, None).map_err(unavailable)?;

        tracing::debug!(device_index, name = %device.name().unwrap_or_default(), "opencl_device_open");

        Ok(Self {
            device,
            context: Arc::new(context),
            queue: Arc::new(queue),
        })
    }

    /// Check if any platform exposes at least one device
    pub fn is_available() -> bool {
        Platform::list()
            .into_iter()
            .any(|platform| OclDevice::list_all(platform).is_ok_and(|devices| !devices.is_empty()))
    }

    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_default()
    }

    pub fn context(&self) -> &OclContext {
        &self.context
    }
}

fn unavailable(e: ocl::Error) -> BackendError {
    BackendError::DeviceUnavailable(format!("OpenCL: {e}"))
}

impl Backend for OpenClBackend {
    type DeviceBuffer = OpenClBuffer;

    const KIND: BackendKind = BackendKind::OpenCl;
    const HOST_ADDRESSABLE: bool = false;

    fn alloc_device(&self, bytes: usize) -> Result<OpenClBuffer> {
        let buffer = OclBuffer::<u8>::builder()
            .queue((*self.queue).clone())
            .flags(ocl::flags::MEM_READ_WRITE)
            .len(bytes)
            .fill_val(0u8)
            .build()
            .map_err(|e| BackendError::allocation(bytes, format!("OpenCL buffer allocation failed: {e}")))?;
        Ok(OpenClBuffer { buffer })
    }

    fn upload(&self, dst: &mut OpenClBuffer, src: &[u8]) -> Result<()> {
        if src.len() != dst.len() {
            return Err(BackendError::SizeMismatch {
                expected: dst.len(),
                actual: src.len(),
            });
        }
        dst.buffer
            .write(src)
            .enq()
            .map_err(|e| BackendError::Other(format!("OpenCL host-to-device copy failed: {e}")))?;
        self.synchronize()
    }

    fn download(&self, src: &OpenClBuffer, dst: &mut [u8]) -> Result<()> {
        if dst.len() != src.len() {
            return Err(BackendError::SizeMismatch {
                expected: src.len(),
                actual: dst.len(),
            });
        }
        src.buffer
            .read(dst)
            .enq()
            .map_err(|e| BackendError::Other(format!("OpenCL device-to-host copy failed: {e}")))?;
        self.synchronize()
    }

    fn synchronize(&self) -> Result<()> {
        self.queue
            .finish()
            .map_err(|e| BackendError::execution_fault(format!("OpenCL queue finish: {e}")))
    }
}

impl fmt::Debug for OpenClBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenClBackend")
            .field("device", &self.device_name())
            .finish()
    }
}
