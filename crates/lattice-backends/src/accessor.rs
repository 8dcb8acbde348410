//! Backend storage handles
//!
//! An [`Accessor`] owns one lattice buffer for one backend. It always holds a
//! stable, 64-byte-aligned host allocation ([`HostBuffer`]) that kernel
//! bodies address through a [`SitePtr`]. On staged backends (CUDA, OpenCL)
//! it additionally owns the device allocation, and the host allocation acts
//! as the mirror that is filled on [`HostAccess::ensure_host_access`] and
//! written back on [`HostAccess::release_host_access`].
//!
//! ```text
//!            bind / bind_from
//!   Unbound ─────────────────▶ Bound ──┬── ensure_host_access ──▶ host open (count += 1)
//!      ▲                               └── release_host_access ─▶ host closed at count 0
//!      └──────── release / drop ───────┘
//! ```

use crate::backend::{AccessorId, Backend, Element};
use crate::error::{BackendError, Result};
use lattice_tracing::performance::record_transfer;
use parking_lot::Mutex;
use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::time::Instant;

/// Alignment of every host allocation (one cache line)
pub const HOST_ALIGNMENT: usize = 64;

// ================================================================================================
// SitePtr
// ================================================================================================

/// Copyable device handle: base pointer plus element count
///
/// This is the value captured by kernel closures. It carries no lifetime, so
/// every dereference is `unsafe`; safe wrappers live on the container view,
/// which borrows the owning container.
pub struct SitePtr<T> {
    ptr: NonNull<T>,
    len: usize,
}

impl<T> Clone for SitePtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SitePtr<T> {}

// SAFETY: SitePtr is an address; synchronization is the caller's contract on
// the unsafe accessors below.
unsafe impl<T: Send> Send for SitePtr<T> {}
unsafe impl<T: Sync> Sync for SitePtr<T> {}

impl<T> PartialEq for SitePtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr && self.len == other.len
    }
}

impl<T> Eq for SitePtr<T> {}

impl<T> fmt::Debug for SitePtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SitePtr")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl<T: Element> SitePtr<T> {
    /// Handle addressing no sites, used for unbound containers
    pub const fn empty() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
        }
    }

    /// Number of sites addressable through this handle
    pub const fn len(self) -> usize {
        self.len
    }

    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    pub const fn as_ptr(self) -> *mut T {
        self.ptr.as_ptr()
    }

    #[inline]
    fn check(self, site: usize) {
        assert!(site < self.len, "site {site} out of range for buffer of {} sites", self.len);
    }

    /// Read one site.
    ///
    /// # Safety
    ///
    /// The owning buffer must be alive and no other lane may be writing
    /// `site` concurrently.
    #[inline]
    pub unsafe fn read(self, site: usize) -> T {
        self.check(site);
        self.ptr.as_ptr().add(site).read()
    }

    /// Write one site.
    ///
    /// # Safety
    ///
    /// The owning buffer must be alive and no other lane may read or write
    /// `site` concurrently.
    #[inline]
    pub unsafe fn write(self, site: usize, value: T) {
        self.check(site);
        self.ptr.as_ptr().add(site).write(value);
    }

    /// Write one site with a non-temporal store where the target supports
    /// one for this element width, bypassing the cache for write-only output.
    ///
    /// Stores issued this way are ordered by [`fence_streaming_stores`],
    /// which dispatch runs at the end of every block.
    ///
    /// # Safety
    ///
    /// Same contract as [`SitePtr::write`].
    #[inline]
    pub unsafe fn stream(self, site: usize, value: T) {
        self.check(site);
        let dst = self.ptr.as_ptr().add(site);

        #[cfg(target_arch = "x86_64")]
        {
            use std::arch::x86_64::{_mm_stream_si32, _mm_stream_si64};
            match std::mem::size_of::<T>() {
                8 if dst as usize % 8 == 0 => {
                    let bits = std::mem::transmute_copy::<T, i64>(&value);
                    _mm_stream_si64(dst.cast::<i64>(), bits);
                    return;
                }
                4 if dst as usize % 4 == 0 => {
                    let bits = std::mem::transmute_copy::<T, i32>(&value);
                    _mm_stream_si32(dst.cast::<i32>(), bits);
                    return;
                }
                _ => {}
            }
        }

        dst.write(value);
    }
}

/// Order all streaming stores issued by the calling thread.
#[inline]
pub fn fence_streaming_stores() {
    #[cfg(target_arch = "x86_64")]
    // SAFETY: sfence has no preconditions; SSE is baseline on x86_64.
    unsafe {
        std::arch::x86_64::_mm_sfence();
    };
}

// ================================================================================================
// HostBuffer
// ================================================================================================

/// Owning, zero-initialized, cache-line-aligned host allocation
///
/// Acquisition is [`HostBuffer::zeroed`]; release is `Drop`, on every exit
/// path.
pub struct HostBuffer<T> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
    _owns: PhantomData<T>,
}

// SAFETY: HostBuffer uniquely owns its allocation.
unsafe impl<T: Send> Send for HostBuffer<T> {}
unsafe impl<T: Sync> Sync for HostBuffer<T> {}

impl<T: Element> HostBuffer<T> {
    /// Allocate `len` zeroed elements
    pub fn zeroed(len: usize) -> Result<Self> {
        let bytes = len.saturating_mul(std::mem::size_of::<T>());
        let layout = Layout::array::<T>(len)
            .and_then(|layout| layout.align_to(HOST_ALIGNMENT))
            .map_err(|e| BackendError::allocation(bytes, e))?;

        if layout.size() == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
                layout,
                _owns: PhantomData,
            });
        }

        // SAFETY: layout has non-zero size; all-zero bytes are a valid T (Pod).
        let raw = unsafe { alloc::alloc_zeroed(layout) }.cast::<T>();
        let ptr = NonNull::new(raw)
            .ok_or_else(|| BackendError::allocation(layout.size(), "host allocator returned null"))?;

        Ok(Self {
            ptr,
            len,
            layout,
            _owns: PhantomData,
        })
    }

    /// Allocate and copy `data`
    pub fn from_slice(data: &[T]) -> Result<Self> {
        let buffer = Self::zeroed(data.len())?;
        // SAFETY: fresh allocation of data.len() elements, no overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), buffer.ptr.as_ptr(), data.len());
        }
        Ok(buffer)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_bytes(&self) -> usize {
        std::mem::size_of_val(self.as_slice())
    }

    pub fn site_ptr(&self) -> SitePtr<T> {
        SitePtr {
            ptr: self.ptr,
            len: self.len,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: ptr is valid for len initialized elements.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: unique borrow of the owning buffer.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Byte view used as the download target.
    ///
    /// # Safety
    ///
    /// No `SitePtr` derived from this buffer may be dereferenced while the
    /// returned slice is alive.
    unsafe fn bytes_mut(&self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<u8>(), self.len * std::mem::size_of::<T>())
    }
}

impl<T> Drop for HostBuffer<T> {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: allocated in `zeroed` with this exact layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), self.layout) };
        }
    }
}

// ================================================================================================
// HostAccess
// ================================================================================================

/// Host-handle lifecycle, independent of element type
///
/// This is what the registry stores; it lets one region track accessors of
/// different element types.
pub trait HostAccess: Send + Sync {
    fn accessor_id(&self) -> AccessorId;

    /// Open (or re-open) the host handle. Staged backends download on the
    /// first open. Unbound accessors have nothing to open.
    fn ensure_host_access(&self) -> Result<()>;

    /// Close one open. Staged backends write back on the last close.
    fn release_host_access(&self) -> Result<()>;

    /// Outstanding opens; always 0 on host-addressable backends
    fn host_open_count(&self) -> usize;
}

// ================================================================================================
// Accessor
// ================================================================================================

struct Staging<D> {
    device: Option<D>,
    host_opens: usize,
}

/// Storage handle for one lattice buffer on backend `B`
pub struct Accessor<T: Element, B: Backend> {
    id: AccessorId,
    backend: B,
    host: Option<HostBuffer<T>>,
    staging: Mutex<Staging<B::DeviceBuffer>>,
}

impl<T: Element, B: Backend> Accessor<T, B> {
    /// Create an unbound accessor
    pub fn new(backend: B) -> Self {
        Self {
            id: AccessorId::next(),
            backend,
            host: None,
            staging: Mutex::new(Staging {
                device: None,
                host_opens: 0,
            }),
        }
    }

    pub fn id(&self) -> AccessorId {
        self.id
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Elements in the bound buffer, 0 when unbound
    pub fn len(&self) -> usize {
        self.host.as_ref().map_or(0, HostBuffer::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bound(&self) -> bool {
        self.host.is_some()
    }

    pub fn size_bytes(&self) -> usize {
        self.len() * std::mem::size_of::<T>()
    }

    /// Allocate a zeroed buffer of `len` elements, replacing any previous one.
    ///
    /// `len == 0` leaves the accessor unbound.
    #[tracing::instrument(skip(self), fields(accessor = %self.id, backend = B::KIND.name()))]
    pub fn bind(&mut self, len: usize) -> Result<()> {
        self.release();
        if len == 0 {
            return Ok(());
        }

        let start = Instant::now();
        let host = HostBuffer::<T>::zeroed(len)?;
        let device = if B::HOST_ADDRESSABLE {
            None
        } else {
            Some(self.backend.alloc_device(host.size_bytes())?)
        };

        let bytes = host.size_bytes();
        self.host = Some(host);
        self.staging.get_mut().device = device;

        tracing::debug!(
            elements = len,
            bytes = bytes,
            duration_us = start.elapsed().as_micros() as u64,
            "accessor_bind"
        );
        Ok(())
    }

    /// Allocate a buffer holding a copy of `data`
    pub fn bind_from(&mut self, data: &[T]) -> Result<()> {
        self.bind(data.len())?;
        if let Some(host) = self.host.as_mut() {
            host.as_mut_slice().copy_from_slice(data);
            if !B::HOST_ADDRESSABLE {
                let staging = self.staging.get_mut();
                if let Some(device) = staging.device.as_mut() {
                    let start = Instant::now();
                    let src = bytemuck::cast_slice::<T, u8>(host.as_slice());
                    self.backend.upload(device, src)?;
                    record_transfer(src.len(), "H2D", start.elapsed().as_micros() as u64);
                }
            }
        }
        Ok(())
    }

    /// Free backend resources and return to the unbound state. Idempotent.
    pub fn release(&mut self) {
        let staging = self.staging.get_mut();
        if staging.host_opens != 0 {
            tracing::warn!(
                accessor = %self.id,
                host_opens = staging.host_opens,
                "accessor released with open host access"
            );
        }
        staging.device = None;
        staging.host_opens = 0;
        if let Some(host) = self.host.take() {
            tracing::trace!(accessor = %self.id, elements = host.len(), "accessor_release");
        }
    }

    /// Device handle for use inside dispatched kernels.
    ///
    /// # Panics
    ///
    /// Panics when the accessor is unbound; see [`Accessor::try_device_access`].
    pub fn device_access(&self) -> SitePtr<T> {
        match self.try_device_access() {
            Ok(ptr) => ptr,
            Err(err) => panic!("device_access: {err}"),
        }
    }

    pub fn try_device_access(&self) -> Result<SitePtr<T>> {
        self.host
            .as_ref()
            .map(HostBuffer::site_ptr)
            .ok_or_else(|| BackendError::Unbound(self.id.to_string()))
    }

    /// Host-path handle; requires an open host handle on staged backends
    pub fn host_handle(&self) -> Result<SitePtr<T>> {
        let ptr = self.try_device_access()?;
        if B::HOST_ADDRESSABLE || self.staging.lock().host_opens > 0 {
            Ok(ptr)
        } else {
            Err(BackendError::HostAccessClosed(self.id.to_string()))
        }
    }

    /// Whether host-path access is currently valid
    pub fn is_host_open(&self) -> bool {
        self.is_bound() && (B::HOST_ADDRESSABLE || self.staging.lock().host_opens > 0)
    }
}

impl<T: Element, B: Backend> HostAccess for Accessor<T, B> {
    fn accessor_id(&self) -> AccessorId {
        self.id
    }

    fn ensure_host_access(&self) -> Result<()> {
        // nothing to stage for a zero-site container
        let Some(host) = self.host.as_ref() else {
            return Ok(());
        };
        if B::HOST_ADDRESSABLE {
            return Ok(());
        }

        let mut staging = self.staging.lock();
        if staging.host_opens == 0 {
            let device = staging
                .device
                .as_ref()
                .ok_or_else(|| BackendError::Unbound(self.id.to_string()))?;
            let start = Instant::now();
            // SAFETY: the mirror is closed, so no kernel holds a live SitePtr
            // dereference; the staging lock excludes concurrent transfers.
            let dst = unsafe { host.bytes_mut() };
            self.backend.download(device, dst)?;
            record_transfer(dst.len(), "D2H", start.elapsed().as_micros() as u64);
        }
        staging.host_opens += 1;
        Ok(())
    }

    fn release_host_access(&self) -> Result<()> {
        let Some(host) = self.host.as_ref() else {
            return Ok(());
        };
        if B::HOST_ADDRESSABLE {
            return Ok(());
        }

        let mut staging = self.staging.lock();
        if staging.host_opens == 0 {
            return Ok(());
        }
        staging.host_opens -= 1;
        if staging.host_opens == 0 {
            let start = Instant::now();
            let src = bytemuck::cast_slice::<T, u8>(host.as_slice());
            if let Some(device) = staging.device.as_mut() {
                self.backend.upload(device, src)?;
                record_transfer(src.len(), "H2D", start.elapsed().as_micros() as u64);
            }
        }
        Ok(())
    }

    fn host_open_count(&self) -> usize {
        if B::HOST_ADDRESSABLE {
            0
        } else {
            self.staging.lock().host_opens
        }
    }
}

impl<T: Element, B: Backend> Drop for Accessor<T, B> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: Element, B: Backend> fmt::Debug for Accessor<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("id", &self.id)
            .field("backend", &B::KIND)
            .field("len", &self.len())
            .finish()
    }
}
