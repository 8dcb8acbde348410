//! Dispatch primitives
//!
//! A [`Context`] bundles a backend with its accessor registry, launch
//! configuration and (optionally) a dedicated worker pool. Work is submitted
//! through a [`Region`]: open one, register every accessor the body touches,
//! then consume it with one of the loop forms.
//!
//! ```text
//! ctx.region() ──▶ track / view ... ──▶ for_* ─┬─ materialize_all
//!                                              ├─ body over the index space
//!                                              ├─ barrier (blocking forms)
//!                                              └─ release_all
//! Region::drop ──▶ registry.close (every exit path, panics included)
//! ```
//!
//! Host loops statically partition `[0, count)` into one contiguous chunk per
//! worker. Accelerator loops launch `blocks × (threads_per_block × lanes)`
//! work items with the same site/lane indexing a device kernel sees; blocks
//! run in parallel on the pool.

use crate::accessor::{fence_streaming_stores, HostAccess};
use crate::backend::{Backend, LaunchConfig, RegionId};
use crate::config::DispatchConfig;
use crate::error::{BackendError, Result};
use crate::registry::AccessorRegistry;
use lattice_tracing::perf_span;
use lattice_tracing::performance::record_launch;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

// ================================================================================================
// Context
// ================================================================================================

/// Backend, registry, configuration and worker pool for one family of
/// containers
pub struct Context<B: Backend> {
    backend: B,
    registry: AccessorRegistry,
    config: DispatchConfig,
    pool: Option<rayon::ThreadPool>,
}

impl<B: Backend> Context<B> {
    /// Context configured from the environment (see [`DispatchConfig::from_env`])
    pub fn new(backend: B) -> Result<Arc<Self>> {
        Self::with_config(backend, DispatchConfig::from_env())
    }

    pub fn with_config(backend: B, config: DispatchConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let pool = match config.host_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("lattice-worker-{i}"))
                    .build()
                    .map_err(|e| BackendError::Other(format!("failed to build worker pool: {e}")))?,
            ),
            None => None,
        };

        tracing::debug!(
            backend = backend.name(),
            threads_per_block = config.threads_per_block,
            host_threads = ?config.host_threads,
            simd_lanes = config.simd_lanes,
            "context_created"
        );

        Ok(Arc::new(Self {
            backend,
            registry: AccessorRegistry::new(),
            config,
            pool,
        }))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &AccessorRegistry {
        &self.registry
    }

    /// Workers available to host loops
    pub fn workers(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, rayon::ThreadPool::current_num_threads)
    }

    /// Open a dispatch region
    pub fn region(&self) -> Region<'_, B> {
        Region {
            ctx: self,
            id: self.registry.open(),
        }
    }

    /// Device-wide synchronization
    pub fn barrier(&self) -> Result<()> {
        self.backend.synchronize().map_err(|err| match err {
            BackendError::ExecutionFault(_) => err,
            other => BackendError::execution_fault(other.to_string()),
        })
    }

    /// Whether two handles refer to the same context
    pub fn same(a: &Arc<Self>, b: &Arc<Self>) -> bool {
        Arc::ptr_eq(a, b)
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl<B: Backend> fmt::Debug for Context<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("backend", &B::KIND)
            .field("config", &self.config)
            .field("workers", &self.workers())
            .field("registry", &self.registry)
            .finish()
    }
}

// ================================================================================================
// Region
// ================================================================================================

/// One dispatch extent
///
/// Accessors tracked here have valid host handles for the duration of the
/// loop that consumes the region. Dropping the region, including during
/// unwinding, releases and pops its registry frame.
#[must_use = "a region does nothing until consumed by a loop form"]
pub struct Region<'c, B: Backend> {
    ctx: &'c Context<B>,
    id: RegionId,
}

impl<'c, B: Backend> Region<'c, B> {
    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn context(&self) -> &'c Context<B> {
        self.ctx
    }

    /// Register an accessor the body will touch. Returns `false` if it was
    /// already tracked in this region.
    pub fn track(&self, accessor: Arc<dyn HostAccess>) -> Result<bool> {
        self.ctx.registry.track(self.id, accessor)
    }

    /// Run `body(i)` for every `i` in `[0, count)` on host workers.
    ///
    /// The index space is split into one contiguous chunk per worker; there
    /// is no ordering between indices. Returns after all chunks have joined.
    pub fn for_host_threads<F>(self, count: usize, body: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync,
    {
        self.run_host("host_threads", count, body)
    }

    /// Collapsed two-level form of [`Region::for_host_threads`]: runs
    /// `body(i, j)` for `i < outer`, `j < inner`.
    pub fn for_host_threads_2d<F>(self, outer: usize, inner: usize, body: F) -> Result<()>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        let count = outer.checked_mul(inner).ok_or_else(|| {
            BackendError::invalid_launch(format!("{outer} x {inner} iterations overflow"))
        })?;
        self.run_host("host_threads_2d", count, move |k| body(k / inner, k % inner))
    }

    /// Accelerator launch over `count` sites with `lanes` lanes each;
    /// `body(lane, site)` runs once per in-range work item.
    ///
    /// Ends with a device barrier; a fault reported there is an
    /// [`BackendError::ExecutionFault`].
    pub fn for_accelerator<F>(self, count: usize, lanes: u32, body: F) -> Result<()>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        self.run_accelerator("accelerator", count, lanes, true, body)
    }

    /// [`Region::for_accelerator`] without the trailing barrier
    pub fn for_accelerator_nb<F>(self, count: usize, lanes: u32, body: F) -> Result<()>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        self.run_accelerator("accelerator_nb", count, lanes, false, body)
    }

    fn run_host<F>(self, form: &'static str, count: usize, body: F) -> Result<()>
    where
        F: Fn(usize) + Send + Sync,
    {
        let ctx = self.ctx;
        ctx.registry.materialize_all(self.id)?;

        let workers = ctx.workers().max(1);
        let chunk = count.div_ceil(workers).max(1);
        let start = Instant::now();
        {
            let _span = perf_span!("for_host_threads", form = form, count = count, workers = workers);
            ctx.install(|| {
                (0..workers).into_par_iter().for_each(|worker| {
                    let begin = (worker * chunk).min(count);
                    let end = (begin + chunk).min(count);
                    for i in begin..end {
                        body(i);
                    }
                    fence_streaming_stores();
                });
            });
        }
        record_launch(form, B::KIND.name(), count, 1, start.elapsed().as_micros() as u64);

        ctx.registry.release_all(self.id)
    }

    fn run_accelerator<F>(self, form: &'static str, count: usize, lanes: u32, blocking: bool, body: F) -> Result<()>
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        let ctx = self.ctx;
        let launch = LaunchConfig::for_sites(count as u64, lanes, ctx.config.threads_per_block)?;
        ctx.registry.materialize_all(self.id)?;

        let start = Instant::now();
        {
            let _span = perf_span!("for_accelerator", form = form, sites = count, lanes = lanes, blocks = launch.blocks);
            ctx.install(|| {
                (0..launch.blocks).into_par_iter().for_each(|block| {
                    for tx in 0..launch.block.x {
                        let site = launch.site(block, tx);
                        if site >= launch.sites {
                            break;
                        }
                        for lane in 0..launch.block.y {
                            body(lane as usize, site as usize);
                        }
                    }
                    fence_streaming_stores();
                });
            });
        }
        record_launch(form, B::KIND.name(), count, lanes as usize, start.elapsed().as_micros() as u64);

        let synced = if blocking { ctx.barrier() } else { Ok(()) };
        let released = ctx.registry.release_all(self.id);
        synced.and(released)
    }
}

impl<B: Backend> Drop for Region<'_, B> {
    fn drop(&mut self) {
        if let Err(err) = self.ctx.registry.close(self.id) {
            tracing::error!(region = %self.id, error = %err, "failed to close region");
        }
    }
}

impl<B: Backend> fmt::Debug for Region<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("id", &self.id)
            .field("tracked", &self.ctx.registry.tracked(self.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::Accessor;
    use crate::backends::HostBackend;
    use crate::testing::StagedBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn host_ctx(config: DispatchConfig) -> Arc<Context<HostBackend>> {
        Context::with_config(HostBackend::new(), config).unwrap()
    }

    fn counters(n: usize) -> Vec<AtomicUsize> {
        (0..n).map(|_| AtomicUsize::new(0)).collect()
    }

    #[test]
    fn test_host_threads_cover_every_index_once() {
        for threads in [1, 3, 8] {
            let ctx = host_ctx(DispatchConfig::default().with_host_threads(threads));
            let hits = counters(101);
            ctx.region()
                .for_host_threads(hits.len(), |i| {
                    hits[i].fetch_add(1, Ordering::Relaxed);
                })
                .unwrap();
            assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1), "threads={threads}");
            assert!(ctx.registry().is_empty());
        }
    }

    #[test]
    fn test_host_threads_2d_covers_grid() {
        let ctx = host_ctx(DispatchConfig::default().with_host_threads(4));
        let hits = counters(5 * 7);
        ctx.region()
            .for_host_threads_2d(5, 7, |i, j| {
                hits[i * 7 + j].fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn test_accelerator_geometry() {
        let ctx = host_ctx(DispatchConfig::default().with_threads_per_block(3));
        let hits = counters(10 * 2);
        ctx.region()
            .for_accelerator(10, 2, |lane, site| {
                assert!(lane < 2 && site < 10);
                hits[site * 2 + lane].fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn test_empty_loops_are_noops() {
        let ctx = host_ctx(DispatchConfig::default());
        ctx.region().for_host_threads(0, |_| unreachable!()).unwrap();
        ctx.region().for_accelerator(0, 1, |_, _| unreachable!()).unwrap();
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn test_zero_lanes_rejected_and_region_drained() {
        let ctx = host_ctx(DispatchConfig::default());
        let err = ctx.region().for_accelerator(4, 0, |_, _| {}).unwrap_err();
        assert!(matches!(err, BackendError::InvalidLaunchConfig(_)));
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Context::with_config(HostBackend::new(), DispatchConfig::default().with_threads_per_block(0))
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidLaunchConfig(_)));
    }

    #[test]
    fn test_staged_region_materializes_and_writes_back() {
        let backend = StagedBackend::new();
        let ctx = Context::with_config(backend.clone(), DispatchConfig::default()).unwrap();
        let mut acc = Accessor::<u32, _>::new(backend.clone());
        acc.bind_from(&[1, 2, 3, 4, 5]).unwrap();
        let acc = Arc::new(acc);

        let region = ctx.region();
        region.track(acc.clone()).unwrap();
        let ptr = acc.device_access();
        region
            .for_accelerator(5, 1, |_, site| unsafe {
                ptr.write(site, ptr.read(site) * 10);
            })
            .unwrap();

        assert_eq!(backend.downloads(), 1);
        assert_eq!(backend.uploads(), 2);
        assert_eq!(backend.synchronizations(), 1);
        assert_eq!(acc.host_open_count(), 0);
        assert!(ctx.registry().is_empty());

        let region = ctx.region();
        region.track(acc.clone()).unwrap();
        let seen = counters(5);
        region
            .for_host_threads(5, |i| {
                seen[i].store(unsafe { ptr.read(i) } as usize, Ordering::Relaxed);
            })
            .unwrap();
        let seen: Vec<usize> = seen.iter().map(|s| s.load(Ordering::Relaxed)).collect();
        assert_eq!(seen, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_non_blocking_skips_barrier() {
        let backend = StagedBackend::new();
        let ctx = Context::with_config(backend.clone(), DispatchConfig::default()).unwrap();
        ctx.region().for_accelerator_nb(16, 1, |_, _| {}).unwrap();
        assert_eq!(backend.synchronizations(), 0);
        ctx.barrier().unwrap();
        assert_eq!(backend.synchronizations(), 1);
    }

    #[test]
    fn test_barrier_fault_surfaces_after_release() {
        let backend = StagedBackend::new();
        let ctx = Context::with_config(backend.clone(), DispatchConfig::default()).unwrap();
        let mut acc = Accessor::<f32, _>::new(backend.clone());
        acc.bind(4).unwrap();
        let acc = Arc::new(acc);

        backend.fail_synchronize(true);
        let region = ctx.region();
        region.track(acc.clone()).unwrap();
        let err = region.for_accelerator(4, 1, |_, _| {}).unwrap_err();
        assert!(matches!(err, BackendError::ExecutionFault(_)));
        assert_eq!(acc.host_open_count(), 0);
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn test_panic_in_body_drains_registry() {
        let backend = StagedBackend::new();
        let ctx = Context::with_config(backend.clone(), DispatchConfig::default()).unwrap();
        let mut acc = Accessor::<u64, _>::new(backend.clone());
        acc.bind(8).unwrap();
        let acc = Arc::new(acc);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let region = ctx.region();
            region.track(acc.clone()).unwrap();
            region
                .for_host_threads(8, |i| {
                    if i == 5 {
                        panic!("boom");
                    }
                })
                .unwrap();
        }));

        assert!(result.is_err());
        assert_eq!(acc.host_open_count(), 0);
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn test_nested_region_inside_body() {
        let backend = StagedBackend::new();
        let ctx = Context::with_config(backend.clone(), DispatchConfig::default().with_host_threads(2)).unwrap();
        let mut acc = Accessor::<u32, _>::new(backend.clone());
        acc.bind(4).unwrap();
        let acc = Arc::new(acc);
        let ptr = acc.device_access();

        let outer = ctx.region();
        outer.track(acc.clone()).unwrap();
        outer
            .for_host_threads(1, |_| {
                assert_eq!(ctx.registry().depth(), 1);
                let inner = ctx.region();
                inner.track(acc.clone()).unwrap();
                inner
                    .for_accelerator(4, 1, |_, site| unsafe { ptr.write(site, site as u32 + 1) })
                    .unwrap();
                // the outer frame still holds the host handle
                assert!(acc.is_host_open());
            })
            .unwrap();

        assert!(ctx.registry().is_empty());
        assert_eq!(acc.host_open_count(), 0);
        assert_eq!(backend.downloads(), 1);

        acc.ensure_host_access().unwrap();
        let values: Vec<u32> = (0..4).map(|i| unsafe { ptr.read(i) }).collect();
        acc.release_host_access().unwrap();
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_dropped_region_pops_frame() {
        let ctx = host_ctx(DispatchConfig::default());
        {
            let region = ctx.region();
            assert_eq!(ctx.registry().depth(), 1);
            drop(region);
        }
        assert!(ctx.registry().is_empty());
    }
}
