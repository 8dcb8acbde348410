//! Shared fixtures for lattice-core integration tests

#![allow(dead_code)]

use lattice_backends::testing::StagedBackend;
use lattice_core::{Backend, Context, DispatchConfig, Element, GridRef, HostBackend, Lattice, Parity};
use std::sync::Arc;

/// Host context with a private pool of `threads` workers
pub fn host_ctx(threads: usize) -> Arc<Context<HostBackend>> {
    Context::with_config(HostBackend::new(), DispatchConfig::default().with_host_threads(threads))
        .expect("host context")
}

/// Staged context plus a handle on its transfer counters
pub fn staged_ctx() -> (Arc<Context<StagedBackend>>, StagedBackend) {
    let backend = StagedBackend::new();
    let ctx = Context::with_config(backend.clone(), DispatchConfig::default().with_host_threads(2))
        .expect("staged context");
    (ctx, backend)
}

/// Container holding `data` under `parity`
pub fn lattice<T: Element, B: Backend>(
    ctx: &Arc<Context<B>>,
    grid: &GridRef,
    data: &[T],
    parity: Parity,
) -> Lattice<T, B> {
    let mut lattice = Lattice::from_slice(ctx, grid, data).expect("from_slice");
    lattice.set_checkerboard(parity);
    lattice
}

/// Every tracked accessor released and every frame popped
pub fn assert_registry_clean<B: Backend>(ctx: &Context<B>) {
    assert!(ctx.registry().is_empty(), "registry not drained: {:?}", ctx.registry());
    assert_eq!(ctx.registry().depth(), 0);
}
