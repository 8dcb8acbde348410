//! Checkerboarded axpy on the host backend
//!
//! ```text
//! LATTICE_TRACING_PROFILE=local RUST_LOG=lattice_core=debug \
//!     cargo run -p lattice-core --example lattice_demo
//! ```

use lattice_core::{mul_add, Context, FlatGrid, HostBackend, Lattice, LatticeError, Parity};
use lattice_tracing::{init_global_tracing, TracingConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_global_tracing(&TracingConfig::from_env())?;

    let ctx = Context::new(HostBackend::new())?;
    tracing::info!(workers = ctx.workers(), config = ?ctx.config(), "context ready");

    let grid = FlatGrid::shared(16);
    let x: Vec<f64> = (0..grid.osites()).map(|i| i as f64).collect();

    let mut xs = Lattice::from_slice(&ctx, &grid, &x)?;
    xs.set_checkerboard(Parity::Even);
    let mut ys = Lattice::<f64, _>::new(&ctx, &grid);
    ys.fill(1.0);
    ys.set_checkerboard(Parity::Even);

    // y = 2x + y in one pass
    let mut out = Lattice::<f64, _>::new(&ctx, &grid);
    out.try_assign(mul_add(2.0f64, &xs, &ys))?;
    out += &xs;

    for site in (0..grid.osites()).step_by(2) {
        tracing::info!(site, value = out.try_peek(site)?, "even site");
    }

    match out.try_peek(1) {
        Err(err @ LatticeError::ParityViolation { .. }) => tracing::info!(%err, "odd site rejected"),
        other => tracing::warn!(?other, "expected a parity violation"),
    }

    println!("{:?}", out.to_vec());
    Ok(())
}
