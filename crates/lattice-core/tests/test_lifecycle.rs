//! Container lifecycle: copies, moves, swaps, rebinding and host interop

mod common;

use common::{assert_registry_clean, host_ctx, lattice, staged_ctx};
use lattice_backends::HostAccess;
use lattice_core::{FlatGrid, Lattice, LatticeError, Parity};
use num_complex::Complex64;

#[test]
fn test_copy_is_independent() -> lattice_core::Result<()> {
    let ctx = host_ctx(2);
    let grid = FlatGrid::shared(16);
    let data: Vec<f32> = (0..16).map(|i| i as f32 * 0.5).collect();
    let source = lattice(&ctx, &grid, &data, Parity::Odd);

    let mut copy = source.clone();
    assert_eq!(copy.to_vec(), source.to_vec());
    assert_eq!(copy.checkerboard(), Parity::Odd);
    assert_ne!(copy.accessor().id(), source.accessor().id());

    copy.try_poke(3, 99.0)?;
    assert_eq!(copy.try_peek(3)?, 99.0);
    assert_eq!(source.try_peek(3)?, 1.5);
    Ok(())
}

#[test]
fn test_copy_from_with_lanes() -> lattice_core::Result<()> {
    let ctx = lattice_core::Context::with_config(
        lattice_core::HostBackend::new(),
        lattice_core::DispatchConfig::default()
            .with_simd_lanes(4)
            .with_threads_per_block(3)
            .with_host_threads(2),
    )?;
    let grid = FlatGrid::shared(11);
    let data: Vec<u64> = (100..111).collect();
    let source = lattice(&ctx, &grid, &data, Parity::Even);

    let mut target = Lattice::<u64, _>::unbound(&ctx, &grid);
    target.try_copy_from(&source)?;
    assert_eq!(target.to_vec(), data);
    assert_eq!(target.checkerboard(), Parity::Even);

    let foreign = Lattice::<u64, _>::new(&ctx, &FlatGrid::shared(11));
    assert!(matches!(target.try_copy_from(&foreign), Err(LatticeError::Conformability(_))));

    let elsewhere = host_ctx(1);
    let stranger = Lattice::<u64, _>::new(&elsewhere, &grid);
    assert!(matches!(target.try_copy_from(&stranger), Err(LatticeError::ContextMismatch)));
    Ok(())
}

#[test]
fn test_take_empties_source() -> lattice_core::Result<()> {
    let ctx = host_ctx(2);
    let grid = FlatGrid::shared(4);
    let mut source = lattice(&ctx, &grid, &[1i32, 2, 3, 4], Parity::Even);

    let moved = source.take();
    assert_eq!(moved.to_vec(), vec![1, 2, 3, 4]);
    assert_eq!(moved.checkerboard(), Parity::Even);

    assert!(!source.is_bound());
    assert_eq!(source.osites(), 0);
    assert_eq!(source.grid(), &grid);
    assert!(source.to_vec().is_empty());

    // reassignable after the move
    source.try_assign(&moved * 3i32)?;
    assert_eq!(source.to_vec(), vec![3, 6, 9, 12]);
    drop(source);
    Ok(())
}

#[test]
fn test_moved_out_container_supports_every_operation() -> lattice_core::Result<()> {
    let ctx = host_ctx(2);
    let grid = FlatGrid::shared(4);
    let mut source = lattice(&ctx, &grid, &[1.0f32, 2.0, 3.0, 4.0], Parity::Odd);
    let moved = source.take();

    // zero sites to touch
    source.try_fill(2.0)?;
    assert!(source.try_to_vec()?.is_empty());

    let copy = source.clone();
    assert!(!copy.is_bound());
    assert_eq!(copy.osites(), 0);

    // copying an empty source empties the target
    let mut target = moved.clone();
    target.try_copy_from(&source)?;
    assert!(!target.is_bound());
    assert!(target.to_vec().is_empty());

    source.try_copy_from(&moved)?;
    assert_eq!(source.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(source.checkerboard(), Parity::Odd);
    assert_registry_clean(&ctx);
    Ok(())
}

#[test]
fn test_moved_out_container_on_staged_backend() -> lattice_core::Result<()> {
    let (ctx, backend) = staged_ctx();
    let grid = FlatGrid::shared(6);
    let mut source = lattice(&ctx, &grid, &[9u32; 6], Parity::Even);
    let moved = source.take();

    let (downloads, uploads) = (backend.downloads(), backend.uploads());
    source.try_fill(1)?;
    assert!(source.try_to_vec()?.is_empty());
    assert!(!source.clone().is_bound());
    assert_eq!((backend.downloads(), backend.uploads()), (downloads, uploads));
    assert_eq!(source.accessor().host_open_count(), 0);

    source.try_assign(&moved + 1u32)?;
    assert_eq!(source.to_vec(), vec![10; 6]);
    assert_registry_clean(&ctx);
    Ok(())
}

#[test]
fn test_assign_reallocates_mismatched_target() -> lattice_core::Result<()> {
    let ctx = host_ctx(2);
    let grid = FlatGrid::shared(4);
    let a = lattice(&ctx, &grid, &[1.0f64, 2.0, 3.0, 4.0], Parity::Even);
    let mut out = Lattice::<f64, _>::new(&ctx, &grid);

    out.try_resize(8)?;
    out.try_assign(&a + 1.0f64)?;
    assert_eq!(out.osites(), 4);
    assert_eq!(out.to_vec(), vec![2.0, 3.0, 4.0, 5.0]);
    assert_eq!(out.checkerboard(), Parity::Even);

    out.try_resize(2)?;
    out.assign(&a * &a);
    assert_eq!(out.to_vec(), vec![1.0, 4.0, 9.0, 16.0]);
    assert_registry_clean(&ctx);
    Ok(())
}

#[test]
fn test_move_from_steals_buffer() {
    let ctx = host_ctx(1);
    let grid = FlatGrid::shared(3);
    let mut a = lattice(&ctx, &grid, &[1u32, 1, 1], Parity::Full);
    let mut b = lattice(&ctx, &grid, &[7u32, 8, 9], Parity::Odd);
    let id = b.accessor().id();

    a.move_from(&mut b);
    assert_eq!(a.accessor().id(), id);
    assert_eq!(a.to_vec(), vec![7, 8, 9]);
    assert_eq!(a.checkerboard(), Parity::Odd);
    assert!(!b.is_bound());
}

#[test]
fn test_swap_exchanges_buffers_and_parity() {
    let ctx = host_ctx(1);
    let grid = FlatGrid::shared(2);
    let mut a = lattice(&ctx, &grid, &[1.0f64, 2.0], Parity::Even);
    let mut b = lattice(&ctx, &grid, &[3.0f64, 4.0], Parity::Odd);

    a.swap(&mut b);
    assert_eq!(a.to_vec(), vec![3.0, 4.0]);
    assert_eq!(a.checkerboard(), Parity::Odd);
    assert_eq!(b.to_vec(), vec![1.0, 2.0]);
    assert_eq!(b.checkerboard(), Parity::Even);

    let mut c = Lattice::<f64, _>::new(&ctx, &FlatGrid::shared(2));
    assert!(matches!(a.try_swap(&mut c), Err(LatticeError::Conformability(_))));
}

#[test]
fn test_reset_and_resize() -> lattice_core::Result<()> {
    let ctx = host_ctx(2);
    let small = FlatGrid::shared(2);
    let large = FlatGrid::shared(9);
    let mut lattice = lattice(&ctx, &small, &[5u8, 6], Parity::Even);

    lattice.try_reset(&large)?;
    assert_eq!(lattice.grid(), &large);
    assert_eq!(lattice.checkerboard(), Parity::Full);
    assert_eq!(lattice.to_vec(), vec![0; 9]);

    lattice.try_resize(3)?;
    assert_eq!(lattice.osites(), 3);
    lattice.try_resize(0)?;
    assert!(!lattice.is_bound());
    Ok(())
}

#[test]
fn test_rebinding_while_tracked_is_refused() {
    let ctx = host_ctx(1);
    let grid = FlatGrid::shared(4);
    let other = FlatGrid::shared(8);
    let mut lattice = Lattice::<f32, _>::new(&ctx, &grid);

    let region = ctx.region();
    let _ = lattice.view(&region);
    assert!(matches!(lattice.try_resize(2), Err(LatticeError::AccessorInUse)));
    assert!(matches!(lattice.try_reset(&other), Err(LatticeError::AccessorInUse)));
    assert_eq!(lattice.grid(), &grid);
    assert_eq!(lattice.osites(), 4);
    drop(region);

    assert!(lattice.try_resize(2).is_ok());
    assert_registry_clean(&ctx);
}

#[test]
fn test_convert_from() -> lattice_core::Result<()> {
    let ctx = host_ctx(2);
    let grid = FlatGrid::shared(3);
    let narrow = lattice(&ctx, &grid, &[1.5f32, -2.0, 8.25], Parity::Odd);

    let mut wide = Lattice::<f64, _>::new(&ctx, &grid);
    wide.try_convert_from(&narrow)?;
    assert_eq!(wide.to_vec(), vec![1.5, -2.0, 8.25]);
    assert_eq!(wide.checkerboard(), Parity::Odd);
    Ok(())
}

#[test]
fn test_bulk_host_interop() -> lattice_core::Result<()> {
    let (ctx, backend) = staged_ctx();
    let grid = FlatGrid::shared(5);
    let mut lattice = Lattice::<i32, _>::try_new(&ctx, &grid)?;

    lattice.copy_from_slice(&[5, 4, 3, 2, 1])?;
    assert_eq!(lattice.to_vec(), vec![5, 4, 3, 2, 1]);
    assert!(backend.uploads() >= 1);
    assert!(matches!(
        lattice.copy_from_slice(&[1, 2]),
        Err(LatticeError::SizeMismatch { expected: 5, actual: 2 })
    ));
    assert!(matches!(
        Lattice::from_slice(&ctx, &grid, &[0i32; 4]),
        Err(LatticeError::SizeMismatch { expected: 5, actual: 4 })
    ));
    assert_registry_clean(&ctx);
    Ok(())
}

#[test]
fn test_poke_respects_parity() -> lattice_core::Result<()> {
    let ctx = host_ctx(1);
    let grid = FlatGrid::shared(4);
    let mut odd = lattice(&ctx, &grid, &[0u16; 4], Parity::Odd);

    odd.try_poke(3, 42)?;
    assert_eq!(odd.try_peek(3)?, 42);
    assert!(matches!(
        odd.try_poke(2, 1),
        Err(LatticeError::ParityViolation { site: 2, .. })
    ));

    // Full containers admit every site
    odd.set_checkerboard(Parity::Full);
    odd.try_poke(2, 7)?;
    assert_eq!(odd.to_vec(), vec![0, 0, 7, 42]);
    Ok(())
}

#[test]
fn test_complex_sites() -> lattice_core::Result<()> {
    let ctx = host_ctx(2);
    let grid = FlatGrid::shared(3);
    let z = lattice(
        &ctx,
        &grid,
        &[Complex64::new(1.0, 1.0), Complex64::new(0.0, 2.0), Complex64::new(-1.0, 0.5)],
        Parity::Even,
    );
    let w = lattice(&ctx, &grid, &[Complex64::new(2.0, 0.0); 3], Parity::Even);

    let out = Lattice::try_from_expr(&z * &w + &z)?;
    assert_eq!(
        out.to_vec(),
        vec![Complex64::new(3.0, 3.0), Complex64::new(0.0, 6.0), Complex64::new(-3.0, 1.5)]
    );
    Ok(())
}

#[test]
#[should_panic(expected = "Lattice::copy_from")]
fn test_fatal_copy_panics() {
    let ctx = host_ctx(1);
    let mut a = Lattice::<f32, _>::new(&ctx, &FlatGrid::shared(2));
    let b = Lattice::<f32, _>::new(&ctx, &FlatGrid::shared(2));
    a.copy_from(&b);
}
