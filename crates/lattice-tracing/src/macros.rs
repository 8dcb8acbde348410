//! Span and event shorthands used on dispatch paths

/// [`crate::performance::PerformanceSpan`] reporting inside a `perf` debug
/// span that carries the given fields.
///
/// ```rust
/// use lattice_tracing::perf_span;
///
/// let blocks = 128u64;
/// {
///     let _span = perf_span!("for_accelerator", sites = 1024, blocks = blocks);
///     // launch
/// }
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr $(, $field:ident = $value:expr)* $(,)?) => {
        $crate::performance::PerformanceSpan::attached(
            $name,
            $crate::tracing::debug_span!("perf", name = $name $(, $field = $value)*),
        )
    };
}

/// Debug event tagged `event = $name`.
///
/// ```rust
/// use lattice_tracing::perf_event;
///
/// perf_event!("accessor_bind", elements = 16, bytes = 128);
/// ```
#[macro_export]
macro_rules! perf_event {
    ($name:expr $(, $field:ident = $value:expr)* $(,)?) => {
        $crate::tracing::debug!(event = $name $(, $field = $value)*)
    };
}
