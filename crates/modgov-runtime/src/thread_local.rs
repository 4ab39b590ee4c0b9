use std::any::Any;

/// Pluggable thread-local context propagation across a suspension point
/// (spec §6, §9: "implementations for specific runtimes can be plugged
/// without changing the kernel"). The snapshot is opaque to the kernel.
pub trait ThreadLocalPropagator: Send + Sync + 'static {
    fn capture(&self) -> Box<dyn Any + Send>;
    fn restore(&self, snapshot: Box<dyn Any + Send>);
}
