use core::fmt;

/// Sink for the lazy map's diagnostic records.
///
/// The map emits exactly one kind of record today: an informational note
/// when a cell it wants to drop is unexpectedly absent. Implement this to
/// route such records somewhere other than the `log` facade.
pub trait LogSink: Send + Sync {
  fn info(&self, message: fmt::Arguments<'_>);
}

/// The default sink, forwarding to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
  fn info(&self, message: fmt::Arguments<'_>) {
    log::info!("{}", message);
  }
}
