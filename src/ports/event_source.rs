//! Event Source Port - Incremental Contract Event Streams
//!
//! One implementor per logical stream (contract address + event).
//! Sources own their cursor and node-side filter privately; nothing
//! is shared between streams.

use async_trait::async_trait;

use crate::domain::event::{EventKind, EventRecord};
use crate::error::SourceError;

/// Trait for "give me the events since the last call" sources.
#[async_trait]
pub trait EventSource: Send + Sync + 'static {
  /// Stream label for logs and metrics.
  fn stream(&self) -> &'static str;

  /// The single event kind this source yields.
  fn kind(&self) -> EventKind;

  /// Return events observed since the previous call, in chain order.
  ///
  /// Fails with `SourceError::Unavailable` on any transport or filter
  /// error. A failed call does not advance the cursor.
  async fn poll(&mut self) -> Result<Vec<EventRecord>, SourceError>;

  /// Recreate whatever node-side state `poll` depends on.
  ///
  /// Sources never call this themselves; the poller does after a
  /// failed `poll`. Events emitted while the source was broken are
  /// not recovered.
  async fn reinstall(&mut self) -> Result<(), SourceError> {
    Ok(())
  }

  /// Number of raw logs dropped as undecodable since the last call.
  /// The poller counts them as handler errors for this stream.
  fn take_rejected(&mut self) -> usize {
    0
  }
}
