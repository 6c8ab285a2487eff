use crate::error::Error;

/// The outbound encoding seam between the registry and its transports.
///
/// A frame is one encoded message on the wire: one `text/event-stream` event
/// block, or one WebSocket message. The registry treats the encoded bytes as
/// opaque; each broker crate implements this trait for its message shape.
///
/// Encoding runs under the target connection's send lock, so implementations
/// must not block on I/O or take registry locks.
pub trait Frame: Send + Sync {
    /// Produce the on-wire representation of this message.
    ///
    /// Failures surface as [`ErrorKind::Encoding`](crate::ErrorKind::Encoding)
    /// and are treated as a delivery failure for the target, not a transport
    /// death.
    fn encode(&self) -> Result<Vec<u8>, Error>;
}
