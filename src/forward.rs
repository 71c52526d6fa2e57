//! Dead-lettering for frames whose handler failed.
//!
//! When a message handler fails, the offending frame is forwarded to an
//! error destination before the failure is surfaced to the caller, so the
//! broker-side queue keeps draining while the poisoned frame stays
//! inspectable.

/// Client capability of forwarding a frame to an error destination.
///
/// Forwarding is fire-and-forget: implementations enqueue the frame (with
/// the failure that condemned it) and return without waiting for a broker
/// acknowledgment.
pub trait ErrorSink {
    /// The frame type moved to the error destination.
    type Frame;
    /// The failure type that condemned the frame.
    type Failure;

    /// Forward `frame` to `destination`, annotated with `failure`.
    fn send_to_error_destination(
        &self,
        failure: &Self::Failure,
        frame: &Self::Frame,
        destination: &str,
    );
}

/// Forward `frame` to the error destination, then surface `failure`.
///
/// # Errors
///
/// Always fails with `failure`; the forwarding happens on the way out.
pub fn forward_and_raise<T, C>(
    client: &C,
    failure: C::Failure,
    frame: &C::Frame,
    destination: &str,
) -> Result<T, C::Failure>
where
    C: ErrorSink + ?Sized,
{
    tracing::warn!(destination, "forwarding failed frame to error destination");
    client.send_to_error_destination(&failure, frame, destination);
    Err(failure)
}
