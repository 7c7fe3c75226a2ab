//! Delivery transport for the Beacon dispatch pipeline.
//!
//! The worker hands an [`EncodedPayload`] to a [`Transport`] once per
//! candidate URL. The transport answers with the response body, or with a
//! [`TransportError`] whose [`is_recoverable`](TransportError::is_recoverable)
//! decides whether the batch is kept for a retry or dropped.

mod error;
mod http;
mod payload;
mod probe;

pub use error::{TransportError, TransportResult};
pub use http::{HttpTransport, MAX_RESPONSE_BYTES};
pub use payload::EncodedPayload;
pub use probe::{AlwaysOnline, ConnectivityProbe, TcpConnectivityProbe};

/// Sends encoded batches to a collection endpoint.
///
/// Implementations are owned by the dispatch worker thread.
pub trait Transport: Send {
    /// POST `payload` to `url`.
    ///
    /// `Ok(None)` means the endpoint answered without a body.
    fn perform_request(
        &self,
        url: &str,
        payload: &EncodedPayload,
    ) -> TransportResult<Option<Vec<u8>>>;

    /// Whether delivery should be attempted at all right now.
    fn is_online(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn perform_request(
        &self,
        url: &str,
        payload: &EncodedPayload,
    ) -> TransportResult<Option<Vec<u8>>> {
        (**self).perform_request(url, payload)
    }

    fn is_online(&self) -> bool {
        (**self).is_online()
    }
}
