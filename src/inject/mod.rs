//! Trigger detection and payload injection for the client-to-server stream

mod detector;
mod policy;
pub mod presets;

pub use self::detector::TriggerDetector;
pub use self::policy::InjectionPolicy;

use bytes::Bytes;
use failure_derive::Fail;

/// An error constructing an `Injection`
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
pub enum InjectionError {
    /// The trigger marker was empty, so it could never be detected
    #[fail(display = "trigger marker may not be empty")]
    EmptyMarker,
}

/// An immutable marker and payload pair. When the marker is seen in the
/// client's stream, the payload is spliced into the stream sent to the
/// server. Both are opaque byte sequences; neither is parsed or validated
/// beyond the marker being non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    marker: Bytes,
    payload: Bytes,
}

impl Injection {
    /// Create a new injection from the given trigger `marker` and `payload`
    pub fn new(
        marker: impl Into<Bytes>,
        payload: impl Into<Bytes>,
    ) -> Result<Self, InjectionError> {
        let marker = marker.into();

        if marker.is_empty() {
            Err(InjectionError::EmptyMarker)
        } else {
            Ok(Self::from_parts(marker, payload.into()))
        }
    }

    pub(crate) fn from_parts(marker: Bytes, payload: Bytes) -> Self {
        debug_assert!(!marker.is_empty());
        Self { marker, payload }
    }

    /// Get the trigger marker
    pub fn marker(&self) -> &[u8] {
        &self.marker
    }

    /// Get the payload injected when the marker is detected
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Create fresh per-session state for this injection
    pub fn splicer(&self) -> Splicer {
        Splicer {
            detector: TriggerDetector::from_marker(self.marker.clone()),
            policy: InjectionPolicy::new(self.payload.clone()),
        }
    }
}

/// The detector and policy pair consulted by a pump for every chunk it
/// forwards. Each session gets its own.
#[derive(Debug, Clone)]
pub struct Splicer {
    detector: TriggerDetector,
    policy: InjectionPolicy,
}

impl Splicer {
    /// Scan `chunk` for the trigger marker and get the chunks to write, in
    /// order, in its place.
    pub fn process(&mut self, chunk: Bytes) -> Vec<Bytes> {
        let triggered = self.detector.scan(&chunk).is_some();
        self.policy.on_chunk_forward(chunk, triggered)
    }

    /// Check whether the payload has been injected
    pub fn has_injected(&self) -> bool {
        self.policy.has_fired()
    }

    /// Get the length of the injected payload
    pub fn payload_len(&self) -> usize {
        self.policy.payload().len()
    }
}
