//! The rule deciding what is actually written for each forwarded chunk

use bytes::Bytes;

/// Decides which chunks to write in place of a chunk read from the client.
///
/// The payload is injected exactly once, directly in front of the chunk that
/// completed the trigger marker. The triggering chunk itself is always
/// forwarded whole and unmodified, including any bytes that follow the
/// marker.
#[derive(Debug, Clone)]
pub struct InjectionPolicy {
    payload: Bytes,
    fired: bool,
}

impl InjectionPolicy {
    /// Create a new policy that will inject `payload`
    pub fn new(payload: Bytes) -> Self {
        Self {
            payload,
            fired: false,
        }
    }

    /// Get the chunks to write, in order, in place of `raw`. `triggered`
    /// indicates whether the trigger marker was completed by `raw`.
    pub fn on_chunk_forward(&mut self, raw: Bytes, triggered: bool) -> Vec<Bytes> {
        if triggered && !self.fired {
            self.fired = true;
            vec![self.payload.clone(), raw]
        } else {
            vec![raw]
        }
    }

    /// Check whether the payload has been injected
    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Get the payload this policy injects
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_without_trigger() {
        let mut policy = InjectionPolicy::new(Bytes::from_static(b"forged"));
        let out = policy.on_chunk_forward(Bytes::from_static(b"hello"), false);

        assert_eq!(out, vec![Bytes::from_static(b"hello")]);
        assert!(!policy.has_fired());
    }

    #[test]
    fn test_payload_precedes_trigger_chunk() {
        let mut policy = InjectionPolicy::new(Bytes::from_static(b"forged"));
        let out = policy.on_chunk_forward(Bytes::from_static(b"marker+tail"), true);

        assert_eq!(
            out,
            vec![
                Bytes::from_static(b"forged"),
                Bytes::from_static(b"marker+tail")
            ]
        );
        assert!(policy.has_fired());
    }

    #[test]
    fn test_injects_only_once() {
        let mut policy = InjectionPolicy::new(Bytes::from_static(b"forged"));
        assert_eq!(policy.on_chunk_forward(Bytes::from_static(b"a"), true).len(), 2);

        let out = policy.on_chunk_forward(Bytes::from_static(b"b"), true);
        assert_eq!(out, vec![Bytes::from_static(b"b")]);
    }
}
