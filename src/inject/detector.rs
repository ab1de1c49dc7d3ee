//! Detection of a trigger marker in a chunked byte stream

use super::InjectionError;
use bytes::Bytes;

/// A scanner that reports when a fixed marker appears in a stream delivered
/// as arbitrarily sized chunks.
///
/// Successive calls to `scan` see one contiguous byte sequence, so a marker
/// split across two (or many) reads is detected exactly as if it had arrived
/// in a single read. The detector is single-shot: once it has fired, the
/// match progress is frozen and every later call returns `None`, even if the
/// marker appears again.
#[derive(Debug, Clone)]
pub struct TriggerDetector {
    marker: Bytes,

    /// `fallback[i]` is the length of the longest proper prefix of
    /// `marker[..=i]` which is also a suffix of it
    fallback: Vec<usize>,

    /// The number of marker bytes matched, ending at the last scanned byte
    matched: usize,

    fired: bool,
}

impl TriggerDetector {
    /// Create a new detector for the given marker, which must not be empty
    pub fn new(marker: Bytes) -> Result<Self, InjectionError> {
        if marker.is_empty() {
            return Err(InjectionError::EmptyMarker);
        }

        Ok(Self::from_marker(marker))
    }

    /// Create a detector for a marker already known to be non-empty
    pub(crate) fn from_marker(marker: Bytes) -> Self {
        let fallback = fallback_table(&marker);

        Self {
            marker,
            fallback,
            matched: 0,
            fired: false,
        }
    }

    /// Feed the next chunk of the stream to the detector. If the marker is
    /// completed by this chunk, the offset just past its last byte within
    /// `chunk` is returned. At most one call over the lifetime of the
    /// detector returns `Some`.
    pub fn scan(&mut self, chunk: &[u8]) -> Option<usize> {
        if self.fired {
            return None;
        }

        for (i, &byte) in chunk.iter().enumerate() {
            // fall back to the longest partial match the byte can extend
            while self.matched > 0 && self.marker[self.matched] != byte {
                self.matched = self.fallback[self.matched - 1];
            }

            if self.marker[self.matched] == byte {
                self.matched += 1;
            }

            if self.matched == self.marker.len() {
                self.fired = true;
                return Some(i + 1);
            }
        }

        None
    }

    /// Get the number of marker bytes matched so far
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Check whether the detector has already fired
    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

fn fallback_table(marker: &[u8]) -> Vec<usize> {
    let mut table = vec![0; marker.len()];
    let mut len = 0;

    for i in 1..marker.len() {
        while len > 0 && marker[i] != marker[len] {
            len = table[len - 1];
        }

        if marker[i] == marker[len] {
            len += 1;
        }

        table[i] = len;
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const NEWKEYS: &[u8] = b"\x00\x00\x00\x0c\x0a\x15";

    fn detector() -> TriggerDetector {
        TriggerDetector::new(Bytes::from_static(NEWKEYS)).unwrap()
    }

    #[test]
    fn test_marker_in_one_chunk() {
        let mut d = detector();
        assert_eq!(d.scan(b"abc\x00\x00\x00\x0c\x0a\x15def"), Some(9));
        assert!(d.has_fired());
    }

    #[test]
    fn test_marker_alone() {
        let mut d = detector();
        assert_eq!(d.scan(NEWKEYS), Some(NEWKEYS.len()));
    }

    #[test]
    fn test_every_two_way_split() {
        for split in 1..NEWKEYS.len() {
            let mut d = detector();
            assert_eq!(d.scan(&NEWKEYS[..split]), None, "split at {}", split);
            assert_eq!(d.matched(), split);
            assert_eq!(
                d.scan(&NEWKEYS[split..]),
                Some(NEWKEYS.len() - split),
                "split at {}",
                split
            );
        }
    }

    #[test]
    fn test_byte_by_byte() {
        let mut d = detector();
        let hits = NEWKEYS
            .iter()
            .map(|b| d.scan(&[*b]))
            .collect::<Vec<_>>();

        assert!(hits[..NEWKEYS.len() - 1].iter().all(Option::is_none));
        assert_eq!(hits[NEWKEYS.len() - 1], Some(1));
    }

    #[test]
    fn test_all_partitions_fire_once() {
        // every way of cutting the marker into consecutive non-empty chunks
        let cuts = NEWKEYS.len() - 1;
        for mask in 0u32..(1 << cuts) {
            let mut d = detector();
            let mut start = 0;
            let mut fired = 0;

            for i in 0..NEWKEYS.len() {
                let last = i == NEWKEYS.len() - 1;
                if last || mask & (1 << i) != 0 {
                    let hit = d.scan(&NEWKEYS[start..=i]);
                    if hit.is_some() {
                        assert!(last, "fired early for mask {:b}", mask);
                        fired += 1;
                    }
                    start = i + 1;
                }
            }

            assert_eq!(fired, 1, "mask {:b}", mask);
        }
    }

    #[test]
    fn test_single_shot() {
        let mut d = detector();
        assert!(d.scan(NEWKEYS).is_some());
        assert_eq!(d.scan(NEWKEYS), None);
        assert_eq!(d.matched(), NEWKEYS.len());
    }

    #[test]
    fn test_mismatch_resets_progress() {
        let mut d = detector();
        assert_eq!(d.scan(b"\x00\x00\x00\x0c\xff"), None);
        assert_eq!(d.matched(), 0);
        assert_eq!(d.scan(b"\x0a\x15"), None);
        assert!(!d.has_fired());
    }

    #[test]
    fn test_restart_on_overlapping_prefix() {
        // the run of zeroes overlaps the marker's own prefix
        let mut d = detector();
        assert_eq!(d.scan(b"\x00\x00\x00\x00"), None);
        assert_eq!(d.matched(), 3);
        assert_eq!(d.scan(b"\x0c\x0a\x15"), Some(3));
    }

    #[test]
    fn test_self_overlapping_marker() {
        let mut d = TriggerDetector::new(Bytes::from_static(b"abab")).unwrap();
        assert_eq!(d.scan(b"aba"), None);
        assert_eq!(d.scan(b"cabab"), Some(5));

        let mut d = TriggerDetector::new(Bytes::from_static(b"aab")).unwrap();
        assert_eq!(d.scan(b"a"), None);
        assert_eq!(d.scan(b"a"), None);
        assert_eq!(d.scan(b"a"), None);
        assert_eq!(d.scan(b"b"), Some(1));
    }

    #[test]
    fn test_fallback_table() {
        assert_eq!(fallback_table(b"abab"), vec![0, 0, 1, 2]);
        assert_eq!(fallback_table(NEWKEYS), vec![0, 1, 2, 0, 0, 0]);
    }

    #[test]
    fn test_empty_marker_rejected() {
        assert_matches!(
            TriggerDetector::new(Bytes::new()),
            Err(InjectionError::EmptyMarker)
        );
    }
}
