//! The relay: listener, sessions and the pumps that move bytes between the
//! client and the server.

mod pump;
mod relay;
mod session;
mod stream;

pub use self::pump::{Direction, Pump, PumpEnd, PumpReport, BUFFER_SIZE};
pub use self::relay::{BoundRelay, Relay, RelayBuilder, RelayStats};
pub use self::session::{Session, SessionCloser, SessionReport};
pub use self::stream::SharedStream;
