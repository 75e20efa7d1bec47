//! roulette-protocol – Signaling-Protokoll-Definitionen
//!
//! Dieses Crate definiert den einzigen netzwerkseitigen Vertrag von
//! Roulette: den Signaling-Umschlag, der ueber den Session-Kanal
//! gebroadcastet wird, sowie die darin transportierten Beschreibungen und
//! Kandidaten.

pub mod error;
pub mod ice;
pub mod signal;

pub use error::{ProtocolError, ProtocolResult};
pub use ice::{IceCandidate, IceServer};
pub use signal::{SdpTyp, SessionDescription, Signal, SignalEnvelope, SignalTyp};
