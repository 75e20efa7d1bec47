//! roulette-core – Gemeinsame Typen, Ereignisse und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Roulette-Crates gemeinsam genutzt werden: Client-Identitaeten,
//! die deterministische Paarungsentscheidung, den Verbindungszustand und
//! die Benachrichtigungen an die Praesentationsschicht.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, RouletteError};
pub use event::PresentationEvent;
pub use types::{ClientId, ConnectionState, PairingDecision, SessionChannelId};
