//! Verhandlungstransport und lokale Medien
//!
//! Der eigentliche Transport (Beschreibungen erzeugen und anwenden,
//! Kandidaten hinzufuegen, Spuren anhaengen) ist ein externer Mitarbeiter.
//! Ereignisse des Transports (lokale Kandidaten, Konnektivitaet, entfernte
//! Spuren) werden ueber einen mpsc-Sender zugestellt, den die Factory beim
//! Erstellen erhaelt.

use std::sync::Arc;

use async_trait::async_trait;
use roulette_core::types::ConnectionState;
use roulette_protocol::{IceCandidate, IceServer, SessionDescription};
use thiserror::Error;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Konnektivitaet
// ---------------------------------------------------------------------------

/// Rohzustand der ICE-Verbindung wie vom Transport gemeldet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceVerbindungsZustand {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceVerbindungsZustand {
    /// Projiziert den Rohzustand auf den oeffentlichen Verbindungszustand
    pub fn projizieren(self) -> ConnectionState {
        match self {
            Self::New => ConnectionState::New,
            Self::Checking => ConnectionState::Checking,
            Self::Connected | Self::Completed => ConnectionState::Connected,
            Self::Disconnected => ConnectionState::Disconnected,
            Self::Failed => ConnectionState::Failed,
            Self::Closed => ConnectionState::Closed,
        }
    }
}

/// Ereignisse, die ein Transport asynchron meldet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Lokal gesammelter Kandidat, der an den Partner gehen soll
    LokalerKandidat(IceCandidate),
    /// Konnektivitaet hat sich geaendert
    KonnektivitaetGeaendert(IceVerbindungsZustand),
    /// Entfernte Spur ist eingetroffen
    RemoteTrack { stream_id: String, track_id: String },
}

/// Ablehnung eines Transportschritts
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn neu(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

// ---------------------------------------------------------------------------
// Medien
// ---------------------------------------------------------------------------

/// Art einer Medienspur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Anhaengbare und stoppbare Medienspur
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    /// Beendet die Spur; wiederholte Aufrufe sind wirkungslos
    fn stop(&self);
    fn ist_gestoppt(&self) -> bool;
    /// Unabhaengige Kopie, die getrennt gestoppt werden kann
    fn klonen(&self) -> Arc<dyn MediaTrack>;
}

/// Opakes Handle auf lokal erfasste Medien
pub trait LocalMedia: Send + Sync {
    fn stream_id(&self) -> &str;
    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>>;
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Verhandlungstransport einer einzelnen Session
#[async_trait]
pub trait NegotiationTransport: Send {
    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError>;
    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError>;
    async fn set_local_description(&mut self, sdp: SessionDescription) -> Result<(), TransportError>;
    async fn set_remote_description(&mut self, sdp: SessionDescription) -> Result<(), TransportError>;
    async fn add_ice_candidate(&mut self, kandidat: IceCandidate) -> Result<(), TransportError>;
    fn add_track(&mut self, track: Arc<dyn MediaTrack>) -> Result<(), TransportError>;
    /// Gibt den Transport frei; danach werden keine Ereignisse mehr gemeldet
    async fn close(&mut self);
}

/// Erzeugt Transporte fuer neue Sessions
pub trait TransportFactory: Send + Sync {
    fn erstellen(
        &self,
        ice_server: &[IceServer],
        ereignisse: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn NegotiationTransport>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projektion_der_ice_zustaende() {
        assert_eq!(IceVerbindungsZustand::Checking.projizieren(), ConnectionState::Checking);
        assert_eq!(IceVerbindungsZustand::Completed.projizieren(), ConnectionState::Connected);
        assert!(IceVerbindungsZustand::Disconnected.projizieren().ist_terminal());
        assert!(IceVerbindungsZustand::Failed.projizieren().ist_terminal());
        assert!(!IceVerbindungsZustand::New.projizieren().ist_terminal());
    }
}
