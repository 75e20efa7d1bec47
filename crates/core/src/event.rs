//! Benachrichtigungen an die Praesentationsschicht
//!
//! Der Orchestrator versendet diese Ereignisse ueber einen tokio-Kanal.
//! Die Oberflaeche (nicht Teil dieses Workspaces) rendert sie.

use crate::error::{FehlerArt, RouletteError};
use crate::types::{ClientId, ConnectionState};
use serde::{Deserialize, Serialize};

/// Beschreibung der entfernten Medienspuren einer Session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMedia {
    /// Stream-Kennung des Transports
    pub stream_id: String,
    /// Kennungen der empfangenen Spuren
    pub track_ids: Vec<String>,
}

/// Alle Ereignisse, die an die Oberflaeche gemeldet werden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentationEvent {
    /// Client ist dem Warteraum beigetreten
    SucheGestartet,
    /// Suche wurde beendet (explizit oder nach einem Abbau)
    SucheGestoppt,
    /// Aktueller Partner hat sich geaendert (`None` = kein Partner)
    PartnerGeaendert { partner: Option<ClientId> },
    /// Verbindungszustand der aktuellen Session
    VerbindungsStatus { zustand: ConnectionState },
    /// Fehler mit beschreibender Nachricht und Wiederholungs-Hinweis
    Verbindungsfehler {
        art: FehlerArt,
        nachricht: String,
        wiederholbar: bool,
    },
    /// Entfernte Medien stehen zur Anzeige bereit
    RemoteMediaVerfuegbar { media: RemoteMedia },
}

impl PresentationEvent {
    /// Baut ein Fehler-Ereignis aus einem `RouletteError`
    pub fn aus_fehler(fehler: &RouletteError) -> Self {
        Self::Verbindungsfehler {
            art: fehler.art(),
            nachricht: fehler.to_string(),
            wiederholbar: fehler.ist_wiederholbar(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ist_serde_kompatibel() {
        let event = PresentationEvent::PartnerGeaendert {
            partner: Some(ClientId::from("bob")),
        };
        let json = serde_json::to_string(&event).unwrap();
        let zurueck: PresentationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, event);
    }

    #[test]
    fn fehler_ereignis_traegt_wiederholbarkeit() {
        let e = RouletteError::KanalWechsel("CHANNEL_ERROR".into());
        match PresentationEvent::aus_fehler(&e) {
            PresentationEvent::Verbindungsfehler {
                art,
                nachricht,
                wiederholbar,
            } => {
                assert_eq!(art, FehlerArt::KanalWechsel);
                assert!(nachricht.contains("CHANNEL_ERROR"));
                assert!(wiederholbar);
            }
            other => panic!("Unerwartetes Ereignis: {other:?}"),
        }
    }
}
