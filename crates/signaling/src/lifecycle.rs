//! ConnectionLifecycleManager – Konnektivitaet und genau ein Abbau pro Session
//!
//! Projiziert das Konnektivitaetssignal des Transports auf den
//! `ConnectionState`, meldet entfernte Medien genau einmal und stellt sicher,
//! dass der Abbau einer Session unabhaengig vom Ausloeser nur einmal
//! durchlaufen wird. Ein automatischer Wiederaufbau findet nicht statt.

use roulette_core::event::RemoteMedia;
use roulette_core::types::ConnectionState;

use crate::transport::IceVerbindungsZustand;

/// Ausloeser eines Session-Abbaus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownGrund {
    /// Nutzer hat die Suche beendet
    Explizit,
    /// Oberflaeche wurde verlassen
    Navigation,
    /// Verhandlungsschritt fehlgeschlagen
    VerhandlungFehlgeschlagen(String),
    /// Transport meldet einen terminalen Zustand
    VerbindungVerloren(ConnectionState),
    /// Partner hat den Session-Kanal verlassen
    PartnerVerlassen,
    /// Partner ist dem Session-Kanal nicht rechtzeitig beigetreten
    PartnerNichtErschienen,
}

impl TeardownGrund {
    /// Kurzkennung fuer Metrik-Labels
    pub fn kennung(&self) -> &'static str {
        match self {
            Self::Explizit => "explizit",
            Self::Navigation => "navigation",
            Self::VerhandlungFehlgeschlagen(_) => "verhandlung_fehlgeschlagen",
            Self::VerbindungVerloren(_) => "verbindung_verloren",
            Self::PartnerVerlassen => "partner_verlassen",
            Self::PartnerNichtErschienen => "partner_nicht_erschienen",
        }
    }
}

impl std::fmt::Display for TeardownGrund {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VerhandlungFehlgeschlagen(m) => write!(f, "{}: {m}", self.kennung()),
            Self::VerbindungVerloren(z) => write!(f, "{}: {z:?}", self.kennung()),
            andere => f.write_str(andere.kennung()),
        }
    }
}

/// Reaktion, die der Orchestrator auf ein Konnektivitaetsereignis ausfuehrt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAktion {
    Keine,
    Verbindend,
    Verbunden { remote: Option<RemoteMedia> },
    Abbauen(TeardownGrund),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbbauStatus {
    Keiner,
    Laeuft,
    Abgeschlossen,
}

/// Verfolgt den Verbindungszustand der aktuellen Session
#[derive(Debug)]
pub struct ConnectionLifecycleManager {
    generation: Option<u64>,
    zustand: ConnectionState,
    remote: Option<RemoteMedia>,
    remote_gemeldet: bool,
    abbau: AbbauStatus,
}

impl Default for ConnectionLifecycleManager {
    fn default() -> Self {
        Self::neu()
    }
}

impl ConnectionLifecycleManager {
    pub fn neu() -> Self {
        Self {
            generation: None,
            zustand: ConnectionState::New,
            remote: None,
            remote_gemeldet: false,
            abbau: AbbauStatus::Keiner,
        }
    }

    /// Beginnt die Beobachtung einer neuen Session
    pub fn neue_sitzung(&mut self, generation: u64) {
        self.generation = Some(generation);
        self.zustand = ConnectionState::New;
        self.remote = None;
        self.remote_gemeldet = false;
        self.abbau = AbbauStatus::Keiner;
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn zustand(&self) -> ConnectionState {
        self.zustand
    }

    pub fn ist_verbunden(&self) -> bool {
        self.zustand == ConnectionState::Connected
    }

    pub fn remote_gemeldet(&self) -> bool {
        self.remote_gemeldet
    }

    /// Wertet einen Konnektivitaetswechsel des Transports aus
    pub fn konnektivitaet(&mut self, roh: IceVerbindungsZustand) -> LifecycleAktion {
        if self.generation.is_none() || self.abbau != AbbauStatus::Keiner {
            return LifecycleAktion::Keine;
        }
        let neu = roh.projizieren();
        if neu == self.zustand {
            return LifecycleAktion::Keine;
        }
        tracing::debug!(von = ?self.zustand, nach = ?neu, "Verbindungszustand geaendert");
        self.zustand = neu;

        match neu {
            ConnectionState::Checking => LifecycleAktion::Verbindend,
            ConnectionState::Connected => LifecycleAktion::Verbunden {
                remote: self.remote_melden(),
            },
            z if z.ist_terminal() => LifecycleAktion::Abbauen(TeardownGrund::VerbindungVerloren(z)),
            _ => LifecycleAktion::Keine,
        }
    }

    /// Nimmt eine entfernte Spur entgegen
    ///
    /// Liefert die entfernten Medien genau einmal, sobald die Verbindung
    /// steht.
    pub fn remote_track(&mut self, stream_id: &str, track_id: &str) -> Option<RemoteMedia> {
        if self.generation.is_none() || self.abbau != AbbauStatus::Keiner {
            return None;
        }
        let media = self.remote.get_or_insert_with(|| RemoteMedia {
            stream_id: stream_id.to_string(),
            track_ids: Vec::new(),
        });
        if !media.track_ids.iter().any(|t| t == track_id) {
            media.track_ids.push(track_id.to_string());
        }

        if self.ist_verbunden() {
            self.remote_melden()
        } else {
            None
        }
    }

    /// Beansprucht den Abbau der aktuellen Session
    ///
    /// Gibt nur beim ersten Aufruf pro Session true zurueck.
    pub fn abbau_beginnen(&mut self) -> bool {
        if self.generation.is_none() || self.abbau != AbbauStatus::Keiner {
            return false;
        }
        self.abbau = AbbauStatus::Laeuft;
        true
    }

    pub fn abbau_abschliessen(&mut self) {
        self.zustand = ConnectionState::Closed;
        self.abbau = AbbauStatus::Abgeschlossen;
    }

    fn remote_melden(&mut self) -> Option<RemoteMedia> {
        if self.remote_gemeldet {
            return None;
        }
        let media = self.remote.clone()?;
        self.remote_gemeldet = true;
        Some(media)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zustaende_werden_projiziert() {
        let mut lm = ConnectionLifecycleManager::neu();
        lm.neue_sitzung(1);

        assert_eq!(
            lm.konnektivitaet(IceVerbindungsZustand::Checking),
            LifecycleAktion::Verbindend
        );
        assert_eq!(
            lm.konnektivitaet(IceVerbindungsZustand::Connected),
            LifecycleAktion::Verbunden { remote: None }
        );
        // Completed nach Connected aendert nichts
        assert_eq!(
            lm.konnektivitaet(IceVerbindungsZustand::Completed),
            LifecycleAktion::Keine
        );
        assert_eq!(
            lm.konnektivitaet(IceVerbindungsZustand::Disconnected),
            LifecycleAktion::Abbauen(TeardownGrund::VerbindungVerloren(
                ConnectionState::Disconnected
            ))
        );
    }

    #[test]
    fn remote_media_genau_einmal() {
        let mut lm = ConnectionLifecycleManager::neu();
        lm.neue_sitzung(1);

        assert!(lm.remote_track("s", "audio").is_none());
        assert!(lm.remote_track("s", "video").is_none());

        match lm.konnektivitaet(IceVerbindungsZustand::Connected) {
            LifecycleAktion::Verbunden { remote: Some(media) } => {
                assert_eq!(media.stream_id, "s");
                assert_eq!(media.track_ids, vec!["audio", "video"]);
            }
            andere => panic!("Verbunden mit Medien erwartet: {andere:?}"),
        }
        assert!(lm.remote_track("s", "audio").is_none());
        assert!(lm.remote_gemeldet());
    }

    #[test]
    fn spur_nach_verbindung_wird_sofort_gemeldet() {
        let mut lm = ConnectionLifecycleManager::neu();
        lm.neue_sitzung(3);
        lm.konnektivitaet(IceVerbindungsZustand::Connected);
        assert!(lm.remote_track("s", "audio").is_some());
        assert!(lm.remote_track("s", "video").is_none());
    }

    #[test]
    fn abbau_nur_einmal_pro_session() {
        let mut lm = ConnectionLifecycleManager::neu();
        assert!(!lm.abbau_beginnen(), "Ohne Session kein Abbau");

        lm.neue_sitzung(1);
        assert!(lm.abbau_beginnen());
        assert!(!lm.abbau_beginnen());
        lm.abbau_abschliessen();
        assert!(!lm.abbau_beginnen());
        assert_eq!(lm.zustand(), ConnectionState::Closed);

        // Nach dem Abbau werden Transportereignisse ignoriert
        assert_eq!(
            lm.konnektivitaet(IceVerbindungsZustand::Failed),
            LifecycleAktion::Keine
        );

        lm.neue_sitzung(2);
        assert!(lm.abbau_beginnen());
    }
}
