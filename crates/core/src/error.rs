//! Fehlertypen fuer Roulette
//!
//! Zentraler Fehler-Enum, der die fuer die Praesentationsschicht sichtbaren
//! Fehlerklassen abdeckt. Die Untercrates definieren eigene Fehler und
//! konvertieren sie an der Grenze zur Oberflaeche in `RouletteError`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Globaler Result-Alias fuer Roulette
pub type Result<T> = std::result::Result<T, RouletteError>;

/// Klassifikation eines Fehlers, wie sie an die Oberflaeche gemeldet wird
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FehlerArt {
    /// Beitritt zu Warteraum oder Session-Kanal hat den Bereitzustand nicht erreicht
    RelayAbonnement,
    /// Verhandlungsschritt vor Bereitschaft der lokalen Medien
    RessourceNichtBereit,
    /// Beschreibung oder Kandidat wurde vom Transport abgelehnt
    VerhandlungsSchritt,
    /// Wechsel vom Warteraum in den Session-Kanal fehlgeschlagen
    KanalWechsel,
    /// Verbindung ist nach erfolgreicher Verhandlung abgebrochen
    VerbindungVerloren,
    /// Alles andere
    Intern,
}

/// Alle moeglichen Fehler im Roulette-System
#[derive(Debug, Error)]
pub enum RouletteError {
    // --- Relay ---
    #[error("Relay-Abonnement fehlgeschlagen: {0}")]
    RelayAbonnement(String),

    #[error("Kanalwechsel fehlgeschlagen: {0}")]
    KanalWechsel(String),

    // --- Verhandlung ---
    #[error("Lokale Medien noch nicht bereit")]
    RessourceNichtBereit,

    #[error("Verhandlungsschritt fehlgeschlagen: {0}")]
    VerhandlungsSchritt(String),

    #[error("Verbindung verloren: {0}")]
    VerbindungVerloren(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl RouletteError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Ordnet den Fehler einer an die Oberflaeche gemeldeten Klasse zu
    pub fn art(&self) -> FehlerArt {
        match self {
            Self::RelayAbonnement(_) => FehlerArt::RelayAbonnement,
            Self::KanalWechsel(_) => FehlerArt::KanalWechsel,
            Self::RessourceNichtBereit => FehlerArt::RessourceNichtBereit,
            Self::VerhandlungsSchritt(_) => FehlerArt::VerhandlungsSchritt,
            Self::VerbindungVerloren(_) => FehlerArt::VerbindungVerloren,
            Self::Konfiguration(_) | Self::Intern(_) | Self::Anyhow(_) => FehlerArt::Intern,
        }
    }

    /// Gibt true zurueck wenn ein erneuter Suchversuch sinnvoll ist
    ///
    /// Alle sitzungsbezogenen Fehler setzen das Matchmaking zurueck, daher
    /// ist nach ihnen eine neue Suche moeglich. Nur Konfigurationsfehler
    /// erfordern einen Eingriff.
    pub fn ist_wiederholbar(&self) -> bool {
        !matches!(self, Self::Konfiguration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = RouletteError::RelayAbonnement("TIMED_OUT".into());
        assert_eq!(e.to_string(), "Relay-Abonnement fehlgeschlagen: TIMED_OUT");
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(RouletteError::KanalWechsel("test".into()).ist_wiederholbar());
        assert!(RouletteError::VerhandlungsSchritt("sdp".into()).ist_wiederholbar());
        assert!(!RouletteError::Konfiguration("test".into()).ist_wiederholbar());
    }

    #[test]
    fn art_zuordnung() {
        assert_eq!(
            RouletteError::RessourceNichtBereit.art(),
            FehlerArt::RessourceNichtBereit
        );
        assert_eq!(RouletteError::intern("x").art(), FehlerArt::Intern);
    }

    #[test]
    fn art_ist_snake_case() {
        let json = serde_json::to_string(&FehlerArt::VerhandlungsSchritt).unwrap();
        assert_eq!(json, "\"verhandlungs_schritt\"");
    }
}
