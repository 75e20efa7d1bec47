//! Fehlertypen fuer Matchmaking und Verhandlung

use roulette_core::RouletteError;
use roulette_protocol::ProtocolError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Warteraum- oder Kanal-Abonnement hat den Bereitzustand nicht erreicht
    #[error("Relay-Abonnement fehlgeschlagen: {0}")]
    RelayAbonnement(String),

    /// Wechsel vom Warteraum in den Session-Kanal fehlgeschlagen
    #[error("Kanalwechsel fehlgeschlagen: {0}")]
    KanalWechsel(String),

    /// Verhandlungsschritt vor Bereitschaft der lokalen Medien
    #[error("Lokale Medien noch nicht bereit")]
    RessourceNichtBereit,

    /// Transport hat eine Beschreibung oder einen Kandidaten abgelehnt
    #[error("Verhandlungsschritt fehlgeschlagen: {0}")]
    VerhandlungsSchritt(String),

    /// Operation im aktuellen Zustand nicht erlaubt (wird abgelehnt)
    #[error("Ungueltiger Zustand: {0}")]
    UngueltigerZustand(String),

    /// Senden ohne aktiven Session-Kanal
    #[error("Kein aktiver Session-Kanal")]
    KeinKanal,

    /// Umschlag nicht dekodierbar
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtocolError),

    /// Relay-Abonnement hat nicht rechtzeitig geantwortet
    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    /// Senden fehlgeschlagen (Empfaenger geschlossen)
    #[error("Senden fehlgeschlagen")]
    SendFehler,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Zustandsfehler
    pub fn zustand(msg: impl Into<String>) -> Self {
        Self::UngueltigerZustand(msg.into())
    }

    /// Beendet der Fehler die aktuelle Session?
    ///
    /// Abgelehnte Operationen und Pufferungen lassen die Session bestehen.
    pub fn ist_sitzungsfatal(&self) -> bool {
        matches!(
            self,
            Self::VerhandlungsSchritt(_) | Self::KeinKanal | Self::SendFehler | Self::Intern(_)
        )
    }
}

impl From<SignalingError> for RouletteError {
    fn from(e: SignalingError) -> Self {
        match e {
            SignalingError::RelayAbonnement(m) => RouletteError::RelayAbonnement(m),
            SignalingError::Zeitlimit(m) => RouletteError::RelayAbonnement(format!("Zeitlimit: {m}")),
            SignalingError::KanalWechsel(m) => RouletteError::KanalWechsel(m),
            SignalingError::RessourceNichtBereit => RouletteError::RessourceNichtBereit,
            SignalingError::VerhandlungsSchritt(m) => RouletteError::VerhandlungsSchritt(m),
            andere => RouletteError::Intern(andere.to_string()),
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use roulette_core::error::FehlerArt;

    #[test]
    fn fatale_fehler() {
        assert!(SignalingError::VerhandlungsSchritt("sdp".into()).ist_sitzungsfatal());
        assert!(!SignalingError::RessourceNichtBereit.ist_sitzungsfatal());
        assert!(!SignalingError::zustand("doppelt").ist_sitzungsfatal());
    }

    #[test]
    fn konvertierung_in_roulette_fehler() {
        let e: RouletteError = SignalingError::Zeitlimit("public:waiting_pool".into()).into();
        assert_eq!(e.art(), FehlerArt::RelayAbonnement);
        let e: RouletteError = SignalingError::KanalWechsel("CLOSED".into()).into();
        assert_eq!(e.art(), FehlerArt::KanalWechsel);
    }

    #[test]
    fn sitzungsfehler_erlauben_neue_suche() {
        // Der Wiederholungs-Hinweis kommt allein aus RouletteError
        for fehler in [
            SignalingError::VerhandlungsSchritt("sdp".into()),
            SignalingError::KanalWechsel("TIMED_OUT".into()),
            SignalingError::Zeitlimit("public:waiting_pool".into()),
            SignalingError::SendFehler,
        ] {
            let e = RouletteError::from(fehler);
            assert!(e.ist_wiederholbar(), "{e} muss wiederholbar sein");
        }
    }
}
