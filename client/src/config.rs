//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! lauffaehig ist.

use std::time::Duration;

use roulette_core::error::RouletteError;
use roulette_core::types::{ClientId, STANDARD_KANAL_PRAEFIX, STANDARD_WARTERAUM};
use roulette_observability::logging::{log_format_gueltig, log_level_gueltig};
use roulette_protocol::ice::standard_ice_server;
use roulette_protocol::IceServer;
use roulette_signaling::{MatchmakingKonfiguration, OrchestratorKonfiguration};
use serde::{Deserialize, Serialize};

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Identitaet und Anzeige
    pub client: ClientEinstellungen,
    /// Warteraum und Session-Kanaele
    pub matchmaking: MatchmakingEinstellungen,
    /// STUN/TURN-Server
    pub ice: IceEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Prometheus-Metriken
    pub metriken: MetrikEinstellungen,
}

/// Identitaet des Clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientEinstellungen {
    /// Feste Identitaet (leer = pro Start neu erzeugt)
    pub id: Option<String>,
    /// Anzeigename in den Logs
    pub anzeigename: String,
}

impl Default for ClientEinstellungen {
    fn default() -> Self {
        Self {
            id: None,
            anzeigename: "Roulette Client".into(),
        }
    }
}

/// Matchmaking-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingEinstellungen {
    /// Name des gemeinsamen Warteraums
    pub warteraum: String,
    /// Praefix der Session-Kanaele
    pub kanal_praefix: String,
    /// Zeitlimit fuer Relay-Abonnements und das Erscheinen des Partners in Millisekunden
    pub abo_timeout_ms: u64,
}

impl Default for MatchmakingEinstellungen {
    fn default() -> Self {
        Self {
            warteraum: STANDARD_WARTERAUM.into(),
            kanal_praefix: STANDARD_KANAL_PRAEFIX.into(),
            abo_timeout_ms: 10_000,
        }
    }
}

/// ICE-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceEinstellungen {
    pub server: Vec<IceServer>,
}

impl Default for IceEinstellungen {
    fn default() -> Self {
        Self {
            server: standard_ice_server(),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level (trace, debug, info, warn, error)
    pub level: String,
    /// Format (text, json)
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Metrik-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetrikEinstellungen {
    /// Metriken erfassen und nach der Sitzung ausgeben
    pub aktiviert: bool,
}

impl Default for MetrikEinstellungen {
    fn default() -> Self {
        Self { aktiviert: true }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    ///
    /// Existiert die Datei nicht, werden Standardwerte verwendet.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft Werte, die keine sinnvolle Sitzung zulassen
    pub fn pruefen(&self) -> roulette_core::Result<()> {
        let fehler = |msg: String| Err(RouletteError::Konfiguration(msg));
        if self.matchmaking.warteraum.trim().is_empty() {
            return fehler("matchmaking.warteraum darf nicht leer sein".into());
        }
        if self.matchmaking.kanal_praefix.is_empty() {
            return fehler("matchmaking.kanal_praefix darf nicht leer sein".into());
        }
        if self.matchmaking.abo_timeout_ms == 0 {
            return fehler("matchmaking.abo_timeout_ms muss groesser als 0 sein".into());
        }
        let level = self.logging.level.as_str();
        if !log_level_gueltig(level) && !level.contains('=') {
            return fehler(format!("Unbekannter Log-Level '{level}'"));
        }
        if !log_format_gueltig(&self.logging.format) {
            return fehler(format!("Unbekanntes Log-Format '{}'", self.logging.format));
        }
        if let Some(turn) = self
            .ice
            .server
            .iter()
            .find(|s| s.ist_turn() && (s.username.is_none() || s.credential.is_none()))
        {
            return fehler(format!(
                "TURN-Server {:?} braucht username und credential",
                turn.urls
            ));
        }
        Ok(())
    }

    /// Feste Identitaet aus der Konfiguration oder eine neu erzeugte
    pub fn client_id(&self) -> ClientId {
        match self.client.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => ClientId::from(id),
            _ => ClientId::generieren(),
        }
    }

    /// Baut die Orchestrator-Einstellungen fuer eine Identitaet
    pub fn orchestrator_konfiguration(&self, client_id: ClientId) -> OrchestratorKonfiguration {
        OrchestratorKonfiguration {
            client_id,
            matchmaking: MatchmakingKonfiguration {
                warteraum: self.matchmaking.warteraum.clone(),
                kanal_praefix: self.matchmaking.kanal_praefix.clone(),
                abo_timeout: Duration::from_millis(self.matchmaking.abo_timeout_ms),
            },
            ice_server: self.ice.server.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.matchmaking.warteraum, "public:waiting_pool");
        assert_eq!(cfg.matchmaking.kanal_praefix, "private:chat_room_");
        assert_eq!(cfg.ice.server.len(), 2);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.metriken.aktiviert);
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [client]
            id = "alice"

            [matchmaking]
            abo_timeout_ms = 2500

            [[ice.server]]
            urls = ["turn:turn.example.org:3478"]
            username = "nutzer"
            credential = "geheim"
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.client_id(), ClientId::from("alice"));
        assert_eq!(cfg.matchmaking.abo_timeout_ms, 2500);
        assert_eq!(cfg.ice.server.len(), 1);
        assert!(cfg.ice.server[0].ist_turn());
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.matchmaking.warteraum, "public:waiting_pool");
        assert_eq!(cfg.logging.format, "text");
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn orchestrator_konfiguration_uebernimmt_werte() {
        let mut cfg = ClientConfig::default();
        cfg.matchmaking.warteraum = "public:test".into();
        cfg.matchmaking.abo_timeout_ms = 750;

        let o = cfg.orchestrator_konfiguration(ClientId::from("bob"));
        assert_eq!(o.client_id, ClientId::from("bob"));
        assert_eq!(o.matchmaking.warteraum, "public:test");
        assert_eq!(o.matchmaking.abo_timeout, Duration::from_millis(750));
        assert_eq!(o.ice_server, standard_ice_server());
    }

    #[test]
    fn ohne_feste_id_wird_erzeugt() {
        let mut cfg = ClientConfig::default();
        cfg.client.id = Some("   ".into());
        assert_ne!(cfg.client_id(), cfg.client_id());
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = ClientConfig::default();
        cfg.matchmaking.abo_timeout_ms = 0;
        assert!(cfg.pruefen().is_err());

        let mut cfg = ClientConfig::default();
        cfg.ice.server = vec![IceServer::stun("turn:ohne.zugang:3478")];
        assert!(cfg.pruefen().is_err());

        let mut cfg = ClientConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.pruefen().is_err());

        let mut cfg = ClientConfig::default();
        cfg.matchmaking.warteraum = "  ".into();
        assert!(cfg.pruefen().is_err());

        // Filter-Direktiven sind erlaubt
        let mut cfg = ClientConfig::default();
        cfg.logging.level = "roulette_signaling=debug".into();
        assert!(cfg.pruefen().is_ok());
    }

    #[test]
    fn pruefung_meldet_konfigurationsfehler() {
        let mut cfg = ClientConfig::default();
        cfg.matchmaking.abo_timeout_ms = 0;
        match cfg.pruefen() {
            Err(RouletteError::Konfiguration(msg)) => assert!(msg.contains("abo_timeout_ms")),
            andere => panic!("Konfigurationsfehler erwartet: {andere:?}"),
        }

        // Konfigurationsfehler sind nicht durch erneutes Suchen behebbar
        let fehler = cfg.pruefen().unwrap_err();
        assert!(!fehler.ist_wiederholbar());
        assert_eq!(fehler.art(), roulette_core::error::FehlerArt::Intern);
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = ClientConfig::laden("/nicht/vorhanden/roulette.toml").unwrap();
        assert_eq!(cfg.matchmaking.abo_timeout_ms, 10_000);
    }
}
