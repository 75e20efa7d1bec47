//! Gemeinsame Identifikations- und Zustandstypen fuer Roulette
//!
//! Identitaeten und Kanalnamen verwenden das Newtype-Pattern um
//! Verwechslungen zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard-Praefix fuer Session-Kanaele
pub const STANDARD_KANAL_PRAEFIX: &str = "private:chat_room_";

/// Standard-Name des Warteraums
pub const STANDARD_WARTERAUM: &str = "public:waiting_pool";

// ---------------------------------------------------------------------------
// ClientId
// ---------------------------------------------------------------------------

/// Opake, pro Client-Instanz einmalig erzeugte Identitaet
///
/// Dient als Presence-Schluessel und als Eingabe fuer die Rollenvergabe.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Erzeugt eine neue zufaellige Identitaet
    pub fn generieren() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Gibt die Identitaet als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionChannelId
// ---------------------------------------------------------------------------

/// Name des Session-Kanals eines Paares
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionChannelId(String);

impl SessionChannelId {
    /// Leitet den Kanalnamen aus dem sortierten Identitaetspaar ab
    ///
    /// Beide Seiten berechnen unabhaengig denselben Namen.
    pub fn fuer_paar(praefix: &str, a: &ClientId, b: &ClientId) -> Self {
        let (klein, gross) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{praefix}{klein}_{gross}"))
    }

    /// Gibt den Kanalnamen als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// PairingDecision
// ---------------------------------------------------------------------------

/// Ergebnis einer Paarung, einmal pro Paarungsereignis berechnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingDecision {
    pub partner_id: ClientId,
    pub session_channel_id: SessionChannelId,
    /// Die lexikographisch kleinere Identitaet erstellt das Angebot
    pub is_offerer: bool,
}

impl PairingDecision {
    /// Berechnet die Entscheidung ohne weiteren Nachrichtenaustausch
    pub fn berechnen(praefix: &str, eigene_id: &ClientId, partner_id: &ClientId) -> Self {
        Self {
            partner_id: partner_id.clone(),
            session_channel_id: SessionChannelId::fuer_paar(praefix, eigene_id, partner_id),
            is_offerer: eigene_id < partner_id,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Verbindungszustand, projiziert aus dem Konnektivitaetssignal des Transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Verbindungsaufbau laeuft
    pub fn ist_verbindend(&self) -> bool {
        matches!(self, Self::Checking)
    }

    /// Terminal-nicht-verbunden: kein automatischer Wiederaufbau
    pub fn ist_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_eindeutig() {
        let a = ClientId::generieren();
        let b = ClientId::generieren();
        assert_ne!(a, b, "Zwei neue ClientIds muessen verschieden sein");
    }

    #[test]
    fn kanalname_ist_symmetrisch() {
        let alice = ClientId::from("alice");
        let bob = ClientId::from("bob");
        let von_alice = SessionChannelId::fuer_paar(STANDARD_KANAL_PRAEFIX, &alice, &bob);
        let von_bob = SessionChannelId::fuer_paar(STANDARD_KANAL_PRAEFIX, &bob, &alice);
        assert_eq!(von_alice, von_bob);
        assert_eq!(von_alice.as_str(), "private:chat_room_alice_bob");
    }

    #[test]
    fn genau_ein_anbieter_pro_paar() {
        let alice = ClientId::from("alice");
        let bob = ClientId::from("bob");
        let a = PairingDecision::berechnen(STANDARD_KANAL_PRAEFIX, &alice, &bob);
        let b = PairingDecision::berechnen(STANDARD_KANAL_PRAEFIX, &bob, &alice);

        assert!(a.is_offerer);
        assert!(!b.is_offerer);
        assert_eq!(a.session_channel_id, b.session_channel_id);
        assert_eq!(a.partner_id, bob);
        assert_eq!(b.partner_id, alice);
    }

    #[test]
    fn zufaellige_ids_ergeben_komplementaere_rollen() {
        for _ in 0..32 {
            let x = ClientId::generieren();
            let y = ClientId::generieren();
            let dx = PairingDecision::berechnen(STANDARD_KANAL_PRAEFIX, &x, &y);
            let dy = PairingDecision::berechnen(STANDARD_KANAL_PRAEFIX, &y, &x);
            assert_ne!(dx.is_offerer, dy.is_offerer);
            assert_eq!(dx.session_channel_id, dy.session_channel_id);
        }
    }

    #[test]
    fn terminale_zustaende() {
        assert!(ConnectionState::Failed.ist_terminal());
        assert!(ConnectionState::Disconnected.ist_terminal());
        assert!(!ConnectionState::Connected.ist_terminal());
        assert!(ConnectionState::Checking.ist_verbindend());
    }

    #[test]
    fn ids_sind_serde_transparent() {
        let id = ClientId::from("alice");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"alice\"");
        let zurueck: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, id);
    }
}
