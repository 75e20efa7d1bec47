//! Relay-Schnittstelle – Presence-Verzeichnis und Session-Kanaele
//!
//! Der Relay-Dienst ist ein externer Mitarbeiter. Er bietet benannte
//! Themen (Warteraum, Session-Kanal), auf denen Clients ihre Presence
//! veroeffentlichen und Umschlaege broadcasten. Ein Abonnement liefert alle
//! Ereignisse eines Themas in Zustellreihenfolge ueber eine mpsc-Queue, die
//! vom Orchestrator als einziger Konsument gelesen wird.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roulette_core::types::ClientId;
use roulette_protocol::SignalEnvelope;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::SignalingResult;

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Metadaten, die ein Client zu seiner Presence veroeffentlicht
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMeta {
    /// Beitrittszeit im Warteraum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
    /// Beitrittszeit im Session-Kanal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<ClientId>,
}

impl PresenceMeta {
    /// Presence im Warteraum
    pub fn warteraum(joined_at: DateTime<Utc>) -> Self {
        Self {
            joined_at: Some(joined_at),
            ..Self::default()
        }
    }

    /// Presence im Session-Kanal
    pub fn kanal(online_at: DateTime<Utc>, user_id: ClientId) -> Self {
        Self {
            online_at: Some(online_at),
            user_id: Some(user_id),
            ..Self::default()
        }
    }
}

/// Vollstaendige Sicht auf die Mitglieder eines Themas
///
/// Mitglieder sind nach Identitaet sortiert, die Iterationsreihenfolge ist
/// damit auf allen Clients stabil.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub mitglieder: BTreeMap<ClientId, PresenceMeta>,
}

impl PresenceSnapshot {
    /// Alle Mitglieder ausser dem angegebenen Client, in stabiler Reihenfolge
    pub fn andere<'a>(&'a self, eigene_id: &'a ClientId) -> impl Iterator<Item = &'a ClientId> {
        self.mitglieder.keys().filter(move |id| *id != eigene_id)
    }

    pub fn enthaelt(&self, id: &ClientId) -> bool {
        self.mitglieder.contains_key(id)
    }

    pub fn anzahl(&self) -> usize {
        self.mitglieder.len()
    }
}

// ---------------------------------------------------------------------------
// Ereignisse und Abonnements
// ---------------------------------------------------------------------------

/// Ereignisse, die ein Relay-Abonnement zustellt
#[derive(Debug, Clone)]
pub enum RelayEreignis {
    /// Presence hat sich geaendert (entspricht einem Sync)
    PresenceSync(PresenceSnapshot),
    /// Broadcast eines anderen Mitglieds
    Broadcast(SignalEnvelope),
}

/// Bestaetigtes Abonnement eines Themas
pub struct Abonnement {
    pub handle: Arc<dyn RelayHandle>,
    pub ereignisse: mpsc::UnboundedReceiver<RelayEreignis>,
}

/// Relay-Dienst (Presence + Broadcast)
#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// Abonniert ein Thema mit dem angegebenen Presence-Schluessel
    ///
    /// Kehrt erst zurueck wenn das Relay den Bereitzustand bestaetigt hat.
    async fn abonnieren(&self, thema: &str, schluessel: &ClientId) -> SignalingResult<Abonnement>;
}

/// Handle auf ein bestehendes Abonnement
#[async_trait]
pub trait RelayHandle: Send + Sync {
    /// Name des abonnierten Themas
    fn thema(&self) -> &str;

    /// Veroeffentlicht oder ersetzt die eigene Presence
    async fn track(&self, meta: PresenceMeta) -> SignalingResult<()>;

    /// Broadcastet einen Umschlag an alle anderen Abonnenten
    async fn broadcast(&self, envelope: SignalEnvelope) -> SignalingResult<()>;

    /// Beendet das Abonnement und entfernt die eigene Presence
    async fn abmelden(&self) -> SignalingResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn andere_mitglieder_in_stabiler_reihenfolge() {
        let mut snapshot = PresenceSnapshot::default();
        for id in ["carol", "alice", "bob"] {
            snapshot
                .mitglieder
                .insert(ClientId::from(id), PresenceMeta::default());
        }
        let ich = ClientId::from("bob");
        let andere: Vec<_> = snapshot.andere(&ich).map(|id| id.as_str()).collect();
        assert_eq!(andere, vec!["alice", "carol"]);
    }

    #[test]
    fn presence_meta_serialisiert_nur_gesetzte_felder() {
        let meta = PresenceMeta::warteraum(Utc::now());
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("joined_at").is_some());
        assert!(json.get("online_at").is_none());
        assert!(json.get("user_id").is_none());
    }
}
