//! MatchmakingCoordinator – Warteraum, Paarung und Kanalwechsel
//!
//! Die Paarung erfolgt rein clientseitig ueber die gemeinsame Presence-Sicht
//! des Warteraums. Beide Clients berechnen aus dem sortierten
//! Identitaetspaar denselben Kanalnamen und komplementaere Rollen, ohne
//! weitere Nachrichten auszutauschen.
//!
//! Handles werden vor dem `await` auf das Abmelden aus dem Koordinator
//! genommen, damit ein zweiter Aufruf nie dasselbe Abonnement doppelt
//! beendet.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roulette_core::types::{
    ClientId, PairingDecision, SessionChannelId, STANDARD_KANAL_PRAEFIX, STANDARD_WARTERAUM,
};
use roulette_protocol::{Signal, SignalEnvelope};
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};
use crate::negotiation::SignalSink;
use crate::relay::{Abonnement, PresenceMeta, PresenceSnapshot, Relay, RelayEreignis, RelayHandle};

/// Standard-Zeitlimit fuer Relay-Abonnements
pub const STANDARD_ABO_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Einstellungen des Koordinators
#[derive(Debug, Clone)]
pub struct MatchmakingKonfiguration {
    /// Name des Warteraum-Themas
    pub warteraum: String,
    /// Praefix der Session-Kanaele
    pub kanal_praefix: String,
    /// Maximale Wartezeit auf die Bestaetigung eines Abonnements
    ///
    /// Gilt auch als Frist, in der der Partner im Session-Kanal erscheinen muss.
    pub abo_timeout: Duration,
}

impl Default for MatchmakingKonfiguration {
    fn default() -> Self {
        Self {
            warteraum: STANDARD_WARTERAUM.to_string(),
            kanal_praefix: STANDARD_KANAL_PRAEFIX.to_string(),
            abo_timeout: STANDARD_ABO_TIMEOUT,
        }
    }
}

// ---------------------------------------------------------------------------
// Mitgliedschaften
// ---------------------------------------------------------------------------

/// Ephemere Mitgliedschaft im Warteraum
struct PoolMembership {
    joined_at: DateTime<Utc>,
    handle: Arc<dyn RelayHandle>,
    generation: u64,
}

/// Ergebnis eines Warteraum-Beitritts
pub struct PoolBeitritt {
    /// Generation, mit der Presence-Ereignisse markiert werden muessen
    pub generation: u64,
    pub ereignisse: mpsc::UnboundedReceiver<RelayEreignis>,
}

/// Abonnierter Session-Kanal eines Paares
#[derive(Clone)]
pub struct SessionKanal {
    id: SessionChannelId,
    client_id: ClientId,
    handle: Arc<dyn RelayHandle>,
}

impl SessionKanal {
    pub fn id(&self) -> &SessionChannelId {
        &self.id
    }
}

#[async_trait]
impl SignalSink for SessionKanal {
    async fn veroeffentlichen(&self, signal: Signal) -> SignalingResult<()> {
        let envelope = SignalEnvelope::verpacken(&signal, &self.client_id)?;
        tracing::debug!(
            kanal = %self.id,
            typ = %envelope.typ,
            "Signal gesendet"
        );
        self.handle.broadcast(envelope).await
    }
}

impl std::fmt::Debug for SessionKanal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKanal").field("id", &self.id).finish()
    }
}

/// Ergebnis eines Kanal-Beitritts
pub struct KanalBeitritt {
    pub kanal: SessionKanal,
    pub ereignisse: mpsc::UnboundedReceiver<RelayEreignis>,
}

// ---------------------------------------------------------------------------
// MatchmakingCoordinator
// ---------------------------------------------------------------------------

/// Verwaltet Warteraum-Mitgliedschaft, Paarungsentscheidung und Kanalwechsel
pub struct MatchmakingCoordinator {
    client_id: ClientId,
    relay: Arc<dyn Relay>,
    konfig: MatchmakingKonfiguration,
    pool: Option<PoolMembership>,
    kanal: Option<SessionKanal>,
    /// Schutz gegen eine zweite Paarung waehrend eine laeuft
    paarung_laeuft: bool,
    pool_generation: u64,
}

impl MatchmakingCoordinator {
    pub fn neu(client_id: ClientId, relay: Arc<dyn Relay>, konfig: MatchmakingKonfiguration) -> Self {
        Self {
            client_id,
            relay,
            konfig,
            pool: None,
            kanal: None,
            paarung_laeuft: false,
            pool_generation: 0,
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn konfiguration(&self) -> &MatchmakingKonfiguration {
        &self.konfig
    }

    pub fn ist_im_warteraum(&self) -> bool {
        self.pool.is_some()
    }

    pub fn paarung_laeuft(&self) -> bool {
        self.paarung_laeuft
    }

    /// Beitrittszeit im Warteraum (falls Mitglied)
    pub fn beigetreten_um(&self) -> Option<DateTime<Utc>> {
        self.pool.as_ref().map(|p| p.joined_at)
    }

    pub fn aktueller_kanal(&self) -> Option<&SessionKanal> {
        self.kanal.as_ref()
    }

    /// Tritt dem Warteraum bei
    ///
    /// Gibt `None` zurueck wenn der Client bereits Mitglied ist, eine
    /// Paarung laeuft oder ein Session-Kanal besteht.
    pub async fn join_pool(&mut self) -> SignalingResult<Option<PoolBeitritt>> {
        if self.pool.is_some() || self.paarung_laeuft || self.kanal.is_some() {
            tracing::debug!(client_id = %self.client_id, "Warteraum-Beitritt uebersprungen");
            return Ok(None);
        }

        self.pool_generation += 1;
        let generation = self.pool_generation;
        let thema = self.konfig.warteraum.clone();

        let abo = self.abonnieren(&thema).await?;
        let joined_at = Utc::now();
        if let Err(e) = abo.handle.track(PresenceMeta::warteraum(joined_at)).await {
            let _ = abo.handle.abmelden().await;
            return Err(SignalingError::RelayAbonnement(format!("Presence-Track fehlgeschlagen: {e}")));
        }

        tracing::info!(client_id = %self.client_id, warteraum = %thema, "Warteraum beigetreten");
        self.pool = Some(PoolMembership {
            joined_at,
            handle: abo.handle,
            generation,
        });

        Ok(Some(PoolBeitritt {
            generation,
            ereignisse: abo.ereignisse,
        }))
    }

    /// Wertet eine Presence-Aenderung des Warteraums aus
    ///
    /// Liefert die Paarungsentscheidung genau einmal pro Paarung.
    /// Benachrichtigungen einer nicht mehr aktuellen Mitgliedschaft werden
    /// verworfen.
    pub fn presence_geaendert(
        &mut self,
        generation: u64,
        snapshot: &PresenceSnapshot,
    ) -> Option<PairingDecision> {
        let aktuell = self
            .pool
            .as_ref()
            .is_some_and(|p| p.generation == generation);
        if !aktuell {
            tracing::trace!(client_id = %self.client_id, generation, "Veraltete Presence verworfen");
            return None;
        }
        if self.paarung_laeuft || self.kanal.is_some() {
            return None;
        }

        // Bei drei oder mehr Wartenden kann die Wahl je Client abweichen
        let partner = snapshot.andere(&self.client_id).next()?.clone();
        let entscheidung =
            PairingDecision::berechnen(&self.konfig.kanal_praefix, &self.client_id, &partner);
        self.paarung_laeuft = true;

        tracing::info!(
            client_id = %self.client_id,
            partner_id = %entscheidung.partner_id,
            kanal = %entscheidung.session_channel_id,
            anbieter = entscheidung.is_offerer,
            "Partner gefunden"
        );
        Some(entscheidung)
    }

    /// Verlaesst den Warteraum (idempotent)
    pub async fn leave_pool(&mut self) -> bool {
        let Some(mitgliedschaft) = self.pool.take() else {
            return false;
        };
        if let Err(e) = mitgliedschaft.handle.abmelden().await {
            tracing::warn!(client_id = %self.client_id, fehler = %e, "Abmelden vom Warteraum fehlgeschlagen");
        }
        tracing::info!(client_id = %self.client_id, "Warteraum verlassen");
        true
    }

    /// Wechselt vom Warteraum in den Session-Kanal der Paarung
    ///
    /// Der Warteraum wird vollstaendig verlassen bevor der Kanal abonniert
    /// wird. Ein erneuter Beitritt zum selben Kanal liefert `None`.
    pub async fn enter_session(
        &mut self,
        entscheidung: &PairingDecision,
    ) -> SignalingResult<Option<KanalBeitritt>> {
        self.leave_pool().await;

        if let Some(kanal) = &self.kanal {
            if kanal.id == entscheidung.session_channel_id {
                return Ok(None);
            }
            self.leave_session_channel().await;
        }

        let thema = entscheidung.session_channel_id.as_str().to_string();
        let abo = match self.abonnieren(&thema).await {
            Ok(abo) => abo,
            Err(e) => {
                self.reset();
                return Err(SignalingError::KanalWechsel(e.to_string()));
            }
        };

        let meta = PresenceMeta::kanal(Utc::now(), self.client_id.clone());
        if let Err(e) = abo.handle.track(meta).await {
            let _ = abo.handle.abmelden().await;
            self.reset();
            return Err(SignalingError::KanalWechsel(format!("Presence-Track fehlgeschlagen: {e}")));
        }

        let kanal = SessionKanal {
            id: entscheidung.session_channel_id.clone(),
            client_id: self.client_id.clone(),
            handle: abo.handle,
        };
        tracing::info!(client_id = %self.client_id, kanal = %kanal.id, "Session-Kanal beigetreten");
        self.kanal = Some(kanal.clone());

        Ok(Some(KanalBeitritt {
            kanal,
            ereignisse: abo.ereignisse,
        }))
    }

    /// Verlaesst den Session-Kanal (idempotent)
    pub async fn leave_session_channel(&mut self) -> bool {
        let Some(kanal) = self.kanal.take() else {
            return false;
        };
        if let Err(e) = kanal.handle.abmelden().await {
            tracing::warn!(kanal = %kanal.id, fehler = %e, "Abmelden vom Session-Kanal fehlgeschlagen");
        }
        tracing::info!(client_id = %self.client_id, kanal = %kanal.id, "Session-Kanal verlassen");
        true
    }

    /// Sendet ein Signal an den Partner im aktuellen Session-Kanal
    pub async fn publish(&self, signal: Signal) -> SignalingResult<()> {
        let kanal = self.kanal.as_ref().ok_or(SignalingError::KeinKanal)?;
        kanal.veroeffentlichen(signal).await
    }

    /// Setzt Paarungsschutz zurueck und macht laufende Presence-Ereignisse ungueltig
    pub fn reset(&mut self) {
        self.paarung_laeuft = false;
        self.pool_generation += 1;
    }

    async fn abonnieren(&self, thema: &str) -> SignalingResult<Abonnement> {
        match tokio::time::timeout(
            self.konfig.abo_timeout,
            self.relay.abonnieren(thema, &self.client_id),
        )
        .await
        {
            Ok(Ok(abo)) => Ok(abo),
            Ok(Err(e)) => {
                tracing::warn!(client_id = %self.client_id, thema, fehler = %e, "Abonnement fehlgeschlagen");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(client_id = %self.client_id, thema, "Abonnement-Zeitlimit ueberschritten");
                Err(SignalingError::Zeitlimit(thema.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
