//! In-Memory-Relay – Presence und Broadcast innerhalb eines Prozesses
//!
//! Bildet die Semantik des externen Relay-Dienstes nach: Themen mit
//! Presence-Verzeichnis, Sync-Benachrichtigung bei jeder Aenderung und
//! Broadcast ohne Echo an den Absender. Wird von den Tests und von der
//! lokalen Sitzung des Clients verwendet.
//!
//! Thread-safe via Arc + DashMap. Clone des Relays teilt den inneren Zustand.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use roulette_core::types::ClientId;
use roulette_protocol::SignalEnvelope;
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};
use crate::relay::{Abonnement, PresenceMeta, PresenceSnapshot, Relay, RelayEreignis, RelayHandle};

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

struct Abonnent {
    abo_id: u64,
    schluessel: ClientId,
    meta: Option<PresenceMeta>,
    tx: mpsc::UnboundedSender<RelayEreignis>,
}

#[derive(Default)]
struct Thema {
    abonnenten: Vec<Abonnent>,
}

impl Thema {
    fn snapshot(&self) -> PresenceSnapshot {
        let mitglieder: BTreeMap<ClientId, PresenceMeta> = self
            .abonnenten
            .iter()
            .filter_map(|a| a.meta.clone().map(|m| (a.schluessel.clone(), m)))
            .collect();
        PresenceSnapshot { mitglieder }
    }

    fn sync_senden(&self) {
        let snapshot = self.snapshot();
        for a in &self.abonnenten {
            let _ = a.tx.send(RelayEreignis::PresenceSync(snapshot.clone()));
        }
    }
}

struct InMemoryRelayInner {
    themen: DashMap<String, Thema>,
    naechste_abo_id: AtomicU64,
    /// Thema -> Status, mit dem Abonnements abgelehnt werden
    ablehnungen: DashMap<String, String>,
    /// Thema -> kuenstliche Verzoegerung bis zur Bestaetigung
    verzoegerungen: DashMap<String, Duration>,
    /// Gesendete Broadcasts je Thema
    broadcasts: DashMap<String, Vec<SignalEnvelope>>,
}

// ---------------------------------------------------------------------------
// InMemoryRelay
// ---------------------------------------------------------------------------

/// Relay-Implementierung im Prozessspeicher
#[derive(Clone)]
pub struct InMemoryRelay {
    inner: Arc<InMemoryRelayInner>,
}

impl InMemoryRelay {
    /// Erstellt ein leeres Relay
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(InMemoryRelayInner {
                themen: DashMap::new(),
                naechste_abo_id: AtomicU64::new(1),
                ablehnungen: DashMap::new(),
                verzoegerungen: DashMap::new(),
                broadcasts: DashMap::new(),
            }),
        }
    }

    /// Abonnements auf `thema` schlagen mit `status` fehl
    pub fn abonnement_ablehnen(&self, thema: &str, status: &str) {
        self.inner
            .ablehnungen
            .insert(thema.to_string(), status.to_string());
    }

    /// Hebt eine Ablehnung wieder auf
    pub fn ablehnung_aufheben(&self, thema: &str) {
        self.inner.ablehnungen.remove(thema);
    }

    /// Verzoegert die Bestaetigung von Abonnements auf `thema`
    pub fn abonnement_verzoegern(&self, thema: &str, dauer: Duration) {
        self.inner.verzoegerungen.insert(thema.to_string(), dauer);
    }

    /// Aktuelle Presence eines Themas
    pub fn presence(&self, thema: &str) -> PresenceSnapshot {
        self.inner
            .themen
            .get(thema)
            .map(|t| t.snapshot())
            .unwrap_or_default()
    }

    /// Anzahl der aktiven Abonnements eines Schluessels auf einem Thema
    pub fn abo_anzahl(&self, thema: &str, schluessel: &ClientId) -> usize {
        self.inner
            .themen
            .get(thema)
            .map(|t| {
                t.abonnenten
                    .iter()
                    .filter(|a| &a.schluessel == schluessel)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Anzahl aller aktiven Abonnements eines Schluessels ueber alle Themen
    pub fn abos_von(&self, schluessel: &ClientId) -> usize {
        self.inner
            .themen
            .iter()
            .map(|t| {
                t.abonnenten
                    .iter()
                    .filter(|a| &a.schluessel == schluessel)
                    .count()
            })
            .sum()
    }

    /// Alle auf einem Thema gebroadcasteten Umschlaege
    ///
    /// Der Mitschnitt lebt so lange wie das Thema selbst und wird mit dem
    /// letzten Abonnement verworfen.
    pub fn broadcasts(&self, thema: &str) -> Vec<SignalEnvelope> {
        self.inner
            .broadcasts
            .get(thema)
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn track_intern(&self, thema: &str, abo_id: u64, meta: PresenceMeta) -> SignalingResult<()> {
        let mut eintrag = self
            .inner
            .themen
            .get_mut(thema)
            .ok_or_else(|| SignalingError::intern(format!("Thema {thema} existiert nicht")))?;
        let abonnent = eintrag
            .abonnenten
            .iter_mut()
            .find(|a| a.abo_id == abo_id)
            .ok_or_else(|| SignalingError::intern("Abonnement bereits beendet"))?;
        abonnent.meta = Some(meta);
        eintrag.sync_senden();
        Ok(())
    }

    fn broadcast_intern(&self, thema: &str, abo_id: u64, envelope: SignalEnvelope) -> SignalingResult<()> {
        let eintrag = self.inner.themen.get(thema).ok_or(SignalingError::SendFehler)?;
        if !eintrag.abonnenten.iter().any(|a| a.abo_id == abo_id) {
            return Err(SignalingError::SendFehler);
        }
        for a in eintrag.abonnenten.iter().filter(|a| a.abo_id != abo_id) {
            let _ = a.tx.send(RelayEreignis::Broadcast(envelope.clone()));
        }
        drop(eintrag);

        self.inner
            .broadcasts
            .entry(thema.to_string())
            .or_default()
            .push(envelope);
        Ok(())
    }

    fn abmelden_intern(&self, thema: &str, abo_id: u64) {
        let ist_leer = match self.inner.themen.get_mut(thema) {
            Some(mut eintrag) => {
                let vorher = eintrag.abonnenten.len();
                eintrag.abonnenten.retain(|a| a.abo_id != abo_id);
                if eintrag.abonnenten.len() != vorher {
                    eintrag.sync_senden();
                }
                eintrag.abonnenten.is_empty()
            }
            None => return,
        };
        if ist_leer && self.inner.themen.remove_if(thema, |_, t| t.abonnenten.is_empty()).is_some() {
            // Verwaistes Thema: Mitschnitt verwerfen
            self.inner.broadcasts.remove(thema);
        }
    }
}

impl Default for InMemoryRelay {
    fn default() -> Self {
        Self::neu()
    }
}

#[async_trait]
impl Relay for InMemoryRelay {
    async fn abonnieren(&self, thema: &str, schluessel: &ClientId) -> SignalingResult<Abonnement> {
        let verzoegerung = self.inner.verzoegerungen.get(thema).map(|d| *d);
        if let Some(dauer) = verzoegerung {
            tokio::time::sleep(dauer).await;
        }

        let ablehnung = self.inner.ablehnungen.get(thema).map(|s| s.clone());
        if let Some(status) = ablehnung {
            tracing::debug!(thema = thema, status = %status, "Abonnement abgelehnt");
            return Err(SignalingError::RelayAbonnement(status));
        }

        let abo_id = self.inner.naechste_abo_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .themen
            .entry(thema.to_string())
            .or_default()
            .abonnenten
            .push(Abonnent {
                abo_id,
                schluessel: schluessel.clone(),
                meta: None,
                tx,
            });

        tracing::debug!(thema = thema, client_id = %schluessel, abo_id, "Thema abonniert");

        Ok(Abonnement {
            handle: Arc::new(InMemoryHandle {
                relay: self.clone(),
                thema: thema.to_string(),
                abo_id,
            }),
            ereignisse: rx,
        })
    }
}

// ---------------------------------------------------------------------------
// InMemoryHandle
// ---------------------------------------------------------------------------

struct InMemoryHandle {
    relay: InMemoryRelay,
    thema: String,
    abo_id: u64,
}

#[async_trait]
impl RelayHandle for InMemoryHandle {
    fn thema(&self) -> &str {
        &self.thema
    }

    async fn track(&self, meta: PresenceMeta) -> SignalingResult<()> {
        self.relay.track_intern(&self.thema, self.abo_id, meta)
    }

    async fn broadcast(&self, envelope: SignalEnvelope) -> SignalingResult<()> {
        self.relay.broadcast_intern(&self.thema, self.abo_id, envelope)
    }

    async fn abmelden(&self) -> SignalingResult<()> {
        self.relay.abmelden_intern(&self.thema, self.abo_id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use roulette_protocol::{SessionDescription, Signal};

    const POOL: &str = "public:waiting_pool";

    fn letzter_sync(rx: &mut mpsc::UnboundedReceiver<RelayEreignis>) -> Option<PresenceSnapshot> {
        let mut letzter = None;
        while let Ok(e) = rx.try_recv() {
            if let RelayEreignis::PresenceSync(s) = e {
                letzter = Some(s);
            }
        }
        letzter
    }

    #[tokio::test]
    async fn track_sendet_sync_an_alle() {
        let relay = InMemoryRelay::neu();
        let alice = ClientId::from("alice");
        let bob = ClientId::from("bob");

        let mut a = relay.abonnieren(POOL, &alice).await.unwrap();
        a.handle.track(PresenceMeta::default()).await.unwrap();
        let b = relay.abonnieren(POOL, &bob).await.unwrap();
        b.handle.track(PresenceMeta::default()).await.unwrap();

        let snapshot = letzter_sync(&mut a.ereignisse).expect("Sync muss vorhanden sein");
        assert_eq!(snapshot.anzahl(), 2);
        assert!(snapshot.enthaelt(&bob));
    }

    #[tokio::test]
    async fn abmelden_entfernt_presence() {
        let relay = InMemoryRelay::neu();
        let alice = ClientId::from("alice");
        let bob = ClientId::from("bob");

        let mut a = relay.abonnieren(POOL, &alice).await.unwrap();
        a.handle.track(PresenceMeta::default()).await.unwrap();
        let b = relay.abonnieren(POOL, &bob).await.unwrap();
        b.handle.track(PresenceMeta::default()).await.unwrap();

        b.handle.abmelden().await.unwrap();
        // Zweites Abmelden ist ein No-op
        b.handle.abmelden().await.unwrap();

        let snapshot = letzter_sync(&mut a.ereignisse).unwrap();
        assert!(!snapshot.enthaelt(&bob));
        assert_eq!(relay.abo_anzahl(POOL, &bob), 0);
        assert_eq!(relay.abo_anzahl(POOL, &alice), 1);
    }

    #[tokio::test]
    async fn broadcast_ohne_echo() {
        let relay = InMemoryRelay::neu();
        let alice = ClientId::from("alice");
        let bob = ClientId::from("bob");
        let kanal = "private:chat_room_alice_bob";

        let mut a = relay.abonnieren(kanal, &alice).await.unwrap();
        let mut b = relay.abonnieren(kanal, &bob).await.unwrap();

        let env = SignalEnvelope::verpacken(
            &Signal::Offer(SessionDescription::offer("v=0")),
            &alice,
        )
        .unwrap();
        a.handle.broadcast(env.clone()).await.unwrap();

        match b.ereignisse.try_recv() {
            Ok(RelayEreignis::Broadcast(empfangen)) => assert_eq!(empfangen, env),
            other => panic!("Broadcast erwartet, erhalten: {other:?}"),
        }
        assert!(a.ereignisse.try_recv().is_err(), "Absender darf kein Echo erhalten");
        assert_eq!(relay.broadcasts(kanal).len(), 1);
    }

    #[tokio::test]
    async fn leeres_thema_verwirft_mitschnitt() {
        let relay = InMemoryRelay::neu();
        let alice = ClientId::from("alice");
        let bob = ClientId::from("bob");
        let kanal = "private:chat_room_alice_bob";

        let a = relay.abonnieren(kanal, &alice).await.unwrap();
        let b = relay.abonnieren(kanal, &bob).await.unwrap();
        let env = SignalEnvelope::verpacken(
            &Signal::Offer(SessionDescription::offer("v=0")),
            &alice,
        )
        .unwrap();
        a.handle.broadcast(env).await.unwrap();

        // Solange noch ein Abonnent da ist, bleibt der Mitschnitt erhalten
        a.handle.abmelden().await.unwrap();
        assert_eq!(relay.broadcasts(kanal).len(), 1);

        b.handle.abmelden().await.unwrap();
        assert!(relay.broadcasts(kanal).is_empty());
        assert!(relay.presence(kanal).mitglieder.is_empty());
    }

    #[tokio::test]
    async fn abgelehntes_abonnement() {
        let relay = InMemoryRelay::neu();
        relay.abonnement_ablehnen(POOL, "CHANNEL_ERROR");

        let ergebnis = relay.abonnieren(POOL, &ClientId::from("alice")).await;
        assert!(matches!(ergebnis, Err(SignalingError::RelayAbonnement(s)) if s == "CHANNEL_ERROR"));

        relay.ablehnung_aufheben(POOL);
        assert!(relay.abonnieren(POOL, &ClientId::from("alice")).await.is_ok());
    }

    #[tokio::test]
    async fn broadcast_nach_abmelden_schlaegt_fehl() {
        let relay = InMemoryRelay::neu();
        let alice = ClientId::from("alice");
        let a = relay.abonnieren("kanal", &alice).await.unwrap();
        a.handle.abmelden().await.unwrap();

        let env = SignalEnvelope::verpacken(
            &Signal::Answer(SessionDescription::answer("v=0")),
            &alice,
        )
        .unwrap();
        assert!(matches!(
            a.handle.broadcast(env).await,
            Err(SignalingError::SendFehler)
        ));
    }
}
