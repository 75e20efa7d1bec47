//! SessionOrchestrator – Ein Konsument, eine geordnete Ereignis-Queue
//!
//! Der Orchestrator besitzt Koordinator, Engine, SignalQueue und
//! Lifecycle-Manager. Befehle der Oberflaeche, Relay-Ereignisse und
//! Transport-Ereignisse landen in einer einzigen mpsc-Queue und werden
//! nacheinander auf einem Task verarbeitet.
//!
//! Jede Weiterleitung markiert ihre Ereignisse mit der Generation, unter der
//! sie gestartet wurde. Ereignisse einer nicht mehr aktuellen Generation
//! werden verworfen, bevor sie Zustand veraendern.
//!
//! Mit jeder Session startet eine Frist fuer das Erscheinen des Partners im
//! Session-Kanal. Laeuft sie ab, bevor der Partner gesehen wurde, wird die
//! Session abgebaut und ein wiederholbarer Fehler gemeldet.

use std::sync::Arc;
use std::time::Duration;

use roulette_core::error::RouletteError;
use roulette_core::event::PresentationEvent;
use roulette_core::types::{ClientId, ConnectionState, PairingDecision, SessionChannelId};
use roulette_observability::RouletteMetrics;
use roulette_protocol::{IceServer, SignalEnvelope};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{SignalingError, SignalingResult};
use crate::lifecycle::{ConnectionLifecycleManager, LifecycleAktion, TeardownGrund};
use crate::matchmaking::{MatchmakingCoordinator, MatchmakingKonfiguration};
use crate::negotiation::{NegotiationEngine, NegotiationPhase};
use crate::queue::{SignalQueue, SignalVerarbeiter};
use crate::relay::{Relay, RelayEreignis};
use crate::transport::{LocalMedia, TransportEvent, TransportFactory};

// ---------------------------------------------------------------------------
// Konfiguration, Befehle, Zustand
// ---------------------------------------------------------------------------

/// Einstellungen eines Orchestrators
#[derive(Debug, Clone)]
pub struct OrchestratorKonfiguration {
    pub client_id: ClientId,
    pub matchmaking: MatchmakingKonfiguration,
    pub ice_server: Vec<IceServer>,
}

/// Befehle der Oberflaeche
#[derive(Clone)]
pub enum Befehl {
    SucheStarten,
    SucheStoppen,
    /// Oberflaeche wird verlassen
    Verlassen,
    LokaleMedien(Arc<dyn LocalMedia>),
    Zuruecksetzen,
    Beenden,
}

impl Befehl {
    fn name(&self) -> &'static str {
        match self {
            Self::SucheStarten => "suche_starten",
            Self::SucheStoppen => "suche_stoppen",
            Self::Verlassen => "verlassen",
            Self::LokaleMedien(_) => "lokale_medien",
            Self::Zuruecksetzen => "zuruecksetzen",
            Self::Beenden => "beenden",
        }
    }
}

/// Momentaufnahme des Orchestrator-Zustands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorZustand {
    pub client_id: ClientId,
    pub sucht: bool,
    pub im_warteraum: bool,
    pub kanal: Option<SessionChannelId>,
    pub partner: Option<ClientId>,
    pub phase: NegotiationPhase,
    pub verbindung: ConnectionState,
    pub gepufferte_signale: usize,
}

enum Ereignis {
    Befehl(Befehl),
    Abfrage(oneshot::Sender<OrchestratorZustand>),
    Pool { generation: u64, ereignis: RelayEreignis },
    Kanal { generation: u64, ereignis: RelayEreignis },
    Transport { generation: u64, ereignis: TransportEvent },
    /// Partner-Frist einer Session ist abgelaufen
    PartnerFrist { generation: u64 },
}

// ---------------------------------------------------------------------------
// OrchestratorHandle
// ---------------------------------------------------------------------------

/// Sendet Befehle an einen laufenden Orchestrator
///
/// Clone ist guenstig (nur ein mpsc-Sender).
#[derive(Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Ereignis>,
}

impl OrchestratorHandle {
    pub fn befehl(&self, befehl: Befehl) -> SignalingResult<()> {
        self.tx
            .send(Ereignis::Befehl(befehl))
            .map_err(|_| SignalingError::SendFehler)
    }

    pub fn suche_starten(&self) -> SignalingResult<()> {
        self.befehl(Befehl::SucheStarten)
    }

    pub fn suche_stoppen(&self) -> SignalingResult<()> {
        self.befehl(Befehl::SucheStoppen)
    }

    pub fn verlassen(&self) -> SignalingResult<()> {
        self.befehl(Befehl::Verlassen)
    }

    pub fn lokale_medien(&self, medien: Arc<dyn LocalMedia>) -> SignalingResult<()> {
        self.befehl(Befehl::LokaleMedien(medien))
    }

    pub fn zuruecksetzen(&self) -> SignalingResult<()> {
        self.befehl(Befehl::Zuruecksetzen)
    }

    pub fn beenden(&self) -> SignalingResult<()> {
        self.befehl(Befehl::Beenden)
    }

    /// Fragt den Zustand ab, nachdem alle vorher gesendeten Ereignisse verarbeitet wurden
    pub async fn zustand(&self) -> SignalingResult<OrchestratorZustand> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Ereignis::Abfrage(tx))
            .map_err(|_| SignalingError::SendFehler)?;
        rx.await.map_err(|_| SignalingError::SendFehler)
    }
}

// ---------------------------------------------------------------------------
// SessionOrchestrator
// ---------------------------------------------------------------------------

struct AktiveSitzung {
    generation: u64,
    entscheidung: PairingDecision,
    partner_im_kanal: bool,
    gepaart_um: Instant,
    weiterleitungen: Vec<JoinHandle<()>>,
}

/// Kontextobjekt fuer Matchmaking und Verhandlung eines Clients
pub struct SessionOrchestrator {
    client_id: ClientId,
    koordinator: MatchmakingCoordinator,
    engine: NegotiationEngine,
    queue: SignalQueue,
    lifecycle: ConnectionLifecycleManager,
    sitzung: Option<AktiveSitzung>,
    sitzung_zaehler: u64,
    suche_aktiv: bool,
    pool_weiterleitung: Option<JoinHandle<()>>,
    ausgang: mpsc::UnboundedSender<PresentationEvent>,
    ereignis_tx: mpsc::UnboundedSender<Ereignis>,
    ereignis_rx: mpsc::UnboundedReceiver<Ereignis>,
    metriken: Option<RouletteMetrics>,
}

impl SessionOrchestrator {
    /// Erstellt einen Orchestrator und den Empfaenger fuer Oberflaechen-Ereignisse
    pub fn neu(
        konfig: OrchestratorKonfiguration,
        relay: Arc<dyn Relay>,
        factory: Arc<dyn TransportFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<PresentationEvent>) {
        let (ausgang, ausgang_rx) = mpsc::unbounded_channel();
        let (ereignis_tx, ereignis_rx) = mpsc::unbounded_channel();

        let orchestrator = Self {
            client_id: konfig.client_id.clone(),
            koordinator: MatchmakingCoordinator::neu(konfig.client_id, relay, konfig.matchmaking),
            engine: NegotiationEngine::neu(factory, konfig.ice_server),
            queue: SignalQueue::neu(),
            lifecycle: ConnectionLifecycleManager::neu(),
            sitzung: None,
            sitzung_zaehler: 0,
            suche_aktiv: false,
            pool_weiterleitung: None,
            ausgang,
            ereignis_tx,
            ereignis_rx,
            metriken: None,
        };
        (orchestrator, ausgang_rx)
    }

    /// Aktiviert die Metrik-Erfassung
    pub fn mit_metriken(mut self, metriken: RouletteMetrics) -> Self {
        self.metriken = Some(metriken);
        self
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            tx: self.ereignis_tx.clone(),
        }
    }

    /// Verarbeitet Ereignisse bis `Beenden` eintrifft
    pub async fn run(mut self) {
        tracing::info!(client_id = %self.client_id, "Orchestrator gestartet");
        while let Some(ereignis) = self.ereignis_rx.recv().await {
            if !self.verarbeiten(ereignis).await {
                break;
            }
        }
        self.reset(TeardownGrund::Navigation).await;
        tracing::info!(client_id = %self.client_id, "Orchestrator beendet");
    }

    /// Baut Session und Warteraum-Mitgliedschaft ab
    ///
    /// Lokale Medien bleiben fuer die naechste Session erhalten.
    pub async fn reset(&mut self, grund: TeardownGrund) {
        self.suche_beenden(grund).await;
        self.queue.reset();
        self.koordinator.reset();
    }

    /// Verarbeitet ein einzelnes Ereignis; false beendet die Schleife
    async fn verarbeiten(&mut self, ereignis: Ereignis) -> bool {
        match ereignis {
            Ereignis::Befehl(befehl) => return self.befehl_ausfuehren(befehl).await,
            Ereignis::Abfrage(antwort) => {
                let _ = antwort.send(self.zustand());
            }
            Ereignis::Pool { generation, ereignis } => {
                self.pool_ereignis(generation, ereignis).await;
            }
            Ereignis::Kanal { generation, ereignis } => {
                if self.ist_aktuell(generation) {
                    self.kanal_ereignis(ereignis).await;
                } else {
                    tracing::trace!(generation, "Kanal-Ereignis einer alten Session verworfen");
                }
            }
            Ereignis::Transport { generation, ereignis } => {
                if self.ist_aktuell(generation) {
                    self.transport_ereignis(ereignis).await;
                } else {
                    tracing::trace!(generation, "Transport-Ereignis einer alten Session verworfen");
                }
            }
            Ereignis::PartnerFrist { generation } => {
                if self.ist_aktuell(generation) {
                    self.partner_frist_abgelaufen().await;
                }
            }
        }
        true
    }

    async fn befehl_ausfuehren(&mut self, befehl: Befehl) -> bool {
        tracing::debug!(client_id = %self.client_id, befehl = befehl.name(), "Befehl empfangen");
        match befehl {
            Befehl::SucheStarten => self.suche_starten().await,
            Befehl::SucheStoppen => self.suche_beenden(TeardownGrund::Explizit).await,
            Befehl::Verlassen => self.suche_beenden(TeardownGrund::Navigation).await,
            Befehl::LokaleMedien(medien) => match self.engine.initialize(medien).await {
                Ok(true) => self.nach_bereitschaft().await,
                Ok(false) => {}
                Err(e) => self.fehler_behandeln(e).await,
            },
            Befehl::Zuruecksetzen => self.reset(TeardownGrund::Explizit).await,
            Befehl::Beenden => return false,
        }
        true
    }

    fn zustand(&self) -> OrchestratorZustand {
        OrchestratorZustand {
            client_id: self.client_id.clone(),
            sucht: self.suche_aktiv,
            im_warteraum: self.koordinator.ist_im_warteraum(),
            kanal: self.koordinator.aktueller_kanal().map(|k| k.id().clone()),
            partner: self.sitzung.as_ref().map(|s| s.entscheidung.partner_id.clone()),
            phase: self.engine.phase(),
            verbindung: self.lifecycle.zustand(),
            gepufferte_signale: self.queue.len(),
        }
    }

    fn ist_aktuell(&self, generation: u64) -> bool {
        self.sitzung
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    fn melden(&self, ereignis: PresentationEvent) {
        tracing::trace!(client_id = %self.client_id, ereignis = ?ereignis, "Ereignis an Oberflaeche");
        let _ = self.ausgang.send(ereignis);
    }

    fn fehler_melden(&self, fehler: SignalingError) {
        self.melden(PresentationEvent::aus_fehler(&RouletteError::from(fehler)));
    }

    // -----------------------------------------------------------------------
    // Suche
    // -----------------------------------------------------------------------

    async fn suche_starten(&mut self) {
        if self.sitzung.is_some() {
            tracing::debug!(client_id = %self.client_id, "Bereits gepaart, Suche ignoriert");
            return;
        }

        match self.koordinator.join_pool().await {
            Ok(Some(beitritt)) => {
                let generation = beitritt.generation;
                self.pool_weiterleitung = Some(weiterleiten(
                    beitritt.ereignisse,
                    self.ereignis_tx.clone(),
                    move |ereignis| Ereignis::Pool { generation, ereignis },
                ));
                self.suche_aktiv = true;
                self.melden(PresentationEvent::SucheGestartet);
            }
            Ok(None) => {}
            Err(e) => {
                if let Some(m) = &self.metriken {
                    m.relay_fehler_total.inc();
                }
                self.fehler_melden(e);
            }
        }
    }

    /// Beendet Suche und Session; meldet nur tatsaechliche Aenderungen
    async fn suche_beenden(&mut self, grund: TeardownGrund) {
        self.sitzung_abbauen(grund).await;
        self.pool_verlassen().await;
        self.suche_aufgeben();
    }

    /// Setzt das Such-Flag zurueck und meldet das einmalig
    fn suche_aufgeben(&mut self) {
        if self.suche_aktiv {
            self.suche_aktiv = false;
            self.melden(PresentationEvent::SucheGestoppt);
        }
    }

    async fn pool_verlassen(&mut self) -> bool {
        if let Some(weiterleitung) = self.pool_weiterleitung.take() {
            weiterleitung.abort();
        }
        let verlassen = self.koordinator.leave_pool().await;
        if verlassen {
            self.koordinator.reset();
        }
        verlassen
    }

    async fn pool_ereignis(&mut self, generation: u64, ereignis: RelayEreignis) {
        let RelayEreignis::PresenceSync(snapshot) = ereignis else {
            return;
        };
        if let Some(entscheidung) = self.koordinator.presence_geaendert(generation, &snapshot) {
            self.paarung_beginnen(entscheidung).await;
        }
    }

    // -----------------------------------------------------------------------
    // Session
    // -----------------------------------------------------------------------

    async fn paarung_beginnen(&mut self, entscheidung: PairingDecision) {
        if let Some(m) = &self.metriken {
            m.paarungen_total.inc();
        }
        if let Some(weiterleitung) = self.pool_weiterleitung.take() {
            weiterleitung.abort();
        }

        let beitritt = match self.koordinator.enter_session(&entscheidung).await {
            Ok(Some(beitritt)) => beitritt,
            Ok(None) => {
                tracing::warn!(client_id = %self.client_id, "Session-Kanal bereits aktiv");
                return;
            }
            Err(e) => {
                if let Some(m) = &self.metriken {
                    m.relay_fehler_total.inc();
                }
                self.fehler_melden(e);
                self.suche_aufgeben();
                return;
            }
        };

        // Gepaart heisst nicht mehr suchend
        self.suche_aufgeben();

        self.sitzung_zaehler += 1;
        let generation = self.sitzung_zaehler;
        let kanal_weiterleitung = weiterleiten(
            beitritt.ereignisse,
            self.ereignis_tx.clone(),
            move |ereignis| Ereignis::Kanal { generation, ereignis },
        );
        let frist = partner_frist_starten(
            self.koordinator.konfiguration().abo_timeout,
            self.ereignis_tx.clone(),
            generation,
        );
        self.sitzung = Some(AktiveSitzung {
            generation,
            entscheidung: entscheidung.clone(),
            partner_im_kanal: false,
            gepaart_um: Instant::now(),
            weiterleitungen: vec![kanal_weiterleitung, frist],
        });
        self.lifecycle.neue_sitzung(generation);
        if let Some(m) = &self.metriken {
            m.aktive_sitzungen.inc();
        }
        self.melden(PresentationEvent::PartnerGeaendert {
            partner: Some(entscheidung.partner_id.clone()),
        });

        let sink = Arc::new(beitritt.kanal);
        if let Err(e) = self.engine.begin(entscheidung, sink).await {
            self.fehler_behandeln(e).await;
            return;
        }
        self.nach_bereitschaft().await;
    }

    /// Verbindet Transport-Ereignisse, arbeitet die Queue ab und bietet ggf. an
    async fn nach_bereitschaft(&mut self) {
        let Some(generation) = self.sitzung.as_ref().map(|s| s.generation) else {
            return;
        };
        if let Some(rx) = self.engine.ereignisse_uebernehmen() {
            let weiterleitung = weiterleiten(rx, self.ereignis_tx.clone(), move |ereignis| {
                Ereignis::Transport { generation, ereignis }
            });
            if let Some(s) = self.sitzung.as_mut() {
                s.weiterleitungen.push(weiterleitung);
            }
        }

        let ergebnis = self
            .queue
            .drain_when_ready(|e: &NegotiationEngine| e.ist_bereit(), &mut self.engine)
            .await;
        match ergebnis {
            Ok(0) => {}
            Ok(n) => tracing::debug!(client_id = %self.client_id, anzahl = n, "Gepufferte Signale angewendet"),
            Err(e) => {
                self.fehler_behandeln(e).await;
                return;
            }
        }

        self.angebot_pruefen().await;
    }

    /// Der Anbieter bietet an, sobald er bereit ist und der Partner im Kanal ist
    async fn angebot_pruefen(&mut self) {
        let partner_da = self.sitzung.as_ref().is_some_and(|s| s.partner_im_kanal);
        if !partner_da
            || !self.engine.ist_bereit()
            || !self.engine.ist_anbieter()
            || self.engine.angebot_erstellt()
        {
            return;
        }
        if let Err(e) = self.engine.create_offer().await {
            self.fehler_behandeln(e).await;
        }
    }

    async fn kanal_ereignis(&mut self, ereignis: RelayEreignis) {
        match ereignis {
            RelayEreignis::PresenceSync(snapshot) => {
                let Some(sitzung) = self.sitzung.as_mut() else {
                    return;
                };
                let anwesend = snapshot.enthaelt(&sitzung.entscheidung.partner_id);
                if anwesend && !sitzung.partner_im_kanal {
                    sitzung.partner_im_kanal = true;
                    tracing::debug!(client_id = %self.client_id, "Partner im Session-Kanal");
                    self.angebot_pruefen().await;
                } else if !anwesend && sitzung.partner_im_kanal {
                    tracing::info!(client_id = %self.client_id, "Partner hat den Session-Kanal verlassen");
                    self.sitzung_abbauen(TeardownGrund::PartnerVerlassen).await;
                }
            }
            RelayEreignis::Broadcast(envelope) => self.signal_empfangen(envelope).await,
        }
    }

    /// Partner wurde innerhalb der Frist nie im Session-Kanal gesehen
    async fn partner_frist_abgelaufen(&mut self) {
        let Some(sitzung) = self.sitzung.as_ref() else {
            return;
        };
        if sitzung.partner_im_kanal {
            return;
        }
        let partner = sitzung.entscheidung.partner_id.clone();
        tracing::warn!(
            client_id = %self.client_id,
            partner = %partner,
            "Partner nicht im Session-Kanal erschienen"
        );
        self.fehler_melden(SignalingError::KanalWechsel(format!(
            "Partner {partner} ist dem Session-Kanal nicht beigetreten"
        )));
        self.sitzung_abbauen(TeardownGrund::PartnerNichtErschienen).await;
    }

    async fn signal_empfangen(&mut self, envelope: SignalEnvelope) {
        if envelope.ist_von(&self.client_id) {
            return;
        }
        let Some(partner) = self.sitzung.as_ref().map(|s| s.entscheidung.partner_id.clone()) else {
            return;
        };
        if !envelope.ist_von(&partner) {
            tracing::warn!(client_id = %self.client_id, from = %envelope.from, "Signal von fremdem Absender ignoriert");
            return;
        }
        let signal = match envelope.auspacken() {
            Ok(signal) => signal,
            Err(e) => {
                tracing::warn!(client_id = %self.client_id, fehler = %e, "Ungueltiges Signal ignoriert");
                return;
            }
        };

        // Live-Signale duerfen gepufferte nicht ueberholen
        if !self.engine.ist_bereit() || !self.queue.is_empty() {
            self.queue.enqueue(signal);
            if self.engine.ist_bereit() {
                self.nach_bereitschaft().await;
            }
            return;
        }

        match self.engine.signal_anwenden(signal.clone()).await {
            Ok(()) => {}
            Err(SignalingError::RessourceNichtBereit) => self.queue.enqueue(signal),
            Err(e) if e.ist_sitzungsfatal() => self.fehler_behandeln(e).await,
            Err(e) => {
                tracing::warn!(client_id = %self.client_id, typ = %signal.typ(), fehler = %e, "Signal abgelehnt");
            }
        }
    }

    async fn transport_ereignis(&mut self, ereignis: TransportEvent) {
        match ereignis {
            TransportEvent::LokalerKandidat(kandidat) => {
                if let Err(e) = self.engine.kandidat_veroeffentlichen(kandidat).await {
                    self.fehler_behandeln(e).await;
                }
            }
            TransportEvent::KonnektivitaetGeaendert(roh) => match self.lifecycle.konnektivitaet(roh) {
                LifecycleAktion::Keine => {}
                LifecycleAktion::Verbindend => {
                    self.melden(PresentationEvent::VerbindungsStatus {
                        zustand: ConnectionState::Checking,
                    });
                }
                LifecycleAktion::Verbunden { remote } => {
                    self.engine.verbunden_markieren();
                    if let (Some(m), Some(s)) = (&self.metriken, &self.sitzung) {
                        m.sitzungen_verbunden_total.inc();
                        m.verbindungsaufbau_sekunden
                            .observe(s.gepaart_um.elapsed().as_secs_f64());
                    }
                    tracing::info!(client_id = %self.client_id, "Verbindung hergestellt");
                    self.melden(PresentationEvent::VerbindungsStatus {
                        zustand: ConnectionState::Connected,
                    });
                    if let Some(media) = remote {
                        self.melden(PresentationEvent::RemoteMediaVerfuegbar { media });
                    }
                }
                LifecycleAktion::Abbauen(grund) => {
                    let zustand = roh.projizieren();
                    self.melden(PresentationEvent::VerbindungsStatus { zustand });
                    self.melden(PresentationEvent::aus_fehler(&RouletteError::VerbindungVerloren(
                        format!("{zustand:?}"),
                    )));
                    self.sitzung_abbauen(grund).await;
                }
            },
            TransportEvent::RemoteTrack { stream_id, track_id } => {
                if let Some(media) = self.lifecycle.remote_track(&stream_id, &track_id) {
                    self.melden(PresentationEvent::RemoteMediaVerfuegbar { media });
                }
            }
        }
    }

    async fn fehler_behandeln(&mut self, fehler: SignalingError) {
        tracing::warn!(client_id = %self.client_id, fehler = %fehler, "Session-Fehler");
        if let (Some(m), SignalingError::VerhandlungsSchritt(_)) = (&self.metriken, &fehler) {
            m.verhandlung_fehler_total.inc();
        }
        let grund = TeardownGrund::VerhandlungFehlgeschlagen(fehler.to_string());
        self.fehler_melden(fehler);
        self.sitzung_abbauen(grund).await;
    }

    /// Einziger Abbaupfad einer Session
    ///
    /// Reihenfolge: Engine schliessen, Queue leeren, Kanal verlassen,
    /// Matchmaking zuruecksetzen, `Closed` melden.
    async fn sitzung_abbauen(&mut self, grund: TeardownGrund) -> bool {
        if !self.lifecycle.abbau_beginnen() {
            return false;
        }
        if let Some(sitzung) = self.sitzung.take() {
            for weiterleitung in sitzung.weiterleitungen {
                weiterleitung.abort();
            }
        }
        tracing::info!(client_id = %self.client_id, grund = %grund, "Session wird abgebaut");

        self.engine.close_connection().await;
        self.queue.reset();
        self.koordinator.leave_session_channel().await;
        self.koordinator.reset();
        self.lifecycle.abbau_abschliessen();

        if let Some(m) = &self.metriken {
            m.abbau_zaehlen(grund.kennung());
            m.aktive_sitzungen.dec();
        }
        self.melden(PresentationEvent::VerbindungsStatus {
            zustand: ConnectionState::Closed,
        });
        self.melden(PresentationEvent::PartnerGeaendert { partner: None });
        true
    }
}

/// Leitet eine Quelle in die zentrale Queue weiter, markiert mit `verpacken`
fn weiterleiten<T, F>(
    mut quelle: mpsc::UnboundedReceiver<T>,
    ziel: mpsc::UnboundedSender<Ereignis>,
    verpacken: F,
) -> JoinHandle<()>
where
    T: Send + 'static,
    F: Fn(T) -> Ereignis + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(e) = quelle.recv().await {
            if ziel.send(verpacken(e)).is_err() {
                break;
            }
        }
    })
}

/// Meldet nach `frist` den Ablauf der Partner-Frist fuer `generation`
fn partner_frist_starten(
    frist: Duration,
    ziel: mpsc::UnboundedSender<Ereignis>,
    generation: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(frist).await;
        let _ = ziel.send(Ereignis::PartnerFrist { generation });
    })
}
