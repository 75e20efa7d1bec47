//! NegotiationEngine – Zustandsmaschine einer Verhandlung
//!
//! ```text
//! Idle ──begin──► AwaitingResource ──initialize──► Negotiating ──► Connected
//!                        │                              │              │
//!                        └──────────► Failed ◄──────────┘              │
//!   (jeder Zustand) ──close_connection──► Closed ◄─────────────────────┘
//! ```
//!
//! Pro Client existiert hoechstens eine Session. Der Transport wird erst
//! erstellt, wenn lokale Medien vorliegen; angehaengt werden Kopien der
//! lokalen Spuren, und nur diese Kopien stoppt `close_connection`.
//!
//! Kandidaten, die vor der entfernten Beschreibung eintreffen, puffert die
//! Engine selbst und reicht sie direkt nach dem Setzen der Beschreibung
//! nach.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use roulette_core::types::PairingDecision;
use roulette_protocol::{IceCandidate, IceServer, SessionDescription, Signal};
use tokio::sync::mpsc;

use crate::error::{SignalingError, SignalingResult};
use crate::queue::SignalVerarbeiter;
use crate::transport::{
    LocalMedia, MediaTrack, NegotiationTransport, TransportError, TransportEvent, TransportFactory,
};

/// Ziel fuer ausgehende Verhandlungsnachrichten (der Session-Kanal)
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn veroeffentlichen(&self, signal: Signal) -> SignalingResult<()>;
}

/// Phase der Verhandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    Idle,
    AwaitingResource,
    Negotiating,
    Connected,
    Closed,
    Failed,
}

// ---------------------------------------------------------------------------
// NegotiationSession
// ---------------------------------------------------------------------------

struct NegotiationSession {
    entscheidung: PairingDecision,
    sink: Arc<dyn SignalSink>,
    transport: Option<Box<dyn NegotiationTransport>>,
    /// Vom Transport gehaltene Spuren (Kopien der lokalen Medien)
    eigene_tracks: Vec<Arc<dyn MediaTrack>>,
    angebot_gesendet: bool,
    lokale_beschreibung: bool,
    remote_beschreibung: bool,
    kandidaten: HashSet<IceCandidate>,
    fruehe_kandidaten: Vec<IceCandidate>,
}

// ---------------------------------------------------------------------------
// NegotiationEngine
// ---------------------------------------------------------------------------

/// Treibt Angebot, Antwort und Kandidatenaustausch einer Session
pub struct NegotiationEngine {
    factory: Arc<dyn TransportFactory>,
    ice_server: Vec<IceServer>,
    phase: NegotiationPhase,
    generation: u64,
    sitzung: Option<NegotiationSession>,
    lokale_medien: Option<Arc<dyn LocalMedia>>,
    ereignis_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl NegotiationEngine {
    pub fn neu(factory: Arc<dyn TransportFactory>, ice_server: Vec<IceServer>) -> Self {
        Self {
            factory,
            ice_server,
            phase: NegotiationPhase::Idle,
            generation: 0,
            sitzung: None,
            lokale_medien: None,
            ereignis_rx: None,
        }
    }

    pub fn phase(&self) -> NegotiationPhase {
        self.phase
    }

    /// Generation der aktuellen (oder letzten) Session
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Transport existiert und nimmt Verhandlungsnachrichten an
    pub fn ist_bereit(&self) -> bool {
        matches!(
            self.phase,
            NegotiationPhase::Negotiating | NegotiationPhase::Connected
        )
    }

    pub fn hat_sitzung(&self) -> bool {
        self.sitzung.is_some()
    }

    pub fn hat_lokale_medien(&self) -> bool {
        self.lokale_medien.is_some()
    }

    pub fn ist_anbieter(&self) -> bool {
        self.sitzung
            .as_ref()
            .is_some_and(|s| s.entscheidung.is_offerer)
    }

    pub fn angebot_erstellt(&self) -> bool {
        self.sitzung.as_ref().is_some_and(|s| s.angebot_gesendet)
    }

    pub fn entscheidung(&self) -> Option<&PairingDecision> {
        self.sitzung.as_ref().map(|s| &s.entscheidung)
    }

    /// Uebernimmt den Ereignisempfaenger des aktuellen Transports
    pub fn ereignisse_uebernehmen(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.ereignis_rx.take()
    }

    /// Oeffnet eine neue Session fuer die Paarung
    ///
    /// Gibt die neue Generation zurueck. Solange eine fruehere Session ihren
    /// Transport noch haelt, wird abgelehnt.
    pub async fn begin(
        &mut self,
        entscheidung: PairingDecision,
        sink: Arc<dyn SignalSink>,
    ) -> SignalingResult<u64> {
        if self.sitzung.is_some() {
            return Err(SignalingError::zustand(
                "Vorherige Session ist noch nicht freigegeben",
            ));
        }

        self.generation += 1;
        self.sitzung = Some(NegotiationSession {
            entscheidung,
            sink,
            transport: None,
            eigene_tracks: Vec::new(),
            angebot_gesendet: false,
            lokale_beschreibung: false,
            remote_beschreibung: false,
            kandidaten: HashSet::new(),
            fruehe_kandidaten: Vec::new(),
        });
        self.phase = NegotiationPhase::AwaitingResource;
        tracing::debug!(generation = self.generation, "Verhandlung begonnen");

        if self.lokale_medien.is_some() {
            self.ressource_anwenden().await?;
        }
        Ok(self.generation)
    }

    /// Stellt die lokalen Medien bereit
    ///
    /// Ohne Session werden sie fuer die naechste Session vorgemerkt. Gibt
    /// true zurueck wenn die Engine dadurch bereit geworden ist.
    pub async fn initialize(&mut self, medien: Arc<dyn LocalMedia>) -> SignalingResult<bool> {
        self.lokale_medien = Some(medien);
        if self.phase != NegotiationPhase::AwaitingResource {
            return Ok(false);
        }
        self.ressource_anwenden().await?;
        Ok(true)
    }

    /// Erstellt und versendet das Angebot (nur Anbieter, einmal pro Session)
    pub async fn create_offer(&mut self) -> SignalingResult<()> {
        self.bereitschaft_pruefen()?;
        let sitzung = self.sitzung_mut()?;
        if !sitzung.entscheidung.is_offerer {
            return Err(SignalingError::zustand("Nur der Anbieter erstellt ein Angebot"));
        }
        if sitzung.angebot_gesendet {
            return Err(SignalingError::zustand("Angebot bereits erstellt"));
        }
        sitzung.angebot_gesendet = true;

        let ergebnis = self.transport_mut()?.create_offer().await;
        let angebot = ergebnis.map_err(|e| self.fehlschlagen("Angebot erstellen", e))?;
        self.lokal_setzen(angebot.clone()).await?;

        tracing::info!(generation = self.generation, "Angebot erstellt");
        self.senden(Signal::Offer(angebot)).await
    }

    /// Verarbeitet das Angebot des Partners und versendet die Antwort
    pub async fn handle_offer(&mut self, angebot: SessionDescription) -> SignalingResult<()> {
        self.bereitschaft_pruefen()?;
        let sitzung = self.sitzung_mut()?;
        if sitzung.entscheidung.is_offerer {
            return Err(SignalingError::zustand("Anbieter erwartet kein Angebot"));
        }
        if sitzung.remote_beschreibung {
            return Err(SignalingError::zustand("Angebot bereits angewendet"));
        }

        self.remote_setzen(angebot).await?;

        let ergebnis = self.transport_mut()?.create_answer().await;
        let antwort = ergebnis.map_err(|e| self.fehlschlagen("Antwort erstellen", e))?;
        self.lokal_setzen(antwort.clone()).await?;

        tracing::info!(generation = self.generation, "Antwort erstellt");
        self.senden(Signal::Answer(antwort)).await
    }

    /// Wendet die Antwort des Partners an
    pub async fn handle_answer(&mut self, antwort: SessionDescription) -> SignalingResult<()> {
        self.bereitschaft_pruefen()?;
        let sitzung = self.sitzung_mut()?;
        if !sitzung.angebot_gesendet || !sitzung.lokale_beschreibung {
            return Err(SignalingError::zustand("Antwort ohne gesendetes Angebot"));
        }
        if sitzung.remote_beschreibung {
            return Err(SignalingError::zustand("Antwort bereits angewendet"));
        }

        self.remote_setzen(antwort).await?;
        tracing::info!(generation = self.generation, "Antwort angewendet");
        Ok(())
    }

    /// Wendet einen Kandidaten des Partners an (oder puffert ihn)
    pub async fn handle_candidate(&mut self, kandidat: IceCandidate) -> SignalingResult<()> {
        self.bereitschaft_pruefen()?;
        if kandidat.ist_ende_marker() {
            return Ok(());
        }

        let sitzung = self.sitzung_mut()?;
        if !sitzung.kandidaten.insert(kandidat.clone()) {
            tracing::trace!(kandidat = %kandidat.candidate, "Doppelter Kandidat ignoriert");
            return Ok(());
        }
        if !sitzung.remote_beschreibung {
            sitzung.fruehe_kandidaten.push(kandidat);
            return Ok(());
        }

        let ergebnis = self.transport_mut()?.add_ice_candidate(kandidat).await;
        ergebnis.map_err(|e| self.fehlschlagen("Kandidat anwenden", e))
    }

    /// Versendet einen lokal gesammelten Kandidaten an den Partner
    ///
    /// Ende-Marker werden nicht versendet. Gibt true zurueck wenn gesendet.
    pub async fn kandidat_veroeffentlichen(&mut self, kandidat: IceCandidate) -> SignalingResult<bool> {
        if kandidat.ist_ende_marker() || !self.ist_bereit() {
            return Ok(false);
        }
        self.senden(Signal::Candidate(kandidat)).await?;
        Ok(true)
    }

    /// Markiert die Verhandlung als abgeschlossen
    pub fn verbunden_markieren(&mut self) -> bool {
        if self.phase != NegotiationPhase::Negotiating {
            return false;
        }
        self.phase = NegotiationPhase::Connected;
        true
    }

    /// Gibt Transport und eigene Spuren frei (idempotent)
    ///
    /// Gibt true zurueck wenn eine Session freigegeben wurde.
    pub async fn close_connection(&mut self) -> bool {
        self.ereignis_rx = None;
        let Some(mut sitzung) = self.sitzung.take() else {
            self.phase = NegotiationPhase::Closed;
            return false;
        };

        if let Some(mut transport) = sitzung.transport.take() {
            transport.close().await;
        }
        for track in sitzung.eigene_tracks.drain(..) {
            track.stop();
        }
        self.phase = NegotiationPhase::Closed;
        tracing::info!(generation = self.generation, "Verhandlung geschlossen");
        true
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    fn bereitschaft_pruefen(&self) -> SignalingResult<()> {
        match self.phase {
            NegotiationPhase::Negotiating | NegotiationPhase::Connected => Ok(()),
            NegotiationPhase::AwaitingResource => Err(SignalingError::RessourceNichtBereit),
            andere => Err(SignalingError::zustand(format!(
                "Keine aktive Verhandlung ({andere:?})"
            ))),
        }
    }

    fn sitzung_mut(&mut self) -> SignalingResult<&mut NegotiationSession> {
        self.sitzung
            .as_mut()
            .ok_or_else(|| SignalingError::zustand("Keine Session"))
    }

    fn transport_mut(&mut self) -> SignalingResult<&mut Box<dyn NegotiationTransport>> {
        self.sitzung_mut()?
            .transport
            .as_mut()
            .ok_or(SignalingError::RessourceNichtBereit)
    }

    fn fehlschlagen(&mut self, schritt: &str, fehler: TransportError) -> SignalingError {
        self.phase = NegotiationPhase::Failed;
        tracing::warn!(generation = self.generation, schritt, fehler = %fehler, "Verhandlungsschritt fehlgeschlagen");
        SignalingError::VerhandlungsSchritt(format!("{schritt}: {fehler}"))
    }

    /// Erstellt den Transport und haengt Kopien der lokalen Spuren an
    async fn ressource_anwenden(&mut self) -> SignalingResult<()> {
        let medien = self
            .lokale_medien
            .clone()
            .ok_or(SignalingError::RessourceNichtBereit)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let transport = self.factory.erstellen(&self.ice_server, tx);
        let mut transport = transport.map_err(|e| self.fehlschlagen("Transport erstellen", e))?;

        let mut eigene: Vec<Arc<dyn MediaTrack>> = Vec::new();
        for track in medien.tracks() {
            let kopie = track.klonen();
            if let Err(e) = transport.add_track(Arc::clone(&kopie)) {
                transport.close().await;
                kopie.stop();
                for t in &eigene {
                    t.stop();
                }
                return Err(self.fehlschlagen("Spur anhaengen", e));
            }
            eigene.push(kopie);
        }

        let sitzung = self.sitzung_mut()?;
        sitzung.transport = Some(transport);
        sitzung.eigene_tracks = eigene;
        self.ereignis_rx = Some(rx);
        self.phase = NegotiationPhase::Negotiating;

        tracing::debug!(
            generation = self.generation,
            stream_id = medien.stream_id(),
            "Lokale Medien angehaengt"
        );
        Ok(())
    }

    async fn lokal_setzen(&mut self, beschreibung: SessionDescription) -> SignalingResult<()> {
        let ergebnis = self
            .transport_mut()?
            .set_local_description(beschreibung)
            .await;
        ergebnis.map_err(|e| self.fehlschlagen("Lokale Beschreibung setzen", e))?;
        self.sitzung_mut()?.lokale_beschreibung = true;
        Ok(())
    }

    async fn remote_setzen(&mut self, beschreibung: SessionDescription) -> SignalingResult<()> {
        let ergebnis = self
            .transport_mut()?
            .set_remote_description(beschreibung)
            .await;
        ergebnis.map_err(|e| self.fehlschlagen("Entfernte Beschreibung setzen", e))?;

        let sitzung = self.sitzung_mut()?;
        sitzung.remote_beschreibung = true;
        let fruehe = std::mem::take(&mut sitzung.fruehe_kandidaten);
        if !fruehe.is_empty() {
            tracing::debug!(anzahl = fruehe.len(), "Fruehe Kandidaten werden nachgereicht");
        }
        for kandidat in fruehe {
            let ergebnis = self.transport_mut()?.add_ice_candidate(kandidat).await;
            ergebnis.map_err(|e| self.fehlschlagen("Kandidat anwenden", e))?;
        }
        Ok(())
    }

    async fn senden(&mut self, signal: Signal) -> SignalingResult<()> {
        let sink = Arc::clone(&self.sitzung_mut()?.sink);
        sink.veroeffentlichen(signal).await
    }
}

#[async_trait]
impl SignalVerarbeiter for NegotiationEngine {
    async fn signal_anwenden(&mut self, signal: Signal) -> SignalingResult<()> {
        match signal {
            Signal::Offer(sdp) => self.handle_offer(sdp).await,
            Signal::Answer(sdp) => self.handle_answer(sdp).await,
            Signal::Candidate(k) => self.handle_candidate(k).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
