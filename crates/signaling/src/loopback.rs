//! Loopback-Transport und simulierte Medien
//!
//! Prozessinterne Implementierung des Verhandlungstransports. Erzeugt
//! synthetische Beschreibungen, meldet nach dem Setzen der lokalen
//! Beschreibung einen Host-Kandidaten und gilt als verbunden, sobald beide
//! Beschreibungen und mindestens ein entfernter Kandidat vorliegen.
//!
//! Jede erstellte Instanz wird als `LoopbackSonde` in der Factory
//! registriert, ueber die Tests den Zustand beobachten und
//! Konnektivitaetsverluste einspeisen.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use roulette_protocol::{IceCandidate, IceServer, SdpTyp, SessionDescription};
use tokio::sync::mpsc;

use crate::transport::{
    IceVerbindungsZustand, LocalMedia, MediaTrack, NegotiationTransport, TrackKind,
    TransportError, TransportEvent, TransportFactory,
};

/// Schritt, an dem ein Transport eine Ablehnung simulieren soll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopbackSchritt {
    Erstellen,
    Angebot,
    Antwort,
    LokaleBeschreibung,
    RemoteBeschreibung,
    Kandidat,
}

// ---------------------------------------------------------------------------
// LoopbackSonde
// ---------------------------------------------------------------------------

struct SondeInner {
    nummer: u64,
    ice_server: Vec<IceServer>,
    geschlossen: AtomicBool,
    kandidaten: Mutex<Vec<IceCandidate>>,
    tracks: Mutex<Vec<Arc<dyn MediaTrack>>>,
    ereignisse: mpsc::UnboundedSender<TransportEvent>,
}

/// Beobachtungspunkt fuer einen erstellten Loopback-Transport
#[derive(Clone)]
pub struct LoopbackSonde {
    inner: Arc<SondeInner>,
}

impl LoopbackSonde {
    pub fn nummer(&self) -> u64 {
        self.inner.nummer
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.inner.geschlossen.load(Ordering::SeqCst)
    }

    /// Angewendete entfernte Kandidaten in Anwendungsreihenfolge
    pub fn angewendete_kandidaten(&self) -> Vec<IceCandidate> {
        self.inner.kandidaten.lock().clone()
    }

    /// Vom Transport gehaltene (angehaengte) Spuren
    pub fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.inner.tracks.lock().clone()
    }

    pub fn track_anzahl(&self) -> usize {
        self.inner.tracks.lock().len()
    }

    pub fn ice_server(&self) -> &[IceServer] {
        &self.inner.ice_server
    }

    /// Speist einen Konnektivitaetswechsel ein (z.B. Verbindungsverlust)
    pub fn konnektivitaet_melden(&self, zustand: IceVerbindungsZustand) {
        if !self.ist_geschlossen() {
            let _ = self
                .inner
                .ereignisse
                .send(TransportEvent::KonnektivitaetGeaendert(zustand));
        }
    }
}

// ---------------------------------------------------------------------------
// LoopbackFactory
// ---------------------------------------------------------------------------

struct FactoryInner {
    fehler: Mutex<Option<LoopbackSchritt>>,
    sonden: Mutex<Vec<LoopbackSonde>>,
    zaehler: AtomicU64,
}

/// Factory fuer Loopback-Transporte
#[derive(Clone)]
pub struct LoopbackFactory {
    inner: Arc<FactoryInner>,
}

impl LoopbackFactory {
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                fehler: Mutex::new(None),
                sonden: Mutex::new(Vec::new()),
                zaehler: AtomicU64::new(0),
            }),
        }
    }

    /// Kuenftig erstellte Transporte lehnen den angegebenen Schritt ab
    pub fn fehler_bei(&self, schritt: LoopbackSchritt) {
        *self.inner.fehler.lock() = Some(schritt);
    }

    pub fn fehler_aufheben(&self) {
        *self.inner.fehler.lock() = None;
    }

    /// Alle bisher erstellten Transporte
    pub fn sonden(&self) -> Vec<LoopbackSonde> {
        self.inner.sonden.lock().clone()
    }

    pub fn letzte_sonde(&self) -> Option<LoopbackSonde> {
        self.inner.sonden.lock().last().cloned()
    }

    /// Anzahl der noch nicht geschlossenen Transporte
    pub fn offene_transporte(&self) -> usize {
        self.inner
            .sonden
            .lock()
            .iter()
            .filter(|s| !s.ist_geschlossen())
            .count()
    }
}

impl Default for LoopbackFactory {
    fn default() -> Self {
        Self::neu()
    }
}

impl TransportFactory for LoopbackFactory {
    fn erstellen(
        &self,
        ice_server: &[IceServer],
        ereignisse: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn NegotiationTransport>, TransportError> {
        let fehler = *self.inner.fehler.lock();
        if fehler == Some(LoopbackSchritt::Erstellen) {
            return Err(TransportError::neu("Transport konnte nicht erstellt werden"));
        }

        let nummer = self.inner.zaehler.fetch_add(1, Ordering::Relaxed) + 1;
        let sonde = LoopbackSonde {
            inner: Arc::new(SondeInner {
                nummer,
                ice_server: ice_server.to_vec(),
                geschlossen: AtomicBool::new(false),
                kandidaten: Mutex::new(Vec::new()),
                tracks: Mutex::new(Vec::new()),
                ereignisse: ereignisse.clone(),
            }),
        };
        self.inner.sonden.lock().push(sonde.clone());

        Ok(Box::new(LoopbackTransport {
            sonde,
            fehler,
            ereignisse,
            lokal: None,
            remote: None,
            verbunden: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// LoopbackTransport
// ---------------------------------------------------------------------------

struct LoopbackTransport {
    sonde: LoopbackSonde,
    fehler: Option<LoopbackSchritt>,
    ereignisse: mpsc::UnboundedSender<TransportEvent>,
    lokal: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    verbunden: bool,
}

impl LoopbackTransport {
    fn pruefen(&self, schritt: LoopbackSchritt) -> Result<(), TransportError> {
        if self.sonde.ist_geschlossen() {
            return Err(TransportError::neu("Transport ist geschlossen"));
        }
        if self.fehler == Some(schritt) {
            return Err(TransportError::neu(format!("{schritt:?} abgelehnt")));
        }
        Ok(())
    }

    fn sdp(&self, typ: &str) -> String {
        format!(
            "v=0\r\no=loopback {} 2 IN IP4 127.0.0.1\r\ns=roulette-{typ}\r\nt=0 0\r\n",
            self.sonde.nummer()
        )
    }

    fn melden(&self, ereignis: TransportEvent) {
        let _ = self.ereignisse.send(ereignis);
    }

    fn verbindung_pruefen(&mut self) {
        let kandidaten = self.sonde.inner.kandidaten.lock().len();
        if self.verbunden || self.lokal.is_none() || self.remote.is_none() || kandidaten == 0 {
            return;
        }
        self.verbunden = true;
        self.melden(TransportEvent::KonnektivitaetGeaendert(
            IceVerbindungsZustand::Checking,
        ));
        self.melden(TransportEvent::KonnektivitaetGeaendert(
            IceVerbindungsZustand::Connected,
        ));
    }
}

static NAECHSTER_PORT: AtomicU16 = AtomicU16::new(50000);

#[async_trait]
impl NegotiationTransport for LoopbackTransport {
    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        self.pruefen(LoopbackSchritt::Angebot)?;
        Ok(SessionDescription::offer(self.sdp("offer")))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError> {
        self.pruefen(LoopbackSchritt::Antwort)?;
        match &self.remote {
            Some(r) if r.typ == SdpTyp::Offer => Ok(SessionDescription::answer(self.sdp("answer"))),
            _ => Err(TransportError::neu("Antwort ohne entferntes Angebot")),
        }
    }

    async fn set_local_description(&mut self, sdp: SessionDescription) -> Result<(), TransportError> {
        self.pruefen(LoopbackSchritt::LokaleBeschreibung)?;
        if self.lokal.is_some() {
            return Err(TransportError::neu("Lokale Beschreibung bereits gesetzt"));
        }
        self.lokal = Some(sdp);

        let port = NAECHSTER_PORT.fetch_add(1, Ordering::Relaxed);
        self.melden(TransportEvent::LokalerKandidat(IceCandidate::neu(format!(
            "candidate:{} 1 UDP 2122252543 127.0.0.1 {port} typ host",
            self.sonde.nummer()
        ))));
        // Ende der Sammlung
        self.melden(TransportEvent::LokalerKandidat(IceCandidate {
            candidate: String::new(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }));
        self.verbindung_pruefen();
        Ok(())
    }

    async fn set_remote_description(&mut self, sdp: SessionDescription) -> Result<(), TransportError> {
        self.pruefen(LoopbackSchritt::RemoteBeschreibung)?;
        if self.remote.is_some() {
            return Err(TransportError::neu("Entfernte Beschreibung bereits gesetzt"));
        }
        self.remote = Some(sdp);

        let stream_id = format!("remote-{}", self.sonde.nummer());
        for track_id in ["audio", "video"] {
            self.melden(TransportEvent::RemoteTrack {
                stream_id: stream_id.clone(),
                track_id: track_id.to_string(),
            });
        }
        self.verbindung_pruefen();
        Ok(())
    }

    async fn add_ice_candidate(&mut self, kandidat: IceCandidate) -> Result<(), TransportError> {
        self.pruefen(LoopbackSchritt::Kandidat)?;
        if self.remote.is_none() {
            return Err(TransportError::neu("Kandidat vor entfernter Beschreibung"));
        }
        self.sonde.inner.kandidaten.lock().push(kandidat);
        self.verbindung_pruefen();
        Ok(())
    }

    fn add_track(&mut self, track: Arc<dyn MediaTrack>) -> Result<(), TransportError> {
        if self.sonde.ist_geschlossen() {
            return Err(TransportError::neu("Transport ist geschlossen"));
        }
        self.sonde.inner.tracks.lock().push(track);
        Ok(())
    }

    async fn close(&mut self) {
        if !self.sonde.inner.geschlossen.swap(true, Ordering::SeqCst) {
            tracing::trace!(transport = self.sonde.nummer(), "Loopback-Transport geschlossen");
        }
    }
}

// ---------------------------------------------------------------------------
// Simulierte Medien
// ---------------------------------------------------------------------------

/// Medienspur ohne Geraet
pub struct TestTrack {
    id: String,
    kind: TrackKind,
    gestoppt: AtomicBool,
}

impl TestTrack {
    pub fn neu(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            gestoppt: AtomicBool::new(false),
        }
    }
}

impl MediaTrack for TestTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.gestoppt.store(true, Ordering::SeqCst);
    }

    fn ist_gestoppt(&self) -> bool {
        self.gestoppt.load(Ordering::SeqCst)
    }

    fn klonen(&self) -> Arc<dyn MediaTrack> {
        Arc::new(TestTrack::neu(self.id.clone(), self.kind))
    }
}

/// Lokale Medien mit je einer Audio- und Videospur
pub struct SimulierteMedien {
    stream_id: String,
    tracks: Vec<Arc<TestTrack>>,
}

impl SimulierteMedien {
    pub fn neu(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            tracks: vec![
                Arc::new(TestTrack::neu("audio", TrackKind::Audio)),
                Arc::new(TestTrack::neu("video", TrackKind::Video)),
            ],
        }
    }

    /// Ist irgendeine der Originalspuren gestoppt?
    pub fn irgendeine_gestoppt(&self) -> bool {
        self.tracks.iter().any(|t| t.ist_gestoppt())
    }
}

impl LocalMedia for SimulierteMedien {
    fn stream_id(&self) -> &str {
        &self.stream_id
    }

    fn tracks(&self) -> Vec<Arc<dyn MediaTrack>> {
        self.tracks
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn MediaTrack>)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roulette_protocol::ice::standard_ice_server;

    fn ereignisse_sammeln(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut alle = Vec::new();
        while let Ok(e) = rx.try_recv() {
            alle.push(e);
        }
        alle
    }

    #[tokio::test]
    async fn angebot_und_antwort_verbinden_beide_seiten() {
        let factory = LoopbackFactory::neu();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let mut a = factory.erstellen(&standard_ice_server(), tx_a).unwrap();
        let mut b = factory.erstellen(&standard_ice_server(), tx_b).unwrap();

        let angebot = a.create_offer().await.unwrap();
        a.set_local_description(angebot.clone()).await.unwrap();
        b.set_remote_description(angebot).await.unwrap();
        let antwort = b.create_answer().await.unwrap();
        b.set_local_description(antwort.clone()).await.unwrap();
        a.set_remote_description(antwort).await.unwrap();

        b.add_ice_candidate(IceCandidate::neu("candidate:a")).await.unwrap();
        a.add_ice_candidate(IceCandidate::neu("candidate:b")).await.unwrap();

        for ereignisse in [ereignisse_sammeln(&mut rx_a), ereignisse_sammeln(&mut rx_b)] {
            assert!(ereignisse.contains(&TransportEvent::KonnektivitaetGeaendert(
                IceVerbindungsZustand::Connected
            )));
            assert!(ereignisse
                .iter()
                .any(|e| matches!(e, TransportEvent::LokalerKandidat(k) if !k.ist_ende_marker())));
        }
        assert_eq!(factory.offene_transporte(), 2);
    }

    #[tokio::test]
    async fn kandidat_vor_beschreibung_wird_abgelehnt() {
        let factory = LoopbackFactory::neu();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut t = factory.erstellen(&[], tx).unwrap();
        assert!(t.add_ice_candidate(IceCandidate::neu("candidate:x")).await.is_err());
    }

    #[tokio::test]
    async fn fehler_injektion_und_schliessen() {
        let factory = LoopbackFactory::neu();
        factory.fehler_bei(LoopbackSchritt::Angebot);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut t = factory.erstellen(&[], tx).unwrap();
        assert!(t.create_offer().await.is_err());

        t.close().await;
        t.close().await;
        let sonde = factory.letzte_sonde().unwrap();
        assert!(sonde.ist_geschlossen());
        assert_eq!(factory.offene_transporte(), 0);
    }

    #[test]
    fn geklonte_spur_stoppt_unabhaengig() {
        let medien = SimulierteMedien::neu("lokal");
        let kopie = medien.tracks()[0].klonen();
        kopie.stop();
        assert!(kopie.ist_gestoppt());
        assert!(!medien.irgendeine_gestoppt());
    }
}
