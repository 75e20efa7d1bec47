//! SignalQueue – Puffer fuer zu frueh eintreffende Verhandlungsnachrichten
//!
//! Nachrichten, die eintreffen bevor die lokalen Medien bereit sind, werden
//! in Ankunftsreihenfolge gepuffert. Beim Uebergang in den Bereitzustand
//! wird der Puffer atomar ausgetauscht und genau einmal abgearbeitet.
//! Waehrend des Abarbeitens eingereihte Nachrichten landen im frischen
//! Puffer und bilden den naechsten Durchgang.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use roulette_protocol::{Signal, SignalTyp};

use crate::error::{SignalingError, SignalingResult};

/// Gepufferte Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedSignal {
    pub typ: SignalTyp,
    pub signal: Signal,
}

impl From<Signal> for QueuedSignal {
    fn from(signal: Signal) -> Self {
        Self {
            typ: signal.typ(),
            signal,
        }
    }
}

/// Empfaenger der abgearbeiteten Nachrichten (die NegotiationEngine)
#[async_trait]
pub trait SignalVerarbeiter: Send {
    async fn signal_anwenden(&mut self, signal: Signal) -> SignalingResult<()>;
}

/// FIFO-Puffer fuer Verhandlungsnachrichten
///
/// Clone teilt den Puffer.
#[derive(Clone, Default)]
pub struct SignalQueue {
    puffer: Arc<Mutex<VecDeque<QueuedSignal>>>,
}

impl SignalQueue {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Haengt eine Nachricht an das Ende an
    pub fn enqueue(&self, signal: Signal) {
        let eintrag = QueuedSignal::from(signal);
        tracing::debug!(typ = %eintrag.typ, "Signal gepuffert");
        self.puffer.lock().push_back(eintrag);
    }

    pub fn len(&self) -> usize {
        self.puffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.puffer.lock().is_empty()
    }

    /// Verwirft alle gepufferten Nachrichten
    pub fn reset(&self) {
        let verworfen = {
            let mut puffer = self.puffer.lock();
            let n = puffer.len();
            puffer.clear();
            n
        };
        if verworfen > 0 {
            tracing::debug!(verworfen, "SignalQueue zurueckgesetzt");
        }
    }

    /// Typen der gepufferten Nachrichten in Reihenfolge
    pub fn typen(&self) -> Vec<SignalTyp> {
        self.puffer.lock().iter().map(|q| q.typ).collect()
    }

    /// Arbeitet den Puffer ab sobald `ist_bereit` zutrifft
    ///
    /// Gibt die Anzahl der angewendeten Nachrichten zurueck. Meldet der
    /// Verarbeiter erneut `RessourceNichtBereit`, wandern die betroffene
    /// und alle folgenden Nachrichten unveraendert an den Anfang zurueck.
    /// Ein sitzungsfataler Fehler bricht ab; die fehlgeschlagene Nachricht
    /// wird nicht erneut eingereiht.
    pub async fn drain_when_ready<V, F>(&self, ist_bereit: F, verarbeiter: &mut V) -> SignalingResult<usize>
    where
        V: SignalVerarbeiter + ?Sized,
        F: Fn(&V) -> bool,
    {
        let mut angewendet = 0;

        loop {
            if !ist_bereit(&*verarbeiter) {
                return Ok(angewendet);
            }

            // Atomarer Austausch: der Puffer ist danach leer
            let mut durchgang = std::mem::take(&mut *self.puffer.lock());
            if durchgang.is_empty() {
                return Ok(angewendet);
            }
            tracing::debug!(anzahl = durchgang.len(), "SignalQueue wird abgearbeitet");

            while let Some(eintrag) = durchgang.pop_front() {
                match verarbeiter.signal_anwenden(eintrag.signal.clone()).await {
                    Ok(()) => angewendet += 1,
                    Err(SignalingError::RessourceNichtBereit) => {
                        durchgang.push_front(eintrag);
                        self.zurueckstellen(durchgang);
                        return Ok(angewendet);
                    }
                    Err(e) if e.ist_sitzungsfatal() => {
                        self.zurueckstellen(durchgang);
                        return Err(e);
                    }
                    Err(e) => {
                        tracing::warn!(typ = %eintrag.typ, fehler = %e, "Gepuffertes Signal abgelehnt");
                    }
                }
            }
        }
    }

    fn zurueckstellen(&self, mut rest: VecDeque<QueuedSignal>) {
        let mut puffer = self.puffer.lock();
        rest.append(&mut puffer);
        *puffer = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roulette_protocol::{IceCandidate, SessionDescription};

    #[derive(Default)]
    struct Aufzeichner {
        bereit: bool,
        angewendet: Vec<Signal>,
        /// Wird beim ersten Anwenden eingereiht
        nachzuegler: Option<(SignalQueue, Signal)>,
        fatal_bei: Option<SignalTyp>,
    }

    #[async_trait]
    impl SignalVerarbeiter for Aufzeichner {
        async fn signal_anwenden(&mut self, signal: Signal) -> SignalingResult<()> {
            if let Some((queue, spaet)) = self.nachzuegler.take() {
                queue.enqueue(spaet);
            }
            if self.fatal_bei == Some(signal.typ()) {
                return Err(SignalingError::VerhandlungsSchritt("abgelehnt".into()));
            }
            self.angewendet.push(signal);
            Ok(())
        }
    }

    fn kandidat(n: u32) -> Signal {
        Signal::Candidate(IceCandidate::neu(format!("candidate:{n}")))
    }

    fn angebot() -> Signal {
        Signal::Offer(SessionDescription::offer("v=0"))
    }

    #[tokio::test]
    async fn nicht_bereit_ist_noop() {
        let queue = SignalQueue::neu();
        queue.enqueue(angebot());
        let mut v = Aufzeichner::default();

        let n = queue.drain_when_ready(|v: &Aufzeichner| v.bereit, &mut v).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(queue.len(), 1);
        assert!(v.angewendet.is_empty());
    }

    #[tokio::test]
    async fn reihenfolge_bleibt_erhalten_und_genau_einmal() {
        let queue = SignalQueue::neu();
        queue.enqueue(kandidat(1));
        queue.enqueue(kandidat(2));
        queue.enqueue(angebot());
        assert_eq!(
            queue.typen(),
            vec![SignalTyp::Candidate, SignalTyp::Candidate, SignalTyp::Offer]
        );

        let mut v = Aufzeichner {
            bereit: true,
            ..Default::default()
        };
        let n = queue.drain_when_ready(|v: &Aufzeichner| v.bereit, &mut v).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(v.angewendet, vec![kandidat(1), kandidat(2), angebot()]);

        // Zweiter Durchgang wendet nichts erneut an
        let n = queue.drain_when_ready(|v: &Aufzeichner| v.bereit, &mut v).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(v.angewendet.len(), 3);
    }

    #[tokio::test]
    async fn waehrend_abarbeitung_eingereiht_folgt_als_naechster_durchgang() {
        let queue = SignalQueue::neu();
        queue.enqueue(kandidat(1));
        queue.enqueue(kandidat(2));

        let mut v = Aufzeichner {
            bereit: true,
            nachzuegler: Some((queue.clone(), kandidat(3))),
            ..Default::default()
        };
        let n = queue.drain_when_ready(|v: &Aufzeichner| v.bereit, &mut v).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(v.angewendet, vec![kandidat(1), kandidat(2), kandidat(3)]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn fataler_fehler_stellt_rest_zurueck() {
        let queue = SignalQueue::neu();
        queue.enqueue(angebot());
        queue.enqueue(kandidat(1));

        let mut v = Aufzeichner {
            bereit: true,
            fatal_bei: Some(SignalTyp::Offer),
            ..Default::default()
        };
        let ergebnis = queue.drain_when_ready(|v: &Aufzeichner| v.bereit, &mut v).await;
        assert!(matches!(ergebnis, Err(SignalingError::VerhandlungsSchritt(_))));
        assert_eq!(queue.typen(), vec![SignalTyp::Candidate]);

        queue.reset();
        assert!(queue.is_empty());
    }
}
