//! roulette-client – Lokale Paarungssitzung
//!
//! Startet zwei Orchestratoren ueber dem In-Memory-Relay und dem
//! Loopback-Transport, wartet bis beide verbunden sind und baut die
//! Session danach wieder ab.

pub mod config;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use roulette_core::event::PresentationEvent;
use roulette_core::types::{ClientId, ConnectionState, SessionChannelId};
use roulette_observability::RouletteMetrics;
use roulette_signaling::{
    InMemoryRelay, LoopbackFactory, OrchestratorHandle, SessionOrchestrator, SimulierteMedien,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use config::ClientConfig;

/// Maximale Wartezeit auf einen Verbindungszustand
const ZEITLIMIT: Duration = Duration::from_secs(10);

/// Ergebnis einer lokalen Sitzung
#[derive(Debug)]
pub struct SitzungsBericht {
    pub teilnehmer: [ClientId; 2],
    pub kanal: Option<SessionChannelId>,
    /// Zeit vom Suchstart bis beide Seiten verbunden sind
    pub verbindungsaufbau: Duration,
    /// Prometheus-Textformat, falls Metriken aktiviert sind
    pub metriken: Option<String>,
}

struct Teilnehmer {
    id: ClientId,
    handle: OrchestratorHandle,
    ereignisse: mpsc::UnboundedReceiver<PresentationEvent>,
    task: JoinHandle<()>,
}

impl Teilnehmer {
    fn starten(
        id: ClientId,
        config: &ClientConfig,
        relay: &InMemoryRelay,
        factory: &LoopbackFactory,
        metriken: Option<&RouletteMetrics>,
    ) -> Self {
        let (mut orchestrator, ereignisse) = SessionOrchestrator::neu(
            config.orchestrator_konfiguration(id.clone()),
            Arc::new(relay.clone()),
            Arc::new(factory.clone()),
        );
        if let Some(m) = metriken {
            orchestrator = orchestrator.mit_metriken(m.clone());
        }
        let handle = orchestrator.handle();
        let task = tokio::spawn(orchestrator.run());
        Self {
            id,
            handle,
            ereignisse,
            task,
        }
    }

    /// Wartet auf einen Verbindungszustand
    ///
    /// Ein Verbindungsfehler vor `Connected` bricht ab.
    async fn warten_auf(&mut self, ziel: ConnectionState) -> Result<()> {
        let id = self.id.clone();
        let ereignisse = &mut self.ereignisse;
        tokio::time::timeout(ZEITLIMIT, async move {
            while let Some(ereignis) = ereignisse.recv().await {
                match ereignis {
                    PresentationEvent::VerbindungsStatus { zustand } if zustand == ziel => {
                        return Ok(());
                    }
                    PresentationEvent::Verbindungsfehler { nachricht, .. }
                        if ziel == ConnectionState::Connected =>
                    {
                        return Err(anyhow!("Verbindungsfehler bei {id}: {nachricht}"));
                    }
                    PresentationEvent::RemoteMediaVerfuegbar { media } => {
                        tracing::info!(
                            client_id = %id,
                            stream_id = %media.stream_id,
                            spuren = media.track_ids.len(),
                            "Entfernte Medien verfuegbar"
                        );
                    }
                    andere => tracing::debug!(client_id = %id, ereignis = ?andere, "Ereignis"),
                }
            }
            Err(anyhow!("Ereigniskanal von {id} geschlossen"))
        })
        .await
        .with_context(|| format!("Zeitlimit beim Warten auf {ziel:?} ({})", self.id))?
    }

    async fn beenden(self) -> Result<()> {
        self.handle.beenden()?;
        self.task.await?;
        Ok(())
    }
}

/// Fuehrt eine vollstaendige Paarung zweier lokaler Clients durch
pub async fn lokale_sitzung(config: &ClientConfig) -> Result<SitzungsBericht> {
    let metriken = if config.metriken.aktiviert {
        Some(RouletteMetrics::neu()?)
    } else {
        None
    };
    let relay = InMemoryRelay::neu();
    let factory = LoopbackFactory::neu();

    let mut erster = Teilnehmer::starten(
        config.client_id(),
        config,
        &relay,
        &factory,
        metriken.as_ref(),
    );
    let mut zweiter = Teilnehmer::starten(
        ClientId::generieren(),
        config,
        &relay,
        &factory,
        metriken.as_ref(),
    );
    tracing::info!(
        name = %config.client.anzeigename,
        erster = %erster.id,
        zweiter = %zweiter.id,
        "Lokale Sitzung wird gestartet"
    );

    let start = Instant::now();
    for t in [&erster, &zweiter] {
        let medien = SimulierteMedien::neu(format!("kamera-{}", t.id));
        t.handle.lokale_medien(Arc::new(medien))?;
        t.handle.suche_starten()?;
    }

    erster.warten_auf(ConnectionState::Connected).await?;
    zweiter.warten_auf(ConnectionState::Connected).await?;
    let verbindungsaufbau = start.elapsed();
    let kanal = erster.handle.zustand().await?.kanal;
    tracing::info!(
        kanal = ?kanal,
        dauer_ms = verbindungsaufbau.as_millis() as u64,
        "Beide Clients verbunden"
    );

    // Abbau von einer Seite; die andere folgt ueber die Presence
    erster.handle.suche_stoppen()?;
    erster.warten_auf(ConnectionState::Closed).await?;
    zweiter.warten_auf(ConnectionState::Closed).await?;

    let teilnehmer = [erster.id.clone(), zweiter.id.clone()];
    erster.beenden().await?;
    zweiter.beenden().await?;

    let metriken = metriken.map(|m| m.exportieren()).transpose()?;
    Ok(SitzungsBericht {
        teilnehmer,
        kanal,
        verbindungsaufbau,
        metriken,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lokale_sitzung_verbindet_und_baut_ab() {
        let mut config = ClientConfig::default();
        config.client.id = Some("alice".into());

        let bericht = lokale_sitzung(&config).await.unwrap();
        assert_eq!(bericht.teilnehmer[0], ClientId::from("alice"));
        let kanal = bericht.kanal.unwrap();
        assert!(kanal.as_str().starts_with("private:chat_room_"));
        assert!(kanal.as_str().contains("alice"));

        let metriken = bericht.metriken.unwrap();
        assert!(metriken.contains("roulette_paarungen_total 2"));
        assert!(metriken.contains("roulette_sitzungen_verbunden_total 2"));
        assert!(metriken.contains("roulette_aktive_sitzungen 0"));
    }

    #[tokio::test]
    async fn ohne_metriken_kein_export() {
        let mut config = ClientConfig::default();
        config.metriken.aktiviert = false;

        let bericht = lokale_sitzung(&config).await.unwrap();
        assert!(bericht.metriken.is_none());
        assert_ne!(bericht.teilnehmer[0], bericht.teilnehmer[1]);
    }
}
