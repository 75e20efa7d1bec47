//! Roulette Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und fuehrt eine
//! lokale Paarungssitzung durch.

use anyhow::Result;
use roulette_client::{config::ClientConfig, lokale_sitzung};
use roulette_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("ROULETTE_CONFIG").unwrap_or_else(|_| "roulette.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Roulette Client wird initialisiert"
    );
    config.pruefen()?;

    let bericht = lokale_sitzung(&config).await?;
    tracing::info!(
        teilnehmer = ?bericht.teilnehmer,
        dauer_ms = bericht.verbindungsaufbau.as_millis() as u64,
        "Lokale Sitzung abgeschlossen"
    );

    if let Some(text) = bericht.metriken {
        println!("{text}");
    }
    Ok(())
}
