//! Prometheus-kompatible Metriken fuer Roulette
//!
//! Registrierte Metriken:
//! - `roulette_paarungen_total` – Counter: Getroffene Paarungsentscheidungen
//! - `roulette_sitzungen_verbunden_total` – Counter: Erfolgreich verhandelte Sessions
//! - `roulette_verhandlung_fehler_total` – Counter: Fehlgeschlagene Verhandlungsschritte
//! - `roulette_relay_fehler_total` – Counter: Fehlgeschlagene Relay-Abonnements
//! - `roulette_abbau_total` – Counter: Session-Abbauten (grund)
//! - `roulette_aktive_sitzungen` – Gauge: Aktuell offene Sessions
//! - `roulette_verbindungsaufbau_sekunden` – Histogram: Paarung bis Verbindung

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Roulette-Prometheus-Metriken
///
/// Clone teilt Registry und Metriken.
#[derive(Clone)]
pub struct RouletteMetrics {
    pub registry: Arc<Registry>,

    // Matchmaking
    pub paarungen_total: IntCounter,
    pub relay_fehler_total: IntCounter,

    // Verhandlung
    pub sitzungen_verbunden_total: IntCounter,
    pub verhandlung_fehler_total: IntCounter,
    pub verbindungsaufbau_sekunden: Histogram,

    // Lebenszyklus
    pub abbau_total: IntCounterVec,
    pub aktive_sitzungen: IntGauge,
}

impl RouletteMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Matchmaking ---
        let paarungen_total = IntCounter::with_opts(Opts::new(
            "roulette_paarungen_total",
            "Anzahl getroffener Paarungsentscheidungen",
        ))?;
        registry.register(Box::new(paarungen_total.clone()))?;

        let relay_fehler_total = IntCounter::with_opts(Opts::new(
            "roulette_relay_fehler_total",
            "Anzahl fehlgeschlagener Relay-Abonnements",
        ))?;
        registry.register(Box::new(relay_fehler_total.clone()))?;

        // --- Verhandlung ---
        let sitzungen_verbunden_total = IntCounter::with_opts(Opts::new(
            "roulette_sitzungen_verbunden_total",
            "Anzahl erfolgreich verhandelter Sessions",
        ))?;
        registry.register(Box::new(sitzungen_verbunden_total.clone()))?;

        let verhandlung_fehler_total = IntCounter::with_opts(Opts::new(
            "roulette_verhandlung_fehler_total",
            "Anzahl fehlgeschlagener Verhandlungsschritte",
        ))?;
        registry.register(Box::new(verhandlung_fehler_total.clone()))?;

        let verbindungsaufbau_sekunden = Histogram::with_opts(
            HistogramOpts::new(
                "roulette_verbindungsaufbau_sekunden",
                "Zeit von der Paarung bis zur Verbindung in Sekunden",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(verbindungsaufbau_sekunden.clone()))?;

        // --- Lebenszyklus ---
        let abbau_total = IntCounterVec::new(
            Opts::new("roulette_abbau_total", "Anzahl der Session-Abbauten"),
            &["grund"],
        )?;
        registry.register(Box::new(abbau_total.clone()))?;

        let aktive_sitzungen = IntGauge::with_opts(Opts::new(
            "roulette_aktive_sitzungen",
            "Anzahl aktuell offener Sessions",
        ))?;
        registry.register(Box::new(aktive_sitzungen.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            paarungen_total,
            relay_fehler_total,
            sitzungen_verbunden_total,
            verhandlung_fehler_total,
            verbindungsaufbau_sekunden,
            abbau_total,
            aktive_sitzungen,
        })
    }

    /// Zaehlt einen Abbau mit dem angegebenen Grund
    pub fn abbau_zaehlen(&self, grund: &str) {
        self.abbau_total.with_label_values(&[grund]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = RouletteMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn gauge_aktive_sitzungen() {
        let metriken = RouletteMetrics::neu().unwrap();
        metriken.aktive_sitzungen.inc();
        metriken.aktive_sitzungen.inc();
        metriken.aktive_sitzungen.dec();
        assert_eq!(metriken.aktive_sitzungen.get(), 1);
    }

    #[test]
    fn abbau_mit_grund_zaehlen() {
        let metriken = RouletteMetrics::neu().unwrap();
        metriken.abbau_zaehlen("explizit");
        metriken.abbau_zaehlen("explizit");
        metriken.abbau_zaehlen("partner_verlassen");
        assert_eq!(metriken.abbau_total.with_label_values(&["explizit"]).get(), 2);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = RouletteMetrics::neu().unwrap();
        metriken.paarungen_total.inc();
        metriken.verbindungsaufbau_sekunden.observe(0.3);

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("roulette_paarungen_total 1"));
        assert!(output.contains("roulette_verbindungsaufbau_sekunden"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn getrennte_instanzen_teilen_nichts() {
        let a = RouletteMetrics::neu().unwrap();
        let b = RouletteMetrics::neu().unwrap();
        a.relay_fehler_total.inc();
        assert_eq!(b.relay_fehler_total.get(), 0);
        assert_eq!(a.clone().relay_fehler_total.get(), 1);
    }
}
