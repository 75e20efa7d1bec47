//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `RR_LOG_LEVEL`: Log-Level oder Filter-Direktive, Standard: info
//! - `RR_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Umgebungsvariablen haben Vorrang vor der Konfigurationsdatei.

use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Level
pub const ENV_LOG_LEVEL: &str = "RR_LOG_LEVEL";

/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "RR_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Liest `RR_LOG_LEVEL` und `RR_LOG_FORMAT` aus der Umgebung und faellt auf
/// die uebergebenen Werte zurueck. Ein bereits installierter Subscriber
/// (z.B. in Tests) bleibt bestehen.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = format_waehlen(std::env::var(ENV_LOG_FORMAT).ok(), format);

    let ergebnis = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging war bereits initialisiert");
    }
}

/// Waehlt das Log-Format: gueltiger Umgebungswert vor Konfigurationswert
pub fn format_waehlen(aus_env: Option<String>, konfiguriert: &str) -> String {
    match aus_env {
        Some(f) if log_format_gueltig(&f) => f,
        _ if log_format_gueltig(konfiguriert) => konfiguriert.to_string(),
        _ => "text".to_string(),
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level), "{level} muss gueltig sein");
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn format_umgebung_hat_vorrang() {
        assert_eq!(format_waehlen(Some("json".into()), "text"), "json");
        assert_eq!(format_waehlen(None, "json"), "json");
    }

    #[test]
    fn format_ungueltig_faellt_auf_text() {
        assert_eq!(format_waehlen(Some("xml".into()), "text"), "text");
        assert_eq!(format_waehlen(Some("JSON".into()), "yaml"), "text");
    }

    #[test]
    fn doppelte_initialisierung_panikt_nicht() {
        logging_initialisieren("debug", "text");
        logging_initialisieren("info", "json");
    }
}
