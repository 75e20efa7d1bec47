//! Fehlertypen fuer das Signaling-Protokoll

use thiserror::Error;

/// Fehler beim Kodieren oder Dekodieren eines Umschlags
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON ungueltig oder Payload passt nicht zum Typ
    #[error("Ungueltiger Umschlag: {0}")]
    Json(#[from] serde_json::Error),

    /// Beschreibungstyp passt nicht zum Umschlagtyp
    #[error("Beschreibungstyp {erhalten} passt nicht zu Umschlag {erwartet}")]
    TypKonflikt { erwartet: String, erhalten: String },
}

/// Result-Typ fuer das Protokoll
pub type ProtocolResult<T> = Result<T, ProtocolError>;
