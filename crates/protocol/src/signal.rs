//! Signaling-Umschlag
//!
//! Jede Verhandlungsnachricht wird als Broadcast auf dem Session-Kanal
//! eines Paares versendet:
//!
//! ```text
//! { "type": "offer" | "answer" | "candidate", "payload": { ... }, "from": "<client-id>" }
//! ```
//!
//! Angebote und Antworten tragen als Payload eine Beschreibung
//! (`{"type": "offer", "sdp": "..."}`), Kandidaten das Browser-Format aus
//! [`crate::ice::IceCandidate`].

use roulette_core::types::ClientId;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::ice::IceCandidate;

// ---------------------------------------------------------------------------
// Beschreibungen
// ---------------------------------------------------------------------------

/// Art einer Sitzungsbeschreibung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpTyp {
    Offer,
    Answer,
}

/// Sitzungsbeschreibung (SDP) wie sie der Transport erzeugt und anwendet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub typ: SdpTyp,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            typ: SdpTyp::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            typ: SdpTyp::Answer,
            sdp: sdp.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Signale
// ---------------------------------------------------------------------------

/// Typ-Feld des Umschlags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalTyp {
    Offer,
    Answer,
    Candidate,
}

impl std::fmt::Display for SignalTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
        };
        f.write_str(s)
    }
}

/// Typsichere Verhandlungsnachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

impl Signal {
    pub fn typ(&self) -> SignalTyp {
        match self {
            Self::Offer(_) => SignalTyp::Offer,
            Self::Answer(_) => SignalTyp::Answer,
            Self::Candidate(_) => SignalTyp::Candidate,
        }
    }
}

// ---------------------------------------------------------------------------
// SignalEnvelope
// ---------------------------------------------------------------------------

/// Umschlag auf dem Session-Kanal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub typ: SignalTyp,
    pub payload: serde_json::Value,
    pub from: ClientId,
}

impl SignalEnvelope {
    /// Verpackt ein Signal mit der Absender-Identitaet
    pub fn verpacken(signal: &Signal, from: &ClientId) -> ProtocolResult<Self> {
        let payload = match signal {
            Signal::Offer(d) | Signal::Answer(d) => serde_json::to_value(d)?,
            Signal::Candidate(c) => serde_json::to_value(c)?,
        };
        Ok(Self {
            typ: signal.typ(),
            payload,
            from: from.clone(),
        })
    }

    /// Dekodiert die Payload passend zum Typ-Feld
    pub fn auspacken(&self) -> ProtocolResult<Signal> {
        match self.typ {
            SignalTyp::Offer => {
                let d: SessionDescription = serde_json::from_value(self.payload.clone())?;
                Self::typ_pruefen(SdpTyp::Offer, &d)?;
                Ok(Signal::Offer(d))
            }
            SignalTyp::Answer => {
                let d: SessionDescription = serde_json::from_value(self.payload.clone())?;
                Self::typ_pruefen(SdpTyp::Answer, &d)?;
                Ok(Signal::Answer(d))
            }
            SignalTyp::Candidate => Ok(Signal::Candidate(serde_json::from_value(
                self.payload.clone(),
            )?)),
        }
    }

    /// Stammt der Umschlag vom angegebenen Client?
    pub fn ist_von(&self, client_id: &ClientId) -> bool {
        &self.from == client_id
    }

    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn typ_pruefen(erwartet: SdpTyp, d: &SessionDescription) -> ProtocolResult<()> {
        if d.typ != erwartet {
            return Err(ProtocolError::TypKonflikt {
                erwartet: format!("{erwartet:?}"),
                erhalten: format!("{:?}", d.typ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn angebot_wire_format() {
        let alice = ClientId::from("alice");
        let env = SignalEnvelope::verpacken(&Signal::Offer(SessionDescription::offer("v=0")), &alice)
            .unwrap();
        let wert: serde_json::Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(
            wert,
            json!({
                "type": "offer",
                "payload": { "type": "offer", "sdp": "v=0" },
                "from": "alice"
            })
        );
    }

    #[test]
    fn kandidat_aus_web_client() {
        let roh = r#"{
            "type": "candidate",
            "payload": { "candidate": "candidate:1 1 udp 1 10.0.0.1 9 typ host", "sdpMid": "0", "sdpMLineIndex": 0 },
            "from": "bob"
        }"#;
        let env = SignalEnvelope::from_json(roh).unwrap();
        assert!(env.ist_von(&ClientId::from("bob")));
        match env.auspacken().unwrap() {
            Signal::Candidate(k) => {
                assert_eq!(k.sdp_mid.as_deref(), Some("0"));
                assert_eq!(k.sdp_m_line_index, Some(0));
            }
            other => panic!("Kandidat erwartet, erhalten: {other:?}"),
        }
    }

    #[test]
    fn typ_konflikt_wird_abgelehnt() {
        let env = SignalEnvelope {
            typ: SignalTyp::Offer,
            payload: json!({ "type": "answer", "sdp": "v=0" }),
            from: ClientId::from("bob"),
        };
        assert!(matches!(
            env.auspacken(),
            Err(ProtocolError::TypKonflikt { .. })
        ));
    }

    #[test]
    fn unbekannter_typ_ist_fehler() {
        let roh = r#"{"type":"bye","payload":{},"from":"bob"}"#;
        assert!(SignalEnvelope::from_json(roh).is_err());
    }

    #[test]
    fn kaputte_payload_ist_fehler() {
        let env = SignalEnvelope {
            typ: SignalTyp::Candidate,
            payload: json!({ "sdpMid": "0" }),
            from: ClientId::from("bob"),
        };
        assert!(matches!(env.auspacken(), Err(ProtocolError::Json(_))));
    }
}
