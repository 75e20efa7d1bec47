//! ICE-Kandidaten und ICE-Server
//!
//! Die Feldnamen folgen dem Browser-Format (`sdpMid`, `sdpMLineIndex`),
//! damit Umschlaege mit Web-Clients austauschbar bleiben.

use serde::{Deserialize, Serialize};

/// Inkrementell entdeckter Netzwerkpfad (Trickle-ICE)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    /// Erstellt einen Kandidaten fuer die erste Media-Zeile
    pub fn neu(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }

    /// Leerer Kandidat signalisiert das Ende der Sammlung
    pub fn ist_ende_marker(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

/// STUN/TURN-Server fuer den Verhandlungstransport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// STUN-Server ohne Zugangsdaten
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Ist ein TURN-Server (braucht Zugangsdaten)
    pub fn ist_turn(&self) -> bool {
        self.urls
            .iter()
            .any(|u| u.starts_with("turn:") || u.starts_with("turns:"))
    }
}

/// Oeffentliche STUN-Server als Standard
pub fn standard_ice_server() -> Vec<IceServer> {
    vec![
        IceServer::stun("stun:stun.l.google.com:19302"),
        IceServer::stun("stun:stun1.l.google.com:19302"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kandidat_im_browser_format() {
        let k = IceCandidate::neu("candidate:1 1 UDP 2122252543 192.168.1.1 50000 typ host");
        let json = serde_json::to_value(&k).unwrap();
        assert_eq!(json["sdpMid"], "0");
        assert_eq!(json["sdpMLineIndex"], 0);
        assert!(json["candidate"].as_str().unwrap().contains("typ host"));
    }

    #[test]
    fn kandidat_ohne_optionale_felder() {
        let k: IceCandidate = serde_json::from_str(r#"{"candidate":"candidate:2"}"#).unwrap();
        assert_eq!(k.sdp_mid, None);
        assert_eq!(k.sdp_m_line_index, None);
        assert!(!k.ist_ende_marker());
    }

    #[test]
    fn standard_server_sind_stun() {
        let server = standard_ice_server();
        assert_eq!(server.len(), 2);
        assert!(server.iter().all(|s| !s.ist_turn()));
    }

    #[test]
    fn turn_server_ohne_leere_felder_serialisiert() {
        let s = IceServer::stun("stun:example.org:3478");
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("username"));
    }
}
