//! roulette-signaling – Matchmaking und Verhandlungs-Orchestrierung
//!
//! Dieser Crate paart zwei anonyme Clients ueber eine gemeinsame
//! Presence-Sicht und treibt anschliessend den Austausch von Angebot,
//! Antwort und Kandidaten, bis eine direkte Medienverbindung steht.
//!
//! ## Architektur
//!
//! ```text
//! Oberflaeche ──Befehl──► OrchestratorHandle
//!                              |
//!                              v
//!          SessionOrchestrator (ein Task, eine geordnete Queue)
//!              |
//!              +-- MatchmakingCoordinator  (Warteraum, Paarung, Kanalwechsel)
//!              +-- NegotiationEngine       (Offer / Answer / Candidate)
//!              +-- SignalQueue             (Puffer bis die Medien bereit sind)
//!              +-- ConnectionLifecycleManager (Konnektivitaet, genau ein Abbau)
//!              |
//!              +--► PresentationEvent ──► Oberflaeche
//!
//! Relay (Trait)              – Presence + Broadcast, z.B. InMemoryRelay
//! TransportFactory (Trait)   – Verhandlungstransport, z.B. LoopbackFactory
//! ```

pub mod error;
pub mod lifecycle;
pub mod loopback;
pub mod matchmaking;
pub mod memory;
pub mod negotiation;
pub mod orchestrator;
pub mod queue;
pub mod relay;
pub mod transport;

// Bequeme Re-Exporte
pub use error::{SignalingError, SignalingResult};
pub use lifecycle::{ConnectionLifecycleManager, TeardownGrund};
pub use loopback::{LoopbackFactory, SimulierteMedien};
pub use matchmaking::{MatchmakingCoordinator, MatchmakingKonfiguration};
pub use memory::InMemoryRelay;
pub use negotiation::{NegotiationEngine, NegotiationPhase, SignalSink};
pub use orchestrator::{
    Befehl, OrchestratorHandle, OrchestratorKonfiguration, OrchestratorZustand,
    SessionOrchestrator,
};
pub use queue::{QueuedSignal, SignalQueue};
pub use relay::{Relay, RelayHandle};
pub use transport::{LocalMedia, MediaTrack, NegotiationTransport, TransportFactory};
