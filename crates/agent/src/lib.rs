//! Conversation pipeline for the RM Traceability SaaS assistant.
//!
//! A turn flows through a fixed sequence of stages:
//! 1. **Session** (`session`) - load or lazily create per-session state
//! 2. **Extraction** (`extractor`, `reference`) - find the product the user means
//! 3. **Classification** (`classifier`) - map the utterance to an [`Intent`]
//! 4. **Composition** (`composer`, `guardrails`) - answer from backend data or a
//!    grounded model completion
//! 5. **Persistence** (`runtime`) - append the exchange to the session history
//!
//! # Key Types
//!
//! - `ConversationOrchestrator` - runs one turn end to end (see `runtime`)
//! - `LlmClient` - black-box text completion seam
//! - `InventoryApi` / `BackendGateway` - backend access with timeout and defaults
//! - `SessionStore` - injectable session storage with eviction
//!
//! # Safety Principle
//!
//! The model never produces inventory numbers or code lists. Those intents are
//! answered verbatim from the backend of record; generated text is only used for
//! navigation help, and is replaced by a fixed sentence when it strays.
//!
//! [`Intent`]: tracechat_core::Intent

pub mod advisor;
pub mod classifier;
pub mod composer;
pub mod extractor;
pub mod gateway;
pub mod guardrails;
pub mod llm;
pub mod matchers;
pub mod reference;
pub mod runtime;
pub mod session;

pub use advisor::{HeuristicAdvisor, NextAction, NextActionAdvisor};
pub use composer::ResponseComposer;
pub use extractor::ProductExtractor;
pub use gateway::{BackendGateway, InventoryApi};
pub use llm::{CompletionRequest, GenerationParams, LlmClient, ModelLoader, SharedModel};
pub use runtime::{ConversationOrchestrator, TurnOutcome, TurnRequest};
pub use session::{EvictionPolicy, InMemorySessionStore, SessionStore};
