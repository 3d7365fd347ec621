// core/mod.rs
pub mod extraction;
pub mod filler;
pub mod generation_service;
pub mod ledger_service;
pub mod retention_service;
pub mod suggestion_tracker;

pub use extraction::{Extractor, HttpExtractor};
pub use filler::{filler_pour, FillOutcome, Filler, FillerError};
pub use generation_service::{GenerationResult, GenerationService, MajProposition};
pub use ledger_service::LedgerService;
pub use retention_service::RetentionService;
pub use suggestion_tracker::{evaluer_drift, EtatModifications};
