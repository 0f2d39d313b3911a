//! 服务模块

pub mod analyzer;
pub mod image;
pub mod llm_client;
pub mod prompt_store;
pub mod qr;
pub mod validators;
pub mod venue_matcher;

pub use analyzer::{Analyzer, AnalyzerSettings, AnalysisOutcome, QuickOutcome, ReceiptImage};
pub use llm_client::{ChatModel, OpenAiClient};
pub use prompt_store::{PromptKind, PromptSource, PromptStore};
pub use validators::Validator;
pub use venue_matcher::{VenueIndex, VenueMatch};
