pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{ActionType, ClinicalIssue, IntentResult, OrchestrationPlan, Urgency};
pub use services::intent::IntentAnalyzer;
pub use services::llm::{GeminiClient, LlmClient};
pub use services::orchestrator::OrchestrationService;
