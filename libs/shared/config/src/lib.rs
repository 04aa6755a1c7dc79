use std::env;
use tracing::warn;

// ── Clinic operating grid ───────────────────────────────────────────────────
// Compile-time scheduling parameters shared by every cell. A day runs
// 09:00–17:00 on a 15-minute grid, giving 32 bookable blocks.

pub const DAY_START_HOUR: u32 = 9;
pub const DAY_END_HOUR: u32 = 17;
pub const SLOT_MINUTES: u32 = 15;
pub const SLOTS_PER_DAY: usize = ((DAY_END_HOUR - DAY_START_HOUR) * (60 / SLOT_MINUTES)) as usize;
pub const BUFFER_SLOTS: usize = 1;
pub const SCHEDULE_LOOKAHEAD_DAYS: i64 = 14;

/// Days scanned by the emergency finder (today inclusive).
pub const EMERGENCY_LOOKAHEAD_DAYS: i64 = 4;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub llm_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL").unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY").unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET").unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            }),
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(12),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// The extractor degrades to deterministic clarification when no key is set.
    pub fn is_llm_configured(&self) -> bool {
        !self.gemini_api_key.is_empty()
    }
}
