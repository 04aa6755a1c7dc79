//! The single versioned pattern table: red flags, greeting/small-talk
//! pre-filters, sedation signals, and the forbidden-output scanner. Any change
//! here is a public API change; bump [`PATTERN_TABLE_VERSION`].
//!
//! The regex engine has no lookbehind, so negated contexts ("no difficulty
//! swallowing") are handled by scanning a bounded window before each red-flag
//! match instead.

use once_cell::sync::Lazy;
use regex::Regex;

pub const PATTERN_TABLE_VERSION: u32 = 3;

/// Which clinical feature a red flag asserts on the synthesized issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedFlagKind {
    Airway,
    Bleeding,
    Trauma,
    Systemic,
}

pub struct RedFlag {
    pub label: &'static str,
    pub kind: RedFlagKind,
    pub pattern: Regex,
}

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("pattern table regex must compile")
}

pub static RED_FLAGS: Lazy<Vec<RedFlag>> = Lazy::new(|| {
    let flag = |label, kind, pattern: &str| RedFlag {
        label,
        kind,
        pattern: rx(pattern),
    };
    vec![
        flag("airway obstruction", RedFlagKind::Airway, r"airway\s+(obstruct|block|clos)"),
        flag("breathing difficulty", RedFlagKind::Airway, r"(trouble|difficulty)\s+breathing"),
        flag("cannot breathe", RedFlagKind::Airway, r"can'?t\s+breathe|cannot\s+breathe|unable\s+to\s+breathe"),
        flag("swallowing difficulty", RedFlagKind::Airway, r"difficulty\s+swallowing"),
        flag("cannot swallow", RedFlagKind::Airway, r"(can'?t|cannot|unable\s+to)\s+swallow"),
        flag("swelling near airway", RedFlagKind::Airway, r"swelling.{0,20}(eye|throat|neck|airway)"),
        flag("uncontrolled bleeding", RedFlagKind::Bleeding, r"uncontroll?(ed|able)\s+bleed"),
        flag("heavy oral bleeding", RedFlagKind::Bleeding, r"heavy\s+bleeding.{0,20}(tooth|gum|mouth)"),
        flag("severe trauma", RedFlagKind::Trauma, r"severe\s+trauma"),
        flag("jaw fracture", RedFlagKind::Trauma, r"jaw\s+(fracture|broken)|broken\s+jaw"),
        flag("avulsed tooth", RedFlagKind::Trauma, r"(knocked?\s*(out|off)|avulsed)\s*(tooth|teeth)"),
        flag("avulsed tooth", RedFlagKind::Trauma, r"(tooth|teeth)\s*(knocked?\s*(out|off)|avulsed)"),
        flag("anaphylaxis", RedFlagKind::Systemic, r"anaphyla|allergic\s+reaction"),
        flag("chest pain", RedFlagKind::Systemic, r"chest\s+pain"),
        flag("loss of consciousness", RedFlagKind::Systemic, r"loss\s+of\s+consciousness|passed\s+out|blacked\s+out"),
    ]
});

/// Negation tokens that may precede a red flag and defuse it, e.g.
/// "no difficulty swallowing", "without trouble breathing".
static NEGATION_GUARD: Lazy<Regex> =
    Lazy::new(|| rx(r"(?:\b(?:no|not|without|denies|deny)\b(?:\s+\w+){0,2}\s*)$"));

const NEGATION_WINDOW: usize = 24;

/// First non-negated red flag in the text, if any. Position-insensitive.
pub fn red_flag_match(text: &str) -> Option<&'static RedFlag> {
    let lower = text.to_lowercase();
    for flag in RED_FLAGS.iter() {
        for m in flag.pattern.find_iter(&lower) {
            let window_start = m.start().saturating_sub(NEGATION_WINDOW);
            // Stay on a char boundary for the window slice.
            let window_start = (window_start..=m.start())
                .find(|&i| lower.is_char_boundary(i))
                .unwrap_or(m.start());
            let preceding = &lower[window_start..m.start()];
            if !NEGATION_GUARD.is_match(preceding) {
                return Some(flag);
            }
        }
    }
    None
}

// ── Greeting / small-talk (deterministic, anchored, run before the LLM) ─────

static GREETING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        rx(r"^(hi|hii+|hey|hello|hola|yo|sup|hiya|howdy|greetings|good\s*(morning|afternoon|evening|day|night))[\s!?.]*$"),
        rx(r"^(what'?s?\s*up|how\s*are\s*you|how'?s?\s*it\s*going)[\s!?.]*$"),
        rx(r"^(thanks|thank\s*you|ty|thx|cheers)[\s!?.]*$"),
        rx(r"^(bye|goodbye|see\s*you|later|cya|take\s*care)[\s!?.]*$"),
        rx(r"^(ok|okay|sure|alright|fine|cool|great|nice|awesome|got\s*it|understood)[\s!?.]*$"),
        rx(r"^(yes|no|yep|nope|yeah|nah|yup)[\s!?.]*$"),
    ]
});

static SMALL_TALK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        rx(r"^(who\s*are\s*you|what\s*can\s*you\s*do|what\s*is\s*this|help)[\s!?.]*$"),
        rx(r"^(tell\s*me\s*(about|more)|what\s*services)[\s!?.]*$"),
        rx(r"^(can\s*you\s*help|i\s*need\s*help)[\s!?.]*$"),
    ]
});

pub fn is_greeting(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    GREETING_PATTERNS.iter().any(|p| p.is_match(&lower))
}

pub fn is_small_talk(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    SMALL_TALK_PATTERNS.iter().any(|p| p.is_match(&lower))
}

// ── Sedation signals ────────────────────────────────────────────────────────

static SEDATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        rx(r"sedat|knock.{0,5}out|put.{0,5}(me|to)\s*sleep|asleep|anaesthe|general\s*an|iv\s*sed"),
        rx(r"dental\s*phobia|terrified|extreme.{0,10}anxiet|panic"),
        rx(r"(want|need|prefer).{0,10}(sleep|unconscious|sedation)"),
    ]
});

pub fn mentions_sedation(text: &str) -> bool {
    let lower = text.to_lowercase();
    SEDATION_PATTERNS.iter().any(|p| p.is_match(&lower))
}

// ── Forbidden LLM output (post-extraction safety scan) ──────────────────────

static FORBIDDEN_OUTPUT: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        // Diagnosis phrasings.
        rx(r"you\s+(likely\s+|probably\s+|definitely\s+)?have\s"),
        rx(r"\bdiagnos(is|ed|e|tic)\b"),
        rx(r"this\s+is\s+(likely|probably|definitely)"),
        rx(r"\b(pulpitis|periodontitis|pericoronitis|necrosis|carcinoma)\b"),
        // Treatment recommendations the system must never phrase itself.
        rx(r"(need|needs|require|requires|recommend|should\s+(get|have))\s+(a\s+|an\s+)?(root\s*canal|extraction|filling|crown|implant|bridge)"),
        rx(r"\bprescri(be|bed|ption)\b"),
        // Drug names.
        rx(r"\b(amoxicillin|penicillin|ibuprofen|paracetamol|acetaminophen|codeine|clindamycin|metronidazole|tramadol)\b"),
    ]
});

pub fn violates_output_safety(text: &str) -> bool {
    let lower = text.to_lowercase();
    FORBIDDEN_OUTPUT.iter().any(|p| p.is_match(&lower))
}
