//! Clinical gate: the deterministic intake state machine. It alone decides
//! whether an issue is complete enough to route, which question comes next,
//! and when escalation is mandatory. LLM output never overrides it.

use crate::models::ClinicalIssue;

/// Minimum number of known profile elements before routing is allowed, capped
/// by how many elements apply to the issue at all so thin concerns (a plain
/// checkup request) can still complete.
const PROFILE_FLOOR: usize = 3;

struct ElementRule {
    key: &'static str,
    question: &'static str,
    answer_keys: &'static [&'static str],
    applicable: fn(&ClinicalIssue) -> bool,
    required: fn(&ClinicalIssue) -> bool,
    present: fn(&ClinicalIssue) -> bool,
}

fn always(_: &ClinicalIssue) -> bool {
    true
}

fn never(_: &ClinicalIssue) -> bool {
    false
}

fn has_pain(issue: &ClinicalIssue) -> bool {
    issue.has_pain
}

fn has_swelling(issue: &ClinicalIssue) -> bool {
    issue.swelling
}

fn pain_or_swelling(issue: &ClinicalIssue) -> bool {
    issue.has_pain || issue.swelling
}

fn mentions_bleeding(issue: &ClinicalIssue) -> bool {
    issue.bleeding
        || issue
            .reported_symptoms
            .iter()
            .any(|s| s.to_lowercase().contains("bleed"))
}

fn answered(issue: &ClinicalIssue, keys: &[&str]) -> bool {
    keys.iter()
        .any(|k| issue.field_answers.get(*k).is_some_and(|v| !v.trim().is_empty()))
}

/// The canonical intake elements, in questioning priority order.
static CLINICAL_ELEMENTS: &[ElementRule] = &[
    ElementRule {
        key: "location",
        question: "Where exactly is the concern - which tooth or area of your mouth?",
        answer_keys: &["location", "pain_location"],
        applicable: always,
        required: pain_or_swelling,
        present: |i| i.location.as_deref().is_some_and(|l| !l.trim().is_empty()),
    },
    ElementRule {
        key: "duration",
        question: "How long has this been going on? (less than 24 hours, 1-3 days, 4-7 days, 1-2 weeks, more than 2 weeks)",
        answer_keys: &["duration", "duration_days"],
        applicable: always,
        required: always,
        present: |i| i.duration_days.is_some(),
    },
    ElementRule {
        key: "severity",
        question: "On a scale of 1-10, how severe is the pain right now?",
        answer_keys: &["severity", "pain_severity"],
        applicable: has_pain,
        required: has_pain,
        present: |i| i.severity.is_some(),
    },
    ElementRule {
        key: "stimulus",
        question: "Does anything set it off - hot or cold, or chewing and pressure?",
        answer_keys: &["stimulus", "thermal_duration"],
        applicable: has_pain,
        required: has_pain,
        present: |i| {
            i.thermal_sensitivity || i.biting_pain || answered(i, &["stimulus", "thermal_duration"])
        },
    },
    ElementRule {
        key: "swelling_location",
        question: "Where is the swelling - face, cheek, jaw, neck, or inside the mouth?",
        answer_keys: &["swelling_location"],
        applicable: has_swelling,
        required: has_swelling,
        present: |i| i.visible_swelling || answered(i, &["swelling_location"]),
    },
    ElementRule {
        key: "airway_status",
        question: "Is the swelling affecting your breathing or swallowing in any way?",
        answer_keys: &["airway_status"],
        applicable: has_swelling,
        required: has_swelling,
        // An explicit negative ("no breathing trouble") counts as a known
        // airway status; only silence leaves the element open.
        present: |i| {
            i.airway_compromise
                || answered(i, &["airway_status"])
                || i.reported_symptoms.iter().any(|s| {
                    let l = s.to_lowercase();
                    l.contains("breath") || l.contains("airway") || l.contains("swallow")
                })
        },
    },
    ElementRule {
        key: "hemorrhage_status",
        question: "Is there any bleeding right now, and if so is it controlled?",
        answer_keys: &["hemorrhage_status"],
        applicable: mentions_bleeding,
        required: mentions_bleeding,
        present: |i| i.bleeding || answered(i, &["hemorrhage_status"]),
    },
    // The last two enrich the profile but never block routing on their own.
    ElementRule {
        key: "chronobiology",
        question: "Does the pain wake you at night or is it worse at certain times?",
        answer_keys: &["chronobiology"],
        applicable: has_pain,
        required: never,
        present: |i| {
            answered(i, &["chronobiology"])
                || i.reported_symptoms
                    .iter()
                    .any(|s| s.to_lowercase().contains("night") || s.to_lowercase().contains("woke"))
        },
    },
    ElementRule {
        key: "systemic_risk",
        question: "Do you have fever, or any medical conditions we should know about?",
        answer_keys: &["systemic_risk"],
        applicable: has_swelling,
        required: never,
        present: |i| {
            answered(i, &["systemic_risk"])
                || i.reported_symptoms
                    .iter()
                    .any(|s| s.to_lowercase().contains("fever"))
        },
    },
];

/// Recompute `clinical_profile` and `missing_clinical_elements` from the
/// issue's current features. Idempotent.
pub fn assess_completeness(issue: &mut ClinicalIssue) {
    let snapshot = issue.clone();

    issue.clinical_profile.clear();
    issue.missing_clinical_elements.clear();

    for rule in CLINICAL_ELEMENTS {
        if !(rule.applicable)(&snapshot) {
            continue;
        }
        let present = (rule.present)(&snapshot);
        issue.clinical_profile.insert(rule.key.to_string(), present);
        if (rule.required)(&snapshot) && !present {
            issue.missing_clinical_elements.push(rule.key.to_string());
        }
    }
}

/// Drop any missing element whose field key has a non-empty structured answer.
pub fn prune_answered(issue: &mut ClinicalIssue) {
    let answered_keys: Vec<&'static str> = CLINICAL_ELEMENTS
        .iter()
        .filter(|rule| answered(issue, rule.answer_keys))
        .map(|rule| rule.key)
        .collect();

    issue
        .missing_clinical_elements
        .retain(|el| !answered_keys.contains(&el.as_str()));
    for key in answered_keys {
        issue.clinical_profile.insert(key.to_string(), true);
    }
}

/// Canonical question for the highest-priority missing element.
pub fn next_question(issue: &ClinicalIssue) -> Option<&'static str> {
    let first_missing = issue.missing_clinical_elements.first()?;
    CLINICAL_ELEMENTS
        .iter()
        .find(|rule| rule.key == first_missing)
        .map(|rule| rule.question)
}

/// Routing policy: nothing missing, and enough of the profile is known.
pub fn route_permitted(issue: &ClinicalIssue) -> bool {
    if !issue.missing_clinical_elements.is_empty() {
        return false;
    }
    let applicable = issue.clinical_profile.len();
    let known = issue.clinical_profile.values().filter(|v| **v).count();
    known >= PROFILE_FLOOR.min(applicable)
}

/// Escalation is mandatory whenever these are truthy, at any point.
pub fn must_escalate(issue: &ClinicalIssue) -> bool {
    issue.airway_compromise || issue.bleeding
}

/// Patient-facing explanation with no diagnosis or treatment phrasing.
pub fn safe_routing_language(issue: &ClinicalIssue) -> String {
    if must_escalate(issue) {
        "The symptoms described need urgent in-person attention. Routing to immediate care."
            .to_string()
    } else {
        "Clinical routing criteria met. The reported symptoms will be assessed in person by the appropriate specialist.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pain_issue() -> ClinicalIssue {
        ClinicalIssue {
            has_pain: true,
            symptom_cluster: "upper right molar pain".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn bare_pain_issue_misses_location_duration_severity_stimulus() {
        let mut issue = pain_issue();
        assess_completeness(&mut issue);
        assert_eq!(
            issue.missing_clinical_elements,
            vec!["location", "duration", "severity", "stimulus"]
        );
        assert_eq!(next_question(&issue), Some(
            "Where exactly is the concern - which tooth or area of your mouth?"
        ));
        assert!(!route_permitted(&issue));
    }

    #[test]
    fn complete_pain_issue_routes() {
        let mut issue = pain_issue();
        issue.location = Some("upper right molar".to_string());
        issue.duration_days = Some(3);
        issue.severity = Some(8);
        issue.thermal_sensitivity = true;
        assess_completeness(&mut issue);
        assert!(issue.missing_clinical_elements.is_empty());
        assert!(route_permitted(&issue));
        // location, duration, severity, stimulus all known.
        assert!(issue.clinical_profile.values().filter(|v| **v).count() >= 4);
    }

    #[test]
    fn swelling_demands_airway_answer() {
        let mut issue = ClinicalIssue {
            swelling: true,
            location: Some("lower left".to_string()),
            duration_days: Some(2),
            visible_swelling: true,
            ..Default::default()
        };
        assess_completeness(&mut issue);
        assert_eq!(issue.missing_clinical_elements, vec!["airway_status"]);

        issue
            .field_answers
            .insert("airway_status".to_string(), "no trouble breathing".to_string());
        prune_answered(&mut issue);
        assert!(issue.missing_clinical_elements.is_empty());
        assert!(route_permitted(&issue));
    }

    #[test]
    fn thin_checkup_issue_completes_once_duration_known() {
        let mut issue = ClinicalIssue {
            symptom_cluster: "routine cleaning request".to_string(),
            ..Default::default()
        };
        assess_completeness(&mut issue);
        assert_eq!(issue.missing_clinical_elements, vec!["duration"]);

        issue.duration_days = Some(30);
        assess_completeness(&mut issue);
        assert!(route_permitted(&issue));
    }

    #[test]
    fn assess_is_idempotent() {
        let mut issue = pain_issue();
        issue.severity = Some(5);
        assess_completeness(&mut issue);
        let first = issue.clone();
        assess_completeness(&mut issue);
        assert_eq!(issue.missing_clinical_elements, first.missing_clinical_elements);
        assert_eq!(issue.clinical_profile, first.clinical_profile);
    }

    #[test]
    fn answering_all_missing_elements_opens_the_gate() {
        // Gate monotonicity: provide answers for everything missing and the
        // next evaluation must permit routing.
        let mut issue = pain_issue();
        assess_completeness(&mut issue);
        for element in issue.missing_clinical_elements.clone() {
            issue.field_answers.insert(element, "answered".to_string());
        }
        assess_completeness(&mut issue);
        prune_answered(&mut issue);
        assert!(route_permitted(&issue), "{:?}", issue);
    }

    #[test]
    fn explicit_airway_negative_counts_as_known_status() {
        let mut issue = ClinicalIssue {
            swelling: true,
            visible_swelling: true,
            location: Some("lower left".to_string()),
            duration_days: Some(4),
            reported_symptoms: vec!["swelling".to_string(), "no breathing trouble".to_string()],
            ..Default::default()
        };
        assess_completeness(&mut issue);
        assert!(issue.missing_clinical_elements.is_empty());
        assert!(route_permitted(&issue));
    }

    #[test]
    fn airway_or_bleeding_forces_escalation() {
        let mut issue = pain_issue();
        assert!(!must_escalate(&issue));
        issue.airway_compromise = true;
        assert!(must_escalate(&issue));

        let bleeding = ClinicalIssue {
            bleeding: true,
            ..Default::default()
        };
        assert!(must_escalate(&bleeding));
    }

    #[test]
    fn safe_language_contains_no_procedure_names() {
        let issue = pain_issue();
        let text = safe_routing_language(&issue).to_lowercase();
        for forbidden in ["root canal", "extraction", "filling", "crown", "diagnos"] {
            assert!(!text.contains(forbidden));
        }
    }
}
