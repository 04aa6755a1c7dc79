//! Deterministic tiered mapping from structured feature flags to a condition
//! key. Total: every issue lands on exactly one key.

use serde::{Deserialize, Serialize};

use crate::models::ClinicalIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKey {
    RootCanal,
    WisdomExtraction,
    Emergency,
    GeneralCheckup,
    Filling,
    Crown,
}

impl ConditionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKey::RootCanal => "root_canal",
            ConditionKey::WisdomExtraction => "wisdom_extraction",
            ConditionKey::Emergency => "emergency",
            ConditionKey::GeneralCheckup => "general_checkup",
            ConditionKey::Filling => "filling",
            ConditionKey::Crown => "crown",
        }
    }
}

pub fn classify(issue: &ClinicalIssue) -> (ConditionKey, Vec<String>) {
    let cluster = issue.symptom_cluster.to_lowercase();

    // Tier 1: emergency features trump everything.
    let mut triggers = Vec::new();
    if issue.airway_compromise {
        triggers.push("Airway compromise".to_string());
    }
    if issue.trauma {
        triggers.push("Dental trauma".to_string());
    }
    if issue.bleeding {
        triggers.push("Uncontrolled bleeding".to_string());
    }
    if !triggers.is_empty() {
        return (ConditionKey::Emergency, triggers);
    }

    // Tier 2: endodontic picture — severe pain with a pulpal stimulus and no
    // swelling.
    let is_severe = issue.severity.unwrap_or(0) >= 7;
    if issue.has_pain {
        let mut triggers = Vec::new();
        if is_severe {
            triggers.push("Severe pain".to_string());
        }
        if issue.thermal_sensitivity {
            triggers.push("Thermal sensitivity".to_string());
        }
        if issue.biting_pain {
            triggers.push("Biting pain".to_string());
        }
        if is_severe && (issue.thermal_sensitivity || issue.biting_pain) && !issue.swelling {
            return (ConditionKey::RootCanal, triggers);
        }
    }

    // Tier 3: surgical picture — swelling with a wisdom/extraction context.
    if issue.swelling {
        let mut triggers = vec!["Swelling".to_string()];
        if issue.impacted_wisdom {
            triggers.push("Impacted wisdom".to_string());
        }
        if cluster.contains("wisdom") {
            triggers.push("Wisdom tooth cluster".to_string());
        }
        if issue.impacted_wisdom || cluster.contains("wisdom") {
            return (ConditionKey::WisdomExtraction, triggers);
        }
        if cluster.contains("extraction") {
            triggers.push("Extraction mentioned".to_string());
            return (ConditionKey::WisdomExtraction, triggers);
        }
    }

    // Tier 4: restorative picture — mild-to-moderate pain, nothing pulpal.
    if issue.has_pain
        && issue.severity.unwrap_or(0) <= 6
        && !issue.swelling
        && !issue.thermal_sensitivity
    {
        let mut triggers = vec!["Pain".to_string()];
        triggers.push("Moderate severity".to_string());
        return (ConditionKey::Filling, triggers);
    }

    // Tier 5: keyword fallback on the cluster summary.
    if cluster.contains("root canal") {
        return (ConditionKey::RootCanal, vec!["Root canal keyword".to_string()]);
    }
    if cluster.contains("wisdom") {
        return (
            ConditionKey::WisdomExtraction,
            vec!["Wisdom tooth keyword".to_string()],
        );
    }
    if cluster.contains("crown") {
        return (ConditionKey::Crown, vec!["Crown keyword".to_string()]);
    }
    if cluster.contains("filling") {
        return (ConditionKey::Filling, vec!["Filling keyword".to_string()]);
    }
    if cluster.contains("clean") {
        return (
            ConditionKey::GeneralCheckup,
            vec!["Cleaning/Hygiene keyword".to_string()],
        );
    }

    (
        ConditionKey::GeneralCheckup,
        vec!["Routine follow-up".to_string()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> ClinicalIssue {
        ClinicalIssue::default()
    }

    #[test]
    fn airway_trauma_bleeding_always_win() {
        let mut i = issue();
        i.has_pain = true;
        i.severity = Some(9);
        i.thermal_sensitivity = true;
        i.bleeding = true;
        let (key, triggers) = classify(&i);
        assert_eq!(key, ConditionKey::Emergency);
        assert!(triggers.contains(&"Uncontrolled bleeding".to_string()));
    }

    #[test]
    fn severe_thermal_pain_without_swelling_is_endodontic() {
        let mut i = issue();
        i.has_pain = true;
        i.severity = Some(8);
        i.thermal_sensitivity = true;
        let (key, triggers) = classify(&i);
        assert_eq!(key, ConditionKey::RootCanal);
        assert!(triggers.contains(&"Severe pain".to_string()));
    }

    #[test]
    fn severe_biting_pain_with_swelling_is_not_endodontic() {
        let mut i = issue();
        i.has_pain = true;
        i.severity = Some(8);
        i.biting_pain = true;
        i.swelling = true;
        let (key, _) = classify(&i);
        assert_ne!(key, ConditionKey::RootCanal);
    }

    #[test]
    fn swelling_with_wisdom_context_is_surgical() {
        let mut i = issue();
        i.swelling = true;
        i.impacted_wisdom = true;
        assert_eq!(classify(&i).0, ConditionKey::WisdomExtraction);

        let mut j = issue();
        j.swelling = true;
        j.symptom_cluster = "lower left wisdom tooth swelling".to_string();
        assert_eq!(classify(&j).0, ConditionKey::WisdomExtraction);
    }

    #[test]
    fn mild_plain_pain_is_restorative() {
        let mut i = issue();
        i.has_pain = true;
        i.severity = Some(4);
        assert_eq!(classify(&i).0, ConditionKey::Filling);
    }

    #[test]
    fn keyword_fallbacks_cover_the_rest() {
        let mut i = issue();
        i.symptom_cluster = "wants a crown replaced".to_string();
        assert_eq!(classify(&i).0, ConditionKey::Crown);

        let mut j = issue();
        j.symptom_cluster = "overdue for a cleaning".to_string();
        assert_eq!(classify(&j).0, ConditionKey::GeneralCheckup);
    }

    #[test]
    fn classifier_is_total() {
        let (key, triggers) = classify(&issue());
        assert_eq!(key, ConditionKey::GeneralCheckup);
        assert_eq!(triggers, vec!["Routine follow-up".to_string()]);
    }
}
