//! Quest classification: dialogue text to a category and measurable goals.
//!
//! Classification runs in two steps. [`detect_type`] walks the declared
//! [`PATTERNS`] table in order and returns the first category with a
//! pattern occurring in the text (case-insensitive). A category-specific
//! extractor then pulls every `current/required` pair that follows one of
//! that category's patterns, together with the descriptor between the
//! pattern and the counter.
//!
//! Everything here is a pure function. Malformed input never panics; it
//! yields a recognized category with an empty goal list.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use questbot_types::{GoalMetadata, GoalType, MobTier, QuestDescriptor, QuestGoal};

/// Category patterns in declaration order. The first category with a
/// matching pattern wins.
pub const PATTERNS: [(GoalType, &[&str]); 7] = [
    (GoalType::Resource, &["Zbierz zasób"]),
    (GoalType::Mob, &["Pokonaj"]),
    (GoalType::Pvp, &["Wygrane walki PvP"]),
    (GoalType::Lpvm, &["Wykonane Listy Gończe PvM"]),
    (GoalType::Expedition, &["Udaj się na wyprawy"]),
    (GoalType::Instance, &["Wykonane dowolne instancje"]),
    (GoalType::Donation, &["Oddaj przedmiot", "Oddaj PSK"]),
];

/// Mob tier keywords, checked in this order.
pub const MOB_TIER_KEYWORDS: [(&str, MobTier); 3] = [
    ("Elitarny", MobTier::Elite),
    ("Czempion", MobTier::Champion),
    ("Bossek", MobTier::Boss),
];

/// Case-insensitive matcher per category, built from [`PATTERNS`].
static CATEGORY_MATCHERS: LazyLock<Vec<(GoalType, Regex)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(goal_type, patterns)| {
            let alternation = patterns
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!("(?i)(?:{alternation})"))
                .ok()
                .map(|re| (*goal_type, re))
        })
        .collect()
});

/// A `current/required` counter such as `3/10` or `3 / 10`.
static COUNTER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*/\s*(\d+)").ok());

/// A parenthetical qualifier such as `(Elitarny)`.
static QUALIFIER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\(([^)]*)\)").ok());

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Outcome of classifying a quest dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classification {
    /// No known pattern occurs in the text.
    None,
    /// A category was recognized.
    Recognized {
        /// The winning category.
        goal_type: GoalType,
        /// Extracted goals, possibly empty.
        goals: Vec<QuestGoal>,
    },
}

impl Classification {
    /// The recognized category, if any.
    pub const fn goal_type(&self) -> Option<GoalType> {
        match self {
            Self::None => None,
            Self::Recognized { goal_type, .. } => Some(*goal_type),
        }
    }

    /// Extracted goals; empty for [`Classification::None`].
    pub fn goals(&self) -> &[QuestGoal] {
        match self {
            Self::None => &[],
            Self::Recognized { goals, .. } => goals,
        }
    }

    /// Consume the classification, returning its goals.
    pub fn into_goals(self) -> Vec<QuestGoal> {
        match self {
            Self::None => Vec::new(),
            Self::Recognized { goals, .. } => goals,
        }
    }
}

/// The first category in [`PATTERNS`] with a pattern occurring in `text`.
pub fn detect_type(text: &str) -> Option<GoalType> {
    let lowered = text.to_lowercase();
    PATTERNS
        .iter()
        .find(|(_, patterns)| {
            patterns
                .iter()
                .any(|pattern| lowered.contains(&pattern.to_lowercase()))
        })
        .map(|(goal_type, _)| *goal_type)
}

/// Classify free quest text.
pub fn classify(text: &str) -> Classification {
    match detect_type(text) {
        None => Classification::None,
        Some(goal_type) => Classification::Recognized {
            goal_type,
            goals: extract_goals(goal_type, text),
        },
    }
}

/// Classify a structured dialogue.
///
/// The category is detected over the text and the counter labels. When the
/// dialogue carries counters belonging to that category they are used
/// directly; otherwise the text is scanned.
pub fn classify_descriptor(descriptor: &QuestDescriptor) -> Classification {
    let haystack = descriptor
        .counters
        .iter()
        .fold(descriptor.text.clone(), |mut acc, counter| {
            acc.push('\n');
            acc.push_str(&counter.label);
            acc
        });
    let Some(goal_type) = detect_type(&haystack) else {
        return Classification::None;
    };
    if goal_type == GoalType::Donation {
        return Classification::Recognized {
            goal_type,
            goals: donation_goal(),
        };
    }

    let from_counters: Vec<QuestGoal> = descriptor
        .counters
        .iter()
        .filter_map(|counter| {
            let rest = strip_pattern(goal_type, &counter.label)?;
            Some(build_goal(goal_type, rest, counter.current, counter.required))
        })
        .collect();

    let goals = if from_counters.is_empty() {
        extract_goals(goal_type, &descriptor.text)
    } else {
        from_counters
    };
    Classification::Recognized { goal_type, goals }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract every goal of `goal_type` from `text`.
///
/// Donation quests have no counter in the dialogue and always yield one
/// synthetic `0/1` goal.
pub fn extract_goals(goal_type: GoalType, text: &str) -> Vec<QuestGoal> {
    if goal_type == GoalType::Donation {
        return donation_goal();
    }
    let Some(matcher) = matcher_for(goal_type) else {
        return Vec::new();
    };

    let bounds: Vec<(usize, usize)> = matcher
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();

    bounds
        .iter()
        .enumerate()
        .filter_map(|(i, &(_, end))| {
            let segment_end = bounds
                .get(i.saturating_add(1))
                .map_or(text.len(), |&(start, _)| start);
            let segment = text.get(end..segment_end)?;
            parse_segment(goal_type, segment)
        })
        .collect()
}

/// The tier named by a mob descriptor.
///
/// A parenthetical qualifier wins; otherwise keywords anywhere in the
/// descriptor are checked; otherwise [`MobTier::Normal`].
pub fn mob_tier(descriptor: &str) -> MobTier {
    let qualified = QUALIFIER.as_ref().and_then(|re| {
        re.captures_iter(descriptor)
            .filter_map(|caps| caps.get(1))
            .find_map(|inner| tier_keyword(inner.as_str()))
    });
    qualified
        .or_else(|| tier_keyword(descriptor))
        .unwrap_or_default()
}

fn tier_keyword(text: &str) -> Option<MobTier> {
    let lowered = text.to_lowercase();
    MOB_TIER_KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.contains(&keyword.to_lowercase()))
        .map(|(_, tier)| *tier)
}

fn matcher_for(goal_type: GoalType) -> Option<&'static Regex> {
    CATEGORY_MATCHERS
        .iter()
        .find(|(t, _)| *t == goal_type)
        .map(|(_, re)| re)
}

/// Text after the first pattern of `goal_type` in `label`.
fn strip_pattern(goal_type: GoalType, label: &str) -> Option<&str> {
    let found = matcher_for(goal_type)?.find(label)?;
    label.get(found.end()..)
}

/// Parse the descriptor and first counter in the text following a pattern.
fn parse_segment(goal_type: GoalType, segment: &str) -> Option<QuestGoal> {
    let caps = COUNTER.as_ref()?.captures(segment)?;
    let whole = caps.get(0)?;
    let current = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let required = caps.get(2)?.as_str().parse::<u32>().ok()?;
    let descriptor = segment.get(..whole.start())?;
    Some(build_goal(goal_type, descriptor, current, required))
}

fn build_goal(goal_type: GoalType, descriptor: &str, current: u32, required: u32) -> QuestGoal {
    let label = clean_label(descriptor);
    let mob_tier = (goal_type == GoalType::Mob)
        .then(|| mob_tier(label.as_deref().unwrap_or_default()));
    QuestGoal {
        goal_type,
        current,
        required,
        metadata: GoalMetadata { label, mob_tier },
    }
}

fn clean_label(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | ','));
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn donation_goal() -> Vec<QuestGoal> {
    vec![QuestGoal::new(GoalType::Donation, 0, 1)]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use questbot_types::GoalCounter;

    use super::*;

    fn only_goal(classification: &Classification) -> &QuestGoal {
        assert_eq!(classification.goals().len(), 1, "{classification:?}");
        classification.goals().first().unwrap()
    }

    #[test]
    fn unknown_text_is_none() {
        assert_eq!(classify("Porozmawiaj z kowalem."), Classification::None);
        assert_eq!(classify(""), Classification::None);
    }

    #[test]
    fn resource_goal_with_label() {
        let c = classify("Zbierz zasób Kryształ Mocy 0/3");
        assert_eq!(c.goal_type(), Some(GoalType::Resource));
        let goal = only_goal(&c);
        assert_eq!((goal.current, goal.required), (0, 3));
        assert_eq!(goal.metadata.label.as_deref(), Some("Kryształ Mocy"));
        assert_eq!(goal.metadata.mob_tier, None);
    }

    #[test]
    fn mob_tier_from_qualifier() {
        let c = classify("Pokonaj Smok Ognia (Czempion) 2/5");
        let goal = only_goal(&c);
        assert_eq!(goal.goal_type, GoalType::Mob);
        assert_eq!(goal.metadata.mob_tier, Some(MobTier::Champion));
        assert_eq!(goal.metadata.label.as_deref(), Some("Smok Ognia (Czempion)"));
    }

    #[test]
    fn mob_without_qualifier_is_normal() {
        let c = classify("Pokonaj Wilk 0/10");
        assert_eq!(only_goal(&c).metadata.mob_tier, Some(MobTier::Normal));
    }

    #[test]
    fn several_mob_goals() {
        let c = classify("Pokonaj Wilk (Elitarny) 1/4. Pokonaj Niedźwiedź (Bossek) 0/1");
        let tiers: Vec<_> = c.goals().iter().map(|g| g.metadata.mob_tier).collect();
        assert_eq!(tiers, vec![Some(MobTier::Elite), Some(MobTier::Boss)]);
        assert_eq!(c.goals().get(1).map(|g| g.required), Some(1));
    }

    #[test]
    fn counters_without_label() {
        for (text, goal_type) in [
            ("Wygrane walki PvP 3/10", GoalType::Pvp),
            ("Wykonane Listy Gończe PvM 0 / 2", GoalType::Lpvm),
            ("Udaj się na wyprawy 1/3", GoalType::Expedition),
            ("Wykonane dowolne instancje 0/1", GoalType::Instance),
        ] {
            let c = classify(text);
            let goal = only_goal(&c);
            assert_eq!(goal.goal_type, goal_type);
            assert_eq!(goal.metadata.label, None);
        }
    }

    #[test]
    fn donation_is_synthetic() {
        for text in ["Oddaj przedmiot: Złoty Pierścień", "Oddaj PSK 500"] {
            let c = classify(text);
            assert_eq!(c.goals(), &[QuestGoal::new(GoalType::Donation, 0, 1)]);
        }
    }

    #[test]
    fn first_category_wins() {
        let c = classify("Wygrane walki PvP 0/2 oraz Pokonaj Wilk 0/3");
        assert_eq!(c.goal_type(), Some(GoalType::Mob));
        assert_eq!(c.goals().len(), 1);

        let c = classify("Pokonaj Wilk 0/3, potem Zbierz zasób Drewno 0/2");
        assert_eq!(c.goal_type(), Some(GoalType::Resource));
    }

    #[test]
    fn case_insensitive_detection() {
        let c = classify("ZBIERZ ZASÓB drewno 1/2");
        assert_eq!(c.goal_type(), Some(GoalType::Resource));
        assert_eq!(only_goal(&c).current, 1);
    }

    #[test]
    fn malformed_counters_give_empty_goals() {
        let c = classify("Zbierz zasób Drewno x/y");
        assert_eq!(c.goal_type(), Some(GoalType::Resource));
        assert!(c.goals().is_empty());

        let c = classify("Pokonaj Wilk 99999999999/3");
        assert_eq!(c.goal_type(), Some(GoalType::Mob));
        assert!(c.goals().is_empty());
    }

    #[test]
    fn classification_is_deterministic() {
        let text = "Pokonaj Wilk (Elitarny) 1/4. Pokonaj Ork 0/2";
        assert_eq!(classify(text), classify(text));
    }

    #[test]
    fn descriptor_counters_preferred() {
        let descriptor = QuestDescriptor {
            text: String::from("Zadanie dzienne"),
            counters: vec![
                GoalCounter {
                    label: String::from("Pokonaj Golem (Elitarny)"),
                    current: 2,
                    required: 6,
                },
                GoalCounter {
                    label: String::from("Nagroda"),
                    current: 0,
                    required: 1,
                },
            ],
            can_finish: false,
        };
        let c = classify_descriptor(&descriptor);
        let goal = only_goal(&c);
        assert_eq!(goal.goal_type, GoalType::Mob);
        assert_eq!((goal.current, goal.required), (2, 6));
        assert_eq!(goal.metadata.mob_tier, Some(MobTier::Elite));
        assert_eq!(goal.metadata.label.as_deref(), Some("Golem (Elitarny)"));
    }

    #[test]
    fn descriptor_falls_back_to_text() {
        let descriptor = QuestDescriptor::from_text("Zbierz zasób Ruda Żelaza 4/8");
        let c = classify_descriptor(&descriptor);
        assert_eq!(only_goal(&c).required, 8);
    }

    #[test]
    fn tier_keyword_outside_parentheses() {
        assert_eq!(mob_tier("Bossek Jaskini"), MobTier::Boss);
        assert_eq!(mob_tier("Wilk (szary) czempion"), MobTier::Champion);
        assert_eq!(mob_tier("(Elitarny) Bossek"), MobTier::Elite);
        assert_eq!(mob_tier("Szczur"), MobTier::Normal);
    }
}
