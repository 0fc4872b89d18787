//! Free-text model answer -> typed `Observation`.
//!
//! Expected line shape: `room | activity description | companion | light`.

use crate::models::{reconcile_with_companion, ActivityStatus, CompanionPresence, Observation};

// English keywords match at a word start ("sit" hits "sits", not "position").
const SLEEP_WORDS: &[&str] = &["睡", "sleep", "asleep", "休息", "闭眼", "nap"];
const ACTIVITY_WORDS: &[&str] = &[
    "玩", "爬", "坐", "play", "活动", "翻", "crawl", "sit", "sat", "roll", "awake", "wake", "woke",
    "toy",
];
const HELD_WORDS: &[&str] = &["抱", "held", "怀里", "in arms", "carried", "cradled"];
const EATING_WORDS: &[&str] = &["吃", "奶", "eat", "喂", "餐椅", "feed", "bottle"];
const UNCERTAIN_WORDS: &[&str] = &["不确定", "未见", "看不清", "unclear", "not visible", "uncertain"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanionRequirement {
    Any,
    NobodyPresent,
}

/// One row of the ordered classification table.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub keywords: &'static [&'static str],
    pub companion: CompanionRequirement,
    pub status: ActivityStatus,
}

impl ClassificationRule {
    pub fn matches(&self, description: &str, presence: CompanionPresence) -> bool {
        let companion_ok = match self.companion {
            CompanionRequirement::Any => true,
            CompanionRequirement::NobodyPresent => presence == CompanionPresence::Absent,
        };
        companion_ok
            && self
                .keywords
                .iter()
                .any(|kw| contains_keyword(description, kw))
    }
}

fn contains_keyword(text: &str, keyword: &str) -> bool {
    if !keyword.is_ascii() {
        return text.contains(keyword);
    }
    text.match_indices(keyword).any(|(idx, _)| {
        text[..idx]
            .chars()
            .next_back()
            .map_or(true, |prev| !prev.is_alphanumeric())
    })
}

/// Evaluated top to bottom; the first matching rule wins.
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        keywords: SLEEP_WORDS,
        companion: CompanionRequirement::Any,
        status: ActivityStatus::Sleeping,
    },
    ClassificationRule {
        keywords: ACTIVITY_WORDS,
        companion: CompanionRequirement::NobodyPresent,
        status: ActivityStatus::AloneAwake,
    },
    ClassificationRule {
        keywords: ACTIVITY_WORDS,
        companion: CompanionRequirement::Any,
        status: ActivityStatus::Playing,
    },
    ClassificationRule {
        keywords: HELD_WORDS,
        companion: CompanionRequirement::Any,
        status: ActivityStatus::Held,
    },
    ClassificationRule {
        keywords: EATING_WORDS,
        companion: CompanionRequirement::Any,
        status: ActivityStatus::Eating,
    },
    ClassificationRule {
        keywords: UNCERTAIN_WORDS,
        companion: CompanionRequirement::Any,
        status: ActivityStatus::Unknown,
    },
];

pub fn classify(description: &str, companion: &str) -> ActivityStatus {
    let lowered = description.to_lowercase();
    let presence = CompanionPresence::from_text(companion);
    let candidate = CLASSIFICATION_RULES
        .iter()
        .find(|rule| rule.matches(&lowered, presence))
        .map(|rule| rule.status)
        .unwrap_or(ActivityStatus::Unknown);

    reconcile_with_companion(candidate, Some(companion))
}

/// Parses one line of model output. Never fails: malformed lines become an
/// unknown observation carrying the raw text.
pub fn parse_line(line: &str) -> Observation {
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    if fields.len() < 4 {
        return Observation::unreadable(line);
    }

    let (room, description, companion, light) = (fields[0], fields[1], fields[2], fields[3]);

    Observation {
        status: classify(description, companion),
        room: non_empty(room),
        companion: non_empty(companion),
        light: non_empty(light),
        description: description.to_string(),
        raw: None,
    }
}

/// First non-blank line of a model answer.
pub fn first_line(answer: &str) -> &str {
    answer
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

fn non_empty(field: &str) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}
