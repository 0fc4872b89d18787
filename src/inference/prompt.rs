use crate::models::ActivityState;

const ACTIVITY_PROMPT: &str = "\
These are snapshots from home cameras over the last ten minutes, about two minutes apart.
Each image is preceded by its file name: camera_time.jpg (for example bedroom_2230.jpg).

Goal: track the activity of {subject}, an infant.

Recognition notes:
- {subject} cannot stand or walk yet; only lies, sits, crawls or lies on the tummy.
- Anyone standing or walking is an adult or another child, not {subject}.
- Usually in the crib (under the mosquito net) or carried by an adult.
- A small bump under the blanket in the crib means {subject} is asleep under it.
- Compare frames: same position means the same activity continued; a new position means a change.
- Colour image means lights on; black-and-white means lights off / night vision.

Output format (exactly one line):
room | activity description | companion | lighting

companion is one of: nobody, adult, mother, father, family, uncertain
lighting is for example: bright, dim, night vision

Examples:
bedroom | asleep in the crib the whole time | nobody | lights off, night vision
living→bedroom | played in the living room, then carried to the bedroom to sleep | mother | bright

Output only that one line, nothing else.";

/// Strict yes/no question for doorway event snapshots.
pub const DOOR_PROMPT: &str = "\
These are motion-alert snapshots from the front-door peephole camera, looking into the hallway.

Is there a stroller, pram or pushchair visible in any of them?

Rules:
- stroller visible -> answer YES
- no stroller (passers-by, neighbours, deliveries) -> answer NO

Answer only YES or NO.";

/// Builds the activity prompt with recent journal lines and the current state.
pub fn activity_prompt(subject: &str, recent_entries: &[String], state: &ActivityState) -> String {
    let mut prompt = ACTIVITY_PROMPT.replace("{subject}", subject);

    if !recent_entries.is_empty() {
        prompt.push_str("\n\nRecent log:\n");
        prompt.push_str(&recent_entries.join("\n"));
    }

    prompt.push_str(&format!(
        "\nCurrent status: {} (in {})",
        state.status, state.room
    ));
    prompt
}

/// Whether a yes/no answer confirms the question. Only the first word
/// counts, so "NO, eyes closed" stays negative.
pub fn is_affirmative(answer: &str) -> bool {
    answer
        .split(|c: char| !c.is_alphabetic())
        .find(|word| !word.is_empty())
        .is_some_and(|word| word.eq_ignore_ascii_case("yes"))
}
