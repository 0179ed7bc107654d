//! Topic tagging for conversation analytics

const TOPIC_WORDS: &[(&str, &[&str])] = &[
    (
        "medication",
        &["medication", "medicine", "pill", "prescription", "dose"],
    ),
    (
        "health",
        &["health", "doctor", "nurse", "pain", "sick", "symptom"],
    ),
    ("meals", &["food", "meal", "eat", "lunch", "dinner", "breakfast"]),
    (
        "activities",
        &["activity", "activities", "exercise", "bingo", "social"],
    ),
    ("mood", &["mood", "lonely", "sad", "happy", "anxious"]),
    ("visit", &["visit", "visiting"]),
    (
        "billing",
        &["bill", "payment", "invoice", "cost", "insurance"],
    ),
    (
        "facility",
        &["room", "facility", "building", "maintenance", "housekeeping"],
    ),
];

/// Lists every topic whose vocabulary appears in the message. Expects
/// lowercased input. Order follows the topic table, not the message.
pub fn extract_topics(lower: &str) -> Vec<String> {
    TOPIC_WORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(topic, _)| (*topic).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_topic() {
        assert_eq!(extract_topics("did she take her pills"), vec!["medication"]);
    }

    #[test]
    fn test_multiple_topics() {
        let topics = extract_topics("the doctor changed her medication after lunch");
        assert_eq!(topics, vec!["medication", "health", "meals"]);
    }

    #[test]
    fn test_no_topics() {
        assert!(extract_topics("hello there").is_empty());
    }
}
