//! Word-list sentiment tagging

use sentinel_core::Sentiment;

const URGENT_WORDS: &[&str] = &["emergency", "urgent", "immediately", "critical", "pain"];

const NEGATIVE_WORDS: &[&str] = &["worried", "concerned", "unhappy", "problem", "issue", "wrong"];

const POSITIVE_WORDS: &[&str] = &["good", "great", "happy", "thank", "appreciate", "wonderful"];

/// Tags a message with a coarse sentiment. Urgent outranks negative, which
/// outranks positive. Expects lowercased input.
pub fn analyze_sentiment(lower: &str) -> Sentiment {
    if URGENT_WORDS.iter().any(|w| lower.contains(w)) {
        return Sentiment::Urgent;
    }
    if NEGATIVE_WORDS.iter().any(|w| lower.contains(w)) {
        return Sentiment::Negative;
    }
    if POSITIVE_WORDS.iter().any(|w| lower.contains(w)) {
        return Sentiment::Positive;
    }
    Sentiment::Neutral
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgent() {
        assert_eq!(analyze_sentiment("this is an emergency"), Sentiment::Urgent);
        assert_eq!(
            analyze_sentiment("she is in a lot of pain"),
            Sentiment::Urgent
        );
    }

    #[test]
    fn test_negative() {
        assert_eq!(
            analyze_sentiment("i'm worried about my mother"),
            Sentiment::Negative
        );
    }

    #[test]
    fn test_positive() {
        assert_eq!(
            analyze_sentiment("thank you, the visit was wonderful"),
            Sentiment::Positive
        );
    }

    #[test]
    fn test_neutral() {
        assert_eq!(analyze_sentiment("what time is lunch served"), Sentiment::Neutral);
    }

    #[test]
    fn test_urgent_outranks_negative() {
        assert_eq!(
            analyze_sentiment("i'm worried, this feels urgent"),
            Sentiment::Urgent
        );
    }
}
