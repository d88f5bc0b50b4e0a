//! Fixed 3-class sentiment classification with structured output.

use parley_rs::agent::{Agent, AgentConfig};
use parley_rs::{ChatBackend, Error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

const SYSTEM_PROMPT: &str = "You are a sentiment analysis expert. Classify the given text as \
     positive, negative, or neutral. Provide brief reasoning for your classification.";

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        })
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct SentimentResult {
    /// The sentiment category of the text
    pub sentiment: Sentiment,
    /// Brief explanation for the sentiment classification
    #[schemars(length(min = 10))]
    pub reasoning: String,
}

/// Reviews with their expected label.
pub const REVIEWS: [(&str, Sentiment); 7] = [
    (
        "This product is absolutely amazing! Best purchase ever!",
        Sentiment::Positive,
    ),
    (
        "Terrible quality, broke after one day. Very disappointed.",
        Sentiment::Negative,
    ),
    (
        "It's okay, nothing special but does the job.",
        Sentiment::Neutral,
    ),
    (
        "I love this! Exceeded all my expectations.",
        Sentiment::Positive,
    ),
    (
        "Waste of money. Do not recommend at all.",
        Sentiment::Negative,
    ),
    (
        "The product works as advertised. No complaints.",
        Sentiment::Neutral,
    ),
    (
        "Outstanding quality and fast shipping!",
        Sentiment::Positive,
    ),
];

#[derive(Debug, Clone)]
pub struct Outcome {
    pub text: String,
    pub expected: Sentiment,
    pub result: SentimentResult,
}

impl Outcome {
    pub fn is_correct(&self) -> bool {
        self.result.sentiment == self.expected
    }
}

/// Correct count and percentage. An empty run is 0%.
pub fn accuracy(outcomes: &[Outcome]) -> (usize, f64) {
    let correct = outcomes.iter().filter(|o| o.is_correct()).count();
    if outcomes.is_empty() {
        return (0, 0.0);
    }
    (correct, correct as f64 / outcomes.len() as f64 * 100.0)
}

/// Classify every review in turn and print a report.
pub async fn run(backend: &dyn ChatBackend, model: &str) -> Result<Vec<Outcome>, Error> {
    let agent = Agent::new(
        backend,
        AgentConfig::new(model).with_system_prompt(SYSTEM_PROMPT),
    );

    crate::heading("Sentiment Analysis");
    let total = REVIEWS.len();
    let mut outcomes = Vec::with_capacity(total);
    for (i, (text, expected)) in REVIEWS.iter().enumerate() {
        println!("\nReview {}/{total}:", i + 1);
        println!("Text: {text}");

        let result = agent.run_output::<SentimentResult>(*text, &[]).await?;
        let outcome = Outcome {
            text: text.to_string(),
            expected: *expected,
            result: result.output,
        };

        println!("\nClassification:");
        println!("  Sentiment: {}", outcome.result.sentiment);
        println!("  Reasoning: {}", outcome.result.reasoning);
        println!("  Expected: {expected}");
        println!(
            "  Status: {}",
            if outcome.is_correct() {
                "Correct"
            } else {
                "Incorrect"
            }
        );
        crate::separator();
        outcomes.push(outcome);
    }

    let (correct, pct) = accuracy(&outcomes);
    println!("\nResults: {correct}/{total} correct ({pct:.1}% accuracy)");
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_rs::testing::ScriptedBackend;
    use parley_rs::ErrorKind;

    fn answer(sentiment: &str) -> String {
        format!(r#"{{"sentiment": "{sentiment}", "reasoning": "Clear wording in the review."}}"#)
    }

    #[tokio::test]
    async fn scores_every_review() {
        // One miss: the third review is labelled positive.
        let labels = [
            "positive", "negative", "positive", "positive", "negative", "neutral", "positive",
        ];
        let backend = labels
            .iter()
            .fold(ScriptedBackend::new(), |b, l| b.reply(&answer(l)));
        let outcomes = run(&backend, "gpt-4o-mini").await.unwrap();

        assert_eq!(outcomes.len(), 7);
        assert!(!outcomes[2].is_correct());
        let (correct, pct) = accuracy(&outcomes);
        assert_eq!(correct, 6);
        assert!((pct - 85.714).abs() < 0.01);

        let sent = backend.requests();
        assert!(sent[0].response_format.is_some());
    }

    #[tokio::test]
    async fn short_reasoning_is_rejected() {
        let backend = ScriptedBackend::new().reply(r#"{"sentiment": "positive", "reasoning": "ok"}"#);
        let err = run(&backend, "m").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn unknown_label_is_rejected() {
        let backend = ScriptedBackend::new().reply(&answer("ecstatic"));
        let err = run(&backend, "m").await.unwrap_err();
        let parley_rs::Error::Schema(schema) = err else {
            panic!("expected schema error");
        };
        let violation = schema.at("/sentiment").expect("violation at /sentiment");
        assert_eq!(violation.received, "ecstatic");
    }

    #[test]
    fn empty_run_has_zero_accuracy() {
        assert_eq!(accuracy(&[]), (0, 0.0));
    }
}
