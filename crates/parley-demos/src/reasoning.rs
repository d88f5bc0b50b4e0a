//! Reasoning effort comparison.

use parley_rs::agent::{Agent, AgentConfig};
use parley_rs::{ChatBackend, Error, ReasoningEffort};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct Solution {
    /// Solution to the problem
    pub answer: String,
}

pub const PUZZLE: &str = "A farmer has chickens and rabbits. There are 35 heads and 94 legs total.\n\
     How many chickens and how many rabbits are there?";

pub const ROUTE_PROBLEM: &str = "Optimize a delivery route visiting 5 cities: A, B, C, D, E.\n\
     Distances (km): A-B:120, A-C:85, A-D:95, A-E:140, B-C:70, B-D:90,\n\
     B-E:80, C-D:50, C-E:110, D-E:75\n\
     Start and end at city A. Find the shortest route.";

pub const EFFORTS: [ReasoningEffort; 3] = [
    ReasoningEffort::Low,
    ReasoningEffort::Medium,
    ReasoningEffort::High,
];

async fn solve(
    backend: &dyn ChatBackend,
    model: &str,
    effort: ReasoningEffort,
    prompt: String,
) -> Result<Solution, Error> {
    let agent = Agent::new(
        backend,
        AgentConfig::new(model).with_reasoning_effort(effort),
    );
    Ok(agent.run_output::<Solution>(prompt, &[]).await?.output)
}

/// Solve the puzzle at each effort level, then the route problem at `high`.
pub async fn run(
    backend: &dyn ChatBackend,
    model: &str,
) -> Result<Vec<(ReasoningEffort, Solution)>, Error> {
    crate::heading("Reasoning Effort Parameter Comparison");
    println!("Problem: {PUZZLE}\n");

    let mut answers = Vec::with_capacity(EFFORTS.len() + 1);
    for effort in EFFORTS {
        let solution = solve(backend, model, effort, format!("Solve this problem:\n{PUZZLE}")).await?;
        println!("Reasoning Effort: {effort}");
        println!("Answer: {}", solution.answer);
        crate::separator();
        answers.push((effort, solution));
    }

    println!();
    crate::heading("Reasoning Effort in Planning Tasks");
    println!("Problem: {ROUTE_PROBLEM}\n");
    let effort = ReasoningEffort::High;
    let solution = solve(
        backend,
        model,
        effort,
        format!("Solve this traveling salesman problem:\n{ROUTE_PROBLEM}"),
    )
    .await?;
    println!("Answer: {}", solution.answer);
    crate::separator();
    answers.push((effort, solution));

    Ok(answers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_rs::testing::ScriptedBackend;

    #[tokio::test]
    async fn each_level_is_sent_with_its_effort() {
        let backend = ScriptedBackend::new()
            .reply(r#"{"answer": "23 chickens, 12 rabbits"}"#)
            .reply(r#"{"answer": "23 chickens and 12 rabbits"}"#)
            .reply(r#"{"answer": "Chickens: 23, rabbits: 12"}"#)
            .reply(r#"{"answer": "A-C-D-E-B-A, 395 km"}"#);
        let answers = run(&backend, "gpt-5").await.unwrap();

        assert_eq!(answers.len(), 4);
        assert_eq!(answers[3].1.answer, "A-C-D-E-B-A, 395 km");

        // The fake backend reports OpenRouter, which nests the effort.
        let efforts: Vec<_> = backend
            .requests()
            .iter()
            .map(|r| r.reasoning.as_ref().and_then(|c| c.effort))
            .collect();
        assert_eq!(
            efforts,
            vec![
                Some(ReasoningEffort::Low),
                Some(ReasoningEffort::Medium),
                Some(ReasoningEffort::High),
                Some(ReasoningEffort::High),
            ]
        );
    }
}
