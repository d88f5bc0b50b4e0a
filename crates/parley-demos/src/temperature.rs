//! Sampling temperature in creative writing.

use parley_rs::agent::{Agent, AgentConfig};
use parley_rs::{ChatBackend, Error};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq)]
pub struct StoryOpening {
    /// Opening paragraph of a story
    pub text: String,
}

pub const TEMPERATURES: [f32; 3] = [0.3, 0.8, 1.5];

const PROMPT: &str =
    "Write the opening paragraph of a mystery novel set in a small coastal town.";

/// One story opening per temperature.
pub async fn run(backend: &dyn ChatBackend, model: &str) -> Result<Vec<(f32, StoryOpening)>, Error> {
    crate::heading("Temperature in Creative Writing");
    println!("Prompt: {PROMPT}\n");

    let mut openings = Vec::with_capacity(TEMPERATURES.len());
    for temperature in TEMPERATURES {
        let agent = Agent::new(
            backend,
            AgentConfig::new(model).with_temperature(temperature),
        );
        let opening = agent.run_output::<StoryOpening>(PROMPT, &[]).await?.output;
        println!("Temperature: {temperature}");
        println!("Output:\n{}\n", opening.text);
        crate::separator();
        openings.push((temperature, opening));
    }
    Ok(openings)
}
