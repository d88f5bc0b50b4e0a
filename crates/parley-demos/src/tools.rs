//! Dice and weather tools over a multi-turn conversation.
//!
//! | Tool | Name | Purpose |
//! |------|------|---------|
//! | [`RollDice`] | `roll_dice` | Random number from 1 to 6 |
//! | [`CheckWeather`] | `check_weather` | Current weather from WeatherAPI |
//!
//! `check_weather` needs `WEATHER_API_KEY`; registering the tools without it
//! is a configuration error.

use parley_rs::agent::{Agent, AgentConfig};
use parley_rs::history::ModelMessage;
use parley_rs::tools::{Tool, ToolFuture, ToolSet, parse_tool_args};
use parley_rs::{ChatBackend, Error, Settings, ToolDef, json_schema_for};
use rand::Rng;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const ROLL_DICE: &str = "roll_dice";
pub const CHECK_WEATHER: &str = "check_weather";

pub const WEATHER_KEY_VAR: &str = "WEATHER_API_KEY";
pub const WEATHER_API_URL: &str = "https://api.weatherapi.com/v1/current.json";

/// Model the tools demo uses when none is given.
pub const DEFAULT_TOOLS_MODEL: &str = "ollama:bielik_v3_q8_tools";

// ── RollDice ────────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct RollDiceArgs {}

/// Roll a six-sided die.
pub struct RollDice;

impl Tool for RollDice {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            ROLL_DICE,
            "Roll a six-sided die and return a number between 1 and 6",
            json_schema_for::<RollDiceArgs>(),
        )
    }

    fn execute(&self, _arguments: &str) -> ToolFuture<'_> {
        let value: u8 = rand::thread_rng().gen_range(1..=6);
        info!("[{ROLL_DICE}] rolled {value}");
        Box::pin(async move { value.to_string() })
    }
}

// ── CheckWeather ────────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct CheckWeatherArgs {
    /// City name, e.g. "Warszawa".
    pub city: String,
}

/// What the model gets back from `check_weather`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WeatherReport {
    pub location: String,
    pub temp_c: f64,
    pub condition: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    location: ApiLocation,
    current: ApiCurrent,
}

#[derive(Deserialize)]
struct ApiLocation {
    name: String,
}

#[derive(Deserialize)]
struct ApiCurrent {
    temp_c: f64,
    condition: ApiCondition,
}

#[derive(Deserialize)]
struct ApiCondition {
    text: String,
}

impl From<ApiResponse> for WeatherReport {
    fn from(r: ApiResponse) -> Self {
        Self {
            location: r.location.name,
            temp_c: r.current.temp_c,
            condition: r.current.condition.text,
        }
    }
}

/// Current conditions for a city from WeatherAPI.
pub struct CheckWeather {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl CheckWeather {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            url: WEATHER_API_URL.to_string(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn def() -> ToolDef {
        ToolDef::new(
            CHECK_WEATHER,
            "Check the current weather in a city: location, temperature in Celsius and conditions",
            json_schema_for::<CheckWeatherArgs>(),
        )
    }

    async fn fetch(&self, city: &str) -> Result<WeatherReport, String> {
        let url = reqwest::Url::parse_with_params(
            &self.url,
            [("key", self.api_key.as_str()), ("q", city), ("aqi", "no")],
        )
        .map_err(|e| format!("invalid weather URL: {e}"))?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("weather request failed: {e}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!(
                "Could not find weather for {city}. Status: {}",
                status.as_u16()
            ));
        }
        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| format!("unexpected weather response: {e}"))?;
        Ok(body.into())
    }
}

impl Tool for CheckWeather {
    fn definition(&self) -> ToolDef {
        Self::def()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: CheckWeatherArgs = match parse_tool_args(&arguments) {
                Ok(a) => a,
                Err(e) => return e,
            };
            match self.fetch(&args.city).await {
                Ok(report) => {
                    info!("[{CHECK_WEATHER}] {report:?}");
                    serde_json::to_string(&report)
                        .unwrap_or_else(|e| format!("Error: cannot encode report: {e}"))
                }
                Err(e) => format!("Error: {e}"),
            }
        })
    }
}

// ── Registration ────────────────────────────────────────────────────

/// Register the demo tools on a [`ToolSet`].
pub trait DemoToolsExt: Sized {
    /// Fails with [`Error::Config`] when `WEATHER_API_KEY` is not set.
    fn with_demo_tools(self, settings: &Settings) -> Result<Self, Error>;
}

impl DemoToolsExt for ToolSet {
    fn with_demo_tools(self, settings: &Settings) -> Result<Self, Error> {
        let key = settings.require(WEATHER_KEY_VAR)?;
        Ok(self
            .with_arg_validation(true)
            .with(RollDice)
            .with(CheckWeather::new(key)))
    }
}

// ── Conversation ────────────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "Jesteś pomocnym asystentem AI";

/// Greeting, then a dice roll, then a weather check, each turn continuing
/// the previous one's history.
pub const PROMPTS: [&str; 3] = [
    "Cześć, kim jesteś?",
    "Rzuć kostką i podaj wynik!",
    "Sprawdź pogodę w Warszawie, proszę Cię!",
];

/// Run the three turns and return the final history.
pub async fn run(
    backend: &dyn ChatBackend,
    model: &str,
    tools: &ToolSet,
) -> Result<Vec<ModelMessage>, Error> {
    crate::heading("Tool Calling");
    let agent = Agent::new(
        backend,
        AgentConfig::new(model)
            .with_system_prompt(SYSTEM_PROMPT)
            .with_temperature(0.1),
    )
    .with_tools(tools);

    let mut history: Vec<ModelMessage> = Vec::new();
    for prompt in PROMPTS {
        let result = agent.run(prompt, &history).await?;
        println!("\n{prompt}");
        println!("Response: {}", result.output);
        println!("  {}", result.usage.summary(model));
        history = result.into_messages();
    }
    crate::separator();
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_rs::testing::ScriptedBackend;
    use parley_rs::ToolCall;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn dice_stays_in_range() {
        for _ in 0..50 {
            let n: u8 = RollDice.execute("{}").await.parse().unwrap();
            assert!((1..=6).contains(&n));
        }
    }

    #[test]
    fn missing_weather_key_is_a_config_error() {
        let err = ToolSet::new()
            .with_demo_tools(&Settings::isolated(Vec::<(String, String)>::new()))
            .unwrap_err();
        assert_eq!(err.kind(), parley_rs::ErrorKind::Config);
        assert!(err.to_string().contains(WEATHER_KEY_VAR));
    }

    #[test]
    fn demo_tools_register_with_key() {
        let settings = Settings::isolated([(WEATHER_KEY_VAR.to_string(), "k".to_string())]);
        let tools = ToolSet::new().with_demo_tools(&settings).unwrap();
        assert_eq!(tools.names(), vec![CHECK_WEATHER, ROLL_DICE]);
    }

    /// Serve one canned HTTP response and hand back the request line.
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf[..n])
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });
        (format!("http://{addr}/v1/current.json"), handle)
    }

    #[tokio::test]
    async fn weather_report_is_trimmed_to_three_fields() {
        let body = r#"{"location": {"name": "Warsaw", "country": "Poland"},
                       "current": {"temp_c": 4.5, "humidity": 80, "condition": {"text": "Light rain", "code": 1183}}}"#;
        let (url, server) = serve_once("200 OK", body).await;
        let tool = CheckWeather::new("k123").with_url(url);

        let out = tool.execute(r#"{"city": "Warsaw"}"#).await;
        let report: WeatherReport = serde_json::from_str(&out).unwrap();
        assert_eq!(
            report,
            WeatherReport {
                location: "Warsaw".into(),
                temp_c: 4.5,
                condition: "Light rain".into(),
            }
        );

        let request_line = server.await.unwrap();
        assert!(request_line.contains("key=k123"));
        assert!(request_line.contains("q=Warsaw"));
        assert!(request_line.contains("aqi=no"));
    }

    #[tokio::test]
    async fn unknown_city_is_an_error_result() {
        let (url, _server) = serve_once("400 Bad Request", r#"{"error": {"code": 1006}}"#).await;
        let tool = CheckWeather::new("k").with_url(url);
        let out = tool.execute(r#"{"city": "Atlantis"}"#).await;
        assert_eq!(out, "Error: Could not find weather for Atlantis. Status: 400");
    }

    #[tokio::test]
    async fn three_turns_share_one_history() {
        let tools = ToolSet::new().with(RollDice);
        let backend = ScriptedBackend::new()
            .reply("Jestem asystentem AI.")
            .tool_calls(vec![ToolCall::new("call_1", ROLL_DICE, "{}")])
            .reply("Wypadło!")
            .reply("Nie mam dostępu do pogody.");
        let history = run(&backend, "bielik", &tools).await.unwrap();

        // 3 prompts, 3 answers, one tool call and its return.
        assert_eq!(history.len(), 8);
        assert!(history[3].calls_tool("call_1"));
        assert!(history[4].has_tool_returns());

        let sent = backend.requests();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[3].messages.len(), 8);
        assert_eq!(sent[0].temperature, Some(0.1));
    }
}
