//! Answer one request from the command line.
//!
//! Usage: stepwise <request...>

use std::sync::Arc;

use stepwise::{Agent, AgentConfig};
use stepwise_llm::{LlmSettings, OpenAiCompatibleModel};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let request = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if request.trim().is_empty() {
        eprintln!("usage: stepwise <request...>");
        std::process::exit(2);
    }

    let config = match AgentConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut builder = Agent::builder().config(config);
    let settings = LlmSettings::from_env();
    if settings.has_credentials() {
        match OpenAiCompatibleModel::new(settings) {
            Ok(model) => builder = builder.model(Arc::new(model)),
            Err(e) => tracing::warn!("language model disabled: {}", e),
        }
    } else {
        tracing::info!("no API key configured, running in offline keyword mode");
    }

    let agent = match builder.build() {
        Ok(agent) => agent,
        Err(e) => {
            eprintln!("Failed to start the agent: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", agent.run(&request).await);
}
