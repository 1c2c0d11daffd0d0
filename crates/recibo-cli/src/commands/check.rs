//! Check command - verify API keys and service access.

use console::style;

use recibo_core::{Credentials, ExtractionError, WhispererClient};

use super::load_config;

pub async fn run(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let credentials = match Credentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            anyhow::bail!("API keys are not configured");
        }
    };
    println!("{} LLMWhisperer API key found", style("✓").green());
    println!("{} OpenAI API key found", style("✓").green());
    println!("{} Structuring model: {}", style("ℹ").blue(), config.llm.model);

    let client = WhispererClient::new(&config.ocr, credentials.whisperer_api_key)?;
    match client.usage().await {
        Ok(usage) => {
            println!("{} LLMWhisperer key is valid", style("✓").green());
            if let Some(plan) = &usage.subscription_plan {
                println!("   Plan: {}", plan);
            }
            if let Some(pages) = usage.today_page_count {
                println!("   Pages today: {}", pages);
            }
            if let Some(quota) = usage.daily_quota {
                println!("   Daily quota: {}", quota);
            }
            if let Some(quota) = usage.monthly_quota {
                println!("   Monthly quota: {}", quota);
            }
            Ok(())
        }
        Err(ExtractionError::Permanent(reason)) => {
            println!("{} LLMWhisperer rejected the key: {}", style("✗").red(), reason);
            anyhow::bail!("LLMWhisperer API key is invalid");
        }
        Err(e) => {
            println!("{} {}", style("✗").red(), e);
            anyhow::bail!("LLMWhisperer is unreachable");
        }
    }
}
