use async_trait::async_trait;

use jobgate_api::{Config, FormField, FormSpec, Service};
use jobgate_identity::{BotClient, JsonFileSecrets};
use jobgate_infra::jobs::{Job, JobAction};

/// Demo action: logs the submitted values.
struct LogValuesAction;

#[async_trait]
impl JobAction for LogValuesAction {
    async fn run(&self, job: &Job, client: &BotClient) -> anyhow::Result<()> {
        let mut keys: Vec<_> = job.value_map.keys().collect();
        keys.sort();
        for key in keys {
            tracing::info!(job_id = %job.id, bot = client.username(), key = %key, value = %job.value_map[key], "job value");
        }
        Ok(())
    }
}

fn demo_form() -> FormSpec {
    FormSpec::default()
        .field(FormField::text("repository", "Repository"))
        .field(FormField::textarea("description", "Description"))
        .field(FormField::checkbox("notify", "Notify on completion"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobgate_observability::init();

    let config = Config::from_env()?;
    let secrets = JsonFileSecrets::new(config.bot_secrets.clone());
    let mut service = Service::new(config)
        .with_form(demo_form())
        .with_action(LogValuesAction)
        .with_secrets(secrets);

    service.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    service.stop().await;

    Ok(())
}
