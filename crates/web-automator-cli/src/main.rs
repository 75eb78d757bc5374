use anyhow::{anyhow, Result};
use bat::PrettyPrinter;
use clap::{CommandFactory, Parser, Subcommand};
use cliclack::spinner;
use console::style;
use dotenv::dotenv;
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use web_automator::{
    actuator::{http::HttpActuatorFactory, ActuatorSource},
    agent::{Agent, Step},
    configuration::Settings,
    playbooks::DirectoryPlaybooks,
    providers::factory::build_provider,
    test_sink::DirectoryTestSink,
};

#[derive(Parser)]
#[command(author, version, about = "LLM-powered web automation agent", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Natural-language task to perform in the browser
    task: Option<String>,

    /// LLM provider: anthropic | openai
    #[arg(short, long)]
    provider: Option<String>,

    /// Model ID override
    #[arg(short, long)]
    model: Option<String>,

    /// Print each step
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::new()?;

    match cli.command {
        Some(Command::Serve { host, port }) => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            println!(
                "Starting server at {}",
                style(format!("http://{}:{}", settings.server.host, settings.server.port)).cyan()
            );
            web_automator_server::serve(settings).await
        }
        None => match cli.task {
            Some(task) => {
                let success = run_task(
                    settings,
                    &task,
                    cli.provider.as_deref(),
                    cli.model.as_deref(),
                    cli.verbose,
                )
                .await?;
                if !success {
                    std::process::exit(1);
                }
                Ok(())
            }
            None => {
                Cli::command().print_help()?;
                Ok(())
            }
        },
    }
}

async fn run_task(
    settings: Settings,
    task: &str,
    provider: Option<&str>,
    model: Option<&str>,
    verbose: bool,
) -> Result<bool> {
    let provider = build_provider(&settings.provider, provider, model)?;
    let agent = Agent::new(
        provider,
        ActuatorSource::Owned(Arc::new(HttpActuatorFactory::new(settings.actuator.clone()))),
    )
    .with_config(settings.agent.clone())
    .with_playbooks(Arc::new(DirectoryPlaybooks::new(&settings.playbooks.skills_dir)))
    .with_test_sink(Arc::new(DirectoryTestSink::new(&settings.tests.tests_dir)));

    println!("Running task: {}", style(task).bold());
    let spin = spinner();
    spin.start("working");
    let result = agent.run(task).await;
    spin.stop("");

    if verbose && !result.steps.is_empty() {
        println!("\n--- Steps ---");
        for step in &result.steps {
            println!("{}", format_step(step));
        }
        println!("--- End Steps ---\n");
    }

    if result.success {
        println!("\n{}", style("Result:").green().bold());
        render(&result.result)?;
    } else {
        eprintln!(
            "\n{} {}\n{}",
            style("Failed:").red().bold(),
            result.error.as_deref().unwrap_or_default(),
            result.result
        );
    }
    Ok(result.success)
}

fn format_step(step: &Step) -> String {
    let status = if step.success {
        style("OK").green()
    } else {
        style("ERR").red()
    };
    format!(
        "  [{}] {}({}) -> {:?}",
        status,
        step.tool_name,
        Value::Object(step.tool_args.clone()),
        step.tool_result
    )
}

fn render(content: &str) -> Result<()> {
    PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print()
        .map_err(|e| anyhow!("Failed to render output: {}", e))?;
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_task_with_options() {
        let cli = Cli::try_parse_from([
            "web-automator",
            "Find the price",
            "-p",
            "openai",
            "-m",
            "gpt-4o-mini",
            "-v",
        ])
        .unwrap();

        assert!(cli.command.is_none());
        assert_eq!(cli.task.as_deref(), Some("Find the price"));
        assert_eq!(cli.provider.as_deref(), Some("openai"));
        assert_eq!(cli.model.as_deref(), Some("gpt-4o-mini"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_parse_serve() {
        let cli =
            Cli::try_parse_from(["web-automator", "serve", "--host", "0.0.0.0", "--port", "9000"])
                .unwrap();

        match cli.command {
            Some(Command::Serve { host, port }) => {
                assert_eq!(host.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(9000));
            }
            None => panic!("Expected serve subcommand"),
        }
    }

    #[test]
    fn test_format_step() {
        console::set_colors_enabled(false);
        let step = Step {
            step_number: 1,
            tool_name: "navigate".to_string(),
            tool_args: json!({"url": "https://example.com"})
                .as_object()
                .unwrap()
                .clone(),
            tool_result: "Navigated".to_string(),
            success: true,
        };
        assert_eq!(
            format_step(&step),
            r#"  [OK] navigate({"url":"https://example.com"}) -> "Navigated""#
        );
    }
}
