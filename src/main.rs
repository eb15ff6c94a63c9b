// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use waypoint_rs::waypoint::config::WorkflowLoader;
use waypoint_rs::waypoint::engine::Engine;
use waypoint_rs::waypoint::memory::backend_from_env;
use waypoint_rs::waypoint::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a workflow from a file
    Run {
        /// Path to the workflow YAML file
        #[arg(short, long)]
        file: String,

        /// Input to the workflow
        #[arg(short, long)]
        input: String,
    },
    /// Serve the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Directory holding workflow YAML files
        #[arg(short, long, default_value = "workflows")]
        workflow_dir: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    match args.command {
        Commands::Run { file, input } => {
            env_logger::init();

            let loader = WorkflowLoader::new();
            let def = loader.load_workflow(&file)?;
            println!("Running workflow: {}", def.name);

            let engine = Engine::from_definition(def, backend_from_env())?;
            let outcome = engine.run(&input).await?;

            println!("Status: {}", outcome.status.as_str());
            println!(
                "Output: {}",
                serde_json::to_string_pretty(&outcome.final_output)?
            );
            if let Some(path) = outcome.report_path {
                println!("Report: {}", path.display());
            }
        }
        Commands::Serve { port, workflow_dir } => {
            // TraceLayer emits through tracing on the server path
            tracing_subscriber::fmt::init();

            server::serve(port, workflow_dir, backend_from_env())
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
    }

    Ok(())
}
