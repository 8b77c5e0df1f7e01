//! MedShop - natural-language questions over a medical inventory database.

use medshop_nlq::chat::{self, ChatClient};
use medshop_nlq::cli::{Cli, Command};
use medshop_nlq::config::Config;
use medshop_nlq::error::{MedshopError, Result};
use medshop_nlq::llm::create_client;
use medshop_nlq::logging;
use medshop_nlq::pipeline::Pipeline;
use medshop_nlq::server;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    logging::init_stderr_logging(cli.default_log_level());

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load(&config_path)?;
    cli.apply_to(&mut config);

    match cli.command {
        Command::Serve { .. } => server::serve(config).await,
        Command::Ask { question } => ask(config, &question.join(" ")).await,
        Command::Chat { endpoint } => {
            let client =
                ChatClient::new(endpoint).map_err(|e| MedshopError::config(format!("{e:#}")))?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            chat::run_repl(&client, stdin, &mut std::io::stdout())
                .await
                .map_err(|e| MedshopError::internal(format!("{e:#}")))
        }
    }
}

async fn ask(config: Config, question: &str) -> Result<()> {
    let llm = create_client(&config.llm)?;
    let pipeline = Pipeline::connect(&config, llm).await?;
    let answer = pipeline.answer(question).await?;
    println!("{answer}");
    Ok(())
}
