use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ventas_agent::agent::ToolAgent;
use ventas_agent::chart::ChartKind;
use ventas_agent::config::AppConfig;
use ventas_agent::llm::{LlmClient, ModelGateway};
use ventas_agent::orchestrator::{finish_then_stop, Outcome, SAMPLE_REQUESTS};
use ventas_agent::store::SalesStore;
use ventas_agent::tools::{serve_stdio, ToolClient, ToolServer};
use ventas_agent::{Orchestrator, PresentationOutput};

#[derive(Parser)]
#[command(name = "ventas-agent")]
#[command(about = "Ask questions about sales data in plain language")]
#[command(version)]
struct Args {
    /// Path to the SQLite sales database (or set VENTAS_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory for exports and charts (or set VENTAS_OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Chart type used when a request asks for a chart
    #[arg(long, global = true, default_value = "bar")]
    chart: ChartKind,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session (default)
    Repl,

    /// Answer a single request and exit
    Ask {
        /// The request in natural language
        request: String,
    },

    /// Create the database and fill it with synthetic sales
    Seed,

    /// Serve the fixed sales tools over stdin/stdout
    ServeTools,

    /// Let the model pick a sales tool for one request
    Agent {
        /// The request in natural language
        request: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is reserved for output (and for JSON-RPC under serve-tools)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(db) = args.db {
        config.db_path = db;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }

    match args.command.unwrap_or(Commands::Repl) {
        Commands::Repl => {
            let orchestrator = build_orchestrator(&config, args.chart)?;
            repl(&orchestrator, config.preview_rows).await?;
        }
        Commands::Ask { request } => {
            let orchestrator = build_orchestrator(&config, args.chart)?;
            let output = orchestrator.handle(&request).await;
            print_output(&output, config.preview_rows);
        }
        Commands::Seed => {
            let mut store = SalesStore::open(&config.db_path)?;
            let inserted = store.seed(&mut rand::thread_rng(), chrono::Local::now().date_naive())?;
            if inserted == 0 {
                println!("{} {} already has data", "OK".green(), config.db_path.display());
            } else {
                println!(
                    "{} Seeded {} sales into {}",
                    "OK".green().bold(),
                    inserted,
                    config.db_path.display()
                );
            }
        }
        Commands::ServeTools => {
            serve_stdio(ToolServer::new(&config)).await?;
        }
        Commands::Agent { request } => {
            let api_key = config.require_api_key()?;
            let gateway = LlmClient::from_config(&config.model, api_key);
            let client = ToolClient::connect(&config).await?;
            info!(tools = ?client.list_tools().await?, "Connected to tool server");

            let turn = ToolAgent::new(&gateway, &client).run(&request).await;
            client.shutdown().await?;
            print!("{}", turn?.render());
        }
    }

    Ok(())
}

/// Check the key and the store before any request is read
fn build_orchestrator(config: &AppConfig, chart: ChartKind) -> Result<Orchestrator> {
    let api_key = config.require_api_key()?;

    if !config.db_path.exists() {
        bail!(
            "database not found at {} (run `ventas-agent seed` first)",
            config.db_path.display()
        );
    }
    let conn = SalesStore::open_read_only(&config.db_path)?;
    conn.query_row("SELECT COUNT(*) FROM ventas", [], |row| row.get::<_, i64>(0))
        .with_context(|| format!("cannot read sales table in {}", config.db_path.display()))?;

    let gateway: Arc<dyn ModelGateway> = Arc::new(LlmClient::from_config(&config.model, api_key));
    Ok(Orchestrator::new(gateway, config).with_chart_kind(chart))
}

async fn repl(orchestrator: &Orchestrator, preview_rows: usize) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    print_banner();

    loop {
        let line = match editor.readline(&format!("{} ", "Tú >".cyan().bold())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(request);

        match request.to_lowercase().as_str() {
            "salir" | "exit" | "quit" => break,
            "menu" | "ayuda" | "help" => {
                print_menu();
                continue;
            }
            "limpiar" | "clear" => {
                print!("\x1B[2J\x1B[1;1H");
                print_banner();
                continue;
            }
            _ => {}
        }

        let (output, interrupted) =
            finish_then_stop(orchestrator.handle(request), tokio::signal::ctrl_c()).await;
        print_output(&output, preview_rows);
        if interrupted {
            println!("{}", "Interrupted".yellow());
            break;
        }
    }

    println!("{}", "Hasta luego".cyan());
    Ok(())
}

fn print_banner() {
    println!("{}", "=".repeat(60).blue());
    println!("{}", "  Sales assistant - ask about ventas in plain language".bold());
    println!("{}", "=".repeat(60).blue());
    print_menu();
}

fn print_menu() {
    println!("\nExamples:");
    for sample in SAMPLE_REQUESTS {
        println!("  - {}", sample.green());
    }
    println!(
        "\nCommands: {} / {} / {}\n",
        "menu".bold(),
        "limpiar".bold(),
        "salir".bold()
    );
}

fn print_output(output: &PresentationOutput, preview_rows: usize) {
    let text = output.render(preview_rows);
    match &output.outcome {
        Outcome::QueryFailed(_) => eprintln!("{}", text.red()),
        Outcome::NoQueryNeeded => println!("{}", text.yellow()),
        Outcome::Answered => println!("{}", text),
    }
}
