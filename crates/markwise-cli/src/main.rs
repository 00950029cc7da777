//! markwise CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use markwise_core::model::Language;

mod commands;

#[derive(Parser)]
#[command(name = "markwise", version, about = "Answer evaluation and scoring engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single answer and print the result as JSON
    Evaluate {
        /// Question paper TOML
        #[arg(long)]
        paper: PathBuf,

        /// Question ID on the paper
        #[arg(long)]
        question_id: String,

        /// File holding the student's answer
        #[arg(long)]
        answer: PathBuf,

        /// Language of a code answer (python, javascript, java, cpp)
        #[arg(long)]
        language: Option<Language>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip the LLM even if one is configured
        #[arg(long)]
        no_llm: bool,
    },

    /// Grade all submissions against a paper and rank the students
    Grade {
        /// Question paper TOML
        #[arg(long)]
        paper: PathBuf,

        /// Submissions TOML
        #[arg(long)]
        submissions: PathBuf,

        /// Output directory for the JSON report
        #[arg(long, default_value = "./markwise-results")]
        output: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Skip the LLM even if one is configured
        #[arg(long)]
        no_llm: bool,
    },

    /// Validate a question paper
    Validate {
        /// Question paper TOML
        #[arg(long)]
        paper: PathBuf,
    },

    /// List subject weight profiles
    Profiles {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example paper
    Init,
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Evaluate {
            paper,
            question_id,
            answer,
            language,
            config,
            no_llm,
        } => commands::evaluate::execute(paper, question_id, answer, language, config, no_llm).await,
        Commands::Grade {
            paper,
            submissions,
            output,
            config,
            no_llm,
        } => commands::grade::execute(paper, submissions, output, config, no_llm).await,
        Commands::Validate { paper } => commands::validate::execute(paper),
        Commands::Profiles { config } => commands::profiles::execute(config),
        Commands::Init => commands::init::execute(),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("markwise=info".parse().expect("static directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Dropping the command future cancels in-flight evaluations, which kills
    // sandboxed children and removes their temp directories.
    let result = tokio::select! {
        result = run(cli.command) => result,
        _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
