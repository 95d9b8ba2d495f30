use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod commands;

#[derive(Parser)]
#[command(name = "mnemo-cli", version, about = "Mnemo spaced-repetition CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Study sessions: open a queue, rate cards, inspect progress
    Study {
        #[command(subcommand)]
        action: commands::study::StudyAction,
    },
    /// Card curation: create, hide, flag, move
    Card {
        #[command(subcommand)]
        action: commands::card::CardAction,
    },
    /// Subject tree management
    Subject {
        #[command(subcommand)]
        action: commands::subject::SubjectAction,
    },
    /// Deck management and membership resolution
    Deck {
        #[command(subcommand)]
        action: commands::deck::DeckAction,
    },
    /// Learner accounts and tiers
    Learner {
        #[command(subcommand)]
        action: commands::learner::LearnerAction,
    },
    /// Difficulty reports over rating history
    Problems {
        #[command(subcommand)]
        action: commands::problems::ProblemsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Corpus and activity statistics
    Stats {
        #[command(subcommand)]
        action: commands::stats::StatsAction,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Study { action } => commands::study::run(action),
        Commands::Card { action } => commands::card::run(action),
        Commands::Subject { action } => commands::subject::run(action),
        Commands::Deck { action } => commands::deck::run(action),
        Commands::Learner { action } => commands::learner::run(action),
        Commands::Problems { action } => commands::problems::run(action),
        Commands::Config { action } => commands::config::run(action),
        Commands::Stats { action } => commands::stats::run(action),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
