//! Deck management commands.

use clap::Subcommand;

use super::open_service;

#[derive(Subcommand)]
pub enum DeckAction {
    /// Create a deck (subject-derived when --subject is given, manual otherwise)
    Create {
        /// Deck name
        name: String,
        /// Subject whose subtree feeds the deck
        #[arg(long)]
        subject: Option<String>,
    },
    /// Show a deck and its member cards
    Get {
        /// Deck ID
        id: String,
    },
    /// List all decks
    List,
    /// Replace a manual deck's member cards
    SetCards {
        /// Deck ID
        id: String,
        /// Comma-separated card IDs
        cards: String,
    },
    /// Recompute derived deck memberships under a subject
    Resolve {
        /// Subject ID
        subject: String,
    },
}

pub fn run(action: DeckAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service()?;

    match action {
        DeckAction::Create { name, subject } => {
            let deck = service.create_deck(&name, subject.as_deref())?;
            println!("Deck created: {}", deck.id);
            println!("{}", serde_json::to_string_pretty(&deck)?);
        }
        DeckAction::Get { id } => match service.db().get_deck(&id)? {
            Some(deck) => {
                let members = service.db().deck_membership(&id)?;
                let view = serde_json::json!({ "deck": deck, "members": members });
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
            None => println!("Deck not found: {id}"),
        },
        DeckAction::List => {
            let decks = service.db().list_decks()?;
            println!("{}", serde_json::to_string_pretty(&decks)?);
        }
        DeckAction::SetCards { id, cards } => {
            let card_ids: Vec<String> = cards
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            let count = service.set_deck_cards(&id, &card_ids)?;
            println!("Deck {id} now has {count} cards");
        }
        DeckAction::Resolve { subject } => {
            let resolution = service.resolve_deck(&subject)?;
            println!("{}", serde_json::to_string_pretty(&resolution)?);
        }
    }

    Ok(())
}
