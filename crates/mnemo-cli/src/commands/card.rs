//! Card curation commands.

use clap::Subcommand;

use super::open_service;

#[derive(Subcommand)]
pub enum CardAction {
    /// Create a card under a subject
    Create {
        /// Subject ID
        subject: String,
        /// Front (prompt) text
        front: String,
        /// Back (answer) text
        back: String,
        /// Sequence position within the subject
        #[arg(long, default_value = "0")]
        position: i64,
        /// Author attribution
        #[arg(long)]
        author: Option<String>,
    },
    /// Show one card
    Get {
        /// Card ID
        id: String,
    },
    /// List the cards directly under a subject
    List {
        /// Subject ID
        subject: String,
    },
    /// Hide a card from every session queue
    Hide {
        /// Card ID
        id: String,
    },
    /// Make a hidden card servable again
    Unhide {
        /// Card ID
        id: String,
    },
    /// Flag a card for curator attention
    Flag {
        /// Card ID
        id: String,
    },
    /// Clear a card's curator flag
    Unflag {
        /// Card ID
        id: String,
    },
    /// Move a card to another subject
    Move {
        /// Card ID
        id: String,
        /// Target subject ID
        subject: String,
    },
}

pub fn run(action: CardAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service()?;

    match action {
        CardAction::Create {
            subject,
            front,
            back,
            position,
            author,
        } => {
            let card = service.create_card(&subject, &front, &back, position, author)?;
            println!("Card created: {}", card.id);
            println!("{}", serde_json::to_string_pretty(&card)?);
        }
        CardAction::Get { id } => match service.db().get_card(&id)? {
            Some(card) => println!("{}", serde_json::to_string_pretty(&card)?),
            None => println!("Card not found: {id}"),
        },
        CardAction::List { subject } => {
            let cards = service.db().cards_for_subject(&subject)?;
            println!("{}", serde_json::to_string_pretty(&cards)?);
        }
        CardAction::Hide { id } => {
            service.set_card_hidden(&id, true)?;
            println!("Card hidden: {id}");
        }
        CardAction::Unhide { id } => {
            service.set_card_hidden(&id, false)?;
            println!("Card visible: {id}");
        }
        CardAction::Flag { id } => {
            service.set_card_flagged(&id, true)?;
            println!("Card flagged: {id}");
        }
        CardAction::Unflag { id } => {
            service.set_card_flagged(&id, false)?;
            println!("Card unflagged: {id}");
        }
        CardAction::Move { id, subject } => {
            let card = service.move_card(&id, &subject)?;
            println!("Card moved: {} -> {}", card.id, card.subject_id);
        }
    }

    Ok(())
}
