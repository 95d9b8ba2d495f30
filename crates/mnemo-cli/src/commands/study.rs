//! Study session commands.

use clap::Subcommand;
use mnemo_core::DeckSelector;

use super::open_service;

#[derive(Subcommand)]
pub enum StudyAction {
    /// Open (or continue) today's session and list the cards to study
    Next {
        /// Learner ID
        learner: String,
        /// Restrict the session to one subject subtree
        #[arg(long, conflicts_with = "decks")]
        subject: Option<String>,
        /// Comma-separated deck IDs to draw from
        #[arg(long)]
        decks: Option<String>,
    },
    /// Grade a card from the open session
    Rate {
        /// Learner ID
        learner: String,
        /// Card ID
        card: String,
        /// One of: again, hard, good, easy
        rating: String,
        /// Session token from `study next`
        #[arg(long)]
        token: String,
    },
    /// Show a learner's scheduling state
    Progress {
        /// Learner ID
        learner: String,
        /// Restrict to one card
        #[arg(long)]
        card: Option<String>,
    },
}

fn parse_selector(subject: Option<String>, decks: Option<String>) -> DeckSelector {
    if let Some(subject_id) = subject {
        return DeckSelector::Subject(subject_id);
    }
    match decks {
        Some(ids) => DeckSelector::Decks(
            ids.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        None => DeckSelector::Any,
    }
}

pub fn run(action: StudyAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service()?;

    match action {
        StudyAction::Next {
            learner,
            subject,
            decks,
        } => {
            let selector = parse_selector(subject, decks);
            let next = service.next_cards(&learner, &selector)?;
            println!("{}", serde_json::to_string_pretty(&next)?);
        }
        StudyAction::Rate {
            learner,
            card,
            rating,
            token,
        } => {
            let outcome = service.submit_rating(&learner, &card, &rating, &token)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        StudyAction::Progress { learner, card } => match card {
            Some(card_id) => match service.db().get_progress(&learner, &card_id)? {
                Some(progress) => println!("{}", serde_json::to_string_pretty(&progress)?),
                None => println!("No progress for card: {card_id}"),
            },
            None => {
                let rows = service.db().progress_for_learner(&learner)?;
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_defaults_to_any() {
        assert_eq!(parse_selector(None, None), DeckSelector::Any);
    }

    #[test]
    fn subject_scope_wins_when_given() {
        assert_eq!(
            parse_selector(Some("sub-1".into()), None),
            DeckSelector::Subject("sub-1".into())
        );
    }

    #[test]
    fn deck_list_is_split_and_trimmed() {
        assert_eq!(
            parse_selector(None, Some("d1, d2 ,,d3".into())),
            DeckSelector::Decks(vec!["d1".into(), "d2".into(), "d3".into()])
        );
    }
}
