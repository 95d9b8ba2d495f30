//! Learner account commands.

use clap::Subcommand;

use super::open_service;

#[derive(Subcommand)]
pub enum LearnerAction {
    /// Register a learner
    Create {
        /// Display name
        name: String,
        /// Tier: basic, plus, or unlimited
        #[arg(long, default_value = "basic")]
        tier: String,
        /// Timezone offset in minutes east of UTC
        #[arg(long, default_value = "0")]
        tz_offset: i32,
    },
    /// Show one learner
    Get {
        /// Learner ID
        id: String,
    },
    /// List all learners
    List,
    /// Change a learner's tier
    SetTier {
        /// Learner ID
        id: String,
        /// New tier: basic, plus, or unlimited
        tier: String,
    },
}

pub fn run(action: LearnerAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service()?;

    match action {
        LearnerAction::Create {
            name,
            tier,
            tz_offset,
        } => {
            let learner = service.create_learner(&name, &tier, tz_offset)?;
            println!("Learner created: {}", learner.id);
            println!("{}", serde_json::to_string_pretty(&learner)?);
        }
        LearnerAction::Get { id } => match service.db().get_learner(&id)? {
            Some(learner) => println!("{}", serde_json::to_string_pretty(&learner)?),
            None => println!("Learner not found: {id}"),
        },
        LearnerAction::List => {
            let learners = service.db().list_learners()?;
            println!("{}", serde_json::to_string_pretty(&learners)?);
        }
        LearnerAction::SetTier { id, tier } => {
            let learner = service.set_learner_tier(&id, &tier)?;
            println!("Learner {} is now on tier: {}", learner.id, learner.tier);
        }
    }

    Ok(())
}
