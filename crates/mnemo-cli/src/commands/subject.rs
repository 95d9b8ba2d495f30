//! Subject tree commands.

use clap::Subcommand;

use super::open_service;

#[derive(Subcommand)]
pub enum SubjectAction {
    /// Create a subject
    Create {
        /// Subject title
        title: String,
        /// Parent subject ID (omit for a root subject)
        #[arg(long)]
        parent: Option<String>,
    },
    /// Show one subject
    Get {
        /// Subject ID
        id: String,
    },
    /// List all subjects in path order
    List,
    /// Print the subtree rooted at a subject
    Tree {
        /// Root subject ID
        id: String,
    },
    /// Re-parent a subject (descendants follow)
    Move {
        /// Subject ID
        id: String,
        /// New parent ID (omit to promote to root)
        #[arg(long)]
        parent: Option<String>,
    },
}

pub fn run(action: SubjectAction) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service()?;

    match action {
        SubjectAction::Create { title, parent } => {
            let subject = service.create_subject(&title, parent.as_deref())?;
            println!("Subject created: {}", subject.id);
            println!("{}", serde_json::to_string_pretty(&subject)?);
        }
        SubjectAction::Get { id } => match service.db().get_subject(&id)? {
            Some(subject) => println!("{}", serde_json::to_string_pretty(&subject)?),
            None => println!("Subject not found: {id}"),
        },
        SubjectAction::List => {
            let subjects = service.db().list_subjects()?;
            println!("{}", serde_json::to_string_pretty(&subjects)?);
        }
        SubjectAction::Tree { id } => {
            let root = service
                .db()
                .get_subject(&id)?
                .ok_or(format!("Subject not found: {id}"))?;
            let base = root.depth();
            for subject in service.db().subjects_under_path(&root.path)? {
                let indent = "  ".repeat(subject.depth().saturating_sub(base));
                println!("{indent}{} ({})", subject.title, subject.id);
            }
        }
        SubjectAction::Move { id, parent } => {
            let subject = service.move_subject(&id, parent.as_deref())?;
            println!("Subject moved: {} -> {}", subject.id, subject.path);
        }
    }

    Ok(())
}
