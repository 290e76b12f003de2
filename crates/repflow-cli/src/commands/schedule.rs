use std::path::PathBuf;

use clap::Subcommand;
use repflow_core::storage::Database;

#[derive(Subcommand)]
pub enum ScheduleAction {
    /// List stored schedules
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print one stored schedule as JSON
    Show {
        /// Schedule id
        id: String,
    },
    /// Store a schedule from a JSON or TOML file
    Import {
        /// Path to the schedule file
        path: PathBuf,
    },
    /// Delete a stored schedule
    Delete {
        /// Schedule id
        id: String,
    },
}

pub fn run(action: ScheduleAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        ScheduleAction::List { json } => {
            let schedules = db.list_schedules()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&schedules)?);
            } else if schedules.is_empty() {
                println!("no schedules stored");
            } else {
                for s in schedules {
                    println!("{}  {} ({} steps)", s.id, s.title, s.step_count);
                }
            }
        }
        ScheduleAction::Show { id } => {
            let schedule = db
                .get_schedule(&id)?
                .ok_or_else(|| format!("schedule not found: {id}"))?;
            println!("{}", serde_json::to_string_pretty(&schedule)?);
        }
        ScheduleAction::Import { path } => {
            let schedule = super::read_schedule_file(&path)?;
            db.save_schedule(&schedule)?;
            println!("schedule imported: {}", schedule.id);
        }
        ScheduleAction::Delete { id } => {
            if !db.delete_schedule(&id)? {
                return Err(format!("schedule not found: {id}").into());
            }
            println!("schedule deleted: {id}");
        }
    }
    Ok(())
}
