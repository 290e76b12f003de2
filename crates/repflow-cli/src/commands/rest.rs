use clap::Subcommand;
use repflow_core::storage::Database;
use repflow_core::Config;

#[derive(Subcommand)]
pub enum RestAction {
    /// Print the rest length new sessions start with
    Get,
    /// Store a default rest length; <= 0 disables rests
    Set {
        #[arg(allow_hyphen_values = true)]
        secs: i64,
    },
}

pub fn run(action: RestAction, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    match action {
        RestAction::Get => {
            let secs = db
                .default_rest_secs()?
                .unwrap_or(config.playback.default_rest_secs);
            println!("{secs}");
        }
        RestAction::Set { secs } => {
            db.set_default_rest_secs(secs)?;
            println!("default rest set to {secs}s");
        }
    }
    Ok(())
}
