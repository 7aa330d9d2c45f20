use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "toolrig", version, about = "Detect, resolve, and install developer tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the state directory (defaults to the platform data dir).
    #[arg(long, global = true)]
    pub state_dir: Option<std::path::PathBuf>,

    /// Override the recipe catalog directory.
    #[arg(long, global = true)]
    pub catalog_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the detected system profile as JSON.
    Detect,

    /// Resolve a tool's choices and print an install plan.
    Plan {
        tool: String,

        /// A pre-answered choice or input, `key=value`; may repeat.
        #[arg(long = "answer", value_parser = parse_key_value)]
        answer: Vec<(String, String)>,
    },

    /// Resolve, (optionally confirm,) and execute an install plan.
    Install {
        tool: String,

        #[arg(long = "answer", value_parser = parse_key_value)]
        answer: Vec<(String, String)>,

        /// Skip the high-risk confirmation gate.
        #[arg(long)]
        yes: bool,

        /// Sudo password, piped to steps that need it. Prompted for if omitted and needed.
        #[arg(long)]
        sudo_password: Option<String>,
    },

    /// Re-resolve and execute a fresh plan for an already-installed tool.
    Update {
        tool: String,

        #[arg(long = "answer", value_parser = parse_key_value)]
        answer: Vec<(String, String)>,

        #[arg(long)]
        yes: bool,

        #[arg(long)]
        sudo_password: Option<String>,
    },

    /// Resolve and execute the inverse (rollback) plan for a tool.
    Remove {
        tool: String,

        #[arg(long)]
        yes: bool,

        #[arg(long)]
        sudo_password: Option<String>,
    },

    /// Resume a paused or interrupted plan by id.
    Resume {
        plan_id: String,

        #[arg(long)]
        sudo_password: Option<String>,
    },

    /// Cancel a running or paused plan by id.
    Cancel { plan_id: String },

    /// List pending (non-terminal) plans.
    #[command(name = "list-plans")]
    ListPlans,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (k, v) = raw.split_once('=').ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    Ok((k.to_string(), v.to_string()))
}
