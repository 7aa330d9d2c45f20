use crate::exit;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    ToolRig(#[from] toolrig_core::ToolRigError),

    #[error(transparent)]
    Lock(#[from] toolrig_lock::LockError),

    #[error(transparent)]
    State(#[from] toolrig_state::StateError),

    #[error("tool '{0}' is not in the catalog")]
    UnknownTool(String),

    #[error("plan '{0}' is not paused or failed; nothing to resume")]
    NotResumable(String),

    #[error("install plan for '{tool}' needs confirmation: {prompt}")]
    ConfirmationRequired { tool: String, prompt: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ToolRig(toolrig_core::ToolRigError::RecipeNotFound(_)) => exit::BAD_ARGUMENTS,
            CliError::UnknownTool(_) => exit::BAD_ARGUMENTS,
            CliError::ConfirmationRequired { .. } => exit::CONFIRMATION_REQUIRED,
            _ => exit::RUNTIME_ERROR,
        }
    }
}
