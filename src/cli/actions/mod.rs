pub mod console;

use anyhow::Result;

#[derive(Debug)]
pub enum Action {
    Console(console::Args),
}

impl Action {
    /// Execute the action.
    ///
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Console(args) => console::execute(args).await,
        }
    }
}
