use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lexchat",
    about = "Ask the legal-research assistant from the terminal"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store the API token used for requests
    Login { token: String },
    /// Forget the stored API token
    Logout,
    /// Ask a question and stream the answer
    Ask {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<i64>,
        /// Print the raw conversation log as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}
