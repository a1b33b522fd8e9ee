use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::util::api_request;

#[derive(Subcommand)]
pub enum ChatCommands {
    /// Open a chat session with the learning assistant
    Start,
    /// Send one message and print the reply
    Send {
        /// Chat session id from `edutrack chat start`
        #[arg(long)]
        session: Uuid,
        /// Message text
        text: String,
    },
    /// Print the transcript and assistant mode
    Show {
        #[arg(long)]
        session: Uuid,
    },
}

pub async fn run(api_url: &str, token: &str, command: ChatCommands) -> i32 {
    match command {
        ChatCommands::Start => {
            api_request(
                api_url,
                reqwest::Method::POST,
                "/v1/chat/sessions",
                Some(token),
                None,
                &[],
            )
            .await
        }
        ChatCommands::Send { session, text } => {
            api_request(
                api_url,
                reqwest::Method::POST,
                &format!("/v1/chat/sessions/{session}/messages"),
                Some(token),
                Some(json!({ "text": text })),
                &[],
            )
            .await
        }
        ChatCommands::Show { session } => {
            api_request(
                api_url,
                reqwest::Method::GET,
                &format!("/v1/chat/sessions/{session}"),
                Some(token),
                None,
                &[],
            )
            .await
        }
    }
}
