use clap::Subcommand;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::util::{api_request, exit_error};

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Show your profile
    Show,
    /// Update display name or parent/school links
    Update {
        #[arg(long)]
        display_name: Option<String>,
        /// Link to a parent account
        #[arg(long)]
        parent_id: Option<Uuid>,
        /// Link to a school account
        #[arg(long)]
        school_id: Option<Uuid>,
    },
}

fn update_body(
    display_name: Option<String>,
    parent_id: Option<Uuid>,
    school_id: Option<Uuid>,
) -> Option<Value> {
    let mut body = Map::new();
    if let Some(name) = display_name {
        body.insert("display_name".to_string(), Value::String(name));
    }
    if let Some(id) = parent_id {
        body.insert("parent_id".to_string(), Value::String(id.to_string()));
    }
    if let Some(id) = school_id {
        body.insert("school_id".to_string(), Value::String(id.to_string()));
    }
    (!body.is_empty()).then_some(Value::Object(body))
}

pub async fn run(api_url: &str, token: &str, command: ProfileCommands) -> i32 {
    match command {
        ProfileCommands::Show => {
            api_request(api_url, reqwest::Method::GET, "/v1/profile", Some(token), None, &[]).await
        }
        ProfileCommands::Update {
            display_name,
            parent_id,
            school_id,
        } => {
            let Some(body) = update_body(display_name, parent_id, school_id) else {
                exit_error(
                    "Nothing to update",
                    Some("Pass --display-name, --parent-id or --school-id."),
                );
            };
            api_request(
                api_url,
                reqwest::Method::PATCH,
                "/v1/profile",
                Some(token),
                Some(body),
                &[],
            )
            .await
        }
    }
}
