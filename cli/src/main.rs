use clap::{Parser, Subcommand};
use edutrack_core::profile::Role;
use tracing_subscriber::EnvFilter;

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "edutrack",
    version,
    about = "EduTrack CLI: accounts, dashboards and the learning assistant"
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "EDUTRACK_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "EDUTRACK_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        display_name: String,
        /// student, parent or school
        #[arg(long)]
        role: Role,
    },
    /// Sign in and store credentials locally
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "EDUTRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out on every device and remove stored credentials
    Logout,
    /// Request a reset link (--email) or set a new password (--token, --new-password)
    ResetPassword {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        new_password: Option<String>,
    },
    /// Show the resolved session (user, role, display name)
    Whoami,
    /// Show what the client router would do with a path
    Open {
        /// Client path, e.g. /dashboard/student
        path: String,
    },
    /// Show your dashboard, or a specific role's
    Dashboard {
        #[arg(long)]
        role: Option<Role>,
    },
    /// Profile operations
    Profile {
        #[command(subcommand)]
        command: commands::profile::ProfileCommands,
    },
    /// Send a message to the EduTrack team
    Feedback {
        #[arg(long)]
        email: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        message: String,
    },
    /// Chat with the learning assistant through the API
    Chat {
        #[command(subcommand)]
        command: commands::chat::ChatCommands,
    },
    /// Chat with the learning assistant locally (needs GEMINI_API_KEY)
    Ask {
        /// Ask a single question instead of starting an interactive session
        #[arg(long)]
        once: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // Diagnostics go to stderr; stdout carries JSON output only
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();
    let api_url = cli.api_url.trim_end_matches('/').to_string();

    let code = match cli.command {
        Commands::Health => commands::health::run(&api_url).await,
        Commands::Register {
            email,
            password,
            display_name,
            role,
        } => commands::auth::register(&api_url, &email, &password, &display_name, role).await,
        Commands::Login { email, password } => {
            commands::auth::login(&api_url, &email, &password).await
        }
        Commands::Logout => commands::auth::logout(&api_url).await,
        Commands::ResetPassword {
            email,
            token,
            new_password,
        } => {
            commands::auth::reset_password(
                &api_url,
                email.as_deref(),
                token.as_deref(),
                new_password.as_deref(),
            )
            .await
        }
        Commands::Whoami => commands::session::whoami(&api_url).await,
        Commands::Open { path } => commands::session::open(&api_url, &path).await,
        Commands::Dashboard { role } => commands::session::dashboard(&api_url, role).await,
        Commands::Profile { command } => {
            let token = util::require_token(&api_url).await;
            commands::profile::run(&api_url, &token, command).await
        }
        Commands::Feedback {
            email,
            subject,
            message,
        } => commands::feedback::run(&api_url, &email, &subject, &message).await,
        Commands::Chat { command } => {
            let token = util::require_token(&api_url).await;
            commands::chat::run(&api_url, &token, command).await
        }
        Commands::Ask { once } => commands::ask::run(once).await,
    };

    std::process::exit(code);
}
