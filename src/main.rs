mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::Method;

use interntrack_client::api::types::Role;
use interntrack_client::config::{ClientConfig, StorageBackend};
use interntrack_client::AppState;

#[derive(Parser, Debug)]
#[command(name = "interntrack", version, about = "InternTrack API client")]
struct Cli {
    /// API base URL, absolute or relative to --origin (env: INTERNTRACK_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Origin for a relative API base (env: INTERNTRACK_ORIGIN)
    #[arg(long, global = true)]
    origin: Option<String>,

    /// Where to keep the session (env: INTERNTRACK_STORAGE)
    #[arg(long, value_enum, global = true)]
    storage: Option<StorageBackend>,

    /// Session file for --storage file (env: INTERNTRACK_SESSION_FILE)
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        /// Falls back to INTERNTRACK_PASSWORD, then a line on stdin
        #[arg(long)]
        password: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami {
        /// Fail unless the user has this role
        #[arg(long, value_parser = parse_role)]
        role: Option<Role>,
    },
    /// Show session details without contacting the API
    Status,
    /// Exchange the refresh token for a new access token
    Refresh,
    /// Send an authenticated request and print the response
    Request {
        path: String,
        #[arg(short = 'X', long, default_value = "GET", value_parser = parse_method)]
        method: Method,
        /// Query parameter, repeatable
        #[arg(short, long = "query", value_parser = parse_pair::<'='>)]
        query: Vec<(String, String)>,
        /// Extra header, repeatable
        #[arg(short = 'H', long = "header", value_parser = parse_pair::<':'>)]
        headers: Vec<(String, String)>,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
        /// Write the raw body to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Download a file with the current session
    Download {
        path: String,
        /// File name to save as
        #[arg(short, long)]
        output: Option<String>,
        /// Query parameter, repeatable
        #[arg(short, long = "query", value_parser = parse_pair::<'='>)]
        query: Vec<(String, String)>,
        /// Directory to save into (env: INTERNTRACK_DOWNLOAD_DIR)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse()
}

fn parse_method(s: &str) -> Result<Method, String> {
    Method::from_bytes(s.trim().to_ascii_uppercase().as_bytes())
        .map_err(|e| format!("invalid method: {}", e))
}

fn parse_pair<const SEP: char>(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once(SEP)
        .ok_or_else(|| format!("expected KEY{}VALUE, got {:?}", SEP, s))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn read_password() -> Result<String, String> {
    if let Ok(password) = std::env::var("INTERNTRACK_PASSWORD") {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| format!("Failed to read password: {}", e))?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn build_config(cli: &Cli) -> Result<ClientConfig, String> {
    let mut config = ClientConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(base) = &cli.api_base {
        config.api_base = base.clone();
    }
    if let Some(origin) = &cli.origin {
        config.origin = Some(origin.clone());
    }
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }
    if let Some(path) = &cli.session_file {
        config.session_file = Some(path.clone());
    }
    if let Command::Download { dir: Some(dir), .. } = &cli.command {
        config.download_dir = dir.clone();
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = build_config(&cli)?;
    log::debug!("Using API base {} with {:?} storage", config.api_base, config.storage);
    let state = AppState::new(config).map_err(|e| e.to_string())?;

    match cli.command {
        Command::Login { email, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password()?,
            };
            commands::login(&state, &email, &password).await
        }
        Command::Logout => commands::logout(&state).await,
        Command::Whoami { role } => commands::whoami(&state, role).await,
        Command::Status => commands::status(&state).await,
        Command::Refresh => commands::refresh(&state).await,
        Command::Request {
            path,
            method,
            query,
            headers,
            data,
            output,
        } => {
            let args = commands::RequestArgs {
                method,
                path,
                query,
                headers,
                data,
                output,
            };
            commands::request(&state, args).await
        }
        Command::Download {
            path,
            output,
            query,
            ..
        } => commands::download(&state, &path, &query, output.as_deref()).await,
    }
}

#[tokio::main]
async fn main() {
    // Pick up INTERNTRACK_* settings from a local .env, if any
    let _ = dotenvy::dotenv();

    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
