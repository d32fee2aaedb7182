use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;

use campushub::{Client, Config, InitOutcome};

#[derive(Parser)]
#[command(name = "campushub", about = "CLI for the CampusHub community API")]
pub struct Args {
    #[arg(long, env = "CAMPUSHUB_BASE_URL", help = "API base URL (overrides config)")]
    pub base_url: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Log in and persist the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "CAMPUSHUB_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account (does not log in)
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "CAMPUSHUB_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the session locally and (best effort) on the server
    Logout,
    /// Show the current user's profile
    Whoami,
    /// Show session status without touching the network
    Status,
    /// GET an API path with the current session
    Get { path: String },
    /// POST a JSON body to an API path with the current session
    Post {
        path: String,
        #[arg(long, help = "JSON request body")]
        body: Option<String>,
    },
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();

    let mut cfg = if let Some(config_path) = &args.config {
        Config::load_from(config_path)?
    } else {
        Config::load()?
    };
    if let Some(base_url) = &args.base_url {
        cfg.base_url = base_url.clone();
    }
    if let Err(errors) = cfg.validate() {
        for e in &errors {
            eprintln!("config error {}", e);
        }
        anyhow::bail!("invalid configuration");
    }

    let client = Client::with_file_storage(&cfg);

    match &args.command {
        Command::Login { username, password } => {
            let user = client.session().login(username, password)?;
            println!("logged in as {} (id {})", user.username, user.id);
            if user.is_first_login {
                println!("first login: visit your profile settings to finish setup");
            }
        }
        Command::Register {
            username,
            email,
            password,
        } => {
            client.session().register(username, email, password)?;
            println!("registered {}; log in to start a session", username);
        }
        Command::Logout => {
            client.session().logout();
            println!("logged out");
        }
        Command::Whoami => {
            match client.session().init()? {
                InitOutcome::NoSession => {
                    println!("not logged in");
                }
                InitOutcome::Restored(user) => {
                    println!("{} (id {})", user.username, user.id);
                }
            }
        }
        Command::Status => {
            // restore only; no profile fetch, no refresh
            if client.store().restore() {
                match client.store().user() {
                    Some(user) => println!("session for {} (id {})", user.username, user.id),
                    None => println!("session present, profile not cached"),
                }
            } else {
                println!("no persisted session");
            }
        }
        Command::Get { path } => {
            restore_session(&client)?;
            let resp = client.api().get(path)?;
            print_response(&resp);
        }
        Command::Post { path, body } => {
            restore_session(&client)?;
            let body: Option<Value> = match body {
                Some(raw) => Some(serde_json::from_str(raw)?),
                None => None,
            };
            let resp = client.api().post(path, body.as_ref())?;
            print_response(&resp);
        }
    }

    Ok(())
}

fn restore_session(client: &Client) -> Result<()> {
    if !client.store().restore() {
        anyhow::bail!("not logged in; run `campushub login` first");
    }
    Ok(())
}

fn print_response(resp: &campushub::ApiResponse) {
    if !resp.is_success() {
        eprintln!("HTTP {}: {}", resp.status, resp.server_error());
        return;
    }
    match resp.json::<Value>() {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Err(_) => println!("{}", resp.text()),
    }
}
