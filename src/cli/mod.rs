//! CLI surface for assured.
//!
//! Thin handlers over the IPC protocol: parse arguments, build a `Request`,
//! print the response. `serve` runs the daemon in the foreground.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config;
use crate::core::{CaseId, ElementId, SnapshotId, Token};
use crate::service::ipc::{Request, Response, send_request};
use crate::service::{CaseFilter, OpError, ShareEntry};
use crate::{Error, Result};

// =============================================================================
// Entry + global options
// =============================================================================

#[derive(Parser, Debug)]
#[command(
    name = "assured",
    version,
    about = "Collaborative assurance case service",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Auth token (default: $ASSURED_TOKEN).
    #[arg(long, global = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Daemon socket path (default: from config).
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// More logging (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the daemon in the foreground.
    Serve,
    /// Daemon health and version.
    Info,
    /// Stop the daemon.
    Shutdown,
    /// Register a user; prints the token exactly once.
    Register {
        username: String,
        email: String,
    },
    /// Case operations.
    Case {
        #[command(subcommand)]
        command: CaseCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum CaseCommand {
    /// List cases visible to the caller.
    List {
        /// owner | view | edit | review
        #[arg(long)]
        filter: Option<String>,
    },
    /// Fully assembled nested tree.
    Show { id: CaseId },
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Delete { id: CaseId },
    /// Sandbox lists.
    Sandbox { id: CaseId },
    /// Run the re-identification pass.
    UpdateIdentifiers { id: CaseId },
    /// Freeze a published snapshot.
    Publish { id: CaseId },
    /// Read a published snapshot.
    Snapshot { id: SnapshotId },
    /// Read the share state (owner only).
    Shares { id: CaseId },
    /// Grant or revoke one permission for a user by email.
    Share {
        id: CaseId,
        email: String,
        /// view | edit | review
        kind: String,
        /// Revoke instead of grant.
        #[arg(long)]
        revoke: bool,
    },
    /// Serialized view of a single element.
    Element { id: ElementId },
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn run(cli: Cli) -> Result<()> {
    let mut cfg = config::load_or_default();
    if let Some(socket) = &cli.socket {
        cfg.socket_path = Some(socket.clone());
    }

    match cli.command {
        Command::Serve => return crate::service::run_daemon(cfg),
        Command::Info => request(&cfg, Request::Info),
        Command::Shutdown => request(&cfg, Request::Shutdown),
        Command::Register { username, email } => {
            request(&cfg, Request::RegisterUser { username, email })
        }
        Command::Case { command } => {
            let token = token_from(&cli.token)?;
            case_command(&cfg, token, command)
        }
    }
}

fn case_command(cfg: &config::Config, token: Token, command: CaseCommand) -> Result<()> {
    let req = match command {
        CaseCommand::List { filter } => Request::ListCases {
            token,
            filter: parse_filter(filter.as_deref())?,
        },
        CaseCommand::Show { id } => Request::GetCase { token, case_id: id },
        CaseCommand::Create { name, description } => Request::CreateCase {
            token,
            name,
            description,
        },
        CaseCommand::Delete { id } => Request::DeleteCase { token, case_id: id },
        CaseCommand::Sandbox { id } => Request::SandboxView { token, case_id: id },
        CaseCommand::UpdateIdentifiers { id } => Request::UpdateIdentifiers { token, case_id: id },
        CaseCommand::Publish { id } => Request::PublishCase { token, case_id: id },
        CaseCommand::Snapshot { id } => Request::GetSnapshot {
            token,
            snapshot_id: id,
        },
        CaseCommand::Shares { id } => Request::ShareState { token, case_id: id },
        CaseCommand::Share {
            id,
            email,
            kind,
            revoke,
        } => {
            let grant = Some(!revoke);
            let entry = match kind.as_str() {
                "view" => ShareEntry {
                    email,
                    view: grant,
                    edit: None,
                    review: None,
                },
                "edit" => ShareEntry {
                    email,
                    view: None,
                    edit: grant,
                    review: None,
                },
                "review" => ShareEntry {
                    email,
                    view: None,
                    edit: None,
                    review: grant,
                },
                other => return Err(invalid_arg("kind", format!("unknown kind `{other}`"))),
            };
            Request::ShareWith {
                token,
                case_id: id,
                entries: vec![entry],
            }
        }
        CaseCommand::Element { id } => Request::GetElement {
            token,
            element_id: id,
        },
    };
    request(cfg, req)
}

fn request(cfg: &config::Config, req: Request) -> Result<()> {
    let response = send_request(&cfg.socket_path(), &req)?;
    render(&response);
    match response {
        Response::Ok { .. } => Ok(()),
        Response::Err { err } => Err(Error::Op(OpError::Validation {
            field: "request".into(),
            reason: format!("{}: {}", err.code, err.message),
        })),
    }
}

fn render(response: &Response) {
    match serde_json::to_string_pretty(response) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to render response: {e}"),
    }
}

fn token_from(flag: &Option<String>) -> Result<Token> {
    let raw = match flag {
        Some(token) => token.clone(),
        None => std::env::var("ASSURED_TOKEN")
            .map_err(|_| invalid_arg("token", "pass --token or set ASSURED_TOKEN".to_string()))?,
    };
    Ok(Token::parse(raw)?)
}

fn parse_filter(raw: Option<&str>) -> Result<CaseFilter> {
    Ok(match raw {
        None => CaseFilter::All,
        Some("owner") => CaseFilter::Owner,
        Some("view") => CaseFilter::View,
        Some("edit") => CaseFilter::Edit,
        Some("review") => CaseFilter::Review,
        Some(other) => {
            return Err(invalid_arg("filter", format!("unknown filter `{other}`")));
        }
    })
}

fn invalid_arg(field: &str, reason: String) -> Error {
    Error::Op(OpError::Validation {
        field: field.to_string(),
        reason,
    })
}
