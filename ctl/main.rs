#![forbid(unsafe_code)]

//! `desktop-session-ctl`: local CLI companion for `desktop-session-host`.
//!
//! Connects to the control socket and sends JSON commands to the host.
//! Intended for operators and smoke tests on the host machine.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand, ValueEnum};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "desktop-session-ctl",
    about = "Local CLI for desktop-session-host",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the host's `ipc_name` config).
    #[arg(long, default_value = "desktop-session-host")]
    ipc_name: String,

    /// Shared secret expected by the host.
    #[arg(long, env = "DESKTOP_SESSION_IPC_TOKEN")]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Control verb forwarded to the bound session.
#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum Action {
    Enable,
    Disable,
    LockScreen,
    Logoff,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::LockScreen => "lock_screen",
            Self::Logoff => "logoff",
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show controller state and the bound session variant.
    Status,

    /// Launch and attach the worker for an interactive session.
    Attach {
        /// Interactive session ID.
        session_id: u32,
    },

    /// Detach the current session and bind the placeholder.
    Detach,

    /// Ask the bound session for a frame.
    Capture,

    /// Send a control verb to the bound session.
    Control {
        /// Verb to send.
        #[arg(value_enum)]
        action: Action,
    },

    /// Update desktop appearance overrides.
    Configure {
        /// Keep the wallpaper.
        #[arg(long)]
        wallpaper: bool,
        /// Disable font smoothing.
        #[arg(long)]
        no_font_smoothing: bool,
        /// Keep visual effects.
        #[arg(long)]
        effects: bool,
    },
}

fn main() {
    let args = Cli::parse();

    let mut request_json = match &args.command {
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::Attach { session_id } => {
            serde_json::json!({ "command": "attach", "session_id": session_id })
        }
        Command::Detach => serde_json::json!({ "command": "detach" }),
        Command::Capture => serde_json::json!({ "command": "capture" }),
        Command::Control { action } => {
            serde_json::json!({ "command": "control", "action": action.as_str() })
        }
        Command::Configure {
            wallpaper,
            no_font_smoothing,
            effects,
        } => serde_json::json!({
            "command": "configure",
            "desktop": {
                "wallpaper": wallpaper,
                "font_smoothing": !no_font_smoothing,
                "effects": effects,
            }
        }),
    };

    if let Some(token) = &args.auth_token {
        request_json["auth_token"] = serde_json::Value::String(token.clone());
    }

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to host: {err}");
            eprintln!("Is desktop-session-host running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Connect to the control socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
