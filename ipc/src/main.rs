//! CLI tool for calling browser-bridge methods
//!
//! Usage:
//!   bridge-ctl <method> [args...]
//!   bridge-ctl --port 9000 echo hello
//!   bridge-ctl Browser_LoadURL 4294967297 https://example.com
//!
//! Each argument is parsed as JSON when it is valid JSON and sent as a string
//! otherwise. The reply is printed as pretty JSON.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use browser_bridge::BridgeError;
use browser_bridge::ipc::{Client, Endpoint};
use clap::Parser;

/// CLI tool for calling browser-bridge methods
#[derive(Parser)]
#[command(name = "bridge-ctl")]
#[command(about = "Send one request to a browser-bridge server")]
struct Cli {
    /// Local socket of the server (default: <temp dir>/cef_server_pipe)
    #[arg(long, env = "BROWSER_BRIDGE_PIPE", conflicts_with = "port")]
    pipe: Option<PathBuf>,

    /// TCP port of the server on 127.0.0.1
    #[arg(long, env = "BROWSER_BRIDGE_PORT")]
    port: Option<u16>,

    /// How long to wait for the connection and the reply, in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Method name to invoke
    method: String,

    /// Positional arguments of the method
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let endpoint = match (cli.pipe.clone(), cli.port) {
        (Some(pipe), _) => Endpoint::Pipe(pipe),
        (None, Some(port)) => Endpoint::Tcp(port),
        (None, None) => Endpoint::default_pipe(),
    };

    match send_request(&endpoint, &cli) {
        Ok(response) => {
            println!("{response}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Parse each argument as JSON, falling back to a plain string
fn build_params(args: &[String]) -> Vec<serde_json::Value> {
    args.iter()
        .map(|arg| {
            serde_json::from_str(arg).unwrap_or_else(|_| serde_json::Value::String(arg.clone()))
        })
        .collect()
}

fn send_request(endpoint: &Endpoint, cli: &Cli) -> Result<String, String> {
    let timeout = Duration::from_millis(cli.timeout_ms);
    let mut client = Client::connect(endpoint, timeout)
        .map_err(|e| format!("failed to connect to {endpoint}: {e}"))?;
    client
        .set_reply_timeout(Some(timeout))
        .map_err(|e| format!("failed to configure connection: {e}"))?;

    let params = build_params(&cli.args);
    let result = client.call::<_, serde_json::Value>(&cli.method, &params);
    client.close();

    match result {
        Ok(value) => {
            serde_json::to_string_pretty(&value).map_err(|e| format!("JSON encoding failed: {e}"))
        }
        Err(BridgeError::Remote(remote)) => Err(format!("[{}] {}", remote.code, remote.message)),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_prefer_json() {
        let args = ["4294967297", "true", "https://example.com", "\"quoted\"", "[1,2]"]
            .map(String::from)
            .to_vec();
        let params = build_params(&args);
        assert_eq!(params[0], serde_json::json!(4294967297u64));
        assert_eq!(params[1], serde_json::json!(true));
        assert_eq!(params[2], serde_json::json!("https://example.com"));
        assert_eq!(params[3], serde_json::json!("quoted"));
        assert_eq!(params[4], serde_json::json!([1, 2]));
    }
}
