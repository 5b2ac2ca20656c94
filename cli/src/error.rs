use std::process::ExitCode;

use browser_bridge::BridgeError;

pub type CliResult<T> = anyhow::Result<T>;

/// Exit status when the engine could not be initialized
const ENGINE_INIT_FAILURE: u8 = 2;

/// Convert a CliResult to an ExitCode, printing errors to stderr
pub fn to_exit_code(result: CliResult<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            ExitCode::from(exit_status(&e))
        }
    }
}

fn exit_status(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<BridgeError>() {
        Some(BridgeError::EngineInit(_)) => ENGINE_INIT_FAILURE,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_engine_init_maps_to_two() {
        let failed: CliResult<()> = Err(BridgeError::EngineInit("no cache".to_string()))
            .context("failed to initialize the browser engine");
        assert_eq!(exit_status(&failed.unwrap_err()), 2);

        let bind: CliResult<()> = Err(BridgeError::Config("bad".to_string())).context("startup");
        assert_eq!(exit_status(&bind.unwrap_err()), 1);
        assert_eq!(exit_status(&anyhow::anyhow!("plain")), 1);
    }
}
