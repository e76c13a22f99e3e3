use std::process::ExitCode;

fn main() -> ExitCode {
    match vibecode::run() {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
