use std::process::ExitCode;

fn main() -> ExitCode {
    tracechat_cli::run()
}
