use std::io;
use std::process::ExitCode;

pub type CliResult<T> = anyhow::Result<T>;

/// Any failure not classified below
const EXIT_FAILURE: u8 = 1;
/// A socket could not be bound
const EXIT_BIND: u8 = 3;
/// No game is listening on the socket
const EXIT_UNREACHABLE: u8 = 4;
/// The peer sent a malformed message
const EXIT_PROTOCOL: u8 = 5;

/// Convert a CliResult to an ExitCode, printing errors to stderr
pub fn to_exit_code(result: CliResult<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tickbridge: {e}");
            for cause in e.chain().skip(1) {
                eprintln!("  caused by: {cause}");
            }
            ExitCode::from(exit_status(&e))
        }
    }
}

/// Pick an exit status from the first recognised cause in the chain
fn exit_status(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if let Some(error) = cause.downcast_ref::<tickbridge::Error>() {
            return match error {
                tickbridge::Error::Bind { .. } => EXIT_BIND,
                tickbridge::Error::ProtocolViolation(_) => EXIT_PROTOCOL,
                tickbridge::Error::Io(e) if is_unreachable(e) => EXIT_UNREACHABLE,
                _ => EXIT_FAILURE,
            };
        }
        if cause.downcast_ref::<tickbridge::ipc::ProtocolError>().is_some() {
            return EXIT_PROTOCOL;
        }
        if let Some(e) = cause.downcast_ref::<io::Error>()
            && is_unreachable(e)
        {
            return EXIT_UNREACHABLE;
        }
    }
    EXIT_FAILURE
}

fn is_unreachable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
    )
}
