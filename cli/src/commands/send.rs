use std::thread;
use std::time::Duration;

use anyhow::Context;
use tickbridge::ipc::client::{CommandClient, connect_with_retry};
use tickbridge::{Command, MouseButtons};

use crate::cli::SendArgs;
use crate::config::MergedConfig;
use crate::error::CliResult;

pub fn execute(args: SendArgs, config: MergedConfig) -> CliResult<()> {
    let command = build_command(&args);
    let limits = config.bridge.limits();
    limits.check_key_count(command.keys.len())?;
    limits.check_text_len(command.text.len())?;

    let path = config.bridge.command_socket();
    let stream = connect_with_retry(path, config.connect_attempts, config.connect_delay)
        .with_context(|| format!("failed to connect to {}", path.display()))?;
    let mut client = CommandClient::from_stream(stream);

    let interval = Duration::from_millis(args.interval_ms);
    for sent in 1..=args.repeat {
        client.send(&command).context("failed to send command")?;
        tracing::debug!(sent, "command sent");
        if sent < args.repeat {
            thread::sleep(interval);
        }
    }

    tracing::info!(count = args.repeat, path = %path.display(), "commands sent");
    Ok(())
}

fn build_command(args: &SendArgs) -> Command {
    Command {
        keys: args.keys.clone(),
        mouse_dx: args.dx,
        mouse_dy: args.dy,
        mouse_buttons: args
            .buttons
            .iter()
            .fold(MouseButtons::empty(), |acc, button| acc | button.flag()),
        scroll_delta: args.scroll,
        text: args.text.clone(),
    }
}
