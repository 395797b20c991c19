use std::io::Write;
use std::time::Instant;

use anyhow::Context;
use serde::Serialize;
use tickbridge::Observation;
use tickbridge::ipc::client::{ObservationClient, connect_with_retry};

use crate::cli::WatchArgs;
use crate::config::MergedConfig;
use crate::error::CliResult;

/// One line of `watch` output
#[derive(Debug, Serialize)]
struct ObservationLine {
    seq: u64,
    reward: f64,
    frame_bytes: usize,
    elapsed_ms: u128,
}

impl ObservationLine {
    fn new(seq: u64, observation: &Observation, started: Instant) -> Self {
        Self {
            seq,
            reward: observation.reward,
            frame_bytes: observation.frame.len(),
            elapsed_ms: started.elapsed().as_millis(),
        }
    }
}

pub fn execute(args: WatchArgs, config: MergedConfig) -> CliResult<()> {
    let path = config.bridge.observation_socket();
    let stream = connect_with_retry(path, config.connect_attempts, config.connect_delay)
        .with_context(|| format!("failed to connect to {}", path.display()))?;
    let mut client = ObservationClient::from_stream(stream, *config.bridge.limits());

    let started = Instant::now();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut seq: u64 = 0;

    while args.count.is_none_or(|count| seq < count) {
        let Some(observation) = client.recv().context("failed to read observation")? else {
            tracing::info!("game closed the observation socket");
            break;
        };
        seq += 1;

        let line = ObservationLine::new(seq, &observation, started);
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
        out.flush()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_serializes_frame_size_not_frame() {
        let observation = Observation::new(1.5, vec![0; 12]);
        let line = ObservationLine::new(3, &observation, Instant::now());
        let json: serde_json::Value = serde_json::to_value(&line).unwrap();

        assert_eq!(json["seq"], 3);
        assert_eq!(json["reward"], 1.5);
        assert_eq!(json["frame_bytes"], 12);
        assert!(json.get("frame").is_none());
    }
}
