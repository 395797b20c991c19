use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use tickbridge::{
    Bridge, InputSink, KeyAction, KeyCode, Modifiers, MouseButton, SocketServer,
};

use crate::cli::ServeArgs;
use crate::config::MergedConfig;
use crate::error::CliResult;

const STATUS_EVERY: u64 = 100;

pub fn execute(args: ServeArgs, config: MergedConfig) -> CliResult<()> {
    if !(args.tick_rate.is_finite() && args.tick_rate > 0.0) {
        anyhow::bail!("tick rate must be positive, got {}", args.tick_rate);
    }
    let period = Duration::from_secs_f64(1.0 / args.tick_rate);
    let (width, height) = config.window;

    let sink = TracingSink {
        window_size: config.window,
        sensitivity: config.mouse_sensitivity,
        ui_focused: args.ui_focused,
    };
    let bridge = Arc::new(Bridge::new(sink, &config.bridge));
    let mut server = SocketServer::start(&config.bridge, Arc::clone(&bridge))
        .context("failed to start socket server")?;

    let mut tick: u64 = 0;
    let mut applied: u64 = 0;
    let mut deadline = Instant::now();

    while args.ticks.is_none_or(|limit| tick < limit) {
        // reward the agent for holding keys so the feedback loop is visible
        let reward = bridge.with_injector(|injector| injector.pressed_keys().len() as f64);
        bridge.publish_observation(reward, test_pattern(width, height, tick));
        if bridge.tick() {
            applied += 1;
        }
        tick += 1;

        if tick % STATUS_EVERY == 0 {
            tracing::info!(
                tick,
                applied,
                connected = bridge.is_client_connected(),
                "serving"
            );
        }

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            deadline = now;
        }
    }

    server.stop();
    tracing::info!(ticks = tick, applied, "serve finished");
    Ok(())
}

/// A moving RGB gradient, `width * height * 3` bytes
fn test_pattern(width: u32, height: u32, tick: u64) -> Vec<u8> {
    let (width, height) = (width as usize, height as usize);
    let shift = tick as usize;
    let mut frame = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            frame.push(((x + shift) * 255 / width.max(1)) as u8);
            frame.push((y * 255 / height.max(1)) as u8);
            frame.push((shift % 256) as u8);
        }
    }
    frame
}

/// Sink that logs every injected event
struct TracingSink {
    window_size: (u32, u32),
    sensitivity: f64,
    ui_focused: bool,
}

impl InputSink for TracingSink {
    fn key(&mut self, key: KeyCode, action: KeyAction, modifiers: Modifiers) {
        tracing::info!(key, %action, ?modifiers, "key");
    }

    fn mouse_button(&mut self, button: MouseButton, action: KeyAction, modifiers: Modifiers) {
        tracing::info!(?button, %action, ?modifiers, "mouse button");
    }

    fn turn(&mut self, yaw: f64, pitch: f64) {
        tracing::info!(yaw, pitch, "turn");
    }

    fn pointer_moved(&mut self, x: f64, y: f64) {
        tracing::info!(x, y, "pointer moved");
    }

    fn scroll(&mut self, delta: f64) {
        tracing::info!(delta, "scroll");
    }

    fn char_typed(&mut self, ch: char) {
        tracing::info!(%ch, "char");
    }

    fn set_system_pointer_enabled(&mut self, enabled: bool) {
        tracing::info!(enabled, "system pointer");
    }

    fn ui_focused(&self) -> bool {
        self.ui_focused
    }

    fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    fn mouse_sensitivity(&self) -> f64 {
        self.sensitivity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_is_rgb_sized() {
        assert_eq!(test_pattern(4, 3, 0).len(), 4 * 3 * 3);
        assert_eq!(test_pattern(1, 1, 7).len(), 3);
    }

    #[test]
    fn test_pattern_moves_with_tick() {
        assert_ne!(test_pattern(8, 2, 0), test_pattern(8, 2, 1));
    }
}
