use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use tickbridge::{KeyCode, MouseButtons};

#[derive(Parser)]
#[command(name = "tickbridge")]
#[command(version)]
#[command(about = "Tick-synchronous bridge between a game and an external agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve both sockets from a synthetic game loop
    Serve(ServeArgs),

    /// Send commands to a running game
    Send(SendArgs),

    /// Print observations from a running game as JSON lines
    Watch(WatchArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Simulation ticks per second
    #[arg(long, default_value_t = 20.0)]
    pub tick_rate: f64,

    /// Stop after this many ticks (runs until killed if omitted)
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Report a UI surface as focused, routing mouse motion to the pointer
    #[arg(long)]
    pub ui_focused: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args)]
pub struct SendArgs {
    /// Key to hold, as an engine key code (can be repeated)
    #[arg(long = "key", short = 'k', allow_hyphen_values = true)]
    pub keys: Vec<KeyCode>,

    /// Horizontal mouse motion
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub dx: f32,

    /// Vertical mouse motion
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub dy: f32,

    /// Mouse button to hold (can be repeated)
    #[arg(long = "button", short = 'b', value_enum)]
    pub buttons: Vec<ButtonArg>,

    /// Scroll wheel delta
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pub scroll: f32,

    /// Text to type while a UI surface is focused
    #[arg(long, default_value = "")]
    pub text: String,

    /// Number of times to send the command
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Delay between repeated sends in milliseconds
    #[arg(long, default_value_t = 50)]
    pub interval_ms: u64,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Stop after this many observations
    #[arg(long)]
    pub count: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Common arguments shared across subcommands
#[derive(Args, Default)]
pub struct CommonArgs {
    // === Sockets ===
    /// Path of the observation socket
    #[arg(long, env = "TICKBRIDGE_OBSERVATION_SOCKET")]
    pub observation_socket: Option<PathBuf>,

    /// Path of the command socket
    #[arg(long, env = "TICKBRIDGE_COMMAND_SOCKET")]
    pub command_socket: Option<PathBuf>,

    // === Limits ===
    /// Maximum keys accepted in one command
    #[arg(long)]
    pub max_keys: Option<usize>,

    /// Maximum text bytes accepted in one command
    #[arg(long)]
    pub max_text_bytes: Option<usize>,

    /// Maximum frame bytes accepted in one observation
    #[arg(long)]
    pub max_frame_bytes: Option<usize>,

    // === Window ===
    /// Window width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Window height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Mouse sensitivity in [0, 1]
    #[arg(long)]
    pub sensitivity: Option<f64>,

    // === Connection ===
    /// Connection attempts before giving up
    #[arg(long)]
    pub connect_attempts: Option<u32>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonArg {
    Left,
    Right,
    Middle,
}

impl ButtonArg {
    pub fn flag(self) -> MouseButtons {
        match self {
            ButtonArg::Left => MouseButtons::LEFT,
            ButtonArg::Right => MouseButtons::RIGHT,
            ButtonArg::Middle => MouseButtons::MIDDLE,
        }
    }
}
