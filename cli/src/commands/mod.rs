pub mod send;
pub mod serve;
pub mod watch;
