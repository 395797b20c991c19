//! Agent-side clients for the two bridge sockets
//!
//! These are plain blocking clients. An agent usually reads observations on a
//! dedicated thread and sends commands from its control loop.

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::ipc::protocol::{
    Command, OBSERVATION_HEADER_LEN, Observation, ProtocolLimits, decode_observation_header,
    encode_command,
};

/// Connect to a bridge socket, retrying while the game is still starting up
pub fn connect_with_retry(
    path: impl AsRef<Path>,
    attempts: u32,
    delay: Duration,
) -> io::Result<UnixStream> {
    let path = path.as_ref();
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match UnixStream::connect(path) {
            Ok(stream) => {
                tracing::debug!(path = %path.display(), attempt, "connected");
                return Ok(stream);
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    path = %path.display(),
                    attempt,
                    error = %e,
                    "connection attempt failed, retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sends commands to the game
pub struct CommandClient {
    stream: UnixStream,
}

impl CommandClient {
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_stream(UnixStream::connect(path)?))
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        Self { stream }
    }

    /// Send one tick's worth of input
    pub fn send(&mut self, command: &Command) -> Result<()> {
        let message = encode_command(command)?;
        self.stream.write_all(&message)?;
        Ok(())
    }
}

/// Receives observations from the game
pub struct ObservationClient {
    stream: UnixStream,
    limits: ProtocolLimits,
}

impl ObservationClient {
    pub fn connect(path: impl AsRef<Path>, limits: ProtocolLimits) -> Result<Self> {
        Ok(Self::from_stream(UnixStream::connect(path)?, limits))
    }

    pub fn from_stream(stream: UnixStream, limits: ProtocolLimits) -> Self {
        Self { stream, limits }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Block until the next observation arrives
    ///
    /// Returns `None` once the game closes the connection.
    pub fn recv(&mut self) -> Result<Option<Observation>> {
        let mut header = [0u8; OBSERVATION_HEADER_LEN];
        if !read_exact_or_eof(&mut self.stream, &mut header)? {
            return Ok(None);
        }

        let (reward, frame_len) = decode_observation_header(&header, &self.limits)?;

        let mut frame = vec![0u8; frame_len];
        if !read_exact_or_eof(&mut self.stream, &mut frame)? {
            tracing::debug!(frame_len, "connection closed mid-frame");
            return Ok(None);
        }

        Ok(Some(Observation { reward, frame }))
    }
}

/// Fill `buf` completely, returning `false` on end of stream
fn read_exact_or_eof(stream: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match stream.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::protocol::{ProtocolError, decode_command, encode_observation};
    use crate::error::Error;

    #[test]
    fn test_command_client_writes_wire_format() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        let mut client = CommandClient::from_stream(local);
        let command = Command {
            keys: vec![87, 32],
            mouse_dx: 1.5,
            text: "go".to_string(),
            ..Default::default()
        };

        client.send(&command).unwrap();
        drop(client);

        let mut received = Vec::new();
        remote.read_to_end(&mut received).unwrap();
        assert_eq!(
            decode_command(&received, &ProtocolLimits::default()).unwrap(),
            command
        );
    }

    #[test]
    fn test_observation_client_reads_until_eof() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        let mut client = ObservationClient::from_stream(local, ProtocolLimits::default());

        let first = Observation::new(0.5, vec![7; 30]);
        let second = Observation::new(-1.0, Vec::new());
        remote
            .write_all(&encode_observation(&first).unwrap())
            .unwrap();
        remote
            .write_all(&encode_observation(&second).unwrap())
            .unwrap();
        drop(remote);

        assert_eq!(client.recv().unwrap(), Some(first));
        assert_eq!(client.recv().unwrap(), Some(second));
        assert_eq!(client.recv().unwrap(), None);
    }

    #[test]
    fn test_observation_client_enforces_frame_limit() {
        let (local, mut remote) = UnixStream::pair().unwrap();
        let limits = ProtocolLimits {
            max_frame_bytes: 4,
            ..Default::default()
        };
        let mut client = ObservationClient::from_stream(local, limits);

        let observation = Observation::new(1.0, vec![0; 5]);
        remote
            .write_all(&encode_observation(&observation).unwrap())
            .unwrap();

        assert!(matches!(
            client.recv(),
            Err(Error::ProtocolViolation(ProtocolError::FrameTooLarge { len: 5, max: 4 }))
        ));
    }

    #[test]
    fn test_connect_with_retry_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.sock");
        let result = connect_with_retry(&missing, 2, Duration::from_millis(1));
        assert!(result.is_err());
    }
}
