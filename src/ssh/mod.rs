//! SSH transport: russh sessions behind small traits, plus the line reader
//! used for every remote command

mod client;
mod lines;
mod session;

pub use client::{ExecChannel, SshClient, SshConnector, SshSession};
pub use lines::{read_lines, ChannelEvent, ChannelSource, Completion, LineReader, ReadLimits};
pub use session::{run_command, Auth, CommandOutput, Connector, RemoteSession};
