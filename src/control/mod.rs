mod command;
mod controller;
mod log;
mod server;
pub mod shell;
mod socket;

pub use command::{Command, CommandBus, CommandReply, CommandSender, CommandSource};
pub use controller::{Controller, ControllerSnapshot};
pub use log::{Event, EventLog, LogEntry};
pub use server::{ControlServer, METHODS};
pub use socket::start_socket_server;
