//! Console adapter trait and event sink.
//!
//! The agent supplies one sink the adapter invokes from its receive
//! thread; the adapter never exposes mutable callback slots.

use std::sync::Arc;

use mix_core::{BusParam, ChannelParam, ConsoleCapabilities, ParamValue, ParameterUpdate};

/// Errors surfaced by adapters. Transient network errors stay internal
/// (the receive loop handles them); these are for the connect path.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("not connected")]
    NotConnected,

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Sink for events decoded by the adapter's receive thread.
pub trait ConsoleEvents: Send + Sync {
    fn on_parameter_update(&self, update: &ParameterUpdate);
    fn on_meter_update(&self, channel: u16, rms_db: f32, peak_db: f32);
    fn on_connection_change(&self, connected: bool);
}

/// Open a connected UDP socket pair (send + cloned receive handle).
pub(crate) fn open_udp(
    ip: &str,
    port: u16,
    recv_timeout: std::time::Duration,
) -> Result<(std::net::UdpSocket, std::net::UdpSocket), ConsoleError> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0")?;
    socket.set_read_timeout(Some(recv_timeout))?;
    socket.connect((ip, port))?;
    let recv = socket.try_clone()?;
    Ok((socket, recv))
}

/// Open a TCP stream pair (send + cloned receive handle).
pub(crate) fn open_tcp(
    ip: &str,
    port: u16,
    recv_timeout: std::time::Duration,
) -> Result<(std::net::TcpStream, std::net::TcpStream), ConsoleError> {
    let stream = std::net::TcpStream::connect((ip, port))?;
    stream.set_read_timeout(Some(recv_timeout))?;
    stream.set_nodelay(true)?;
    let recv = stream.try_clone()?;
    Ok((stream, recv))
}

/// Abstract interface implemented per console.
pub trait ConsoleAdapter: Send + Sync {
    /// Connect to the console. `port` 0 selects the protocol default.
    fn connect(&self, ip: &str, port: u16) -> bool;
    fn disconnect(&self);
    fn is_connected(&self) -> bool;

    fn capabilities(&self) -> ConsoleCapabilities;

    /// Request a dump of all channel/bus parameters.
    fn request_full_sync(&self);

    fn set_channel_param(&self, ch: u16, param: ChannelParam, value: ParamValue);
    fn set_send_level(&self, ch: u16, bus: u16, level: f32);
    fn set_bus_param(&self, bus: u16, param: BusParam, value: f32);

    fn subscribe_meter(&self, refresh_ms: u32);
    fn unsubscribe_meter(&self);

    /// Periodic keepalive driver; call from the DSP loop.
    fn tick(&self);

    /// Install the event sink. Must be called before `connect`.
    fn set_event_sink(&self, sink: Arc<dyn ConsoleEvents>);
}
