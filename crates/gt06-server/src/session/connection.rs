//! Connection task: read loop, acknowledgements and command dispatch

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use fleet_core::{ControlCommand, DeviceState, DeviceStatusEvent};
use gt06_codec::{ack_frame, CommandReply, FrameDecoder, LoginInfo, PacketBody, TelemetryPacket};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{SessionManager, SessionState};
use crate::error::{SessionError, SessionResult};
use crate::registry::{DeviceHandle, OutboundCommand};

/// Size of a single socket read
pub const READ_BUFFER_SIZE: usize = 1024;

const OUTBOX_CAPACITY: usize = 16;

/// Server flags remembered per connection for late-reply detection
const ISSUED_FLAG_HISTORY: usize = 64;

struct PendingCommand {
    command: ControlCommand,
    server_flag: u32,
    reply: oneshot::Sender<CommandReply>,
}

/// State owned by one connection task
struct DeviceSession {
    id: Uuid,
    peer: String,
    imei: Option<String>,
    state: SessionState,
    decoder: FrameDecoder,
    started: Instant,
    last_activity: Instant,
    pending: VecDeque<PendingCommand>,
    issued: VecDeque<u32>,
}

impl DeviceSession {
    fn new(peer: String) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            peer,
            imei: None,
            state: SessionState::Connected,
            decoder: FrameDecoder::new(),
            started: now,
            last_activity: now,
            pending: VecDeque::new(),
            issued: VecDeque::new(),
        }
    }

    fn is_authenticated(&self) -> bool {
        self.imei.is_some()
    }

    /// When the session times out, if it can
    fn deadline(&self, login_timeout: u64, idle_timeout: u64) -> Option<Instant> {
        if !self.is_authenticated() {
            Some(self.started + Duration::from_secs(login_timeout))
        } else if idle_timeout > 0 {
            Some(self.last_activity + Duration::from_secs(idle_timeout))
        } else {
            None
        }
    }

    fn record_issued(&mut self, server_flag: u32) {
        if self.issued.len() == ISSUED_FLAG_HISTORY {
            self.issued.pop_front();
        }
        self.issued.push_back(server_flag);
    }

    /// Resolve the waiter for `reply`.
    ///
    /// A reply carrying a flag this connection issued only ever completes
    /// that command; once its caller has given up, the reply is dropped.
    /// Replies with a flag the connection never issued go to the oldest
    /// waiter whose command the text answers.
    fn resolve_reply(&mut self, reply: CommandReply) {
        self.pending.retain(|p| !p.reply.is_closed());

        let index = if self.issued.contains(&reply.server_flag) {
            let index = self.pending.iter().position(|p| p.server_flag == reply.server_flag);
            if index.is_none() {
                info!(
                    connection_id = %self.id,
                    server_flag = reply.server_flag,
                    text = %reply.text,
                    "Dropping late command reply"
                );
                return;
            }
            index
        } else {
            self.pending.iter().position(|p| p.command.accepts_reply(&reply.text))
        };

        match index.and_then(|i| self.pending.remove(i)) {
            Some(waiter) => {
                debug!(
                    connection_id = %self.id,
                    server_flag = reply.server_flag,
                    expected = waiter.server_flag,
                    command = %waiter.command,
                    "Command reply received"
                );
                // Receiver may have timed out in the meantime
                let _ = waiter.reply.send(reply);
            }
            None => {
                info!(connection_id = %self.id, text = %reply.text, "Unsolicited command reply");
            }
        }
    }
}

impl SessionManager {
    /// Serve one device connection until it closes or times out
    pub async fn handle_connection<S>(self: Arc<Self>, stream: S, peer: String)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut session = DeviceSession::new(peer);
        info!(connection_id = %session.id, peer = %session.peer, "Device connected");

        match self.run_session(&mut session, stream).await {
            Ok(()) => info!(connection_id = %session.id, imei = ?session.imei, "Device disconnected"),
            Err(SessionError::Unauthorized(imei)) => {
                warn!(connection_id = %session.id, peer = %session.peer, %imei, "Rejected unknown device")
            }
            Err(e) => warn!(connection_id = %session.id, imei = ?session.imei, error = %e, "Session ended"),
        }

        self.teardown(&mut session);
    }

    async fn run_session<S>(&self, session: &mut DeviceSession, stream: S) -> SessionResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let (outbox_tx, mut outbox_rx) = mpsc::channel::<OutboundCommand>(OUTBOX_CAPACITY);
        let mut buf = [0u8; READ_BUFFER_SIZE];
        let login_timeout = self.config.login_timeout_secs;
        let idle_timeout = self.config.idle_timeout_secs;

        session.state = SessionState::AwaitingLogin;

        loop {
            let deadline = session.deadline(login_timeout, idle_timeout);
            let expiry = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                read = reader.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        return Ok(());
                    }
                    session.last_activity = Instant::now();
                    for packet in session.decoder.decode(&buf[..n]) {
                        self.handle_packet(session, &mut writer, &outbox_tx, packet).await?;
                    }
                }
                Some(command) = outbox_rx.recv() => {
                    write_command(session, &mut writer, command).await?;
                }
                _ = expiry => {
                    return Err(if session.is_authenticated() {
                        SessionError::IdleTimeout(idle_timeout)
                    } else {
                        SessionError::LoginTimeout(login_timeout)
                    });
                }
            }
        }
    }

    async fn handle_packet<W>(
        &self,
        session: &mut DeviceSession,
        writer: &mut W,
        outbox: &mpsc::Sender<OutboundCommand>,
        packet: TelemetryPacket,
    ) -> SessionResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        debug!(
            connection_id = %session.id,
            protocol = %packet.protocol,
            serial = packet.serial,
            raw = %packet.raw,
            "Packet received"
        );

        if let PacketBody::Login(login) = &packet.body {
            return self.handle_login(session, writer, outbox, &packet, login).await;
        }

        let Some(imei) = session.imei.clone() else {
            warn!(
                connection_id = %session.id,
                peer = %session.peer,
                protocol = %packet.protocol,
                "Dropping packet before login"
            );
            return Ok(());
        };

        if packet.needs_ack {
            writer.write_all(&ack_frame(packet.protocol.number(), packet.serial)).await?;
        }
        session.state = SessionState::Streaming;

        match &packet.body {
            PacketBody::Location(fix) => self.process_location(&imei, &packet, fix).await,
            PacketBody::Status(status) => self.process_status(&imei, &packet, status).await,
            PacketBody::Alarm { flags, fix } => {
                warn!(
                    imei = %imei,
                    alarms = ?flags.active(),
                    position = ?fix.as_ref().and_then(|f| f.position()),
                    "Device alarm"
                );
            }
            PacketBody::CommandReply(reply) => session.resolve_reply(reply.clone()),
            PacketBody::Unknown { payload } => {
                debug!(imei = %imei, protocol = %packet.protocol, %payload, "Ignoring unsupported protocol");
            }
            PacketBody::Login(_) => {}
        }
        Ok(())
    }

    async fn handle_login<W>(
        &self,
        session: &mut DeviceSession,
        writer: &mut W,
        outbox: &mpsc::Sender<OutboundCommand>,
        packet: &TelemetryPacket,
        login: &LoginInfo,
    ) -> SessionResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let imei = login.imei().to_string();

        match self.collaborators.devices.is_registered(&imei).await {
            Ok(true) => {}
            Ok(false) => return Err(SessionError::Unauthorized(imei)),
            Err(e) => {
                error!(imei = %imei, error = %e, "Device registry lookup failed");
                return Err(e.into());
            }
        }

        if let Some(previous) = session.imei.as_deref().filter(|p| *p != imei) {
            self.registry.remove_if(previous, session.id);
        }
        let handle = DeviceHandle::new(session.id, imei.clone(), outbox.clone());
        if let Some(replaced) = self.registry.insert(handle) {
            if replaced.connection_id != session.id {
                info!(imei = %imei, replaced = %replaced.connection_id, "Device reconnected, replacing old connection");
            }
        }

        session.imei = Some(imei.clone());
        session.state = SessionState::Authenticated;
        session.last_activity = Instant::now();

        info!(
            connection_id = %session.id,
            imei = %imei,
            device_type = ?login.device_type,
            timezone_minutes = ?login.timezone_offset_minutes,
            "Device logged in"
        );
        self.collaborators
            .publisher
            .publish_device_status(&imei, DeviceStatusEvent::new(&imei, DeviceState::Connected));

        writer.write_all(&ack_frame(packet.protocol.number(), packet.serial)).await?;
        Ok(())
    }

    fn teardown(&self, session: &mut DeviceSession) {
        session.state = SessionState::Closed;
        // Dropping the senders fails any caller still waiting for a reply
        session.pending.clear();

        let Some(imei) = session.imei.as_deref() else {
            return;
        };
        if self.registry.remove_if(imei, session.id) {
            self.collaborators
                .publisher
                .publish_device_status(imei, DeviceStatusEvent::new(imei, DeviceState::Disconnected));
        } else {
            debug!(imei = %imei, connection_id = %session.id, "Registry entry already replaced");
        }
    }
}

async fn write_command<W>(session: &mut DeviceSession, writer: &mut W, command: OutboundCommand) -> SessionResult<()>
where
    W: AsyncWrite + Unpin,
{
    session.pending.retain(|p| !p.reply.is_closed());

    let OutboundCommand {
        command,
        frame,
        server_flag,
        reply,
    } = command;
    writer.write_all(&frame).await?;
    debug!(connection_id = %session.id, server_flag, %command, "Command written");

    session.record_issued(server_flag);
    session.pending.push_back(PendingCommand {
        command,
        server_flag,
        reply,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn waiter(
        session: &mut DeviceSession,
        command: ControlCommand,
        server_flag: u32,
    ) -> oneshot::Receiver<CommandReply> {
        let (reply, rx) = oneshot::channel();
        session.record_issued(server_flag);
        session.pending.push_back(PendingCommand {
            command,
            server_flag,
            reply,
        });
        rx
    }

    fn reply(server_flag: u32, text: &str) -> CommandReply {
        CommandReply {
            server_flag,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn reply_matches_server_flag() {
        let mut session = DeviceSession::new("test".into());
        let mut first = waiter(&mut session, ControlCommand::CutOil, 1);
        let second = waiter(&mut session, ControlCommand::ConnectOil, 2);

        session.resolve_reply(reply(2, "HFYD=Success!"));
        assert_eq!(second.await.unwrap().text, "HFYD=Success!");
        assert!(first.try_recv().is_err());
        assert_eq!(session.pending.len(), 1);
    }

    #[tokio::test]
    async fn unissued_flag_goes_to_oldest_matching_command() {
        let mut session = DeviceSession::new("test".into());
        let mut locate = waiter(&mut session, ControlCommand::GetLocation, 1);
        let cut = waiter(&mut session, ControlCommand::CutOil, 2);

        session.resolve_reply(reply(0, "DYD=Success!"));
        assert_eq!(cut.await.unwrap().text, "DYD=Success!");
        assert!(locate.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_reply_is_dropped() {
        let mut session = DeviceSession::new("test".into());
        drop(waiter(&mut session, ControlCommand::CutOil, 1));
        let mut connect = waiter(&mut session, ControlCommand::ConnectOil, 2);

        session.resolve_reply(reply(1, "DYD=Success!"));
        assert!(connect.try_recv().is_err());
        assert_eq!(session.pending.len(), 1);
        assert_eq!(session.pending[0].server_flag, 2);
    }

    #[tokio::test]
    async fn abandoned_waiters_are_pruned() {
        let mut session = DeviceSession::new("test".into());
        drop(waiter(&mut session, ControlCommand::GetLocation, 1));
        let live = waiter(&mut session, ControlCommand::GetLocation, 2);

        session.resolve_reply(reply(9, "DWXX=Lat:N27.7"));
        assert_eq!(live.await.unwrap().server_flag, 9);
        assert!(session.pending.is_empty());
    }

    #[test]
    fn issued_flags_are_bounded() {
        let mut session = DeviceSession::new("test".into());
        for flag in 0..(ISSUED_FLAG_HISTORY as u32 + 10) {
            session.record_issued(flag);
        }
        assert_eq!(session.issued.len(), ISSUED_FLAG_HISTORY);
        assert!(!session.issued.contains(&0));
    }

    #[test]
    fn deadline_follows_login_state() {
        let mut session = DeviceSession::new("test".into());
        assert_eq!(session.deadline(60, 900), Some(session.started + Duration::from_secs(60)));

        session.imei = Some("111".into());
        assert_eq!(session.deadline(60, 900), Some(session.last_activity + Duration::from_secs(900)));
        assert_eq!(session.deadline(60, 0), None);
    }
}
