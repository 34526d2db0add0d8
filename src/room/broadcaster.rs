//! Per-tick outbound write coalescing.
//!
//! Handlers never touch a transport. Every write lands in a scoped buffer
//! that is appended to the tick-level queue when the scope ends (on every
//! exit path, including early returns — the guard enqueues on `Drop`), and
//! the whole queue is flushed to the transport exactly once per scheduling
//! tick, in enqueue order.

use smallvec::SmallVec;

use super::collections::{ClientCollection, PlayerCollection};
use crate::player::Player;
use crate::protocol::{Cn, MasterEntry, Message, Pn};

/// Position updates travel unreliably on channel 0.
pub const CHAN_POS: u8 = 0;
/// Game messages travel reliably on channel 1.
pub const CHAN_MSG: u8 = 1;

/// Which connected clients a queued write goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientSet {
    All,
    AllExcept(SmallVec<[Cn; 4]>),
    Only(SmallVec<[Cn; 8]>),
}

impl RecipientSet {
    pub fn except(cn: Cn) -> Self {
        Self::AllExcept(SmallVec::from_slice(&[cn]))
    }

    pub fn one(cn: Cn) -> Self {
        Self::Only(SmallVec::from_slice(&[cn]))
    }

    /// Resolve against the connected-client registry at flush time.
    fn resolve(&self, clients: &ClientCollection) -> SmallVec<[Cn; 8]> {
        match self {
            Self::All => clients.cns().collect(),
            Self::AllExcept(excluded) => {
                clients.cns().filter(|cn| !excluded.contains(cn)).collect()
            }
            Self::Only(listed) => listed.iter().copied().filter(|cn| clients.contains(*cn)).collect(),
        }
    }
}

/// One resolved write handed to the transport: an ordered payload plus the
/// recipient list. The transport owns per-opcode encoding and socket sends.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub recipients: SmallVec<[Cn; 8]>,
    pub channel: u8,
    pub reliable: bool,
    pub messages: Vec<Message>,
}

/// Outbound boundary of the room engine.
pub trait Transport: Send {
    fn deliver(&mut self, delivery: Delivery);
}

#[derive(Debug)]
struct QueuedBroadcast {
    channel: u8,
    reliable: bool,
    recipients: RecipientSet,
    messages: Vec<Message>,
}

/// Accumulates scoped writes for the current tick.
#[derive(Debug, Default)]
pub struct Broadcaster {
    queue: Vec<QueuedBroadcast>,
}

/// An open scoped-write context. Dropping it enqueues whatever was written,
/// so flush eligibility survives early returns in handlers.
pub struct BroadcastScope<'a> {
    queue: &'a mut Vec<QueuedBroadcast>,
    entry: QueuedBroadcast,
}

impl BroadcastScope<'_> {
    pub fn write(&mut self, message: Message) {
        self.entry.messages.push(message);
    }
}

impl Drop for BroadcastScope<'_> {
    fn drop(&mut self) {
        if self.entry.messages.is_empty() {
            return;
        }
        self.queue.push(QueuedBroadcast {
            channel: self.entry.channel,
            reliable: self.entry.reliable,
            recipients: self.entry.recipients.clone(),
            messages: std::mem::take(&mut self.entry.messages),
        });
    }
}

impl Broadcaster {
    /// Open a scoped write for the given channel and recipient set.
    pub fn scope(&mut self, channel: u8, reliable: bool, recipients: RecipientSet) -> BroadcastScope<'_> {
        BroadcastScope {
            queue: &mut self.queue,
            entry: QueuedBroadcast {
                channel,
                reliable,
                recipients,
                messages: Vec::new(),
            },
        }
    }

    /// Reliable room-wide scope on the message channel; the common case.
    pub fn broadcast(&mut self) -> BroadcastScope<'_> {
        self.scope(CHAN_MSG, true, RecipientSet::All)
    }

    /// Reliable unicast scope to one client.
    pub fn unicast(&mut self, cn: Cn) -> BroadcastScope<'_> {
        self.scope(CHAN_MSG, true, RecipientSet::one(cn))
    }

    // Room lifecycle notifications, all through the same scoped primitive.

    pub fn pause(&mut self) {
        self.broadcast().write(Message::PauseGame { paused: true });
    }

    pub fn resume(&mut self) {
        self.broadcast().write(Message::PauseGame { paused: false });
    }

    pub fn time_left(&mut self, seconds: u32) {
        self.broadcast().write(Message::TimeUp { seconds });
    }

    pub fn intermission(&mut self) {
        self.broadcast().write(Message::TimeUp { seconds: 0 });
    }

    pub fn server_message(&mut self, text: String) {
        self.broadcast().write(Message::ServerText { text });
    }

    pub fn current_masters(&mut self, mastermode: i32, masters: Vec<MasterEntry>) {
        self.broadcast().write(Message::CurrentMaster { mastermode, masters });
    }

    /// Announce a newly connected player to everyone else.
    pub fn client_connected(&mut self, player: &Player, team_name: Option<String>) {
        self.scope(CHAN_MSG, true, RecipientSet::except(player.cn))
            .write(Message::InitClient(player.client_init(team_name)));
    }

    pub fn player_disconnected(&mut self, cn: Cn) {
        self.broadcast().write(Message::ClientDisconnected { cn });
    }

    pub fn player_died(&mut self, victim: Pn, actor: Pn, actor_frags: i32) {
        self.broadcast().write(Message::Died {
            victim,
            actor,
            frags: actor_frags,
        });
    }

    pub fn teleport(&mut self, pn: Pn, teleport: i32, teledest: i32) {
        self.scope(CHAN_POS, false, RecipientSet::All)
            .write(Message::Teleport { pn, teleport, teledest });
    }

    pub fn jumppad(&mut self, pn: Pn, jumppad: i32) {
        self.scope(CHAN_POS, false, RecipientSet::All)
            .write(Message::JumpPad { pn, jumppad });
    }

    /// Exclude a client from everything queued so far. Called at admission,
    /// so a newcomer only sees writes from their own handshake onward.
    pub fn exclude_from_pending(&mut self, cn: Cn) {
        for queued in &mut self.queue {
            match &mut queued.recipients {
                RecipientSet::All => queued.recipients = RecipientSet::except(cn),
                RecipientSet::AllExcept(excluded) => {
                    if !excluded.contains(&cn) {
                        excluded.push(cn);
                    }
                }
                RecipientSet::Only(listed) => listed.retain(|c| *c != cn),
            }
        }
    }

    /// Flush everything accumulated this tick: first the per-player coalesced
    /// state (positions, then buffered client data), then the scoped queue in
    /// enqueue order. Clears all buffers.
    pub fn flush(
        &mut self,
        clients: &ClientCollection,
        players: &mut PlayerCollection,
        transport: &mut dyn Transport,
    ) {
        let mut positions: Vec<Message> = Vec::new();
        let mut client_data: Vec<Message> = Vec::new();
        for player in players.iter_mut() {
            if let Some(position) = player.state.position.take() {
                positions.push(Message::Pos {
                    pn: player.pn,
                    position,
                });
            }
            if !player.state.messages.is_empty() {
                client_data.push(Message::ClientData {
                    cn: player.cn,
                    messages: std::mem::take(&mut player.state.messages),
                });
            }
        }

        let everyone: SmallVec<[Cn; 8]> = clients.cns().collect();
        if !positions.is_empty() && !everyone.is_empty() {
            transport.deliver(Delivery {
                recipients: everyone.clone(),
                channel: CHAN_POS,
                reliable: false,
                messages: positions,
            });
        }
        if !client_data.is_empty() && !everyone.is_empty() {
            transport.deliver(Delivery {
                recipients: everyone,
                channel: CHAN_MSG,
                reliable: true,
                messages: client_data,
            });
        }

        for queued in self.queue.drain(..) {
            let recipients = queued.recipients.resolve(clients);
            if recipients.is_empty() {
                continue;
            }
            transport.deliver(Delivery {
                recipients,
                channel: queued.channel,
                reliable: queued.reliable,
                messages: queued.messages,
            });
        }
    }

    #[cfg(test)]
    fn queued_len(&self) -> usize {
        self.queue.len()
    }
}

/// Transport that records deliveries instead of sending them. Shared by unit
/// and integration tests.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub deliveries: Vec<Delivery>,
}

impl RecordingTransport {
    /// All messages delivered to the given client, in delivery order, with
    /// coalesced `ClientData` batches unwrapped.
    pub fn messages_to(&self, cn: Cn) -> Vec<Message> {
        let mut out = Vec::new();
        for delivery in &self.deliveries {
            if !delivery.recipients.contains(&cn) {
                continue;
            }
            for message in &delivery.messages {
                match message {
                    Message::ClientData { messages, .. } => out.extend(messages.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
        }
        out
    }

    pub fn kinds_to(&self, cn: Cn) -> Vec<&'static str> {
        self.messages_to(cn).iter().map(Message::kind).collect()
    }

    pub fn clear(&mut self) {
        self.deliveries.clear();
    }
}

impl Transport for RecordingTransport {
    fn deliver(&mut self, delivery: Delivery) {
        self.deliveries.push(delivery);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Client;
    use crate::protocol::Privilege;

    fn registry(cns: &[Cn]) -> ClientCollection {
        let mut clients = ClientCollection::default();
        for &cn in cns {
            clients.add(Client::new(cn, Privilege::None));
        }
        clients
    }

    #[test]
    fn scope_enqueues_on_drop_in_write_order() {
        let mut broadcaster = Broadcaster::default();
        {
            let mut scope = broadcaster.broadcast();
            scope.write(Message::Welcome);
            scope.write(Message::Taunt);
        }
        {
            let mut scope = broadcaster.unicast(2);
            scope.write(Message::ServerText { text: "hi".into() });
        }
        assert_eq!(broadcaster.queued_len(), 2);

        let clients = registry(&[1, 2]);
        let mut players = PlayerCollection::default();
        let mut transport = RecordingTransport::default();
        broadcaster.flush(&clients, &mut players, &mut transport);

        assert_eq!(transport.deliveries.len(), 2);
        assert_eq!(
            transport.deliveries[0].messages,
            vec![Message::Welcome, Message::Taunt]
        );
        assert_eq!(transport.deliveries[1].recipients.as_slice(), &[2]);
    }

    #[test]
    fn scope_enqueues_on_early_return() {
        fn handler(broadcaster: &mut Broadcaster, fail: bool) -> Result<(), ()> {
            let mut scope = broadcaster.broadcast();
            scope.write(Message::Taunt);
            if fail {
                return Err(());
            }
            scope.write(Message::Welcome);
            Ok(())
        }

        let mut broadcaster = Broadcaster::default();
        assert!(handler(&mut broadcaster, true).is_err());
        assert_eq!(broadcaster.queued_len(), 1);
    }

    #[test]
    fn empty_scope_enqueues_nothing() {
        let mut broadcaster = Broadcaster::default();
        drop(broadcaster.broadcast());
        assert_eq!(broadcaster.queued_len(), 0);
    }

    #[test]
    fn flush_clears_queue() {
        let mut broadcaster = Broadcaster::default();
        broadcaster.server_message("once".into());

        let clients = registry(&[1]);
        let mut players = PlayerCollection::default();
        let mut transport = RecordingTransport::default();
        broadcaster.flush(&clients, &mut players, &mut transport);
        broadcaster.flush(&clients, &mut players, &mut transport);

        assert_eq!(transport.deliveries.len(), 1);
    }

    #[test]
    fn all_except_excludes_only_listed() {
        let mut broadcaster = Broadcaster::default();
        broadcaster
            .scope(CHAN_MSG, true, RecipientSet::except(2))
            .write(Message::Taunt);

        let clients = registry(&[1, 2, 3]);
        let mut players = PlayerCollection::default();
        let mut transport = RecordingTransport::default();
        broadcaster.flush(&clients, &mut players, &mut transport);

        assert_eq!(transport.deliveries[0].recipients.as_slice(), &[1, 3]);
    }

    #[test]
    fn admission_exclusion_hides_pending_broadcasts() {
        let mut broadcaster = Broadcaster::default();
        broadcaster.server_message("pre-admission".into());
        broadcaster.exclude_from_pending(2);
        broadcaster.unicast(2).write(Message::Welcome);

        let clients = registry(&[1, 2]);
        let mut players = PlayerCollection::default();
        let mut transport = RecordingTransport::default();
        broadcaster.flush(&clients, &mut players, &mut transport);

        assert_eq!(transport.deliveries[0].recipients.as_slice(), &[1]);
        assert_eq!(transport.kinds_to(2), vec!["welcome"]);
    }

    #[test]
    fn unicast_to_departed_client_is_dropped() {
        let mut broadcaster = Broadcaster::default();
        broadcaster.unicast(9).write(Message::Welcome);

        let clients = registry(&[1]);
        let mut players = PlayerCollection::default();
        let mut transport = RecordingTransport::default();
        broadcaster.flush(&clients, &mut players, &mut transport);

        assert!(transport.deliveries.is_empty());
    }

    #[test]
    fn player_buffers_coalesce_into_one_client_data_delivery() {
        let mut broadcaster = Broadcaster::default();
        let clients = registry(&[0, 1]);
        let mut players = PlayerCollection::default();
        let mut p0 = crate::player::Player::new(0, 0, "a".into(), 0);
        p0.state.queue(Message::Taunt);
        p0.state.queue(Message::GunSelect { gun: 4 });
        let mut p1 = crate::player::Player::new(1, 1, "b".into(), 0);
        p1.state.queue(Message::Sound { sound: 2 });
        players.add(p0);
        players.add(p1);

        let mut transport = RecordingTransport::default();
        broadcaster.flush(&clients, &mut players, &mut transport);

        assert_eq!(transport.deliveries.len(), 1);
        assert_eq!(transport.deliveries[0].messages.len(), 2);
        assert!(players.iter().all(|p| p.state.messages.is_empty()));
    }
}
