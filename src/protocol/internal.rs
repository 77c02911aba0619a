//! Internal utilities used to construct protocol parties.
//!
//! The [`Protocol`](super::Protocol) interface is designed to be easy for
//! outside consumers to drive. Internally, a party is a state machine that
//! buffers messages for different points in the protocol and suspends until
//! the message it needs has arrived. Writing such a state machine by hand is
//! tedious and error prone; Rust already has a great tool for writing state
//! machines: **async**.
//!
//! A party is written as an async function, with async functions for sending
//! and receiving messages, and this module converts the resulting future
//! into an instance of the protocol interface.
//!
//! The coordination problem is deciding which message belongs to which
//! retrieval. Parties address messages by *label*: the id of the secret
//! whose share is being delivered, the multiplication operator whose masked
//! opening is being broadcast, or the final output. Labels, together with
//! the run nonce and (for broadcasts) the publishing party, are hashed into
//! fixed-size tags that prefix every message on the wire. Both sides derive
//! the same tag independently, so no extra negotiation is needed, and two
//! concurrent runs can never confuse each other's messages.
use ck_meow::Meow;
use event_listener::Event;
use serde::{de::DeserializeOwned, Serialize};
use smol::{
    block_on,
    channel::{self, Receiver, Sender},
    future,
    lock::Mutex,
    Executor,
};
use std::{collections::HashMap, error, future::Future, sync::Arc};

use crate::expr::{OpId, RunId, SecretId};
use crate::serde::{decode, encode_with_tag};

use super::{Action, MessageData, Participant, Protocol, ProtocolError};

/// The domain for our use of meow here.
const MEOW_DOMAIN: &[u8] = b"saunter message tags";

/// Addresses a message within one evaluation run.
///
/// Broadcast labels are further qualified by the publishing party, so each
/// party's opening of the same multiplication gets its own tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    /// A share of the secret with this id, sent privately to its holder.
    Share(SecretId),
    /// The masked `x - a` opening for a multiplication node.
    BeaverD(OpId),
    /// The masked `y - b` opening for a multiplication node.
    BeaverE(OpId),
    /// A party's share of the final result.
    Output,
}

impl Label {
    fn feed(&self, meow: &mut Meow) {
        match self {
            Label::Share(id) => {
                meow.meta_ad(b"share", false);
                meow.ad(&id.bytes(), false);
            }
            Label::BeaverD(op) => {
                meow.meta_ad(b"beaver d", false);
                meow.ad(&op.bytes(), false);
            }
            Label::BeaverE(op) => {
                meow.meta_ad(b"beaver e", false);
                meow.ad(&op.bytes(), false);
            }
            Label::Output => {
                meow.meta_ad(b"output", false);
            }
        }
    }
}

/// A fixed-size tag identifying where in the protocol a message is needed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct MessageTag([u8; Self::SIZE]);

impl MessageTag {
    /// 160 bit tags, enough for 80 bits of collision security, which should
    /// be ample.
    const SIZE: usize = 20;

    /// The tag for a private message addressed by label.
    ///
    /// Private messages are only ever delivered to their recipient, so the
    /// sender does not participate in the tag.
    fn private(run: RunId, label: Label) -> Self {
        let mut meow = Meow::new(MEOW_DOMAIN);
        meow.meta_ad(b"private", false);
        meow.meta_ad(b"run", false);
        meow.ad(&run.bytes(), false);
        label.feed(&mut meow);
        let mut out = [0u8; Self::SIZE];
        meow.prf(&mut out, false);
        Self(out)
    }

    /// The tag for a broadcast from a given party, addressed by label.
    fn public(run: RunId, publisher: Participant, label: Label) -> Self {
        let mut meow = Meow::new(MEOW_DOMAIN);
        meow.meta_ad(b"public", false);
        meow.meta_ad(b"run", false);
        meow.ad(&run.bytes(), false);
        meow.meta_ad(b"publisher", false);
        meow.ad(&publisher.bytes(), false);
        label.feed(&mut meow);
        let mut out = [0u8; Self::SIZE];
        meow.prf(&mut out, false);
        Self(out)
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE {
            return None;
        }
        // Unwrapping is fine because we checked the length already.
        Some(Self(bytes[..Self::SIZE].try_into().unwrap()))
    }
}

type SubMessageQueue = Vec<(Participant, MessageData)>;

/// A message buffer is a concurrent data structure to buffer messages.
///
/// The idea is that we can put messages, and have them organized according
/// to the tag that identifies where in the protocol those messages will be
/// needed. This data structure also provides async functions which allow
/// efficiently waiting until a particular message is available, by using
/// events to sleep tasks until a message for that slot has arrived.
#[derive(Clone)]
struct MessageBuffer {
    messages: Arc<Mutex<HashMap<MessageTag, SubMessageQueue>>>,
    events: Arc<Mutex<HashMap<MessageTag, Event>>>,
}

impl MessageBuffer {
    fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(HashMap::new())),
            events: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Push a message into this buffer.
    ///
    /// We also need the tag for the message, and the participant who sent it.
    async fn push(&self, tag: MessageTag, from: Participant, message: MessageData) {
        let mut messages_lock = self.messages.as_ref().lock().await;
        messages_lock.entry(tag).or_default().push((from, message));
        let mut events_lock = self.events.as_ref().lock().await;
        events_lock.entry(tag).or_default().notify(1);
    }

    /// Pop a message for a particular tag.
    ///
    /// This will block until a message for that tag is available. This will
    /// also correctly wake the underlying task when such a message arrives.
    async fn pop(&self, tag: MessageTag) -> (Participant, MessageData) {
        loop {
            let listener = {
                let mut messages_lock = self.messages.as_ref().lock().await;
                let messages = messages_lock.entry(tag).or_default();
                if let Some(out) = messages.pop() {
                    return out;
                }
                let mut events_lock = self.events.as_ref().lock().await;
                events_lock.entry(tag).or_default().listen()
            };
            listener.await;
        }
    }
}

/// Used to represent the different kinds of messages a participant can send.
///
/// This is basically used to communicate between the future and the executor.
#[derive(Debug, Clone)]
enum Message {
    Many(MessageData),
    Private(Participant, MessageData),
}

#[derive(Clone)]
struct Comms {
    buffer: MessageBuffer,
    message_s: Sender<Message>,
    message_r: Receiver<Message>,
}

impl Comms {
    fn new() -> Self {
        let (message_s, message_r) = channel::bounded(1);

        Self {
            buffer: MessageBuffer::new(),
            message_s,
            message_r,
        }
    }

    async fn outgoing(&self) -> Message {
        self.message_r
            .recv()
            .await
            .expect("failed to check outgoing messages")
    }

    async fn push_message(&self, from: Participant, message: MessageData) {
        let tag = match MessageTag::from_bytes(&message) {
            Some(t) => t,
            _ => return,
        };

        self.buffer.push(tag, from, message).await
    }

    async fn send_raw(&self, data: Message) {
        self.message_s
            .send(data)
            .await
            .expect("failed to send message");
    }
}

/// The messaging interface a party evaluates over.
///
/// All four operations address messages by [`Label`]; the retrievals block
/// until the matching message has been delivered.
#[derive(Clone)]
pub struct Communicator {
    run: RunId,
    me: Participant,
    comms: Comms,
}

impl Communicator {
    /// Broadcast a message to every other party under a label.
    pub async fn publish_message<T: Serialize>(&self, label: Label, data: &T) {
        let tag = MessageTag::public(self.run, self.me, label);
        let message_data = encode_with_tag(&tag.0, data);
        self.comms.send_raw(Message::Many(message_data)).await;
    }

    /// Retrieve another party's broadcast under a label.
    ///
    /// Messages whose transport-level sender disagrees with the tag's
    /// publisher are dropped; an honest transport never produces them.
    pub async fn retrieve_public_message<T: DeserializeOwned>(
        &self,
        from: Participant,
        label: Label,
    ) -> Result<T, ProtocolError> {
        let tag = MessageTag::public(self.run, from, label);
        loop {
            let (sender, data) = self.comms.buffer.pop(tag).await;
            if sender != from {
                future::yield_now().await;
                continue;
            }
            let decoded: Result<T, Box<dyn error::Error + Send + Sync>> =
                decode(&data[MessageTag::SIZE..]).map_err(|e| e.into());
            return Ok(decoded?);
        }
    }

    /// Send a private message to one party under a label.
    pub async fn send_private_message<T: Serialize>(
        &self,
        to: Participant,
        label: Label,
        data: &T,
    ) {
        let tag = MessageTag::private(self.run, label);
        let message_data = encode_with_tag(&tag.0, data);
        self.comms.send_raw(Message::Private(to, message_data)).await;
    }

    /// Retrieve a private message addressed to us under a label.
    pub async fn retrieve_private_message<T: DeserializeOwned>(
        &self,
        label: Label,
    ) -> Result<T, ProtocolError> {
        let tag = MessageTag::private(self.run, label);
        let (_, data) = self.comms.buffer.pop(tag).await;
        let decoded: Result<T, Box<dyn error::Error + Send + Sync>> =
            decode(&data[MessageTag::SIZE..]).map_err(|e| e.into());
        Ok(decoded?)
    }
}

/// Represents the context that protocols have access to.
///
/// This allows us to spawn new tasks, and send and receive messages.
///
/// This context can safely be cloned.
#[derive(Clone)]
pub struct Context<'a> {
    comms: Comms,
    executor: Arc<Executor<'a>>,
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Self {
            comms: Comms::new(),
            executor: Arc::new(Executor::new()),
        }
    }

    /// Return the messaging interface for one party of one run.
    pub fn communicator(&self, run: RunId, me: Participant) -> Communicator {
        Communicator {
            run,
            me,
            comms: self.comms.clone(),
        }
    }

    /// Run a future to completion on this executor.
    pub async fn run<T>(&self, fut: impl Future<Output = T>) -> T {
        self.executor.run(fut).await
    }
}

/// This struct will convert a future into a protocol.
struct ProtocolExecutor<'a, T> {
    ctx: Context<'a>,
    ret_r: channel::Receiver<Result<T, ProtocolError>>,
    done: bool,
}

impl<'a, T: Send + 'a> ProtocolExecutor<'a, T> {
    fn new(
        ctx: Context<'a>,
        fut: impl Future<Output = Result<T, ProtocolError>> + Send + 'a,
    ) -> Self {
        let (ret_s, ret_r) = smol::channel::bounded(1);
        let fut = async move {
            let res = fut.await;
            ret_s
                .send(res)
                .await
                .expect("failed to return result of protocol");
        };

        ctx.executor.spawn(fut).detach();

        Self {
            ctx,
            ret_r,
            done: false,
        }
    }
}

impl<'a, T> Protocol for ProtocolExecutor<'a, T> {
    type Output = T;

    fn poke(&mut self) -> Result<Action<Self::Output>, ProtocolError> {
        if self.done {
            return Ok(Action::Wait);
        }
        let fut_return = async {
            let out = self
                .ret_r
                .recv()
                .await
                .expect("failed to retrieve return value");
            Ok::<_, ProtocolError>(Action::Return(out?))
        };
        let fut_outgoing = async {
            let action: Action<Self::Output> = match self.ctx.comms.outgoing().await {
                Message::Many(m) => Action::SendMany(m),
                Message::Private(to, m) => Action::SendPrivate(to, m),
            };
            Ok::<_, ProtocolError>(action)
        };
        // This is a future which will keep ticking the executor until
        // all tasks are asleep, at which point it will indicate that nothing
        // is left to do, by returning `Action::Wait`.
        let fut_wait = async {
            while self.ctx.executor.try_tick() {
                // Now that we've ticked, we want to yield to allow the
                // executor to poll the other action sources.
                future::yield_now().await;
            }
            Ok(Action::Wait)
        };
        // The priority is first to send all outgoing messages before
        // returning, otherwise we might deadlock other people, by preventing
        // them from receiving the output.
        let action = block_on(
            self.ctx
                .run(future::or(fut_outgoing, future::or(fut_return, fut_wait))),
        );
        match action {
            Err(_) => self.done = true,
            Ok(Action::Return(_)) => self.done = true,
            _ => {}
        };
        action
    }

    fn message(&mut self, from: Participant, data: MessageData) {
        block_on(
            self.ctx
                .executor
                .run(self.ctx.comms.push_message(from, data)),
        );
    }
}

/// Run a protocol, converting a future into an instance of the Protocol trait.
pub fn make_protocol<'a, T: Send + 'a>(
    ctx: Context<'a>,
    fut: impl Future<Output = Result<T, ProtocolError>> + Send + 'a,
) -> impl Protocol<Output = T> + 'a {
    ProtocolExecutor::new(ctx, fut)
}
