//! Hand-off of beat snapshots from the audio thread to a consumer.
//!
//! A fixed pool of [`BeatSnapshot`] buffers circulates between two
//! single-producer single-consumer rings:
//!
//! ```text
//!   audio thread                              consumer thread
//!   SnapshotDispatcher --- published (1) ---> SnapshotReceiver
//!                      <------ free (N) -----
//! ```
//!
//! The dispatcher copies the live beat buffer into a snapshot it owns and
//! moves it into the published ring. The receiver keeps the newest snapshot
//! and returns older ones through the free ring. Nothing is shared while it
//! is being written, and neither side ever waits for the other.
//!
//! The published ring holds a single snapshot. When it is still occupied the
//! dispatcher parks the new snapshot as pending and overwrites it on later
//! beats, so a slow consumer always catches up to the most recent beat.
//!
//! A consumer that shows up while the audio thread is running goes through a
//! [`ConsumerPort`]. The port builds the pool on its own thread and sends it
//! over a command ring; the dispatcher swaps it in at the start of the next
//! block and sends the link it replaced back to the port to be freed there.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use rtrb::{Consumer, Producer, PushError, RingBuffer};

use crate::{BeatBuffer, BeatError, BeatEvent, BoundaryKind, Result};

/// Commands a [`ConsumerPort`] can queue before the dispatcher drains them.
pub const PORT_COMMAND_CAPACITY: usize = 4;

/// Immutable copy of the beat buffer taken when a beat was detected.
///
/// Samples are kept in the circular layout of the live buffer;
/// [`start_index`](Self::start_index) is the slot of the beat boundary and
/// [`aligned`](Self::aligned) reads from there.
#[derive(Clone)]
pub struct BeatSnapshot {
    data: Vec<f32>,
    channels: usize,
    stride: usize,
    frames: usize,
    start_index: usize,
    kind: BoundaryKind,
    stamp: SnapshotStamp,
}

/// Metadata recorded alongside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotStamp {
    /// Running count of beats detected since the processor was prepared.
    pub sequence: u64,
    pub bpm: f64,
    pub sample_rate: f64,
}

impl BeatSnapshot {
    fn with_reserve(channels: usize, reserve: usize) -> Self {
        Self {
            data: vec![0.0; channels * reserve],
            channels,
            stride: reserve,
            frames: 0,
            start_index: 0,
            kind: BoundaryKind::Forward,
            stamp: SnapshotStamp {
                sequence: 0,
                bpm: 0.0,
                sample_rate: 0.0,
            },
        }
    }

    /// Makes room for `reserve` samples on each of `channels` channels,
    /// discarding the contents if storage has to change.
    fn reserve(&mut self, channels: usize, reserve: usize) {
        if channels != self.channels || reserve > self.stride {
            *self = Self::with_reserve(channels, reserve);
        }
    }

    /// Copies `buffer` into this snapshot. Reallocates only when the buffer
    /// outgrew the reserve this snapshot was created with.
    fn capture(&mut self, buffer: &BeatBuffer, event: &BeatEvent, stamp: SnapshotStamp) {
        let frames = buffer.capacity();
        if buffer.channels() != self.channels || frames > self.stride {
            self.channels = buffer.channels();
            self.stride = buffer.reserved().max(frames);
            self.data = vec![0.0; self.channels * self.stride];
        }
        for ch in 0..self.channels {
            let start = ch * self.stride;
            self.data[start..start + frames].copy_from_slice(buffer.channel(ch));
        }
        self.frames = frames;
        self.start_index = event.beat_start_index;
        self.kind = event.kind;
        self.stamp = stamp;
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Samples per channel, one beat long.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Slot holding the sample at the beat boundary.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn kind(&self) -> BoundaryKind {
        self.kind
    }

    pub fn stamp(&self) -> SnapshotStamp {
        self.stamp
    }

    pub fn sequence(&self) -> u64 {
        self.stamp.sequence
    }

    /// One channel in circular slot order.
    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.stride;
        &self.data[start..start + self.frames]
    }

    /// One channel read from the beat boundary onwards, wrapping once.
    pub fn aligned(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        let plane = self.channel(channel);
        let start = if self.frames == 0 {
            0
        } else {
            self.start_index % self.frames
        };
        plane[start..].iter().chain(&plane[..start]).copied()
    }

    /// Writes the aligned channel into `out` and returns how many samples
    /// were copied.
    pub fn copy_aligned(&self, channel: usize, out: &mut [f32]) -> usize {
        let mut copied = 0;
        for (dst, sample) in out.iter_mut().zip(self.aligned(channel)) {
            *dst = sample;
            copied += 1;
        }
        copied
    }
}

impl fmt::Debug for BeatSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeatSnapshot")
            .field("channels", &self.channels)
            .field("frames", &self.frames)
            .field("start_index", &self.start_index)
            .field("kind", &self.kind)
            .field("stamp", &self.stamp)
            .finish()
    }
}

/// Receives beat snapshots on the consumer side.
pub trait BeatConsumer {
    fn push_buffer(&mut self, snapshot: &BeatSnapshot, start_index: usize);
}

impl<F> BeatConsumer for F
where
    F: FnMut(&BeatSnapshot, usize),
{
    fn push_buffer(&mut self, snapshot: &BeatSnapshot, start_index: usize) {
        self(snapshot, start_index)
    }
}

/// What happened to a beat handed to [`SnapshotDispatcher::notify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The snapshot is waiting in the published ring.
    Published,
    /// The published ring was occupied; the snapshot will go out on a later
    /// flush unless a newer beat replaces it first.
    Pending,
    /// No consumer is attached, or no snapshot buffer was available.
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Snapshots moved into the published ring.
    pub delivered: u64,
    /// Pending snapshots overwritten by a newer beat.
    pub superseded: u64,
    /// Beats discarded because nobody was listening.
    pub dropped: u64,
}

/// Size every pooled snapshot is kept at. Read and written off the audio
/// thread only.
#[derive(Debug, Clone, Copy)]
struct PoolLayout {
    channels: usize,
    reserve: usize,
    slots: usize,
}

type SharedLayout = Arc<Mutex<PoolLayout>>;

fn current_layout(shared: &SharedLayout) -> PoolLayout {
    *shared.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Link {
    free: Consumer<BeatSnapshot>,
    published: Producer<BeatSnapshot>,
    pending: Option<BeatSnapshot>,
    /// Snapshots pulled out of the free ring to be resized by `reserve`.
    spare: Vec<BeatSnapshot>,
}

impl Link {
    /// Allocates a full pool and returns both ends.
    fn open(shared: &SharedLayout) -> (Box<Self>, SnapshotReceiver) {
        let layout = current_layout(shared);
        let (mut free_tx, free_rx) = RingBuffer::new(layout.slots);
        let (published_tx, published_rx) = RingBuffer::new(1);
        for _ in 0..layout.slots {
            if free_tx
                .push(BeatSnapshot::with_reserve(layout.channels, layout.reserve))
                .is_err()
            {
                break;
            }
        }

        let link = Box::new(Self {
            free: free_rx,
            published: published_tx,
            pending: None,
            spare: Vec::with_capacity(layout.slots),
        });
        let receiver = SnapshotReceiver {
            published: published_rx,
            free: free_tx,
            latest: None,
            layout: Arc::clone(shared),
        };
        (link, receiver)
    }

    fn take_snapshot(&mut self) -> Option<BeatSnapshot> {
        self.spare.pop().or_else(|| self.free.pop().ok())
    }
}

enum LinkCommand {
    Attach(Box<Link>),
    Detach,
}

/// Audio-thread ends of the port rings.
struct Control {
    commands: Consumer<LinkCommand>,
    retired: Producer<Box<Link>>,
}

/// Producer half of the snapshot hand-off, owned by the audio callback.
pub struct SnapshotDispatcher {
    link: Option<Box<Link>>,
    layout: SharedLayout,
    control: Option<Control>,
    stats: DispatchStats,
}

impl SnapshotDispatcher {
    /// Creates a dispatcher whose pools hold `slots` snapshots of `reserve`
    /// samples on each of `channels` channels.
    pub fn new(channels: usize, reserve: usize, slots: usize) -> Self {
        Self {
            link: None,
            layout: Arc::new(Mutex::new(PoolLayout {
                channels,
                reserve,
                slots,
            })),
            control: None,
            stats: DispatchStats::default(),
        }
    }

    /// Allocates a snapshot pool and returns the receiving end. Replaces any
    /// previous consumer.
    ///
    /// Not real-time safe.
    pub fn connect(&mut self) -> SnapshotReceiver {
        let (link, receiver) = Link::open(&self.layout);
        self.link = Some(link);
        receiver
    }

    /// Drops the link to the current consumer, if any. Not real-time safe.
    pub fn disconnect(&mut self) -> bool {
        self.link.take().is_some()
    }

    /// Opens a port for attaching consumers from another thread. A port
    /// handed out earlier stops working.
    ///
    /// Not real-time safe.
    pub fn port(&mut self) -> ConsumerPort {
        let (commands_tx, commands_rx) = RingBuffer::new(PORT_COMMAND_CAPACITY);
        let (retired_tx, retired_rx) = RingBuffer::new(PORT_COMMAND_CAPACITY + 1);
        self.control = Some(Control {
            commands: commands_rx,
            retired: retired_tx,
        });
        ConsumerPort {
            commands: commands_tx,
            retired: retired_rx,
            layout: Arc::clone(&self.layout),
        }
    }

    /// Applies attach and detach requests queued on the port. Called at the
    /// start of every block.
    pub fn apply_commands(&mut self) {
        let Some(control) = self.control.as_mut() else {
            return;
        };
        while let Ok(command) = control.commands.pop() {
            let next = match command {
                LinkCommand::Attach(link) => Some(link),
                LinkCommand::Detach => None,
            };
            if let Some(old) = std::mem::replace(&mut self.link, next) {
                // The port drains this ring before every command, so it only
                // fills up if the port stopped collecting.
                if let Err(PushError::Full(old)) = control.retired.push(old) {
                    drop(old);
                }
            }
        }
    }

    /// Resizes the snapshot pool for a new stream layout. Snapshots held by
    /// the consumer are resized when it hands them back.
    ///
    /// Not real-time safe.
    pub fn reserve(&mut self, channels: usize, reserve: usize) {
        {
            let mut layout = self.layout.lock().unwrap_or_else(PoisonError::into_inner);
            layout.channels = channels;
            layout.reserve = reserve;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };
        while let Ok(snapshot) = link.free.pop() {
            link.spare.push(snapshot);
        }
        for snapshot in link.spare.iter_mut().chain(link.pending.as_mut()) {
            snapshot.reserve(channels, reserve);
        }
    }

    /// Whether a receiver is attached and still alive.
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .map(|link| !link.published.is_abandoned())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Captures `buffer` for the beat described by `event` and hands it to
    /// the consumer. Never blocks.
    pub fn notify(&mut self, buffer: &BeatBuffer, event: &BeatEvent, stamp: SnapshotStamp) -> DispatchOutcome {
        let Some(link) = self.link.as_mut() else {
            self.stats.dropped += 1;
            return DispatchOutcome::Dropped;
        };
        if link.published.is_abandoned() {
            self.stats.dropped += 1;
            return DispatchOutcome::Dropped;
        }

        let mut snapshot = match link.pending.take() {
            Some(stale) => {
                self.stats.superseded += 1;
                stale
            }
            None => match link.take_snapshot() {
                Some(snapshot) => snapshot,
                None => {
                    self.stats.dropped += 1;
                    return DispatchOutcome::Dropped;
                }
            },
        };
        snapshot.capture(buffer, event, stamp);

        match link.published.push(snapshot) {
            Ok(()) => {
                self.stats.delivered += 1;
                DispatchOutcome::Published
            }
            Err(PushError::Full(snapshot)) => {
                link.pending = Some(snapshot);
                DispatchOutcome::Pending
            }
        }
    }

    /// Retries publishing a pending snapshot. Called once per block.
    pub fn flush(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let Some(snapshot) = link.pending.take() else {
            return;
        };
        match link.published.push(snapshot) {
            Ok(()) => self.stats.delivered += 1,
            Err(PushError::Full(snapshot)) => link.pending = Some(snapshot),
        }
    }
}

impl fmt::Debug for SnapshotDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotDispatcher")
            .field("connected", &self.is_connected())
            .field(
                "pending",
                &self.link.as_ref().map(|link| link.pending.is_some()),
            )
            .field("port", &self.control.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

/// Lets a consumer attach or detach while the audio thread owns the
/// dispatcher. Every call allocates or frees on the calling thread only.
pub struct ConsumerPort {
    commands: Producer<LinkCommand>,
    retired: Consumer<Box<Link>>,
    layout: SharedLayout,
}

impl ConsumerPort {
    /// Builds a snapshot pool and queues it for the audio thread. The
    /// receiver starts getting snapshots once the next block has run.
    pub fn attach(&mut self) -> Result<SnapshotReceiver> {
        self.release_retired();
        let (link, receiver) = Link::open(&self.layout);
        self.send(LinkCommand::Attach(link))?;
        Ok(receiver)
    }

    /// Queues removal of the current consumer.
    pub fn detach(&mut self) -> Result<()> {
        self.release_retired();
        self.send(LinkCommand::Detach)
    }

    /// Whether the dispatcher that handed out this port still listens to it.
    pub fn is_connected(&self) -> bool {
        !self.commands.is_abandoned()
    }

    /// Frees links the audio thread has swapped out. Returns how many.
    pub fn release_retired(&mut self) -> usize {
        let mut released = 0;
        while self.retired.pop().is_ok() {
            released += 1;
        }
        released
    }

    fn send(&mut self, command: LinkCommand) -> Result<()> {
        if !self.is_connected() {
            return Err(BeatError::Disconnected);
        }
        self.commands.push(command).map_err(|_| BeatError::QueueFull)
    }
}

impl fmt::Debug for ConsumerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerPort")
            .field("connected", &self.is_connected())
            .field("free_slots", &self.commands.slots())
            .finish()
    }
}

/// Consumer half of the snapshot hand-off. Poll it at any rate; only the
/// newest snapshot is kept. Dropping it detaches the consumer.
pub struct SnapshotReceiver {
    published: Consumer<BeatSnapshot>,
    free: Producer<BeatSnapshot>,
    latest: Option<BeatSnapshot>,
    layout: SharedLayout,
}

impl SnapshotReceiver {
    /// Collects published snapshots and returns the newest one if anything
    /// arrived since the last poll.
    pub fn poll(&mut self) -> Option<&BeatSnapshot> {
        let mut fresh = false;
        while let Ok(snapshot) = self.published.pop() {
            if let Some(previous) = self.latest.replace(snapshot) {
                self.recycle(previous);
            }
            fresh = true;
        }
        if fresh {
            self.latest.as_ref()
        } else {
            None
        }
    }

    /// Polls and forwards a new snapshot to `consumer`. Returns whether one
    /// was delivered.
    pub fn deliver_to<C: BeatConsumer + ?Sized>(&mut self, consumer: &mut C) -> bool {
        match self.poll() {
            Some(snapshot) => {
                consumer.push_buffer(snapshot, snapshot.start_index());
                true
            }
            None => false,
        }
    }

    /// The most recent snapshot received, even if already seen.
    pub fn latest(&self) -> Option<&BeatSnapshot> {
        self.latest.as_ref()
    }

    /// Whether the dispatcher side still exists.
    pub fn is_connected(&self) -> bool {
        !self.published.is_abandoned()
    }

    fn recycle(&mut self, mut snapshot: BeatSnapshot) {
        let layout = current_layout(&self.layout);
        snapshot.reserve(layout.channels, layout.reserve);
        if self.free.push(snapshot).is_err() {
            tracing::debug!("snapshot pool full, releasing buffer");
        }
    }
}

impl fmt::Debug for SnapshotReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotReceiver")
            .field("connected", &self.is_connected())
            .field("latest", &self.latest)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(beat_start_index: usize) -> BeatEvent {
        BeatEvent {
            beat_start_index,
            offset: 0,
            kind: BoundaryKind::Forward,
        }
    }

    fn stamp(sequence: u64) -> SnapshotStamp {
        SnapshotStamp {
            sequence,
            bpm: 120.0,
            sample_rate: 48_000.0,
        }
    }

    fn filled_buffer(value: f32) -> BeatBuffer {
        let mut buffer = BeatBuffer::new(2, 4);
        buffer.write_block(&[[value, value + 1.0, value + 2.0, value + 3.0], [-value; 4]], 4);
        buffer
    }

    #[test]
    fn drops_without_consumer() {
        let mut dispatcher = SnapshotDispatcher::new(2, 4, 3);
        let buffer = filled_buffer(1.0);
        let before = buffer.channel(0).to_vec();

        let outcome = dispatcher.notify(&buffer, &event(0), stamp(1));

        assert_eq!(outcome, DispatchOutcome::Dropped);
        assert_eq!(dispatcher.stats().dropped, 1);
        assert_eq!(buffer.channel(0), &before[..]);
        assert_eq!(buffer.write_index(), 0);
    }

    #[test]
    fn delivers_an_independent_copy() {
        let mut dispatcher = SnapshotDispatcher::new(2, 4, 3);
        let mut receiver = dispatcher.connect();
        let mut buffer = filled_buffer(1.0);

        assert_eq!(
            dispatcher.notify(&buffer, &event(2), stamp(1)),
            DispatchOutcome::Published
        );
        buffer.write_block(&[[9.0f32; 4], [9.0; 4]], 4);

        let snapshot = receiver.poll().expect("snapshot should be published");
        assert_eq!(snapshot.channel(0), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(snapshot.channel(1), &[-1.0; 4]);
        assert_eq!(snapshot.start_index(), 2);
        assert_eq!(snapshot.aligned(0).collect::<Vec<_>>(), vec![3.0, 4.0, 1.0, 2.0]);
        assert_eq!(snapshot.sequence(), 1);
        assert!(receiver.poll().is_none());
        assert!(receiver.latest().is_some());
    }

    #[test]
    fn slow_consumer_gets_most_recent_beat() {
        let mut dispatcher = SnapshotDispatcher::new(2, 4, 3);
        let mut receiver = dispatcher.connect();

        for sequence in 1..=5 {
            let buffer = filled_buffer(sequence as f32);
            let outcome = dispatcher.notify(&buffer, &event(0), stamp(sequence));
            let expected = if sequence == 1 {
                DispatchOutcome::Published
            } else {
                DispatchOutcome::Pending
            };
            assert_eq!(outcome, expected);
        }

        assert_eq!(receiver.poll().map(BeatSnapshot::sequence), Some(1));
        dispatcher.flush();
        assert_eq!(receiver.poll().map(BeatSnapshot::sequence), Some(5));

        let stats = dispatcher.stats();
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.superseded, 3);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn pool_recycles_between_threads() {
        let mut dispatcher = SnapshotDispatcher::new(2, 4, 3);
        let receiver = dispatcher.connect();

        let consumer = std::thread::spawn(move || {
            let mut receiver = receiver;
            let mut seen = Vec::new();
            while receiver.is_connected() || receiver.latest().is_some() {
                if let Some(snapshot) = receiver.poll() {
                    seen.push(snapshot.sequence());
                    if snapshot.sequence() == 200 {
                        break;
                    }
                }
                std::thread::yield_now();
            }
            seen
        });

        for sequence in 1..=200 {
            let buffer = filled_buffer(sequence as f32);
            dispatcher.notify(&buffer, &event(0), stamp(sequence));
        }
        while dispatcher.link.as_ref().is_some_and(|link| link.pending.is_some()) {
            dispatcher.flush();
            std::thread::yield_now();
        }

        let seen = consumer.join().unwrap();
        assert_eq!(seen.last(), Some(&200));
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(dispatcher.stats().dropped, 0);
    }

    #[test]
    fn dropped_receiver_detaches() {
        let mut dispatcher = SnapshotDispatcher::new(2, 4, 3);
        let receiver = dispatcher.connect();
        assert!(dispatcher.is_connected());
        drop(receiver);

        assert!(!dispatcher.is_connected());
        let buffer = filled_buffer(1.0);
        assert_eq!(
            dispatcher.notify(&buffer, &event(0), stamp(1)),
            DispatchOutcome::Dropped
        );
        assert!(dispatcher.disconnect());
        assert!(!dispatcher.disconnect());
    }

    #[test]
    fn closures_act_as_consumers() {
        let mut dispatcher = SnapshotDispatcher::new(2, 4, 3);
        let mut receiver = dispatcher.connect();
        dispatcher.notify(&filled_buffer(1.0), &event(3), stamp(7));

        let mut received = None;
        let mut consumer = |snapshot: &BeatSnapshot, start_index: usize| {
            received = Some((snapshot.sequence(), start_index));
        };
        assert!(receiver.deliver_to(&mut consumer));
        assert!(!receiver.deliver_to(&mut consumer));
        assert_eq!(received, Some((7, 3)));
    }

    #[test]
    fn copy_aligned_fills_output() {
        let mut dispatcher = SnapshotDispatcher::new(2, 4, 3);
        let mut receiver = dispatcher.connect();
        dispatcher.notify(&filled_buffer(1.0), &event(1), stamp(1));

        let snapshot = receiver.poll().unwrap();
        let mut out = [0.0; 6];
        assert_eq!(snapshot.copy_aligned(0, &mut out), 4);
        assert_eq!(out, [2.0, 3.0, 4.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn port_attaches_on_next_block() {
        let mut dispatcher = SnapshotDispatcher::new(2, 4, 3);
        let mut port = dispatcher.port();
        let mut receiver = port.attach().unwrap();
        assert!(!dispatcher.is_connected());

        dispatcher.apply_commands();
        assert!(dispatcher.is_connected());
        dispatcher.notify(&filled_buffer(1.0), &event(0), stamp(1));
        assert_eq!(receiver.poll().map(BeatSnapshot::sequence), Some(1));

        port.detach().unwrap();
        dispatcher.apply_commands();
        assert!(!dispatcher.is_connected());
        assert!(receiver.is_connected());
        assert_eq!(port.release_retired(), 1);
        assert!(!receiver.is_connected());
    }

    #[test]
    fn reattaching_retires_the_previous_link() {
        let mut dispatcher = SnapshotDispatcher::new(2, 4, 3);
        let mut port = dispatcher.port();
        let first = port.attach().unwrap();
        dispatcher.apply_commands();

        let mut second = port.attach().unwrap();
        dispatcher.apply_commands();
        assert_eq!(port.release_retired(), 1);
        assert!(!first.is_connected());

        dispatcher.notify(&filled_buffer(2.0), &event(0), stamp(4));
        assert_eq!(second.poll().map(BeatSnapshot::sequence), Some(4));
    }

    #[test]
    fn port_reports_full_queue_and_replaced_dispatcher() {
        let mut dispatcher = SnapshotDispatcher::new(1, 4, 3);
        let mut port = dispatcher.port();
        for _ in 0..PORT_COMMAND_CAPACITY {
            port.detach().unwrap();
        }
        assert!(matches!(port.detach(), Err(BeatError::QueueFull)));

        let _newer = dispatcher.port();
        assert!(!port.is_connected());
        assert!(matches!(port.attach(), Err(BeatError::Disconnected)));
    }

    #[test]
    fn reserve_resizes_pooled_snapshots() {
        let mut dispatcher = SnapshotDispatcher::new(1, 4, 3);
        let mut receiver = dispatcher.connect();
        let mut small = BeatBuffer::new(1, 4);
        small.write_block(&[[1.0f32; 4]], 4);
        dispatcher.notify(&small, &event(0), stamp(1));
        assert!(receiver.poll().is_some());

        dispatcher.reserve(2, 8);
        let link = dispatcher.link.as_ref().unwrap();
        assert_eq!(link.spare.len(), 2);
        assert!(link
            .spare
            .iter()
            .all(|snapshot| snapshot.channels == 2 && snapshot.stride == 8));

        let wide = BeatBuffer::with_reserve(2, 6, 8);
        dispatcher.notify(&wide, &event(0), stamp(2));
        let snapshot = receiver.poll().unwrap();
        assert_eq!(snapshot.channels(), 2);
        assert_eq!(snapshot.frames(), 6);

        // the stale mono snapshot comes back resized
        let link = dispatcher.link.as_mut().unwrap();
        let recycled = link.free.pop().unwrap();
        assert_eq!((recycled.channels, recycled.stride), (2, 8));
    }
}
