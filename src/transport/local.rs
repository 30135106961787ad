use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{Tag, Topology, Transport};
use crate::error::{Error, Result};

/// How long a blocked rank waits before checking whether its peer is gone.
const POLL: Duration = Duration::from_millis(20);

struct Envelope {
    from: usize,
    tag: Tag,
    payload: Vec<u8>,
}

struct Rendezvous {
    arrived: usize,
    generation: u64,
}

/// State every rank of one universe can see.
struct Shared {
    departed: Vec<AtomicBool>,
    rendezvous: Mutex<Rendezvous>,
    released: Condvar,
}

impl Shared {
    fn has_departed(&self, rank: usize) -> bool {
        self.departed[rank].load(Ordering::Acquire)
    }

    fn first_departed(&self) -> Option<usize> {
        (0..self.departed.len()).find(|&rank| self.has_departed(rank))
    }

    /// Reusable barrier; fails once a rank has left without entering it.
    fn wait(&self) -> Result<()> {
        let size = self.departed.len();
        let mut state = self
            .rendezvous
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == size {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(());
        }
        while state.generation == generation {
            if let Some(peer) = self.first_departed() {
                state.arrived -= 1;
                return Err(Error::Disconnected { peer });
            }
            state = self
                .released
                .wait_timeout(state, POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Ok(())
    }
}

/// One rank of a `LocalUniverse`.
///
/// Sends are eager: the message is queued in the destination's mailbox and
/// the call returns. Messages that arrive before their matching receive are
/// parked so that later receives can still find them in arrival order.
///
/// Dropping a transport marks its rank as departed. Receives from a departed
/// rank fail with `Error::Disconnected` once its queued messages are used up,
/// and so does any barrier it never entered.
pub struct LocalTransport {
    topology: Topology,
    // No sender to ourselves: with a single rank a receive errors out at once.
    outboxes: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
    parked: RefCell<VecDeque<Envelope>>,
    shared: Arc<Shared>,
    epoch: Instant,
}

impl LocalTransport {
    fn take_parked(&self, source: usize, tag: Tag) -> Option<Envelope> {
        let mut parked = self.parked.borrow_mut();
        let pos = parked
            .iter()
            .position(|env| env.from == source && env.tag == tag)?;
        parked.remove(pos)
    }

    /// Files `env` away unless it is the one being waited for.
    fn accept(&self, env: Envelope, source: usize, tag: Tag) -> Option<Envelope> {
        if env.from == source && env.tag == tag {
            return Some(env);
        }
        self.parked.borrow_mut().push_back(env);
        None
    }

    fn next_matching(&self, source: usize, tag: Tag) -> Result<Envelope> {
        if let Some(env) = self.take_parked(source, tag) {
            return Ok(env);
        }
        loop {
            match self.inbox.recv_timeout(POLL) {
                Ok(env) => {
                    if let Some(env) = self.accept(env, source, tag) {
                        return Ok(env);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.shared.has_departed(source) {
                        // Its sends were queued before it left.
                        while let Ok(env) = self.inbox.try_recv() {
                            if let Some(env) = self.accept(env, source, tag) {
                                return Ok(env);
                            }
                        }
                        return Err(Error::Disconnected { peer: source });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Disconnected { peer: source })
                }
            }
        }
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.shared.departed[self.topology.rank].store(true, Ordering::Release);
        self.shared.released.notify_all();
    }
}

impl Transport for LocalTransport {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn send(&self, dest: usize, tag: Tag, data: &[u8]) -> Result<()> {
        trace!(from = self.topology.rank, dest, ?tag, len = data.len(), "send");
        let outbox = self
            .outboxes
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or(Error::Disconnected { peer: dest })?;
        outbox
            .send(Envelope {
                from: self.topology.rank,
                tag,
                payload: data.to_vec(),
            })
            .map_err(|_| Error::Disconnected { peer: dest })
    }

    fn receive_into(&self, source: usize, tag: Tag, buf: &mut [u8]) -> Result<()> {
        let env = self.next_matching(source, tag).map_err(|e| {
            debug!(rank = self.topology.rank, source, ?tag, "peer left before sending");
            e
        })?;
        if env.payload.len() != buf.len() {
            return Err(Error::Protocol {
                from: source,
                tag,
                expected: buf.len(),
                actual: env.payload.len(),
            });
        }
        buf.copy_from_slice(&env.payload);
        trace!(rank = self.topology.rank, source, ?tag, len = buf.len(), "received");
        Ok(())
    }

    fn broadcast(&self, root: usize, values: &mut [u64]) -> Result<()> {
        if self.topology.rank == root {
            let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
            for dest in (0..self.topology.size).filter(|&r| r != root) {
                self.send(dest, Tag::Geometry, &bytes)?;
            }
        } else {
            let mut bytes = vec![0u8; values.len() * 8];
            self.receive_into(root, Tag::Geometry, &mut bytes)?;
            for (value, chunk) in values.iter_mut().zip(bytes.chunks_exact(8)) {
                let mut word = [0u8; 8];
                word.copy_from_slice(chunk);
                *value = u64::from_le_bytes(word);
            }
        }
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        self.shared.wait()
    }

    fn wall_time(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// A set of ranks running as threads of the current process.
pub struct LocalUniverse;

impl LocalUniverse {
    /// Builds the `size` connected transports, rank order.
    pub fn transports(size: usize) -> Vec<LocalTransport> {
        assert!(size > 0, "a universe needs at least one rank");
        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| mpsc::channel()).unzip();
        let shared = Arc::new(Shared {
            departed: (0..size).map(|_| AtomicBool::new(false)).collect(),
            rendezvous: Mutex::new(Rendezvous {
                arrived: 0,
                generation: 0,
            }),
            released: Condvar::new(),
        });
        let epoch = Instant::now();

        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalTransport {
                topology: Topology::new(rank, size),
                outboxes: senders
                    .iter()
                    .enumerate()
                    .map(|(dest, tx)| if dest == rank { None } else { Some(tx.clone()) })
                    .collect(),
                inbox,
                parked: RefCell::new(VecDeque::new()),
                shared: Arc::clone(&shared),
                epoch,
            })
            .collect()
    }

    /// Runs `f` once per rank, each on its own thread, and returns the
    /// results in rank order.
    ///
    /// A rank that returns or unwinds early drops its transport, so peers
    /// waiting on it fail instead of blocking. A panic on any rank is
    /// re-raised here once every rank has finished.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(LocalTransport) -> R + Sync,
        R: Send,
    {
        let transports = Self::transports(size);
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = transports
                .into_iter()
                .map(|transport| scope.spawn(move || f(transport)))
                .collect();
            let joined: Vec<_> = handles.into_iter().map(|handle| handle.join()).collect();
            joined
                .into_iter()
                .map(|result| match result {
                    Ok(result) => result,
                    Err(cause) => panic::resume_unwind(cause),
                })
                .collect()
        })
    }
}
