//! One site's copy of the shared document.
//!
//! A [`Replica`] owns the document tree, the version vector, the causal
//! queue and the operation log behind a single lock. Local edits apply
//! immediately and are handed to an outbox for broadcast; remote operations
//! go through the causal queue first.

use crate::config::ReplicaConfig;
use crate::error::{ReplicaError, Result};
use crate::network::{Envelope, Message};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error};
use treedoc_causal::{CausalQueue, OperationLog};
use treedoc_core::{Operation, SiteId, VersionVector};
use treedoc_tree::{Document, Edit, TreeStats};

/// Messages a replica wants broadcast, in generation order.
pub type Outbox = mpsc::UnboundedReceiver<Message>;

/// Diagnostic counters for a replica.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicaStats {
    pub tree: TreeStats,
    /// Remote operations waiting on causal dependencies.
    pub pending: usize,
    /// Operations applied so far, local and remote.
    pub logged: usize,
    pub faulted: bool,
}

struct ReplicaState {
    doc: Document,
    vector: VersionVector,
    queue: CausalQueue<Operation>,
    log: OperationLog<Envelope>,
    faulted: bool,
}

/// A site's replica of the document.
pub struct Replica {
    site: SiteId,
    state: Mutex<ReplicaState>,
    events: broadcast::Sender<Edit>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Replica {
    /// Create a replica and the outbox its local operations are pushed to.
    pub fn new(config: ReplicaConfig) -> (Self, Outbox) {
        let site = config.site_id.unwrap_or_else(SiteId::generate);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (outbound, outbox) = mpsc::unbounded_channel();

        let replica = Self {
            site,
            state: Mutex::new(ReplicaState {
                doc: Document::with_config(config.document_config()),
                vector: VersionVector::new(),
                queue: CausalQueue::new(),
                log: OperationLog::new(),
                faulted: false,
            }),
            events,
            outbound,
        };
        (replica, outbox)
    }

    pub fn site(&self) -> SiteId {
        self.site
    }

    /// Subscribe to the edits applied to this replica, local and remote.
    pub fn subscribe(&self) -> broadcast::Receiver<Edit> {
        self.events.subscribe()
    }

    /// Insert `value` so it ends up at `position` of the rendered text.
    pub fn insert(&self, position: usize, value: char) -> Result<Operation> {
        self.local(Edit::Insert { position, value }, |doc, site| {
            doc.insert_at_position(site, position, value)
        })
    }

    /// Delete the character at `position` of the rendered text.
    pub fn delete(&self, position: usize) -> Result<Operation> {
        self.local(Edit::Delete { position }, |doc, _| {
            doc.delete_at_position(position)
        })
    }

    /// Apply a local edit, stamp it and queue it for broadcast.
    fn local<F>(&self, event: Edit, edit: F) -> Result<Operation>
    where
        F: FnOnce(&mut Document, SiteId) -> treedoc_tree::Result<Operation>,
    {
        let mut state = self.state.lock();
        if state.faulted {
            return Err(ReplicaError::Faulted(self.site));
        }
        let op = edit(&mut state.doc, self.site)?;
        let vector = state.vector.clone();
        let version = state.vector.increment(self.site);
        let envelope = Envelope {
            vector,
            site: self.site,
            version,
            op: op.clone(),
        };
        state.log.write(self.site, version, envelope.clone());
        self.emit(event);
        debug!(site = %self.site, version, "applied local operation");

        // Pushed under the lock so the outbox stays in version order.
        if self.outbound.send(Message::Operation(envelope)).is_err() {
            debug!(site = %self.site, "outbox closed, operation not broadcast");
        }
        Ok(op)
    }

    /// Hand a remote operation to the causal queue and apply whatever it
    /// releases. Returns how many operations were applied.
    ///
    /// An operation the tree rejects proves the histories have diverged; the
    /// replica is then faulted and refuses all further work.
    pub fn deliver(&self, envelope: Envelope) -> Result<usize> {
        self.deliver_all(std::iter::once(envelope))
    }

    /// Deliver a batch of remote operations, such as a sync response, under
    /// a single lock acquisition. Returns how many operations were applied.
    pub fn deliver_all<I>(&self, envelopes: I) -> Result<usize>
    where
        I: IntoIterator<Item = Envelope>,
    {
        let mut applied = 0;
        let mut rejected = None;
        {
            let mut state = self.state.lock();
            if state.faulted {
                return Err(ReplicaError::Faulted(self.site));
            }
            let state = &mut *state;
            'batch: for envelope in envelopes {
                let ready = state.queue.enqueue(envelope.into(), &mut state.vector);
                for elem in ready {
                    match state.doc.apply_operation(&elem.op) {
                        Ok(edit) => {
                            debug!(site = %elem.site, version = elem.version, "applied remote operation");
                            if let Some(edit) = edit {
                                self.emit(edit);
                            }
                            state.log.write(elem.site, elem.version, Envelope::from(elem));
                            applied += 1;
                        }
                        Err(e) => {
                            error!(
                                replica = %self.site,
                                site = %elem.site,
                                version = elem.version,
                                error = %e,
                                "remote operation rejected, replica faulted"
                            );
                            state.faulted = true;
                            rejected = Some(e);
                            break 'batch;
                        }
                    }
                }
            }
        }
        match rejected {
            Some(e) => Err(ReplicaError::Tree(e)),
            None => Ok(applied),
        }
    }

    /// Decode a wire envelope and deliver it.
    pub fn deliver_bytes(&self, bytes: &[u8]) -> Result<usize> {
        let envelope = Envelope::decode(bytes)?;
        self.deliver(envelope)
    }

    /// Operations the holder of `vector` has not seen, oldest first.
    pub fn missing_operations(&self, vector: &VersionVector) -> Vec<Envelope> {
        self.state
            .lock()
            .log
            .missing_operations(vector)
            .into_iter()
            .map(|entry| entry.op)
            .collect()
    }

    /// Called with the state lock held so events keep mutation order.
    fn emit(&self, edit: Edit) {
        // No subscribers is fine.
        let _ = self.events.send(edit);
    }

    pub fn render(&self) -> String {
        self.state.lock().doc.render()
    }

    pub fn len(&self) -> usize {
        self.state.lock().doc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().doc.is_empty()
    }

    pub fn vector(&self) -> VersionVector {
        self.state.lock().vector.clone()
    }

    pub fn is_faulted(&self) -> bool {
        self.state.lock().faulted
    }

    /// Buffered remote operations, for diagnostics.
    pub fn pending(&self) -> Vec<Envelope> {
        self.state
            .lock()
            .queue
            .pending()
            .cloned()
            .map(Envelope::from)
            .collect()
    }

    pub fn stats(&self) -> ReplicaStats {
        let state = self.state.lock();
        ReplicaStats {
            tree: state.doc.stats(),
            pending: state.queue.len(),
            logged: state.log.len(),
            faulted: state.faulted,
        }
    }
}
