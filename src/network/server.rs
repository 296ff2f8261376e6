// The node event loop: frames from every transport are funneled into one
// bounded channel and handled one at a time, while a separate task produces
// blocks on a timer when the node holds a validator key

use crate::config::NodeConfig;
use crate::core::{Block, BlockBuilder, Blockchain, Transaction, TxHasher};
use crate::error::{BlockchainError, Result, ValidationError};
use crate::network::{
    default_rpc_decode, Broadcaster, DecodedMessage, Message, NetAddr, Outbound, Payload,
    RpcDecodeFn, StatusMessage, Transport, DEFAULT_INBOUND_CAPACITY, DEFAULT_OUTBOUND_CAPACITY,
};
use crate::storage::{MemoryPool, DEFAULT_MEMPOOL_CAPACITY};
use crate::utils::PrivateKey;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(5);

pub struct ServerOpts {
    pub id: String,
    /// Transport used for direct replies
    pub transport: Arc<dyn Transport>,
    /// Every transport the node listens on and broadcasts over
    pub transports: Vec<Arc<dyn Transport>>,
    pub block_time: Duration,
    /// Present only on the block producer
    pub private_key: Option<PrivateKey>,
    pub rpc_decode: RpcDecodeFn,
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
    pub mempool_capacity: usize,
}

impl ServerOpts {
    pub fn new(id: impl Into<String>, transport: Arc<dyn Transport>) -> ServerOpts {
        ServerOpts {
            id: id.into(),
            transports: vec![Arc::clone(&transport)],
            transport,
            block_time: DEFAULT_BLOCK_TIME,
            private_key: None,
            rpc_decode: default_rpc_decode,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            mempool_capacity: DEFAULT_MEMPOOL_CAPACITY,
        }
    }

    pub fn from_config(config: &NodeConfig, transport: Arc<dyn Transport>) -> Result<ServerOpts> {
        config.validate()?;

        let mut opts = ServerOpts::new(config.id.clone(), transport);
        opts.block_time = config.block_time();
        opts.inbound_capacity = config.inbound_capacity;
        opts.outbound_capacity = config.outbound_capacity;
        opts.mempool_capacity = config.mempool_capacity;
        if config.validator {
            opts.private_key = Some(PrivateKey::generate()?);
        }
        Ok(opts)
    }

    pub fn with_private_key(mut self, key: PrivateKey) -> ServerOpts {
        self.private_key = Some(key);
        self
    }

    pub fn with_block_time(mut self, block_time: Duration) -> ServerOpts {
        self.block_time = block_time;
        self
    }

    /// Listen and broadcast on an additional transport
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> ServerOpts {
        self.transports.push(transport);
        self
    }
}

/// Lifecycle of a server, observable through [`ServerHandle::get_state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Built but `start` has not run yet
    Idle,
    Running,
    /// The loop has exited and background tasks are being awaited
    ShuttingDown,
    Stopped,
}

/// Cheap handle onto a running server's shared state
#[derive(Clone)]
pub struct ServerHandle {
    id: String,
    chain: Arc<Blockchain>,
    mempool: Arc<MemoryPool>,
    shutdown: Arc<watch::Sender<bool>>,
    state: Arc<watch::Sender<ServerState>>,
}

impl ServerHandle {
    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn chain(&self) -> &Arc<Blockchain> {
        &self.chain
    }

    pub fn mempool(&self) -> &Arc<MemoryPool> {
        &self.mempool
    }

    pub fn get_state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

pub struct Server {
    opts: ServerOpts,
    chain: Arc<Blockchain>,
    mempool: Arc<MemoryPool>,
    shutdown: Arc<watch::Sender<bool>>,
    state: Arc<watch::Sender<ServerState>>,
}

impl Server {
    pub fn new(opts: ServerOpts) -> Result<Server> {
        if opts.transports.is_empty() {
            return Err(BlockchainError::Config(format!(
                "{}: server needs at least one transport",
                opts.id
            )));
        }

        let chain = Arc::new(Blockchain::new(Block::genesis())?);
        let mempool = Arc::new(MemoryPool::new(opts.mempool_capacity));
        let (shutdown, _) = watch::channel(false);
        let (state, _) = watch::channel(ServerState::Idle);

        Ok(Server {
            opts,
            chain,
            mempool,
            shutdown: Arc::new(shutdown),
            state: Arc::new(state),
        })
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            id: self.opts.id.clone(),
            chain: Arc::clone(&self.chain),
            mempool: Arc::clone(&self.mempool),
            shutdown: Arc::clone(&self.shutdown),
            state: Arc::clone(&self.state),
        }
    }

    pub fn get_state(&self) -> ServerState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ServerState) {
        self.state.send_replace(state);
    }

    fn is_running(&self) -> bool {
        self.get_state() == ServerState::Running
    }

    /// Run until shutdown is requested or every transport goes quiet.
    pub async fn start(mut self) -> Result<()> {
        // Fails fast if a transport was already consumed by someone else
        let receivers = match self
            .opts
            .transports
            .iter()
            .map(|t| t.consume())
            .collect::<Result<Vec<_>>>()
        {
            Ok(receivers) => receivers,
            Err(e) => {
                self.set_state(ServerState::Stopped);
                return Err(e);
            }
        };

        let (inbound_tx, mut inbound_rx) = mpsc::channel(self.opts.inbound_capacity.max(1));
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        for rx in receivers {
            tasks.push(spawn_forwarder(rx, inbound_tx.clone(), self.shutdown.subscribe()));
        }
        drop(inbound_tx);

        let (outbound, _worker) = Broadcaster::spawn(
            self.opts.transports.clone(),
            Arc::clone(&self.opts.transport),
            self.opts.outbound_capacity,
        );

        let dispatcher = Dispatcher {
            id: self.opts.id.clone(),
            chain: Arc::clone(&self.chain),
            mempool: Arc::clone(&self.mempool),
            outbound: outbound.clone(),
        };

        match self.opts.private_key.take() {
            Some(key) => {
                info!("{}: starting block producer every {:?}", self.opts.id, self.opts.block_time);
                let producer = Producer {
                    id: self.opts.id.clone(),
                    chain: Arc::clone(&self.chain),
                    mempool: Arc::clone(&self.mempool),
                    key,
                    outbound,
                };
                tasks.push(tokio::spawn(producer.run(
                    self.opts.block_time,
                    self.shutdown.subscribe(),
                )));
            }
            None => drop(outbound),
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        if *shutdown_rx.borrow() {
            self.set_state(ServerState::ShuttingDown);
        } else {
            self.set_state(ServerState::Running);
            info!("{}: server running", self.opts.id);
        }

        while self.is_running() {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        self.set_state(ServerState::ShuttingDown);
                    }
                }
                maybe_rpc = inbound_rx.recv() => match maybe_rpc {
                    Some(rpc) => {
                        let from = rpc.from.clone();
                        let result = (self.opts.rpc_decode)(rpc)
                            .and_then(|msg| dispatcher.process_message(msg));
                        if let Err(e) = result {
                            warn!("{}: message from {from} rejected: {e}", self.opts.id);
                        }
                    }
                    None => {
                        info!("{}: all inbound sources closed", self.opts.id);
                        self.set_state(ServerState::ShuttingDown);
                    }
                },
            }
        }

        info!("{}: shutting down", self.opts.id);
        self.shutdown.send_replace(true);
        for task in tasks {
            if let Err(e) = task.await {
                error!("{}: background task failed: {e}", self.opts.id);
            }
        }
        self.set_state(ServerState::Stopped);
        Ok(())
    }
}

fn spawn_forwarder(
    mut rx: mpsc::Receiver<crate::network::Rpc>,
    inbound: mpsc::Sender<crate::network::Rpc>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                maybe_rpc = rx.recv() => match maybe_rpc {
                    // Waits while the event loop is behind; nothing is dropped
                    Some(rpc) => {
                        if inbound.send(rpc).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    })
}

/// Message handling shared by the event loop
struct Dispatcher {
    id: String,
    chain: Arc<Blockchain>,
    mempool: Arc<MemoryPool>,
    outbound: Broadcaster,
}

impl Dispatcher {
    fn process_message(&self, msg: DecodedMessage) -> Result<()> {
        match msg.payload {
            Payload::Transaction(tx) => self.process_transaction(tx),
            Payload::Block(block) => self.process_block(block),
            Payload::GetStatus(_) => self.process_get_status(msg.from),
            Payload::Status(status) => {
                info!(
                    "{}: peer {} ({}) is at height {}",
                    self.id, msg.from, status.id, status.current_height
                );
                Ok(())
            }
        }
    }

    fn process_transaction(&self, tx: Transaction) -> Result<()> {
        let hash = tx.hash(&TxHasher);
        if self.mempool.contains(&hash) {
            debug!("{}: transaction {hash} already in mempool", self.id);
            return Ok(());
        }
        // An echo of something a block already carried
        if self.mempool.was_included(&hash) {
            debug!("{}: transaction {hash} already included", self.id);
            return Ok(());
        }

        tx.verify()?;

        let bytes = Message::from_transaction(&tx)?.bytes()?;
        if self.mempool.add(tx) {
            info!(
                "{}: added transaction {hash} to mempool (size {})",
                self.id,
                self.mempool.len()
            );
            self.outbound.enqueue(Outbound::Broadcast(bytes));
        }
        Ok(())
    }

    fn process_block(&self, block: Block) -> Result<()> {
        match self.chain.add_block(&block) {
            Ok(()) => {
                let removed = self.mempool.remove_included(block.get_transactions());
                debug!("{}: block {} cleared {removed} pooled transaction(s)", self.id, block.get_height());
                self.outbound
                    .enqueue(Outbound::Broadcast(Message::from_block(&block)?.bytes()?));
                Ok(())
            }
            Err(BlockchainError::Validation(ValidationError::AlreadyKnown { height, .. })) => {
                debug!("{}: block at height {height} already known", self.id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn process_get_status(&self, from: NetAddr) -> Result<()> {
        let status = StatusMessage {
            current_height: self.chain.height(),
            id: self.id.clone(),
        };
        let payload = Message::status(&status)?.bytes()?;
        self.outbound.enqueue(Outbound::Direct { to: from, payload });
        Ok(())
    }
}

/// Timer-driven block production
struct Producer {
    id: String,
    chain: Arc<Blockchain>,
    mempool: Arc<MemoryPool>,
    key: PrivateKey,
    outbound: Broadcaster,
}

impl Producer {
    async fn run(self, block_time: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(block_time);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.create_new_block() {
                        error!("{}: failed to create block: {e}", self.id);
                    }
                }
            }
        }
        debug!("{}: block producer stopped", self.id);
    }

    fn create_new_block(&self) -> Result<()> {
        let current = self.chain.current_header();
        let pending = self.mempool.pending();

        let block = BlockBuilder::from_prev_header(&current)?
            .with_transactions(pending)
            .sign(&self.key)?;
        self.chain.add_block(&block)?;

        // Only what went into the block; arrivals since the snapshot stay pooled
        self.mempool.remove_included(block.get_transactions());
        self.outbound
            .enqueue(Outbound::Broadcast(Message::from_block(&block)?.bytes()?));
        Ok(())
    }
}
