//! Authoritative, tickable world over a key-value backend.
//!
//! A [`World`] owns the component and transaction registries, the
//! committed state, the per-tick transaction queue, and the tick loop.
//! Each tick is atomic: a journal record of the tick's inputs is written
//! first, every registered system runs once against a staged write
//! buffer, and the buffer commits together with the tick counter in one
//! key-value transaction. A tick that fails, panics, or is interrupted
//! by a crash has no effect, and an interrupted tick is replayed from
//! the journal on the next [`World::load_state`].
//!
//! ```ignore
//! let kv: KvHandle = Arc::new(MemoryStore::new());
//! let mut world = World::new(kv, WorldOptions::new("my-world"))?;
//! world.register_component::<Position>()?;
//! let move_tx = world.register_transaction::<MoveInput, MoveResult>("move")?;
//! world.add_system("movement", move |ctx| {
//!     for (hash, input, _envelope) in ctx.transactions(&move_tx)? {
//!         // mutate state through ctx; nothing is durable until commit
//!     }
//!     Ok(())
//! })?;
//! world.load_state()?;
//! world.start_game()?;
//! ```

mod context;
mod error;
mod event;
mod persona;

pub use context::{CancelToken, ComponentBundle, Receipt, WorldContext};
pub use error::{AdmissionError, WorldError};
pub use event::{Event, EventHub, EventMode};
pub use persona::{
    authorize_persona_address_tx, create_persona_tx, AuthorizePersonaAddress,
    AuthorizePersonaAddressResult, CreatePersona, CreatePersonaResult, SignerComponent,
    AUTHORIZE_PERSONA_ADDRESS_TX_NAME, CREATE_PERSONA_TX_NAME,
};

pub use ward_codec::{Decode, Encode};
pub use ward_ecs::{Component, EntityId, Filter, GameState, StateError, TypeId, WriteBuffer};
pub use ward_kv::{KeySpace, Kv, KvHandle, MemoryStore, RedisStore};
pub use ward_tx::{
    NoopVerifier, QueuedTx, RejectingVerifier, SignatureVerifier, SignedTx, TxHash, TxQueue,
    TxRegistry, TxType, TxTypeId,
};

use std::collections::VecDeque;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use persona::{PersonaIndex, PersonaRecord};

/// Journal record written before a tick's systems run: the inputs
/// needed to re-execute the tick identically.
#[derive(Encode, Decode)]
struct PendingBatch {
    tick: u64,
    queue: TxQueue,
}

type SystemFn = Box<dyn FnMut(&mut WorldContext<'_>) -> anyhow::Result<()> + Send>;
type InitFn = Box<dyn FnOnce(&mut WorldContext<'_>) + Send>;

struct SystemEntry {
    name: String,
    run: SystemFn,
}

/// Construction parameters for a [`World`].
pub struct WorldOptions {
    namespace: String,
    tick_channel: Option<Receiver<Instant>>,
    tick_done_channel: Option<Sender<u64>>,
    disable_signature_verification: bool,
    event_mode: EventMode,
    verifier: Arc<dyn SignatureVerifier>,
    receipt_history: usize,
    tick_interval: Duration,
}

impl WorldOptions {
    /// Options for a world identified by `namespace`. Signatures are
    /// checked against the namespace, and all persisted keys carry it.
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            tick_channel: None,
            tick_done_channel: None,
            disable_signature_verification: false,
            event_mode: EventMode::default(),
            verifier: Arc::new(NoopVerifier),
            receipt_history: 5,
            tick_interval: Duration::from_secs(1),
        }
    }

    /// Drive ticks from an external channel instead of the internal
    /// timer. Mostly for tests.
    #[must_use]
    pub fn tick_channel(mut self, channel: Receiver<Instant>) -> Self {
        self.tick_channel = Some(channel);
        self
    }

    /// Receive every completed tick number on `channel`.
    #[must_use]
    pub fn tick_done_channel(mut self, channel: Sender<u64>) -> Self {
        self.tick_done_channel = Some(channel);
        self
    }

    /// Skip cryptographic signature verification during admission. All
    /// other admission checks still run. For tests.
    #[must_use]
    pub fn disable_signature_verification(mut self) -> Self {
        self.disable_signature_verification = true;
        self
    }

    #[must_use]
    pub fn event_mode(mut self, mode: EventMode) -> Self {
        self.event_mode = mode;
        self
    }

    /// Plug in the cryptographic primitive used to verify signatures.
    #[must_use]
    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// How many ticks of transaction receipts to retain.
    #[must_use]
    pub fn receipt_history(mut self, ticks: usize) -> Self {
        self.receipt_history = ticks;
        self
    }

    /// Interval of the internal tick timer. One second by default.
    #[must_use]
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

/// The world facade: registries, committed state, queue, and tick loop.
pub struct World {
    namespace: String,
    state: GameState,
    systems: Vec<SystemEntry>,
    init: Option<InitFn>,
    tx_registry: Arc<TxRegistry>,
    queue: Arc<Mutex<TxQueue>>,
    verifier: Arc<dyn SignatureVerifier>,
    disable_sig_verification: bool,
    personas: Arc<RwLock<PersonaIndex>>,
    hub: Arc<EventHub>,
    receipts: VecDeque<(u64, Vec<Receipt>)>,
    receipt_history: usize,
    tick_channel: Option<Receiver<Instant>>,
    tick_interval: Duration,
    tick_done: Option<Sender<u64>>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    running: Arc<AtomicBool>,
    observed_tick: Arc<AtomicU64>,
    loaded: bool,
    pending_in_journal: bool,
}

impl World {
    /// Build a world over an already-open backend.
    ///
    /// The built-in persona component and the two built-in transaction
    /// types are registered here, ahead of anything user code adds.
    pub fn new(kv: KvHandle, options: WorldOptions) -> Result<Self, WorldError> {
        let keys = KeySpace::new(&options.namespace);
        let mut state = GameState::new(kv, keys);
        state.registry_mut().register::<SignerComponent>()?;

        let mut tx_registry = TxRegistry::new();
        let create_id = tx_registry.register(CREATE_PERSONA_TX_NAME)?;
        let authorize_id = tx_registry.register(AUTHORIZE_PERSONA_ADDRESS_TX_NAME)?;
        debug_assert_eq!(create_id, persona::create_persona_tx().id());
        debug_assert_eq!(authorize_id, persona::authorize_persona_address_tx().id());

        let systems: Vec<SystemEntry> = vec![
            SystemEntry {
                name: CREATE_PERSONA_TX_NAME.to_string(),
                run: Box::new(persona::create_persona_system),
            },
            SystemEntry {
                name: AUTHORIZE_PERSONA_ADDRESS_TX_NAME.to_string(),
                run: Box::new(persona::authorize_persona_address_system),
            },
        ];

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            namespace: options.namespace,
            state,
            systems,
            init: None,
            tx_registry: Arc::new(tx_registry),
            queue: Arc::new(Mutex::new(TxQueue::new())),
            verifier: options.verifier,
            disable_sig_verification: options.disable_signature_verification,
            personas: Arc::new(RwLock::new(PersonaIndex::default())),
            hub: Arc::new(EventHub::new(options.event_mode)),
            receipts: VecDeque::new(),
            receipt_history: options.receipt_history,
            tick_channel: options.tick_channel,
            tick_interval: options.tick_interval,
            tick_done: options.tick_done_channel,
            shutdown_tx,
            shutdown_rx,
            running: Arc::new(AtomicBool::new(false)),
            observed_tick: Arc::new(AtomicU64::new(0)),
            loaded: false,
            pending_in_journal: false,
        })
    }

    /// Build a world over a Redis-compatible server at `kv_address`.
    pub fn connect(kv_address: &str, options: WorldOptions) -> Result<Self, WorldError> {
        let store = RedisStore::connect(kv_address)?;
        Self::new(Arc::new(store), options)
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.state.tick()
    }

    // ==================== Registration ====================

    /// Register a component type. Allowed only before `load_state`.
    pub fn register_component<T: Component>(&mut self) -> Result<(), WorldError> {
        if self.loaded {
            return Err(WorldError::SchemaFrozen);
        }
        match self.state.registry_mut().register::<T>() {
            Ok(_) => Ok(()),
            Err(StateError::ComponentAlreadyRegistered(name)) => Err(
                WorldError::ComponentRegistrationMustHappenOnce(name.to_string()),
            ),
            Err(err) => Err(err.into()),
        }
    }

    /// Register a transaction type. Allowed only before `load_state`.
    pub fn register_transaction<I, O>(
        &mut self,
        name: &'static str,
    ) -> Result<TxType<I, O>, WorldError>
    where
        I: Encode + Decode + Send + Sync + 'static,
        O: Encode + Decode + Send + Sync + 'static,
    {
        if self.loaded {
            return Err(WorldError::SchemaFrozen);
        }
        let registry = Arc::get_mut(&mut self.tx_registry).ok_or(WorldError::SchemaFrozen)?;
        let id = registry.register(name)?;
        Ok(TxType::new(id, name))
    }

    /// Append a system to the pipeline. Systems run once per tick in
    /// registration order, after the built-in persona systems.
    pub fn add_system<F>(&mut self, name: &str, system: F) -> Result<(), WorldError>
    where
        F: FnMut(&mut WorldContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        if self.loaded {
            return Err(WorldError::SchemaFrozen);
        }
        self.systems.push(SystemEntry {
            name: name.to_string(),
            run: Box::new(system),
        });
        Ok(())
    }

    /// Set a hook that runs inside the world's very first tick, before
    /// any system. Used to seed initial entities.
    pub fn init<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut WorldContext<'_>) + Send + 'static,
    {
        self.init = Some(Box::new(hook));
    }

    #[must_use]
    pub fn component_id<T: Component>(&self) -> Option<TypeId> {
        self.state.registry().id_of::<T>()
    }

    // ==================== Lifecycle ====================

    /// Load committed state and finish any interrupted tick.
    ///
    /// Verifies the persisted component manifest against the registered
    /// set, rebuilds all in-memory mirrors, and, when a pending batch is
    /// found in the journal, re-executes that tick with the journaled
    /// queue and the currently registered systems. Freezes the schema.
    pub fn load_state(&mut self) -> Result<(), WorldError> {
        self.state.load()?;
        self.observed_tick.store(self.state.tick(), Ordering::SeqCst);
        *self.personas.write() = persona::rebuild_index(&mut self.state)?;
        self.loaded = true;
        self.pending_in_journal = false;

        let journal_key = self.state.keys().pending_batch();
        if let Some(bytes) = self.state.kv().get(&journal_key)? {
            let batch: PendingBatch = ward_codec::decode_from_slice(&bytes)
                .map_err(|err| WorldError::CorruptJournal(err.to_string()))?;
            if batch.tick != self.state.tick() {
                return Err(WorldError::CorruptJournal(format!(
                    "journal is for tick {} but the world is at tick {}",
                    batch.tick,
                    self.state.tick()
                )));
            }
            tracing::info!(
                tick = batch.tick,
                transactions = batch.queue.len(),
                "replaying interrupted tick from journal"
            );
            self.pending_in_journal = true;
            self.run_tick(batch.queue, &CancelToken::new())?;
        }
        Ok(())
    }

    /// Execute one tick with a fresh cancellation token.
    pub fn tick(&mut self) -> Result<(), WorldError> {
        self.tick_with(&CancelToken::new())
    }

    /// Execute one tick, observing `token` between systems.
    pub fn tick_with(&mut self, token: &CancelToken) -> Result<(), WorldError> {
        if !self.loaded || self.pending_in_journal {
            return Err(WorldError::RecoveryRequired);
        }
        let snapshot = self.queue.lock().take();
        self.run_tick(snapshot, token)
    }

    /// Run the tick loop until `shutdown` is called or the trigger
    /// channel closes. A failed tick stops the loop with its error; the
    /// journal keeps the tick replayable after a restart.
    pub fn start_game(&mut self) -> Result<(), WorldError> {
        if !self.loaded {
            return Err(WorldError::StateNotLoaded);
        }
        let trigger = match self.tick_channel.take() {
            Some(channel) => channel,
            None => crossbeam_channel::tick(self.tick_interval),
        };
        let shutdown = self.shutdown_rx.clone();
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(namespace = %self.namespace, "game loop started");

        let result = loop {
            crossbeam_channel::select! {
                recv(trigger) -> msg => {
                    if msg.is_err() {
                        break Ok(());
                    }
                    match self.tick() {
                        Ok(()) => {}
                        Err(WorldError::TickCancelled) => {}
                        // A failed tick is never retried automatically;
                        // surfacing it makes the retry a deployment
                        // decision.
                        Err(err) => break Err(err),
                    }
                }
                recv(shutdown) -> _ => {
                    break Ok(());
                }
            }
        };

        self.running.store(false, Ordering::SeqCst);
        self.hub.close();
        tracing::info!(namespace = %self.namespace, "game loop stopped");
        result
    }

    /// Stop the tick loop at the next tick boundary and close the event
    /// hub. Idempotent; an in-progress tick finishes or fails on its
    /// own.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        if !self.running.load(Ordering::SeqCst) {
            self.hub.close();
        }
    }

    #[must_use]
    pub fn is_game_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Subscribe to the event stream.
    #[must_use]
    pub fn subscribe_events(&self) -> Receiver<Event> {
        self.hub.subscribe()
    }

    // ==================== Tick execution ====================

    fn run_tick(&mut self, snapshot: TxQueue, token: &CancelToken) -> Result<(), WorldError> {
        let tick = self.state.tick();
        let journal = ward_codec::encode_to_vec(&PendingBatch {
            tick,
            queue: snapshot.clone(),
        })?;
        self.state
            .kv()
            .set_many(vec![(self.state.keys().pending_batch(), journal)])?;
        // The journal outlives any failure below. Only a successful
        // commit clears it, so a rolled-back or interrupted tick is
        // re-executed with identical inputs by the recovery protocol.
        self.pending_in_journal = true;

        tracing::info!(tick, "Tick started");
        let started = Instant::now();

        let mut buffer = WriteBuffer::new(&self.state);
        let mut events: Vec<Event> = Vec::new();
        let mut receipts: Vec<Receipt> = Vec::new();
        let mut pending_personas: Vec<PersonaRecord> = Vec::new();

        let personas = Arc::clone(&self.personas);
        let personas_guard = personas.read();
        let init = if tick == 0 { self.init.take() } else { None };

        let state = &mut self.state;
        let systems = &mut self.systems;

        if let Some(init) = init {
            let mut ctx = WorldContext {
                state: &mut *state,
                buffer: &mut buffer,
                queue: &snapshot,
                tick,
                events: &mut events,
                receipts: &mut receipts,
                cancel: token,
                personas: &*personas_guard,
                pending_personas: &mut pending_personas,
            };
            if let Err(panic) = catch_unwind(AssertUnwindSafe(move || init(&mut ctx))) {
                tracing::error!("Tick: {}, Current running system: init", tick);
                resume_unwind(panic);
            }
        }

        for entry in systems.iter_mut() {
            if token.is_cancelled() {
                return Err(WorldError::TickCancelled);
            }

            let mut ctx = WorldContext {
                state: &mut *state,
                buffer: &mut buffer,
                queue: &snapshot,
                tick,
                events: &mut events,
                receipts: &mut receipts,
                cancel: token,
                personas: &*personas_guard,
                pending_personas: &mut pending_personas,
            };
            match catch_unwind(AssertUnwindSafe(|| (entry.run)(&mut ctx))) {
                Err(panic) => {
                    tracing::error!("Tick: {}, Current running system: {}", tick, entry.name);
                    resume_unwind(panic);
                }
                Ok(Err(source)) => {
                    tracing::error!(
                        tick,
                        system = entry.name.as_str(),
                        error = %source,
                        "system failed; tick rolled back"
                    );
                    return Err(WorldError::System {
                        system: entry.name.clone(),
                        source,
                    });
                }
                Ok(Ok(())) => {}
            }
        }

        if token.is_cancelled() {
            return Err(WorldError::TickCancelled);
        }
        drop(personas_guard);

        // Commit: the staged buffer, the advanced tick counter, and the
        // journal delete land in one atomic transaction. On failure the
        // journal stays for the recovery protocol to replay.
        let next_tick = tick + 1;
        buffer.commit(state, next_tick)?;
        self.pending_in_journal = false;
        self.observed_tick.store(next_tick, Ordering::SeqCst);

        if !pending_personas.is_empty() {
            let mut index = self.personas.write();
            for record in pending_personas {
                index.insert(record);
            }
        }

        if !receipts.is_empty() {
            tracing::debug!(tick, count = receipts.len(), "transaction receipts recorded");
        }
        self.receipts.push_back((tick, receipts));
        while self.receipts.len() > self.receipt_history {
            self.receipts.pop_front();
        }

        // Delivery is best effort and outside the atomic commit.
        self.hub.emit_batch(&events);

        let elapsed = started.elapsed();
        tracing::info!(tick, elapsed_ms = elapsed.as_millis() as u64, "Tick ended");
        if elapsed.as_millis() > 100 {
            tracing::warn!(
                tick,
                elapsed_ms = elapsed.as_millis() as u64,
                "tick duration exceeded 100ms"
            );
        }

        if let Some(done) = &self.tick_done {
            let _ = done.send(next_tick);
        }
        Ok(())
    }

    // ==================== Out-of-band state access ====================

    /// Create one entity directly in committed state. Valid between
    /// ticks only; the tick counter does not advance.
    pub fn create_entity<B: ComponentBundle>(&mut self) -> Result<EntityId, WorldError> {
        let mut created = self.create_entities::<B>(1)?;
        Ok(created.remove(0))
    }

    /// Create `count` entities directly in committed state.
    pub fn create_entities<B: ComponentBundle>(
        &mut self,
        count: usize,
    ) -> Result<Vec<EntityId>, WorldError> {
        if !self.loaded {
            return Err(WorldError::StateNotLoaded);
        }
        if self.pending_in_journal {
            return Err(WorldError::RecoveryRequired);
        }
        let ids = B::type_ids(self.state.registry())?;
        let mut buffer = WriteBuffer::new(&self.state);
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(buffer.create(&self.state, &ids)?);
        }
        let tick = self.state.tick();
        buffer.commit(&mut self.state, tick)?;
        Ok(out)
    }

    /// Read a component from committed state.
    pub fn get_component<T: Component>(&mut self, entity: EntityId) -> Result<T, WorldError> {
        let type_id = self
            .state
            .registry()
            .id_of::<T>()
            .ok_or(WorldError::ComponentNotRegistered(T::NAME))?;
        let bytes = self.state.committed_cell(entity, type_id)?;
        Ok(ward_codec::decode_from_slice(&bytes)?)
    }

    /// Entities matching the filter in committed state.
    #[must_use]
    pub fn search(&self, filter: &Filter) -> Vec<EntityId> {
        let buffer = WriteBuffer::new(&self.state);
        buffer.search(&self.state, filter).collect()
    }

    pub fn filter_exact<B: ComponentBundle>(&self) -> Result<Filter, WorldError> {
        Ok(Filter::exact(&B::type_ids(self.state.registry())?))
    }

    pub fn filter_contains<B: ComponentBundle>(&self) -> Result<Filter, WorldError> {
        Ok(Filter::contains(&B::type_ids(self.state.registry())?))
    }

    /// Receipts recorded during `tick`, while still retained.
    #[must_use]
    pub fn receipts_for_tick(&self, tick: u64) -> Option<Vec<Receipt>> {
        self.receipts
            .iter()
            .find(|(t, _)| *t == tick)
            .map(|(_, receipts)| receipts.clone())
    }

    // ==================== Admission ====================

    /// A cloneable handle for admitting transactions from other threads
    /// (the network front end). Valid once the world is loaded.
    #[must_use]
    pub fn admission_handle(&self) -> AdmissionHandle {
        AdmissionHandle {
            namespace: self.namespace.clone(),
            nonce_key: self.state.keys().nonces(),
            kv: Arc::clone(self.state.kv()),
            queue: Arc::clone(&self.queue),
            verifier: Arc::clone(&self.verifier),
            disable_sig_verification: self.disable_sig_verification,
            tx_registry: Arc::clone(&self.tx_registry),
            personas: Arc::clone(&self.personas),
            observed_tick: Arc::clone(&self.observed_tick),
        }
    }

    /// Admit a user-path transaction into the queue.
    pub fn submit(&self, tx_name: &str, tx: SignedTx) -> Result<TxHash, AdmissionError> {
        self.admission_handle().submit(tx_name, tx)
    }

    /// Admit a system-path transaction into the queue.
    pub fn submit_system(&self, tx_name: &str, tx: SignedTx) -> Result<TxHash, AdmissionError> {
        self.admission_handle().submit_system(tx_name, tx)
    }

    /// The signer address bound to `persona_tag`, as observable at
    /// `tick`. A registration from tick `t` becomes observable once the
    /// world has committed past `t`.
    pub fn signer_for(&self, persona_tag: &str, tick: u64) -> Result<String, AdmissionError> {
        self.admission_handle().signer_for(persona_tag, tick)
    }

    pub fn get_nonce(&self, signer_address: &str) -> Result<u64, AdmissionError> {
        self.admission_handle().get_nonce(signer_address)
    }

    pub fn set_nonce(&self, signer_address: &str, nonce: u64) -> Result<(), AdmissionError> {
        self.admission_handle().set_nonce(signer_address, nonce)
    }

    /// Queue a transaction directly, without the admission checks. The
    /// envelope is unsigned and carries the world's namespace. For
    /// internal producers and tests.
    pub fn enqueue<I: Encode, O>(
        &self,
        tx_type: &TxType<I, O>,
        input: I,
    ) -> Result<TxHash, WorldError> {
        self.enqueue_as(tx_type, input, "")
    }

    /// Queue a transaction directly with an explicit persona tag.
    pub fn enqueue_as<I: Encode, O>(
        &self,
        tx_type: &TxType<I, O>,
        input: I,
        persona_tag: &str,
    ) -> Result<TxHash, WorldError> {
        let body = tx_type.encode_input(&input)?;
        let tx = SignedTx::unsigned(persona_tag, &self.namespace, 0, body);
        let hash = tx.hash();
        self.queue.lock().push(QueuedTx {
            type_id: tx_type.id(),
            hash,
            tx,
        });
        Ok(hash)
    }

    /// Number of transactions waiting for the next tick.
    #[must_use]
    pub fn queued_transactions(&self) -> usize {
        self.queue.lock().len()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("namespace", &self.namespace)
            .field("tick", &self.state.tick())
            .field("systems", &self.systems.len())
            .field("loaded", &self.loaded)
            .finish()
    }
}

/// Admits signed transactions into a world's queue. Cloneable and
/// thread-safe; admission never blocks a running tick beyond the queue
/// push itself.
#[derive(Clone)]
pub struct AdmissionHandle {
    namespace: String,
    nonce_key: String,
    kv: KvHandle,
    queue: Arc<Mutex<TxQueue>>,
    verifier: Arc<dyn SignatureVerifier>,
    disable_sig_verification: bool,
    tx_registry: Arc<TxRegistry>,
    personas: Arc<RwLock<PersonaIndex>>,
    observed_tick: Arc<AtomicU64>,
}

impl AdmissionHandle {
    pub fn submit(&self, tx_name: &str, tx: SignedTx) -> Result<TxHash, AdmissionError> {
        self.admit(tx_name, tx, false)
    }

    pub fn submit_system(&self, tx_name: &str, tx: SignedTx) -> Result<TxHash, AdmissionError> {
        self.admit(tx_name, tx, true)
    }

    fn admit(
        &self,
        tx_name: &str,
        tx: SignedTx,
        system_path: bool,
    ) -> Result<TxHash, AdmissionError> {
        let type_id = self
            .tx_registry
            .id_by_name(tx_name)
            .ok_or_else(|| AdmissionError::UnknownTransactionType(tx_name.to_string()))?;

        if tx.persona_tag.is_empty() {
            return Err(AdmissionError::EmptyPersonaTag);
        }
        if tx.namespace != self.namespace {
            return Err(AdmissionError::InvalidSignature(format!(
                "got namespace {:?} but it must be {:?}",
                tx.namespace, self.namespace
            )));
        }
        if system_path && !tx.system {
            return Err(AdmissionError::SystemTransactionRequired);
        }
        if !system_path && tx.system {
            return Err(AdmissionError::SystemTransactionForbidden);
        }

        // Resolve the signer: a persona claim names its own address,
        // everything else signs as a previously registered persona.
        let signer_address = if type_id == persona::create_persona_tx().id() {
            let input: CreatePersona = ward_codec::decode_from_slice(&tx.body)?;
            input.signer_address
        } else {
            self.signer_for(&tx.persona_tag, 0)?
        };

        let stored = self.get_nonce(&signer_address)?;
        if tx.nonce <= stored {
            return Err(AdmissionError::InvalidSignature(format!(
                "got nonce {} but it must be greater than {stored}",
                tx.nonce
            )));
        }

        if !self.disable_sig_verification {
            self.verifier
                .verify(&tx, &signer_address)
                .map_err(|err| AdmissionError::InvalidSignature(err.to_string()))?;
        }

        // Nonce advance and queue append happen under the queue lock so
        // the executor's snapshot never splits them. The nonce is
        // checked again here: two racing submissions for one signer can
        // both pass the pre-lock check with the same stale value, and
        // the loser must still be turned away before it reaches the
        // queue.
        let hash = tx.hash();
        let mut queue = self.queue.lock();
        let stored = self.get_nonce(&signer_address)?;
        if tx.nonce <= stored {
            return Err(AdmissionError::InvalidSignature(format!(
                "got nonce {} but it must be greater than {stored}",
                tx.nonce
            )));
        }
        self.store_nonce(&signer_address, tx.nonce)?;
        queue.push(QueuedTx { type_id, hash, tx });
        Ok(hash)
    }

    /// See [`World::signer_for`]. Querying at a tick the world has not
    /// committed past reports the registrations as not yet processed.
    pub fn signer_for(&self, persona_tag: &str, tick: u64) -> Result<String, AdmissionError> {
        let current = self.observed_tick.load(Ordering::SeqCst);
        if tick >= current {
            return Err(AdmissionError::CreatePersonaTxsNotProcessed);
        }
        self.personas
            .read()
            .get(persona_tag)
            .map(|record| record.address.clone())
            .ok_or_else(|| AdmissionError::PersonaTagHasNoSigner(persona_tag.to_string()))
    }

    /// Last accepted nonce for a signer; zero when never seen.
    pub fn get_nonce(&self, signer_address: &str) -> Result<u64, AdmissionError> {
        match self.kv.hget(&self.nonce_key, signer_address)? {
            None => Ok(0),
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    AdmissionError::InvalidSignature(format!(
                        "stored nonce for {signer_address} is malformed"
                    ))
                })?;
                Ok(u64::from_be_bytes(raw))
            }
        }
    }

    /// Advance a signer's nonce. Nonces only move forward; a lower
    /// value is ignored.
    pub fn set_nonce(&self, signer_address: &str, nonce: u64) -> Result<(), AdmissionError> {
        self.store_nonce(signer_address, nonce)
    }

    fn store_nonce(&self, signer_address: &str, nonce: u64) -> Result<(), AdmissionError> {
        if nonce <= self.get_nonce(signer_address)? {
            return Ok(());
        }
        self.kv
            .hset(&self.nonce_key, signer_address, &nonce.to_be_bytes())?;
        Ok(())
    }
}
