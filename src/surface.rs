use crate::arbiter::PointerArbiter;
use crate::bus::{MessageBus, Subscription};
use crate::protocol::{ConversationRecord, Envelope, MessageKind};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Delay between the surface signalling readiness and the host asking it to
/// report geometry, so the surface has laid itself out first.
pub const BOUNDS_REQUEST_DELAY: Duration = Duration::from_millis(100);

/// Host-side handle to one embedded surface. Implementations use interior
/// mutability; the handle is shared between the instance and its arbiter.
pub trait SurfaceHandle {
    /// Toggle whether the surface accepts pointer input (the inverse of
    /// click-through).
    fn set_input_enabled(&self, enabled: bool);
    /// Send an envelope into the surface context.
    fn post(&self, env: &Envelope) -> anyhow::Result<()>;
    /// Remove the surface from the host document.
    fn detach(&self);
}

/// Creates surfaces in the host document. Creation failure is fatal to the
/// visibility transition that requested it.
pub trait SurfaceFactory {
    fn create(&self, slot_id: &str, style: &SurfaceStyle) -> anyhow::Result<Rc<dyn SurfaceHandle>>;
}

/// Presentation the factory must apply: fixed full-viewport, transparent,
/// stacked above everything, and click-through until the arbiter says
/// otherwise. Rendering itself happens outside this crate.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceStyle {
    pub full_viewport: bool,
    pub transparent: bool,
    pub click_through: bool,
    pub z_index: i64,
}

impl SurfaceStyle {
    pub fn overlay() -> Self {
        Self {
            full_viewport: true,
            transparent: true,
            click_through: true,
            z_index: i64::from(i32::MAX),
        }
    }
}

/// Everything needed to inject one surface and seed its handshake.
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    pub slot_id: String,
    pub position: String,
    pub existing_conversation: Option<ConversationRecord>,
    pub page_url: String,
    pub page_title: String,
    pub tab_id: Option<u32>,
}

struct Handshake {
    existing_conversation: Option<ConversationRecord>,
    position: String,
    page_url: String,
    page_title: String,
    tab_id: Option<u32>,
}

/// One live injected surface: the underlying handle, its pointer arbiter and
/// the bus subscriptions registered on its behalf.
pub struct SurfaceInstance {
    slot_id: String,
    handle: Rc<dyn SurfaceHandle>,
    arbiter: Rc<RefCell<PointerArbiter>>,
    subscriptions: RefCell<Vec<Subscription>>,
    handshake: RefCell<Option<Handshake>>,
    pending_bounds_request: Cell<Option<Instant>>,
    created_at: Instant,
}

impl SurfaceInstance {
    pub fn slot_id(&self) -> &str {
        &self.slot_id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn arbiter(&self) -> &Rc<RefCell<PointerArbiter>> {
        &self.arbiter
    }

    /// Send an envelope into the surface. Transport failures are logged and
    /// swallowed.
    pub fn post(&self, env: &Envelope) {
        if let Err(e) = self.handle.post(env) {
            tracing::warn!(slot = %self.slot_id, "failed to post to surface: {e}");
        }
    }

    /// Run the initialization handshake. Fires at most once, when the
    /// surface signals readiness: seeds it with the conversation snapshot
    /// and viewport position, answers its identity eagerly, then schedules
    /// a geometry request.
    fn initialize(&self, now: Instant) {
        let Some(handshake) = self.handshake.borrow_mut().take() else {
            return;
        };
        self.post(&Envelope::Init {
            existing_conversation: handshake.existing_conversation,
            position: handshake.position,
        });
        self.post(&Envelope::CurrentTabResponse {
            tab_id: handshake.tab_id,
            url: handshake.page_url,
            title: handshake.page_title,
        });
        self.pending_bounds_request
            .set(Some(now + BOUNDS_REQUEST_DELAY));
        tracing::debug!(slot = %self.slot_id, "surface initialized");
    }

    fn tick(&self, now: Instant) {
        if let Some(due) = self.pending_bounds_request.get() {
            if now >= due {
                self.pending_bounds_request.set(None);
                self.post(&Envelope::RequestBounds {});
            }
        }
    }

    /// Cleanup (release every listener registered for this instance) then
    /// removal (detach the surface from the document).
    fn teardown(&self, bus: &MessageBus) {
        for sub in self.subscriptions.borrow_mut().drain(..) {
            bus.unsubscribe(sub);
        }
        self.pending_bounds_request.set(None);
        self.handle.detach();
        tracing::debug!(slot = %self.slot_id, "surface removed");
    }
}

/// Owns at most one live surface per slot and guarantees idempotent
/// replacement: injecting into an occupied slot fully tears the old
/// instance down before the new one is constructed.
pub struct SurfaceLifecycleManager {
    bus: Rc<MessageBus>,
    factory: Box<dyn SurfaceFactory>,
    instances: HashMap<String, Rc<SurfaceInstance>>,
}

impl SurfaceLifecycleManager {
    pub fn new(bus: Rc<MessageBus>, factory: Box<dyn SurfaceFactory>) -> Self {
        Self {
            bus,
            factory,
            instances: HashMap::new(),
        }
    }

    pub fn inject(&mut self, config: SurfaceConfig) -> anyhow::Result<Rc<SurfaceInstance>> {
        self.remove(&config.slot_id);

        let handle = self.factory.create(&config.slot_id, &SurfaceStyle::overlay())?;
        let arbiter = Rc::new(RefCell::new(PointerArbiter::new(Rc::clone(&handle))));

        let bounds_sub = {
            let arbiter = Rc::clone(&arbiter);
            self.bus.subscribe(MessageKind::Bounds, move |env| {
                if let Envelope::Bounds { bounds } = env {
                    arbiter.borrow_mut().set_region(*bounds);
                }
            })
        };
        let lock_sub = {
            let arbiter = Rc::clone(&arbiter);
            self.bus.subscribe(MessageKind::PointerLock, move |env| {
                if let Envelope::PointerLock { enabled } = env {
                    arbiter.borrow_mut().set_override(*enabled);
                }
            })
        };

        let instance = Rc::new(SurfaceInstance {
            slot_id: config.slot_id.clone(),
            handle,
            arbiter,
            subscriptions: RefCell::new(vec![bounds_sub, lock_sub]),
            handshake: RefCell::new(Some(Handshake {
                existing_conversation: config.existing_conversation,
                position: config.position,
                page_url: config.page_url,
                page_title: config.page_title,
                tab_id: config.tab_id,
            })),
            pending_bounds_request: Cell::new(None),
            created_at: Instant::now(),
        });

        self.instances
            .insert(config.slot_id.clone(), Rc::clone(&instance));
        tracing::info!(slot = %config.slot_id, "surface injected");
        Ok(instance)
    }

    /// No-op when the slot is empty. Otherwise cleanup, removal, registry
    /// delete, in that order; afterwards no handler registered for the
    /// instance can fire again.
    pub fn remove(&mut self, slot_id: &str) {
        if let Some(instance) = self.instances.remove(slot_id) {
            instance.teardown(&self.bus);
        }
    }

    pub fn get_instance(&self, slot_id: &str) -> Option<&Rc<SurfaceInstance>> {
        self.instances.get(slot_id)
    }

    /// Surface readiness signal from the embedder; triggers the handshake.
    pub fn notify_ready(&self, slot_id: &str) {
        if let Some(instance) = self.instances.get(slot_id) {
            instance.initialize(Instant::now());
        }
    }

    /// Forward a host-wide pointer sample to the slot's arbiter.
    pub fn on_pointer_move(&self, slot_id: &str, x: f64, y: f64) {
        if let Some(instance) = self.instances.get(slot_id) {
            instance.arbiter.borrow_mut().on_pointer_move(x, y);
        }
    }

    /// Drive delayed work (the post-handshake geometry request).
    pub fn tick(&self, now: Instant) {
        for instance in self.instances.values() {
            instance.tick(now);
        }
    }
}
