use crate::bus::{MessageBus, Subscription};
use crate::conversation::ConversationSync;
use crate::keybind::{KeyEvent, Keybind};
use crate::protocol::{Envelope, MessageKind};
use crate::settings::{Position, Settings};
use crate::surface::{SurfaceConfig, SurfaceLifecycleManager};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Slot identifier for the single ask-bar surface.
pub const ASK_BAR_SLOT: &str = "askbar-overlay";

/// Hide requests arriving this soon after the surface was constructed are
/// assumed to come from the same gesture that opened it and are ignored.
pub const DISMISS_GRACE: Duration = Duration::from_millis(200);

/// Host document identity, owned by the embedding context.
pub trait HostPage {
    fn url(&self) -> String;
    fn title(&self) -> String;
    fn tab_id(&self) -> Option<u32>;
    /// Give keyboard focus back to the host page so the toggle keybind keeps
    /// working after the surface is gone.
    fn restore_focus(&self);
}

enum Deferred {
    Hide,
}

/// Wires the bus, lifecycle manager and conversation synchronizer together
/// and is the sole writer of the surface-visible state.
pub struct OverlayCoordinator {
    bus: Rc<MessageBus>,
    surfaces: Rc<RefCell<SurfaceLifecycleManager>>,
    conversation: Rc<RefCell<ConversationSync>>,
    host: Rc<dyn HostPage>,
    enabled: bool,
    keybind: Keybind,
    position: Position,
    visible: bool,
    on_open: Option<Box<dyn Fn()>>,
    deferred: Rc<RefCell<VecDeque<Deferred>>>,
    subscriptions: Vec<Subscription>,
    destroyed: bool,
}

impl OverlayCoordinator {
    pub fn new(
        bus: Rc<MessageBus>,
        surfaces: Rc<RefCell<SurfaceLifecycleManager>>,
        conversation: Rc<RefCell<ConversationSync>>,
        host: Rc<dyn HostPage>,
        settings: &Settings,
    ) -> Self {
        Self {
            bus,
            surfaces,
            conversation,
            host,
            enabled: settings.features.ask_bar.is_enabled,
            keybind: settings.ask_bar_keybind(),
            position: settings.features.ask_bar.position,
            visible: false,
            on_open: None,
            deferred: Rc::new(RefCell::new(VecDeque::new())),
            subscriptions: Vec::new(),
            destroyed: false,
        }
    }

    /// Callback fired once per Hidden -> Visible transition, for collaborators
    /// that eagerly prepare content when the surface opens.
    pub fn set_on_open(&mut self, callback: impl Fn() + 'static) {
        self.on_open = Some(Box::new(callback));
    }

    /// Register the host-side message handlers. Call once after construction.
    pub fn init(&mut self) {
        let close_sub = {
            let deferred = Rc::clone(&self.deferred);
            self.bus.subscribe(MessageKind::Close, move |_| {
                deferred.borrow_mut().push_back(Deferred::Hide);
            })
        };
        let update_sub = {
            let conversation = Rc::clone(&self.conversation);
            self.bus.subscribe(MessageKind::UpdateConversation, move |env| {
                if let Envelope::UpdateConversation {
                    messages,
                    conversation_id,
                } = env
                {
                    conversation
                        .borrow_mut()
                        .set_messages(messages.clone(), conversation_id.clone());
                }
            })
        };
        let identity_sub = {
            let surfaces = Rc::clone(&self.surfaces);
            let host = Rc::clone(&self.host);
            self.bus.subscribe(MessageKind::GetCurrentTab, move |_| {
                if let Some(instance) = surfaces.borrow().get_instance(ASK_BAR_SLOT) {
                    instance.post(&Envelope::CurrentTabResponse {
                        tab_id: host.tab_id(),
                        url: host.url(),
                        title: host.title(),
                    });
                }
            })
        };
        self.subscriptions
            .extend([close_sub, update_sub, identity_sub]);
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Toggle contract for the global keybind: when the feature is enabled
    /// and the event matches the configured binding, flip visibility. Returns
    /// whether the event was consumed.
    pub fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if !self.enabled || !self.keybind.matches(event) {
            return false;
        }
        if self.visible {
            self.hide();
        } else if let Err(e) = self.show() {
            tracing::error!("failed to open overlay: {e}");
        }
        true
    }

    /// Hidden -> Visible. No-op when disabled or already visible. On inject
    /// failure the transition aborts and the state stays Hidden.
    pub fn show(&mut self) -> anyhow::Result<()> {
        if !self.enabled || self.visible {
            return Ok(());
        }

        let existing_conversation = {
            let conversation = self.conversation.borrow();
            if conversation.messages().is_empty() {
                None
            } else {
                Some(conversation.record().clone())
            }
        };
        let config = SurfaceConfig {
            slot_id: ASK_BAR_SLOT.to_string(),
            position: self.position.as_str().to_string(),
            existing_conversation,
            page_url: self.host.url(),
            page_title: self.host.title(),
            tab_id: self.host.tab_id(),
        };

        if let Err(e) = self.surfaces.borrow_mut().inject(config) {
            tracing::error!("surface injection failed, staying hidden: {e}");
            return Err(e);
        }
        self.visible = true;
        if let Some(callback) = &self.on_open {
            callback();
        }
        Ok(())
    }

    /// Visible -> Hidden. No-op when already hidden; suppressed inside the
    /// grace window after construction so the opening gesture cannot also
    /// dismiss the surface.
    pub fn hide(&mut self) {
        if !self.visible {
            return;
        }
        let in_grace = self
            .surfaces
            .borrow()
            .get_instance(ASK_BAR_SLOT)
            .is_some_and(|i| i.created_at().elapsed() < DISMISS_GRACE);
        if in_grace {
            tracing::debug!("ignoring hide request during dismiss grace window");
            return;
        }
        self.force_hide();
    }

    fn force_hide(&mut self) {
        if !self.visible {
            return;
        }
        // Flush before teardown so no in-flight edits are lost.
        self.conversation.borrow_mut().flush();
        self.surfaces.borrow_mut().remove(ASK_BAR_SLOT);
        self.visible = false;
        self.host.restore_focus();
    }

    /// Re-apply live configuration: re-arm the keybind and tear the surface
    /// down when the feature was just disabled (the grace window does not
    /// protect against an explicit disable).
    pub fn on_settings_changed(&mut self, settings: &Settings) {
        self.enabled = settings.features.ask_bar.is_enabled;
        self.keybind = settings.ask_bar_keybind();
        self.position = settings.features.ask_bar.position;
        tracing::debug!(enabled = self.enabled, "settings re-applied");
        if !self.enabled && self.visible {
            self.force_hide();
        }
    }

    /// Drive deferred work: close requests queued by message handlers, the
    /// lifecycle manager's delayed geometry request, and the conversation
    /// persistence debounce.
    pub fn tick(&mut self, now: Instant) {
        loop {
            let action = self.deferred.borrow_mut().pop_front();
            match action {
                Some(Deferred::Hide) => self.hide(),
                None => break,
            }
        }
        self.surfaces.borrow().tick(now);
        self.conversation.borrow_mut().tick(now);
    }

    /// Forward a host-wide pointer sample to the live surface's arbiter.
    pub fn on_pointer_move(&self, x: f64, y: f64) {
        self.surfaces.borrow().on_pointer_move(ASK_BAR_SLOT, x, y);
    }

    /// The embedder signals that the injected surface finished loading.
    pub fn notify_surface_ready(&self) {
        self.surfaces.borrow().notify_ready(ASK_BAR_SLOT);
    }

    /// Full teardown. Idempotent.
    pub fn cleanup(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.force_hide();
        for sub in self.subscriptions.drain(..) {
            self.bus.unsubscribe(sub);
        }
    }
}
