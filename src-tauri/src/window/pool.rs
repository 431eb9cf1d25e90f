// Window pool manager
//
// Owns the single toolbar window and the pre-warmed action windows. Popped
// windows move to the in-use set and are destroyed on close, never returned.

use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use super::{
    SharedWindow, WindowFactory, WindowId, ACTION_WINDOW_HEIGHT, ACTION_WINDOW_MIN_HEIGHT,
    ACTION_WINDOW_MIN_WIDTH, ACTION_WINDOW_WIDTH,
};
use crate::geometry::Size;

/// Number of hidden action windows kept ready.
pub const DEFAULT_PRELOAD_COUNT: usize = 1;

/// Asks the owner to call [`WindowPool::refill`] on a later turn of its loop.
pub type RefillScheduler = Box<dyn Fn() + Send>;

pub struct WindowPool {
    factory: Box<dyn WindowFactory>,
    schedule_refill: RefillScheduler,
    preload_count: usize,
    toolbar: Option<SharedWindow>,
    pooled: Vec<SharedWindow>,
    in_use: HashMap<WindowId, SharedWindow>,
    /// Size each in-use window was last given by placement
    placed: HashMap<WindowId, Size>,
    result: Option<SharedWindow>,
    remember_size: bool,
    last_size: Option<Size>,
}

impl WindowPool {
    pub fn new(
        factory: Box<dyn WindowFactory>,
        preload_count: usize,
        schedule_refill: RefillScheduler,
    ) -> Self {
        Self {
            factory,
            schedule_refill,
            preload_count,
            toolbar: None,
            pooled: Vec::new(),
            in_use: HashMap::new(),
            placed: HashMap::new(),
            result: None,
            remember_size: false,
            last_size: None,
        }
    }

    pub fn factory(&self) -> &dyn WindowFactory {
        self.factory.as_ref()
    }

    // ===== Toolbar =====

    /// Create the toolbar unless a live one exists. Returns the new window, or
    /// `None` when nothing was created.
    pub fn create_toolbar_window(&mut self, size: Size) -> Option<SharedWindow> {
        if self.toolbar().is_some() {
            return None;
        }

        match self.factory.create_toolbar(size) {
            Ok(window) => {
                info!("Toolbar window created: {}", window.id());
                self.toolbar = Some(window.clone());
                Some(window)
            }
            Err(e) => {
                error!("Failed to create toolbar window: {}", e);
                None
            }
        }
    }

    /// The toolbar, if it is still alive
    pub fn toolbar(&self) -> Option<&SharedWindow> {
        self.toolbar.as_ref().filter(|w| w.is_alive())
    }

    pub fn is_toolbar(&self, id: &WindowId) -> bool {
        self.toolbar.as_ref().is_some_and(|w| w.id() == id)
    }

    pub fn destroy_toolbar(&mut self) {
        if let Some(toolbar) = self.toolbar.take() {
            if toolbar.is_alive() {
                toolbar.destroy();
            }
        }
    }

    // ===== Action windows =====

    pub fn set_remember_size(&mut self, remember: bool) {
        self.remember_size = remember;
    }

    /// Size for the next action window
    pub fn action_window_size(&self) -> Size {
        match self.last_size {
            Some(size) if self.remember_size => size,
            _ => Size::new(ACTION_WINDOW_WIDTH, ACTION_WINDOW_HEIGHT),
        }
    }

    pub fn pooled_count(&self) -> usize {
        self.pooled.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    pub fn in_use(&self, id: &WindowId) -> Option<&SharedWindow> {
        self.in_use.get(id)
    }

    pub fn in_use_ids(&self) -> Vec<WindowId> {
        self.in_use.keys().cloned().collect()
    }

    pub fn is_pooled(&self, id: &WindowId) -> bool {
        self.pooled.iter().any(|w| w.id() == id)
    }

    /// Fill the pool up to the preload count.
    pub fn init_preloaded_action_windows(&mut self) {
        while self.pooled.len() < self.preload_count {
            if !self.push_new_action_window() {
                break;
            }
        }
        debug!("Action window pool holds {}", self.pooled.len());
    }

    /// Top the pool up by one window. Never grows past the preload count.
    pub fn refill(&mut self) {
        self.pooled.retain(|w| w.is_alive());
        if self.pooled.len() < self.preload_count {
            self.push_new_action_window();
        }
    }

    fn push_new_action_window(&mut self) -> bool {
        match self.factory.create_action(self.action_window_size()) {
            Ok(window) => {
                self.pooled.push(window);
                true
            }
            Err(e) => {
                warn!("Failed to preload action window: {}", e);
                false
            }
        }
    }

    /// Take the last pooled window, or build one on the spot when the pool
    /// is empty. A refill is always scheduled.
    pub fn pop_action_window(&mut self) -> Option<SharedWindow> {
        let mut window = None;
        while let Some(candidate) = self.pooled.pop() {
            if candidate.is_alive() {
                window = Some(candidate);
                break;
            }
        }

        let window = match window {
            Some(window) => Some(window),
            None => {
                debug!("Action window pool empty, creating on demand");
                match self.factory.create_action(self.action_window_size()) {
                    Ok(window) => Some(window),
                    Err(e) => {
                        error!("Failed to create action window: {}", e);
                        None
                    }
                }
            }
        };

        (self.schedule_refill)();

        let window = window?;
        self.in_use.insert(window.id().clone(), window.clone());
        Some(window)
    }

    /// Note the size an in-use window was just given, so the resize it
    /// causes is not taken for a user resize.
    pub fn record_placement(&mut self, id: &WindowId, size: Size) {
        if self.in_use.contains_key(id) {
            self.placed.insert(id.clone(), size);
        }
    }

    /// Record a user resize. Only kept when remembering sizes; minimize
    /// (zero size) and our own placements are ignored.
    pub fn on_action_resized(&mut self, id: &WindowId, size: Size) {
        if !self.remember_size || !self.in_use.contains_key(id) {
            return;
        }
        if size.width < 1.0 || size.height < 1.0 {
            return;
        }
        if self.placed.get(id).is_some_and(|placed| same_size(*placed, size)) {
            return;
        }
        self.last_size = Some(Size::new(
            size.width.max(ACTION_WINDOW_MIN_WIDTH),
            size.height.max(ACTION_WINDOW_MIN_HEIGHT),
        ));
    }

    pub fn close_preloaded_action_windows(&mut self) {
        for window in self.pooled.drain(..) {
            if window.is_alive() {
                window.destroy();
            }
        }
    }

    pub fn close_in_use_windows(&mut self) {
        self.placed.clear();
        for (_, window) in self.in_use.drain() {
            if window.is_alive() {
                window.close();
            }
        }
    }

    // ===== Result window =====

    pub fn result_window(&self) -> Option<&SharedWindow> {
        self.result.as_ref().filter(|w| w.is_alive())
    }

    pub fn create_result_window(&mut self, size: Size) -> Option<SharedWindow> {
        match self.factory.create_result(size) {
            Ok(window) => {
                self.result = Some(window.clone());
                Some(window)
            }
            Err(e) => {
                error!("Failed to create result window: {}", e);
                None
            }
        }
    }

    pub fn close_result_window(&mut self) {
        if let Some(window) = self.result.take() {
            if window.is_alive() {
                window.close();
            }
        }
    }

    /// Forget a window the OS has destroyed.
    pub fn on_destroyed(&mut self, id: &WindowId) {
        if self.is_toolbar(id) {
            self.toolbar = None;
        }
        if self.result.as_ref().is_some_and(|w| w.id() == id) {
            self.result = None;
        }
        self.in_use.remove(id);
        self.placed.remove(id);
        self.pooled.retain(|w| w.id() != id);
    }
}

// Logical sizes come back from the OS rounded to whole physical pixels.
fn same_size(a: Size, b: Size) -> bool {
    (a.width - b.width).abs() < 1.0 && (a.height - b.height).abs() < 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::runtime;
    use crate::selection::testing::FakeWindowFactory;
    use crate::window::{WindowHandle, WindowKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn pool_with(factory: &FakeWindowFactory, preload: usize) -> (WindowPool, Arc<AtomicUsize>) {
        let refills = Arc::new(AtomicUsize::new(0));
        let counter = refills.clone();
        let pool = WindowPool::new(
            Box::new(factory.clone()),
            preload,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (pool, refills)
    }

    fn factory() -> FakeWindowFactory {
        // Lifecycle events go nowhere
        let (sender, _) = runtime::channel();
        FakeWindowFactory::new(sender)
    }

    #[test]
    fn test_toolbar_created_once() {
        let factory = factory();
        let (mut pool, _) = pool_with(&factory, 1);
        let size = Size::new(350.0, 43.0);

        assert!(pool.create_toolbar_window(size).is_some());
        assert!(pool.create_toolbar_window(size).is_none());
        assert_eq!(factory.created(WindowKind::Toolbar).len(), 1);

        // A dead toolbar can be replaced
        factory.toolbar().destroy();
        assert!(pool.toolbar().is_none());
        assert!(pool.create_toolbar_window(size).is_some());
        assert_eq!(factory.created(WindowKind::Toolbar).len(), 2);
    }

    #[test]
    fn test_pop_moves_window_to_in_use_and_schedules_refill() {
        let factory = factory();
        let (mut pool, refills) = pool_with(&factory, 2);
        pool.init_preloaded_action_windows();
        assert_eq!(pool.pooled_count(), 2);

        let window = pool.pop_action_window().unwrap();
        assert!(pool.in_use(window.id()).is_some());
        assert!(!pool.is_pooled(window.id()));
        assert_eq!(pool.pooled_count(), 1);
        assert_eq!(refills.load(Ordering::SeqCst), 1);

        pool.refill();
        pool.refill();
        assert_eq!(pool.pooled_count(), 2);
    }

    #[test]
    fn test_pop_skips_dead_windows_and_creates_on_demand() {
        let factory = factory();
        let (mut pool, refills) = pool_with(&factory, 1);
        pool.init_preloaded_action_windows();
        factory.created(WindowKind::Action)[0].destroy();

        let window = pool.pop_action_window().unwrap();
        assert!(window.is_alive());
        assert_eq!(factory.created(WindowKind::Action).len(), 2);
        assert_eq!(refills.load(Ordering::SeqCst), 1);

        factory.fail_actions(true);
        assert!(pool.pop_action_window().is_none());
        // Refill is requested even when nothing could be handed out
        assert_eq!(refills.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remembered_size_only_from_in_use_windows() {
        let factory = factory();
        let (mut pool, _) = pool_with(&factory, 1);
        pool.init_preloaded_action_windows();
        let pooled = factory.created(WindowKind::Action)[0].id().clone();

        pool.on_action_resized(&pooled, Size::new(900.0, 900.0));
        let window = pool.pop_action_window().unwrap();
        pool.on_action_resized(window.id(), Size::new(600.0, 450.0));
        // Not remembering yet
        assert_eq!(pool.action_window_size(), Size::new(ACTION_WINDOW_WIDTH, ACTION_WINDOW_HEIGHT));

        pool.set_remember_size(true);
        pool.on_action_resized(window.id(), Size::new(600.0, 450.0));
        assert_eq!(pool.action_window_size(), Size::new(600.0, 450.0));
    }

    #[test]
    fn test_remembered_size_ignores_minimize_and_placement() {
        let factory = factory();
        let (mut pool, _) = pool_with(&factory, 1);
        pool.set_remember_size(true);
        let window = pool.pop_action_window().unwrap();

        pool.record_placement(window.id(), Size::new(480.0, 380.0));
        pool.on_action_resized(window.id(), Size::new(480.0, 380.0));
        pool.on_action_resized(window.id(), Size::new(0.0, 0.0));
        assert_eq!(pool.action_window_size(), Size::new(ACTION_WINDOW_WIDTH, ACTION_WINDOW_HEIGHT));

        // Below the minimum is raised to it
        pool.on_action_resized(window.id(), Size::new(120.0, 90.0));
        assert_eq!(
            pool.action_window_size(),
            Size::new(ACTION_WINDOW_MIN_WIDTH, ACTION_WINDOW_MIN_HEIGHT)
        );
    }

    #[test]
    fn test_close_and_forget() {
        let factory = factory();
        let (mut pool, _) = pool_with(&factory, 1);
        pool.init_preloaded_action_windows();
        let in_use = pool.pop_action_window().unwrap();
        pool.refill();

        pool.close_preloaded_action_windows();
        assert_eq!(pool.pooled_count(), 0);
        assert!(in_use.is_alive());

        pool.on_destroyed(in_use.id());
        assert!(pool.in_use(in_use.id()).is_none());
        assert_eq!(pool.in_use_count(), 0);
    }
}
