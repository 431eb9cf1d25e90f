use super::{HookFilterMode, HookSink, HookStartOptions, SelectionHook};

/// Hook for platforms without global selection capture.
#[derive(Debug, Default)]
pub struct UnsupportedHook;

impl SelectionHook for UnsupportedHook {
    fn start(&mut self, _options: HookStartOptions, _sink: HookSink) -> bool {
        false
    }

    fn stop(&mut self) -> bool {
        false
    }

    fn cleanup(&mut self) {}

    fn set_global_filter_mode(&mut self, _mode: HookFilterMode, _list: &[String]) -> bool {
        false
    }

    fn set_selection_passive_mode(&mut self, _passive: bool) -> bool {
        false
    }

    fn write_to_clipboard(&mut self, _text: &str) -> bool {
        false
    }

    fn request_selection(&mut self) -> bool {
        false
    }
}
