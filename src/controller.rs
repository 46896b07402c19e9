use serde::{Deserialize, Serialize};

use crate::layout;

/// Navigation input from the viewer page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Next,
    Prev,
    TogglePause,
}

impl NavCommand {
    /// Accepts both command names and browser key names.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "next" | "right" | "ArrowRight" => Some(NavCommand::Next),
            "prev" | "left" | "ArrowLeft" => Some(NavCommand::Prev),
            "pause" | "space" | " " => Some(NavCommand::TogglePause),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub page: usize,
    pub total_pages: usize,
    pub paused: bool,
}

/// Current page and pause flag of an interactive view.
#[derive(Debug, Clone, Default)]
pub struct PageController {
    current_page: usize,
    total_pages: usize,
    paused: bool,
    pausable: bool,
}

impl PageController {
    pub fn new(pausable: bool) -> Self {
        PageController {
            pausable,
            ..Default::default()
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Recomputes the page count for `keys` keys and wraps the current page into range.
    pub fn set_key_count(&mut self, keys: usize, per_page: usize) {
        self.total_pages = layout::page_count(keys, per_page);
        self.current_page %= self.total_pages.max(1);
    }

    pub fn next(&mut self) {
        if self.total_pages > 0 {
            self.current_page = (self.current_page + 1) % self.total_pages;
        }
    }

    pub fn prev(&mut self) {
        if self.total_pages > 0 {
            self.current_page = (self.current_page + self.total_pages - 1) % self.total_pages;
        }
    }

    pub fn toggle_pause(&mut self) {
        if !self.pausable {
            return;
        }
        self.paused = !self.paused;
        log::info!("{}", if self.paused { "Paused" } else { "Resumed" });
    }

    /// Applies `command`, returning true when the page changed.
    pub fn apply(&mut self, command: NavCommand) -> bool {
        let before = self.current_page;
        match command {
            NavCommand::Next => self.next(),
            NavCommand::Prev => self.prev(),
            NavCommand::TogglePause => self.toggle_pause(),
        }
        self.current_page != before
    }

    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            page: self.current_page,
            total_pages: self.total_pages,
            paused: self.paused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_keys(keys: usize, pausable: bool) -> PageController {
        let mut controller = PageController::new(pausable);
        controller.set_key_count(keys, 4);
        controller
    }

    #[test]
    fn next_wraps_to_first_page() {
        let mut controller = with_keys(5, false);
        controller.next();
        assert_eq!(controller.current_page(), 1);
        assert!(controller.apply(NavCommand::Next));
        assert_eq!(controller.current_page(), 0);
    }

    #[test]
    fn prev_wraps_to_last_page() {
        let mut controller = with_keys(9, false);
        controller.prev();
        assert_eq!(controller.current_page(), 2);
    }

    #[test]
    fn pause_leaves_page_alone() {
        let mut controller = with_keys(5, true);
        controller.next();
        assert!(!controller.apply(NavCommand::TogglePause));
        assert!(controller.paused());
        assert_eq!(controller.current_page(), 1);
        controller.toggle_pause();
        assert!(!controller.paused());
    }

    #[test]
    fn pause_ignored_when_not_pausable() {
        let mut controller = with_keys(5, false);
        controller.toggle_pause();
        assert!(!controller.paused());
    }

    #[test]
    fn shrinking_key_count_wraps_page() {
        let mut controller = with_keys(12, false);
        controller.prev();
        assert_eq!(controller.current_page(), 2);
        controller.set_key_count(5, 4);
        assert_eq!(controller.current_page(), 0);
    }

    #[test]
    fn no_pages_is_stable() {
        let mut controller = with_keys(0, true);
        controller.next();
        controller.prev();
        assert_eq!(controller.status(), ControllerStatus { page: 0, total_pages: 0, paused: false });
    }

    #[test]
    fn parses_key_names() {
        assert_eq!(NavCommand::parse("ArrowRight"), Some(NavCommand::Next));
        assert_eq!(NavCommand::parse("prev"), Some(NavCommand::Prev));
        assert_eq!(NavCommand::parse(" "), Some(NavCommand::TogglePause));
        assert_eq!(NavCommand::parse("up"), None);
    }
}
