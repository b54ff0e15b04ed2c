//! Window classification.
//!
//! Pure functions over light snapshots and a [`RuleSet`]. Everything the
//! rules need from the OS (children, descendants, fresh geometry) is
//! gathered by the engine beforehand, so classification never blocks and
//! never fails.

use crate::config::RuleSet;
use crate::config::rules::AMBIGUOUS_MAIN_CLASS;
use crate::{Rect, WindowSnapshot};

/// What the engine should make of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// The application's main window; its content views get resized.
    MainWindow,
    /// Suspected ad surface.
    AdCandidate,
    /// Top-level container of the embedded legacy web view that hosts ads.
    LegacyAdContainer,
    /// Bottom-docked banner inside the main window (aggressive mode).
    BannerCandidate,
    Irrelevant,
}

/// Content panes inside the main window that the resizer stretches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentView {
    /// Chat/friend list (`OnlineMainView*`).
    OnlineMain,
    /// Lock screen (`LockModeView*`).
    LockMode,
}

/// Facts about a main-window child that need OS calls to establish.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildContext<'a> {
    /// Title of the main window.
    pub parent_text: &'a str,
    /// Whether the main window has a custom-scroll descendant.
    pub parent_has_custom_scroll: bool,
    /// `(child, parent)` bounds, queried fresh. Only needed in aggressive mode.
    pub geometry: Option<(Rect, Rect)>,
}

pub struct Classifier<'a> {
    rules: &'a RuleSet,
    aggressive: bool,
}

impl<'a> Classifier<'a> {
    pub fn new(rules: &'a RuleSet, aggressive: bool) -> Self {
        Self { rules, aggressive }
    }

    /// Identifies resizable content panes by class and text prefix.
    pub fn content_view(&self, window: &WindowSnapshot) -> Option<ContentView> {
        if window.class_name() != self.rules.content_child_class {
            return None;
        }
        if window.text.starts_with(&self.rules.main_view_prefix) {
            Some(ContentView::OnlineMain)
        } else if window.text.starts_with(&self.rules.lock_view_prefix) {
            Some(ContentView::LockMode)
        } else {
            None
        }
    }

    /// Classifies a top-level window.
    ///
    /// `descendants` are light snapshots below `window` (direct children
    /// have `parent == window`); the engine only collects them for windows
    /// whose class can matter.
    pub fn classify_top_level(
        &self,
        window: &WindowSnapshot,
        descendants: &[WindowSnapshot],
    ) -> Classification {
        if !window.is_top_level {
            return Classification::Irrelevant;
        }
        if self.is_main_window(window, descendants) {
            return Classification::MainWindow;
        }
        if self.rules.is_ad_candidate_class(window.class_name()) {
            let signed = self.rules.is_legacy_title(&window.text)
                || descendants.iter().any(|d| self.rules.is_legacy_title(&d.text));
            if signed {
                return Classification::LegacyAdContainer;
            }
            if window.text.is_empty() {
                return Classification::AdCandidate;
            }
        }
        Classification::Irrelevant
    }

    fn is_main_window(&self, window: &WindowSnapshot, descendants: &[WindowSnapshot]) -> bool {
        let class = window.class_name();
        if !self.rules.is_main_class(class) {
            return false;
        }
        if class == AMBIGUOUS_MAIN_CLASS {
            return self.has_main_title(&window.text);
        }
        // The embedded web view's window never hosts the chat list.
        if self.rules.is_legacy_title(&window.text) {
            return false;
        }
        if !window.text.is_empty() {
            return true;
        }
        // The title is briefly empty while the window is built and while
        // switching to lock mode; the content view gives it away.
        descendants
            .iter()
            .filter(|d| d.parent == Some(window.handle()))
            .any(|d| self.content_view(d).is_some())
    }

    fn has_main_title(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.rules
            .main_window_titles
            .iter()
            .any(|t| text.contains(&t.to_lowercase()))
    }

    /// Classifies a direct child of an approved main window.
    ///
    /// Content views are not classified here; check [`Self::content_view`]
    /// first.
    pub fn classify_main_child(&self, child: &WindowSnapshot, ctx: &ChildContext<'_>) -> Classification {
        if self.aggressive {
            let class = child.class_name();
            let web = self.rules.is_chrome_widget(class);
            let token = self.matches_ad_token(&child.text) || self.matches_ad_token(class);
            if web && token {
                return Classification::AdCandidate;
            }
            // Native panes are never hidden on shape alone.
            if let Some((bounds, parent)) = ctx.geometry
                && self.is_banner(&bounds, &parent)
                && (web || token)
            {
                return Classification::BannerCandidate;
            }
        }
        if child.class_name() == self.rules.content_child_class
            && child.text.is_empty()
            && !ctx.parent_text.is_empty()
            && !ctx.parent_has_custom_scroll
        {
            return Classification::AdCandidate;
        }
        Classification::Irrelevant
    }

    /// Children of an approved legacy container are ad sub-windows,
    /// whatever they look like.
    pub fn classify_legacy_child(&self, _child: &WindowSnapshot) -> Classification {
        Classification::AdCandidate
    }

    /// Bottom-docked, nearly full-width, banner-height.
    pub fn is_banner(&self, bounds: &Rect, parent: &Rect) -> bool {
        let r = self.rules;
        if bounds.height < r.banner_min_height_px || bounds.height > r.banner_max_height_px {
            return false;
        }
        if parent.width <= 0 {
            return false;
        }
        if f64::from(bounds.width) < r.banner_min_width_ratio * f64::from(parent.width) {
            return false;
        }
        (bounds.bottom() - parent.bottom()).abs() <= r.banner_bottom_margin_px
    }

    pub fn matches_ad_token(&self, haystack: &str) -> bool {
        self.rules
            .aggressive_ad_tokens
            .iter()
            .any(|token| contains_token(haystack, token))
    }
}

/// Token search with a word-boundary rule for short ASCII tokens.
///
/// Tokens of up to three ASCII characters match case-sensitively and only
/// when not glued to other alphanumerics (`"Ad"` matches `"Ad banner"` but
/// not `"Header"`). Longer or non-ASCII tokens match case-insensitively
/// anywhere.
pub fn contains_token(haystack: &str, token: &str) -> bool {
    if token.is_empty() || haystack.is_empty() {
        return false;
    }
    if token.len() <= 3 && token.is_ascii() {
        return haystack.match_indices(token).any(|(start, m)| {
            let before = haystack[..start].chars().next_back();
            let after = haystack[start + m.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        });
    }
    haystack.to_lowercase().contains(&token.to_lowercase())
}
