//! Classification and geometry parameters.
//!
//! Loaded from `~/.config/adfence/rules.toml`. Every field has a default
//! tuned for the current KakaoTalk window layout, so an empty file is a
//! valid rule set.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Class shared by the main window and several unrelated popups. Windows of
/// this class only count as the main window when their title matches
/// `main_window_titles`.
pub const AMBIGUOUS_MAIN_CLASS: &str = "EVA_Window";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Top-level classes that can host the main chat list.
    pub main_window_classes: Vec<String>,
    /// Title fragments accepted for [`AMBIGUOUS_MAIN_CLASS`] windows.
    pub main_window_titles: Vec<String>,
    /// Top-level classes that may be legacy ad containers. Empty means
    /// "same as `main_window_classes`".
    pub ad_candidate_classes: Vec<String>,
    /// Exact title of the embedded web view that hosts ads.
    pub chrome_legacy_title: String,
    /// Title fragments that also identify the embedded web view.
    pub chrome_legacy_title_contains: Vec<String>,
    /// Text fragments that mark a child window as an ad (aggressive mode).
    pub aggressive_ad_tokens: Vec<String>,
    pub banner_min_height_px: i32,
    pub banner_max_height_px: i32,
    /// Minimum banner width as a fraction of the parent width.
    pub banner_min_width_ratio: f64,
    /// Maximum distance between the banner's and the parent's bottom edges.
    pub banner_bottom_margin_px: i32,
    /// Width trimmed from content views to keep the window shadow visible.
    pub layout_shadow_padding_px: i32,
    /// Height trimmed from the main view for the title area.
    pub main_view_padding_px: i32,
    /// Class of the content child windows inside the main window.
    pub content_child_class: String,
    /// Text prefix of the chat list view.
    pub main_view_prefix: String,
    /// Text prefix of the lock-screen view.
    pub lock_view_prefix: String,
    /// Class prefix of the custom scrollbar that only real content has.
    pub custom_scroll_prefix: String,
    /// Class prefixes of embedded Chromium widgets.
    pub chrome_widget_prefixes: Vec<String>,
    pub cache_ttl_ms: u64,
    /// TTL for cached empty titles, which are often transient.
    pub empty_text_ttl_ms: u64,
    /// How deep the legacy-title and custom-scroll searches descend.
    pub signature_search_depth: u32,
    /// Minimum gap between two identical error log lines.
    pub log_rate_limit_ms: u64,
}

impl Default for RuleSet {
    fn default() -> Self {
        let main_window_classes = strings(&["EVA_Window_Dblclk", AMBIGUOUS_MAIN_CLASS]);
        Self {
            ad_candidate_classes: main_window_classes.clone(),
            main_window_classes,
            main_window_titles: strings(&["카카오톡", "KakaoTalk", "カカオトーク"]),
            chrome_legacy_title: "Chrome Legacy Window".into(),
            chrome_legacy_title_contains: strings(&["Chrome Legacy Window"]),
            aggressive_ad_tokens: strings(&["광고", "Ad", "AdFit", "Advertisement", "BannerAdView"]),
            banner_min_height_px: 80,
            banner_max_height_px: 170,
            banner_min_width_ratio: 0.85,
            banner_bottom_margin_px: 10,
            layout_shadow_padding_px: 2,
            main_view_padding_px: 31,
            content_child_class: "EVA_ChildWindow".into(),
            main_view_prefix: "OnlineMainView".into(),
            lock_view_prefix: "LockModeView".into(),
            custom_scroll_prefix: "_EVA_CustomScrollCtrl".into(),
            chrome_widget_prefixes: strings(&["Chrome_WidgetWin_", "Chrome_RenderWidgetHostHWND"]),
            cache_ttl_ms: 2000,
            empty_text_ttl_ms: 100,
            signature_search_depth: 8,
            log_rate_limit_ms: 5000,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl RuleSet {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn empty_text_ttl(&self) -> Duration {
        Duration::from_millis(self.empty_text_ttl_ms)
    }

    pub fn log_rate_limit(&self) -> Duration {
        Duration::from_millis(self.log_rate_limit_ms)
    }

    pub fn is_main_class(&self, class: &str) -> bool {
        self.main_window_classes.iter().any(|c| c == class)
    }

    pub fn is_ad_candidate_class(&self, class: &str) -> bool {
        self.ad_candidate_classes.iter().any(|c| c == class)
    }

    pub fn is_chrome_widget(&self, class: &str) -> bool {
        self.chrome_widget_prefixes
            .iter()
            .any(|p| !p.is_empty() && class.starts_with(p.as_str()))
    }

    /// Whether `title` carries the legacy web-view signature.
    pub fn is_legacy_title(&self, title: &str) -> bool {
        if title.is_empty() {
            return false;
        }
        title == self.chrome_legacy_title
            || self
                .chrome_legacy_title_contains
                .iter()
                .any(|frag| !frag.is_empty() && title.contains(frag.as_str()))
    }

    /// Brings every field into a usable state.
    ///
    /// Returns one human-readable warning per correction. Never fails: the
    /// worst case is a rule set equal to the defaults.
    pub fn repair(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        let defaults = RuleSet::default();

        self.main_window_classes.retain(|c| !c.is_empty());
        if self.main_window_classes.is_empty() {
            warnings.push("main_window_classes is empty; using the defaults".into());
            self.main_window_classes = defaults.main_window_classes.clone();
        }
        self.ad_candidate_classes.retain(|c| !c.is_empty());
        if self.ad_candidate_classes.is_empty() {
            self.ad_candidate_classes = self.main_window_classes.clone();
        }
        self.main_window_titles.retain(|t| !t.is_empty());
        self.chrome_legacy_title_contains.retain(|t| !t.is_empty());
        self.aggressive_ad_tokens.retain(|t| !t.is_empty());

        if self.banner_min_height_px < 1 {
            warnings.push(format!(
                "banner_min_height_px = {} must be at least 1; auto-corrected",
                self.banner_min_height_px
            ));
            self.banner_min_height_px = 1;
        }
        if self.banner_max_height_px < 1 {
            warnings.push(format!(
                "banner_max_height_px = {} must be at least 1; auto-corrected",
                self.banner_max_height_px
            ));
            self.banner_max_height_px = 1;
        }
        if self.banner_min_height_px > self.banner_max_height_px {
            warnings.push(format!(
                "banner_min_height_px ({}) > banner_max_height_px ({}); values swapped (auto-corrected)",
                self.banner_min_height_px, self.banner_max_height_px
            ));
            std::mem::swap(
                &mut self.banner_min_height_px,
                &mut self.banner_max_height_px,
            );
        }

        let ratio = self.banner_min_width_ratio;
        if !ratio.is_finite() {
            warnings.push("banner_min_width_ratio is not a number; using the default".into());
            self.banner_min_width_ratio = defaults.banner_min_width_ratio;
        } else if !(0.1..=1.0).contains(&ratio) {
            self.banner_min_width_ratio = ratio.clamp(0.1, 1.0);
            warnings.push(format!(
                "banner_min_width_ratio = {ratio} is outside 0.1..=1.0; using {}",
                self.banner_min_width_ratio
            ));
        }

        non_negative(&mut self.banner_bottom_margin_px, "banner_bottom_margin_px", &mut warnings);
        non_negative(&mut self.layout_shadow_padding_px, "layout_shadow_padding_px", &mut warnings);
        non_negative(&mut self.main_view_padding_px, "main_view_padding_px", &mut warnings);

        if self.cache_ttl_ms < 100 {
            warnings.push(format!("cache_ttl_ms = {} is below 100; using 100", self.cache_ttl_ms));
            self.cache_ttl_ms = 100;
        }
        let empty_ttl = self.empty_text_ttl_ms.clamp(10, self.cache_ttl_ms);
        if empty_ttl != self.empty_text_ttl_ms {
            warnings.push(format!(
                "empty_text_ttl_ms = {} is outside 10..={}; using {empty_ttl}",
                self.empty_text_ttl_ms, self.cache_ttl_ms
            ));
            self.empty_text_ttl_ms = empty_ttl;
        }
        let depth = self.signature_search_depth.clamp(1, 16);
        if depth != self.signature_search_depth {
            warnings.push(format!(
                "signature_search_depth = {} is outside 1..=16; using {depth}",
                self.signature_search_depth
            ));
            self.signature_search_depth = depth;
        }

        if self.content_child_class.is_empty()
            || self.main_view_prefix.is_empty()
            || self.lock_view_prefix.is_empty()
        {
            warnings.push("content view markers must not be empty; using the defaults".into());
            self.content_child_class = defaults.content_child_class;
            self.main_view_prefix = defaults.main_view_prefix;
            self.lock_view_prefix = defaults.lock_view_prefix;
        }

        if self.has_replacement_chars() {
            warnings.push(
                "string integrity warning: rules contain U+FFFD replacement characters; \
                 the file was probably saved in the wrong encoding"
                    .into(),
            );
        }

        warnings
    }

    fn has_replacement_chars(&self) -> bool {
        let lists = [
            &self.main_window_classes,
            &self.main_window_titles,
            &self.ad_candidate_classes,
            &self.chrome_legacy_title_contains,
            &self.aggressive_ad_tokens,
        ];
        lists.iter().flat_map(|l| l.iter()).any(|s| s.contains('\u{FFFD}'))
            || self.chrome_legacy_title.contains('\u{FFFD}')
    }
}

fn non_negative(value: &mut i32, key: &str, warnings: &mut Vec<String>) {
    if *value < 0 {
        warnings.push(format!("{key} = {value} must not be negative; using 0"));
        *value = 0;
    }
}
