pub mod cache;
pub mod classifier;
pub mod config;
pub mod dump;
pub mod engine;
pub mod ledger;
pub mod logging;
pub mod pid;
pub mod process;
pub mod rect;
pub mod resizer;
pub mod scheduler;
pub mod window;

#[cfg(test)]
mod fake;

pub use cache::IdentityCache;
pub use classifier::{Classification, Classifier, ContentView};
pub use config::{Loaded, RuleSet, Settings};
pub use dump::{TreeDump, dump_tree};
pub use engine::{Engine, EngineState};
pub use ledger::{AppliedAction, HideRecord};
pub use process::ProcessResolver;
pub use rect::Rect;
pub use scheduler::SchedulerMode;
pub use window::{ProviderError, ProviderResult, WindowHandle, WindowIdentity, WindowProvider, WindowSnapshot};
