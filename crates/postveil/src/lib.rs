//! `postveil` - hide timeline posts that match your blocked phrases
//!
//! This library watches a single-page application's timeline through an
//! abstract element-tree surface, evaluates every newly inserted post
//! against a user-edited rule set, and hides matches outright or behind a
//! reveal-on-click overlay. Rule edits apply on the very next batch, each
//! hide is audited per rule, and the whole pipeline survives in-app
//! navigation by re-attaching to the new tree.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use postveil::{App, BlockedRule, Config, MemoryStore, MinimalUi, Page, RuleStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> postveil::Result<()> {
//! let page = Page::new("https://example.com/home");
//! let store = Arc::new(MemoryStore::new());
//! store.set_rules(vec![BlockedRule::literal("spoiler")]).await?;
//!
//! let app = App::new(page, store, Arc::new(MinimalUi), &Config::default());
//! app.start().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod app;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod dom;
pub mod error;
pub mod interceptor;
pub mod logging;
pub mod matcher;
pub mod observer;
pub mod rules;
pub mod settings;
pub mod store;
pub mod wait;

pub use app::App;
pub use config::Config;
pub use dispatcher::{BatchObserver, MutationDispatcher, RouteTable, SelectorPolicy};
pub use dom::{Element, MutationBatch, Page, Selector};
pub use error::{Error, Result};
pub use interceptor::{NavigationAction, NavigationInterceptor};
pub use logging::init_logging;
pub use matcher::Matcher;
pub use observer::PostObserver;
pub use rules::{AuditCounts, BlockedRule, GlobalSettings};
pub use settings::{MinimalUi, SettingsController, UiBuilder};
pub use store::{JsonFileStore, MemoryStore, RuleStore};
pub use wait::wait_for_element;
