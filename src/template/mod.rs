//! Email template system.
//!
//! This module provides:
//! - Template definitions with `{{placeholder}}` and `{{#flag}}...{{/flag}}` markers
//! - A tokenizer and resolver that render those markers against JSON parameters
//! - In-memory and PostgreSQL template lookup
//! - A render cache invalidated by template edits
//!
//! # Example
//!
//! ```ignore
//! let store = Arc::new(MemoryTemplateStore::new());
//! store.create(EmailTemplate {
//!     name: "welcome".to_string(),
//!     subject_template: "Hi {{name}}".to_string(),
//!     html_template: Some("{{#vip}}VIP perk{{/vip}} Welcome".to_string()),
//!     ..
//! })?;
//!
//! let renderer = TemplateRenderer::new(store, None);
//! let rendered = renderer.render("welcome", &params).await?;
//! ```

mod cache;
mod factory;
mod parser;
mod postgres_store;
mod render;
mod renderer;
mod store;
mod types;

pub use cache::{hash_params, CacheConfig, RenderCache};
pub use factory::create_template_repository;
pub use parser::{tokenize, Token};
pub use postgres_store::PostgresTemplateStore;
pub use render::{is_truthy, render_str, Params};
pub use renderer::{render_template, TemplateRenderer};
pub use store::{MemoryTemplateStore, TemplateRepository};
pub use types::{
    EmailTemplate, RenderedEmail, TemplateError, TemplateResult,
    TemplateSummary, UpdateTemplateRequest,
};
