//! Generic object synchronization.
//!
//! Upserts a root object, reconciles its categories, children and bindings,
//! and retries deferred objects once the main pass is over.

mod hooks;
mod object;
mod post_process;
mod reconcile;
mod site_binding;

pub use hooks::{CustomHook, HookContext, PostApplyHook};
pub use post_process::{PostProcessEntry, PostProcessQueue};
pub use reconcile::{IdentityOverride, MergeOverride};

pub(crate) use object::{apply_object_task, delete_object_task, delete_row, update_object};
pub(crate) use post_process::process_post_queue;
pub(crate) use site_binding::{add_to_site, remove_from_site};
