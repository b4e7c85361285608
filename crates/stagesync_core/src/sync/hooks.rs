//! Type-specific work run after an object is persisted.

use crate::engine::Engine;
use crate::error::{StagingError, StagingResult};
use crate::host::ObjectStore;
use crate::object::{ObjectRegistry, ObjectTypeDescriptor};
use stagesync_codec::{Row, Value};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// What a post-apply hook can see.
pub struct HookContext<'a> {
    /// Target object store.
    pub objects: &'a dyn ObjectStore,
    /// Object registry.
    pub registry: &'a ObjectRegistry,
    /// Descriptor of the object just persisted.
    pub descriptor: &'a ObjectTypeDescriptor,
    /// Its target identifier.
    pub target_id: i64,
}

/// A host-provided hook.
pub type CustomHook = Arc<dyn Fn(&HookContext<'_>) -> StagingResult<()> + Send + Sync>;

/// Post-apply hooks, registered per object type.
#[derive(Clone)]
pub enum PostApplyHook {
    /// Stores the number of `child_type` rows under the object in
    /// `count_column`.
    RecountChildren {
        /// Child type to count.
        child_type: String,
        /// Column receiving the count.
        count_column: String,
    },
    /// Renumbers the object and its siblings 1..n by their current order
    /// (ties broken by identifier).
    NormalizeOrder {
        /// Order column.
        order_column: String,
    },
    /// Host-specific hook.
    Custom(CustomHook),
}

impl fmt::Debug for PostApplyHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecountChildren {
                child_type,
                count_column,
            } => f
                .debug_struct("RecountChildren")
                .field("child_type", child_type)
                .field("count_column", count_column)
                .finish(),
            Self::NormalizeOrder { order_column } => f
                .debug_struct("NormalizeOrder")
                .field("order_column", order_column)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl PostApplyHook {
    /// Runs the hook.
    ///
    /// # Errors
    ///
    /// Store failures, or a structural error when the counted child type does
    /// not reference the object's type.
    pub fn run(&self, ctx: &HookContext<'_>) -> StagingResult<()> {
        match self {
            Self::RecountChildren {
                child_type,
                count_column,
            } => recount(ctx, child_type, count_column),
            Self::NormalizeOrder { order_column } => normalize(ctx, order_column),
            Self::Custom(hook) => hook(ctx),
        }
    }
}

fn recount(ctx: &HookContext<'_>, child_type: &str, count_column: &str) -> StagingResult<()> {
    let child = ctx.registry.descriptor(child_type)?;
    let column = child.parent_column_for(&ctx.descriptor.object_type)?;
    let count = ctx
        .objects
        .find(&child, &Row::new().with(column, ctx.target_id))?
        .len();
    let Some(mut row) = ctx.objects.get(ctx.descriptor, ctx.target_id)? else {
        return Ok(());
    };
    let count = i64::try_from(count)
        .map_err(|_| StagingError::host(format!("{child_type} count overflows")))?;
    if row.integer(count_column) != Some(count) {
        row.set(count_column, count);
        ctx.objects.update(ctx.descriptor, &row)?;
    }
    Ok(())
}

fn normalize(ctx: &HookContext<'_>, order_column: &str) -> StagingResult<()> {
    let descriptor = ctx.descriptor;
    let Some(current) = ctx.objects.get(descriptor, ctx.target_id)? else {
        return Ok(());
    };
    let mut criteria = Row::new();
    if let Some(parent) = &descriptor.parent {
        criteria.set(parent.column.clone(), current.get(&parent.column).clone());
    }
    if let Some(site) = &descriptor.site_column {
        criteria.set(site.clone(), current.get(site).clone());
    }

    let mut siblings = ctx.objects.find(descriptor, &criteria)?;
    siblings.sort_by_key(|r| {
        (
            r.integer(order_column).unwrap_or(i64::MAX),
            r.id(&descriptor.id_column).unwrap_or_default(),
        )
    });
    for (position, mut row) in (1i64..).zip(siblings) {
        if row.integer(order_column) != Some(position) {
            row.set(order_column, Value::Integer(position));
            ctx.objects.update(descriptor, &row)?;
        }
    }
    Ok(())
}

/// Runs the hooks registered for the object's type.
pub(crate) fn run_hooks(
    engine: &Engine<'_>,
    descriptor: &ObjectTypeDescriptor,
    target_id: i64,
) -> StagingResult<()> {
    let host = engine.host;
    let hooks = host.registry.hooks(&descriptor.object_type);
    if hooks.is_empty() {
        return Ok(());
    }
    let ctx = HookContext {
        objects: host.objects.as_ref(),
        registry: &host.registry,
        descriptor,
        target_id,
    };
    for hook in hooks {
        trace!(object_type = %descriptor.object_type, ?hook, "post-apply hook");
        hook.run(&ctx)?;
    }
    engine.touch_object(&descriptor.object_type, target_id);
    Ok(())
}
