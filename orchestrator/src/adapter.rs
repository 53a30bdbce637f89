//! Framework adapters: derive implied resources from patch intents.
//!
//! The core never inspects intent semantics itself. An [`Adapter`] maps each
//! structured intent to the logical resources it would claim, and the conflict
//! detector unions those into the issuing task's resource writes. Without an
//! adapter, intents contribute nothing and only declared resources are
//! checked.

use std::collections::HashMap;

use crate::core::conflict::ImpliedResources;
use crate::core::plan::{PatchIntent, Plan};

/// Maps a patch intent to the logical resource identifiers it implies.
pub trait Adapter {
    /// Resources the intent would claim, e.g. `route:/auth` for a router
    /// registration. Unknown actions return no resources.
    fn implied_resources(&self, intent: &PatchIntent) -> Vec<String>;
}

/// Default adapter for the common web-framework intent vocabulary.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAdapter;

impl Adapter for GenericAdapter {
    fn implied_resources(&self, intent: &PatchIntent) -> Vec<String> {
        let resource = match intent.action.as_str() {
            "add_router" => intent.params.get("prefix").map(|p| format!("route:{p}")),
            "add_dependency" => intent
                .params
                .get("function_name")
                .map(|name| format!("di:{name}")),
            "add_config" => intent.params.get("key").map(|key| format!("config:{key}")),
            "add_middleware" => intent
                .params
                .get("class")
                .map(|class| format!("middleware:{class}")),
            _ => None,
        };
        resource.into_iter().collect()
    }
}

/// Derive implied resources for every task in a plan.
///
/// Returns an empty map when no adapter is configured, which degrades conflict
/// detection to declared resources only.
pub fn implied_resource_map(plan: &Plan, adapter: Option<&dyn Adapter>) -> ImpliedResources {
    let Some(adapter) = adapter else {
        return HashMap::new();
    };

    let mut map: ImpliedResources = HashMap::new();
    for task in &plan.tasks {
        let mut resources: Vec<String> = Vec::new();
        for intent in &task.patch_intents {
            resources.extend(adapter.implied_resources(intent));
        }
        if !resources.is_empty() {
            map.insert(task.id.clone(), resources);
        }
    }
    map
}
