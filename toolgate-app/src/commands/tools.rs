use crate::context::Toolgate;
use std::fmt::Write;
use toolgate_policy::permissions::PermissionEvaluator;
use toolgate_policy::registry::{ToolDescriptor, ToolRegistry};

pub fn run(toolgate: &Toolgate, operations: bool) {
    if operations {
        print!("{}", render_operations(&toolgate.registry));
    } else {
        print!("{}", render_catalog(&toolgate.registry, &toolgate.evaluator));
    }
}

/// Status of a tool under the live security config, ignoring any particular
/// agent.
pub fn status(descriptor: &ToolDescriptor, evaluator: &PermissionEvaluator) -> &'static str {
    if descriptor.key.hard_disabled_reason().is_some() {
        return "disabled";
    }
    let check = evaluator.check_tool_permission(&descriptor.key.to_string(), "catalog");
    match (check.allowed, check.requires_confirmation) {
        (false, _) => "blocked",
        (true, true) => "confirm",
        (true, false) => "allowed",
    }
}

pub fn render_catalog(registry: &ToolRegistry, evaluator: &PermissionEvaluator) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<30} {:<10} {:<8} {}", "TOOL", "RISK", "STATUS", "DESCRIPTION");
    for descriptor in registry.descriptors() {
        let _ = writeln!(
            out,
            "{:<30} {:<10} {:<8} {}",
            descriptor.key.to_string(),
            descriptor.risk_level.as_str(),
            status(descriptor, evaluator),
            descriptor.description
        );
    }
    out
}

pub fn render_operations(registry: &ToolRegistry) -> String {
    let mut out = String::new();
    for (category, operations) in registry.available_operations() {
        let _ = writeln!(out, "{}: {}", category, operations.join(", "));
    }
    out
}
