//! JSON Schema construction for the tool catalog (spec §6 "Tool catalog").
//!
//! Every tool shares a common base (pagination, CLI selection, verbose,
//! force_refresh, context_id, resume) plus one domain-specific primary arg
//! and a handful of optional hint fields drawn from the tool's
//! `cache_key_fields` (minus the primary arg itself).

use brutalist_types::{Domain, ToolConfig};
use serde_json::{json, Map, Value};

pub fn tool_description(domain: Domain) -> &'static str {
    match domain {
        Domain::Codebase => "Adversarially critique a codebase for design flaws, bugs, and maintainability issues.",
        Domain::FileStructure => "Critique a project's file and directory layout for organization and scalability problems.",
        Domain::Dependencies => "Roast a project's dependency choices, versions, and bloat.",
        Domain::GitHistory => "Critique a repository's commit history for process smells.",
        Domain::TestCoverage => "Assess test coverage and test quality with no mercy.",
        Domain::Idea => "Roast a product or project idea as an adversarial critic.",
        Domain::Architecture => "Critique a system architecture for scalability, reliability, and operational risk.",
        Domain::Research => "Adversarially review a research proposal for rigor and validity.",
        Domain::Security => "Perform an adversarial security review of a system description.",
        Domain::Product => "Roast a product concept from a market and execution-risk perspective.",
        Domain::Infrastructure => "Critique an infrastructure design for resilience, cost, and operational burden.",
    }
}

fn primary_arg_description(domain: Domain) -> &'static str {
    match domain {
        Domain::Codebase | Domain::FileStructure | Domain::Dependencies | Domain::GitHistory | Domain::TestCoverage => {
            "Filesystem path to the target."
        }
        Domain::Idea => "The idea to roast, as free text.",
        Domain::Architecture => "Description of the system architecture.",
        Domain::Research => "Description of the research proposal.",
        Domain::Security => "Description of the system under security review.",
        Domain::Product => "Description of the product concept.",
        Domain::Infrastructure => "Description of the infrastructure design.",
    }
}

fn hint_schema(field: &str) -> Value {
    match field {
        "depth" => json!({"type": "integer", "description": "How deep to go — roughly, how thorough the critique should be."}),
        "includeDevDeps" | "runCoverage" => json!({"type": "boolean"}),
        "commitRange" => json!({"type": "string", "description": "Git revision range, e.g. HEAD~50..HEAD."}),
        _ => json!({"type": "string"}),
    }
}

/// Fields shared by every tool, independent of domain (spec §6 "Pagination
/// fields" and "CLIs selection").
fn base_properties() -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("offset".to_string(), json!({"type": "integer", "minimum": 0}));
    props.insert(
        "limit".to_string(),
        json!({"type": "integer", "minimum": brutalist_paginate::MIN_LIMIT_TOKENS, "maximum": brutalist_paginate::MAX_LIMIT_TOKENS}),
    );
    props.insert("cursor".to_string(), json!({"type": "string"}));
    props.insert("context_id".to_string(), json!({"type": "string"}));
    props.insert("resume".to_string(), json!({"type": "boolean"}));
    props.insert("force_refresh".to_string(), json!({"type": "boolean"}));
    props.insert("verbose".to_string(), json!({"type": "boolean", "description": "Include an execution summary in the response."}));
    props.insert(
        "clis".to_string(),
        json!({
            "type": "array",
            "items": {"type": "string", "enum": ["claude", "codex", "gemini"]},
            "minItems": 1,
            "maxItems": 3,
            "description": "Restrict which CLI critics run for this request."
        }),
    );
    props.insert(
        "models".to_string(),
        json!({
            "type": "object",
            "properties": {
                "claude": {"type": "string"},
                "codex": {"type": "string"},
                "gemini": {"type": "string"}
            },
            "additionalProperties": false
        }),
    );
    props
}

/// Build the full JSON Schema `input_schema` object for one tool.
pub fn build_input_schema(tool: &ToolConfig) -> Value {
    let required = vec![tool.primary_arg_field.to_string()];
    let mut properties = base_properties();

    properties.insert(tool.primary_arg_field.to_string(), json!({
        "type": "string",
        "description": primary_arg_description(tool.domain),
    }));

    for field in &tool.cache_key_fields {
        if *field == tool.primary_arg_field {
            continue;
        }
        properties.insert((*field).to_string(), hint_schema(field));
    }

    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": required,
    })
}

/// `{name, description, inputSchema}` as sent over the hand-rolled HTTP
/// `tools/list` JSON-RPC response (spec §6).
pub fn tool_json(tool: &ToolConfig) -> Value {
    json!({
        "name": tool.name,
        "description": tool_description(tool.domain),
        "inputSchema": build_input_schema(tool),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use brutalist_types::build_catalog;

    #[test]
    fn every_tool_schema_requires_its_primary_arg() {
        for tool in build_catalog() {
            let schema = build_input_schema(&tool);
            let required = schema["required"].as_array().unwrap();
            assert!(required.iter().any(|v| v == tool.primary_arg_field));
        }
    }

    #[test]
    fn schema_exposes_pagination_and_cli_selection_fields() {
        let tool = build_catalog().into_iter().next().unwrap();
        let schema = build_input_schema(&tool);
        let properties = schema["properties"].as_object().unwrap();
        for field in ["offset", "limit", "cursor", "context_id", "resume", "force_refresh", "clis", "models"] {
            assert!(properties.contains_key(field), "missing base field {field}");
        }
    }
}
