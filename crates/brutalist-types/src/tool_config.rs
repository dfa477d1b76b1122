use serde::{Deserialize, Serialize};

/// One of the 11 `roast_<domain>` analysis domains (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Codebase,
    FileStructure,
    Dependencies,
    GitHistory,
    TestCoverage,
    Idea,
    Architecture,
    Research,
    Security,
    Product,
    Infrastructure,
}

impl Domain {
    pub fn all() -> [Domain; 11] {
        [
            Domain::Codebase,
            Domain::FileStructure,
            Domain::Dependencies,
            Domain::GitHistory,
            Domain::TestCoverage,
            Domain::Idea,
            Domain::Architecture,
            Domain::Research,
            Domain::Security,
            Domain::Product,
            Domain::Infrastructure,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            Domain::Codebase => "codebase",
            Domain::FileStructure => "file_structure",
            Domain::Dependencies => "dependencies",
            Domain::GitHistory => "git_history",
            Domain::TestCoverage => "test_coverage",
            Domain::Idea => "idea",
            Domain::Architecture => "architecture",
            Domain::Research => "research",
            Domain::Security => "security",
            Domain::Product => "product",
            Domain::Infrastructure => "infrastructure",
        }
    }

    /// The name of the JSON field the primary argument is carried in.
    pub fn primary_arg_field(&self) -> &'static str {
        match self {
            Domain::Codebase | Domain::FileStructure | Domain::Dependencies | Domain::GitHistory
            | Domain::TestCoverage => "targetPath",
            Domain::Idea => "idea",
            Domain::Architecture => "architecture",
            Domain::Research => "research",
            Domain::Security => "system",
            Domain::Product => "product",
            Domain::Infrastructure => "infrastructure",
        }
    }

    /// True for domains whose primary arg is a filesystem path (as opposed
    /// to free text) — these get a working-directory passed to the CLI.
    pub fn is_filesystem(&self) -> bool {
        matches!(
            self,
            Domain::Codebase
                | Domain::FileStructure
                | Domain::Dependencies
                | Domain::GitHistory
                | Domain::TestCoverage
        )
    }

    pub fn tool_name(&self) -> String {
        format!("roast_{}", self.id())
    }
}

/// Static, immutable description of one MCP tool (spec §3 `ToolConfig`).
///
/// Built once at startup from the literal domain table below — not derived
/// at runtime from a persona/strategy generator (that generator is out of
/// scope per spec.md §1).
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub name: String,
    pub domain: Domain,
    pub primary_arg_field: &'static str,
    /// Argument fields (beyond the primary arg) that participate in the
    /// cache key. Always a superset containing at least the primary arg.
    pub cache_key_fields: Vec<&'static str>,
    pub analysis_type: &'static str,
}

impl ToolConfig {
    pub fn for_domain(domain: Domain) -> Self {
        let primary = domain.primary_arg_field();
        let mut cache_key_fields = vec![primary];
        cache_key_fields.extend(common_hint_fields());
        ToolConfig {
            name: domain.tool_name(),
            domain,
            primary_arg_field: primary,
            cache_key_fields,
            analysis_type: domain.id(),
        }
    }
}

/// Optional domain hint fields shared across the catalog (spec §6).
fn common_hint_fields() -> &'static [&'static str] {
    &[
        "depth",
        "commitRange",
        "includeDevDeps",
        "runCoverage",
        "resources",
        "timeline",
        "scale",
        "constraints",
        "deployment",
        "field",
        "claims",
        "data",
        "assets",
        "threatModel",
        "compliance",
        "users",
        "competition",
        "metrics",
        "sla",
        "budget",
        "context",
    ]
}

/// Build the fixed-at-startup catalog of all 11 tools.
pub fn build_catalog() -> Vec<ToolConfig> {
    Domain::all().into_iter().map(ToolConfig::for_domain).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_eleven_tools_with_unique_names() {
        let catalog = build_catalog();
        assert_eq!(catalog.len(), 11);
        let mut names: Vec<_> = catalog.iter().map(|t| t.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 11);
    }

    #[test]
    fn cache_key_fields_contain_primary_arg() {
        for tc in build_catalog() {
            assert!(tc.cache_key_fields.contains(&tc.primary_arg_field));
        }
    }

    #[test]
    fn filesystem_domains_use_target_path() {
        assert_eq!(Domain::Codebase.primary_arg_field(), "targetPath");
        assert_eq!(Domain::Security.primary_arg_field(), "system");
    }

    #[test]
    fn tool_name_is_prefixed() {
        assert_eq!(Domain::Security.tool_name(), "roast_security");
    }
}
