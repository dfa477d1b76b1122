//! Per-analysisType user-prompt composition (spec §4.2: "a short, mechanical
//! user-prompt template keyed by analysisType … this is glue, not the hard
//! part").

/// Build the user prompt handed to every elected CLI for one request.
pub fn build_user_prompt(analysis_type: &str, primary_arg: &str, context: Option<&str>) -> String {
    let task = match analysis_type {
        "codebase" => format!("Analyze the codebase at {primary_arg} for design flaws, bugs, and maintainability issues."),
        "file_structure" => format!("Critique the file and directory structure at {primary_arg} for organization and scalability problems."),
        "dependencies" => format!("Roast the dependency choices and versions declared under {primary_arg}."),
        "git_history" => format!("Analyze the git history at {primary_arg} for process smells (commit hygiene, churn, risky patterns)."),
        "test_coverage" => format!("Assess the test coverage and test quality at {primary_arg}."),
        "idea" => format!("Roast this idea as an adversarial critic: {primary_arg}"),
        "architecture" => format!("Critique this system architecture for scalability, reliability, and operational risk: {primary_arg}"),
        "research" => format!("Adversarially review this research proposal for rigor and validity: {primary_arg}"),
        "security" => format!("Perform an adversarial security review of this system description: {primary_arg}"),
        "product" => format!("Roast this product concept from a market and execution-risk perspective: {primary_arg}"),
        "infrastructure" => format!("Critique this infrastructure design for resilience, cost, and operational burden: {primary_arg}"),
        other => format!("Analyze the following for domain \"{other}\": {primary_arg}"),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{task}\n\nContext: {ctx}"),
        _ => task,
    }
}
