use std::path::Path;

use agentdag_agents::template;
use agentdag_core::config::AppConfig;
use agentdag_engine::{AgentRegistry, Graph};

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

/// Print every check; returns the number of issues found.
pub fn run_doctor(config: &AppConfig, graph_path: &Path, agents: &AgentRegistry) -> usize {
    let mut checks = Vec::new();

    // 1. Engine limits
    checks.push(check_engine(config));

    // 2. HTTP client settings
    checks.push(check_http(config));

    // 3. Graph loads, validates, and every kind is registered
    let graph = match Graph::load(graph_path) {
        Ok(graph) => {
            checks.push(check_kinds(&graph, agents, graph_path));
            Some(graph)
        }
        Err(e) => {
            checks.push(CheckResult {
                label: "Graph".into(),
                ok: false,
                detail: format!("{}: {}", graph_path.display(), e),
            });
            None
        }
    };

    // 4. Credentials the graph's agents need
    if let Some(ref graph) = graph {
        checks.extend(check_credentials(config, graph, agents));
        checks.extend(check_templates(graph));
    }

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
    fail_count
}

fn check_engine(config: &AppConfig) -> CheckResult {
    let engine = &config.engine;
    let parallel = if engine.max_parallel == 0 {
        "unbounded".to_string()
    } else {
        engine.max_parallel.to_string()
    };
    let timeout = if engine.node_timeout_secs == 0 {
        "none".to_string()
    } else {
        format!("{}s", engine.node_timeout_secs)
    };
    CheckResult {
        label: "Engine".into(),
        ok: true,
        detail: format!(
            "parallelism {}, node timeout {}, fail-fast {}",
            parallel, timeout, engine.fail_fast
        ),
    }
}

fn check_http(config: &AppConfig) -> CheckResult {
    match agentdag_agents::http::build_client(&config.http) {
        Ok(_) if config.http.timeout_secs == 0 => CheckResult {
            label: "HTTP".into(),
            ok: false,
            detail: "timeout_secs = 0 fails every request immediately".into(),
        },
        Ok(_) => CheckResult {
            label: "HTTP".into(),
            ok: true,
            detail: format!(
                "timeout {}s, user agent '{}'",
                config.http.timeout_secs, config.http.user_agent
            ),
        },
        Err(e) => CheckResult {
            label: "HTTP".into(),
            ok: false,
            detail: e.to_string(),
        },
    }
}

fn check_kinds(graph: &Graph, agents: &AgentRegistry, path: &Path) -> CheckResult {
    match agents.resolve(graph) {
        Ok(_) => CheckResult {
            label: "Graph".into(),
            ok: true,
            detail: format!(
                "{} ({} nodes, roots: {})",
                path.display(),
                graph.len(),
                graph.roots().join(", ")
            ),
        },
        Err(e) => CheckResult {
            label: "Graph".into(),
            ok: false,
            detail: e.to_string(),
        },
    }
}

fn check_credentials(config: &AppConfig, graph: &Graph, agents: &AgentRegistry) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let uses_llm = graph
        .nodes()
        .any(|n| n.kind() == "openAICall");
    if uses_llm {
        results.push(match config.llm.resolve_api_key() {
            Ok(_) => CheckResult {
                label: "LLM key".into(),
                ok: true,
                detail: format!("Configured for {} at {}", config.llm.model, config.llm.base_url),
            },
            Err(e) => CheckResult {
                label: "LLM key".into(),
                ok: false,
                detail: e.to_string(),
            },
        });
    }

    for var in agents.required_env(graph) {
        if uses_llm && var == config.llm.api_key_env {
            continue;
        }
        let set = std::env::var(&var).map_or(false, |v| !v.trim().is_empty());
        results.push(CheckResult {
            label: var.clone(),
            ok: set,
            detail: if set { "set".into() } else { "not set".into() },
        });
    }

    results
}

/// One issue per node whose templates name something other than its children.
fn check_templates(graph: &Graph) -> Vec<CheckResult> {
    graph
        .nodes()
        .filter_map(|node| {
            let missing = template::unresolved(
                &node.params,
                node.children.iter().map(|c| c.as_str()),
            );
            (!missing.is_empty()).then(|| CheckResult {
                label: format!("Template '{}'", node.id),
                ok: false,
                detail: format!("placeholders without a matching child: {}", missing.join(", ")),
            })
        })
        .collect()
}
