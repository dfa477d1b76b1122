//! CLI availability probing (spec §4.2 "detect which CLIs are available").
//!
//! Probes `--version` for each agent with a short timeout and caches the
//! result for the lifetime of the process — repeated tool calls don't each
//! pay the subprocess-spawn cost just to learn what's on `PATH`.

use std::collections::HashMap;
use std::time::Duration;

use brutalist_types::CliAgent;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct AvailabilityProbe {
    cache: Mutex<HashMap<CliAgent, bool>>,
}

impl AvailabilityProbe {
    pub fn new() -> Self {
        AvailabilityProbe {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Is `agent`'s CLI runnable? Cached after the first probe.
    pub async fn is_available(&self, agent: CliAgent) -> bool {
        if let Some(cached) = self.cache.lock().await.get(&agent) {
            return *cached;
        }
        let available = probe(agent).await;
        self.cache.lock().await.insert(agent, available);
        available
    }

    /// Probe every known agent concurrently, returning the available subset.
    pub async fn available_agents(&self) -> Vec<CliAgent> {
        let mut out = Vec::new();
        for agent in CliAgent::all() {
            if self.is_available(agent).await {
                out.push(agent);
            }
        }
        out
    }
}

impl Default for AvailabilityProbe {
    fn default() -> Self {
        Self::new()
    }
}

async fn probe(agent: CliAgent) -> bool {
    let program = agent.as_str();
    let result = tokio::time::timeout(PROBE_TIMEOUT, Command::new(program).arg("--version").output()).await;
    let available = matches!(result, Ok(Ok(output)) if output.status.success());
    debug!(agent = %agent, available, "CLI availability probed");
    available
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_binary_is_reported_unavailable() {
        // Every agent name is a real program name, so fake the probe result
        // directly via the cache instead of depending on the host's PATH.
        let probe = AvailabilityProbe::new();
        probe.cache.lock().await.insert(CliAgent::Claude, false);
        assert!(!probe.is_available(CliAgent::Claude).await);
    }

    #[tokio::test]
    async fn cached_result_is_reused() {
        let probe = AvailabilityProbe::new();
        probe.cache.lock().await.insert(CliAgent::Codex, true);
        assert!(probe.is_available(CliAgent::Codex).await);
        // Second call must not re-probe; cache already holds the answer.
        assert!(probe.is_available(CliAgent::Codex).await);
    }
}
