use crate::agents::DelegateTools;
use crate::state::AppState;

/// Print each delegate with the tools it can see.
pub async fn list(state: &AppState) -> anyhow::Result<()> {
    if state.agents.is_empty() {
        println!("No delegate agents configured.");
        return Ok(());
    }

    let shared_count = match state.primary.tool_count().await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "primary tool discovery failed");
            0
        }
    };

    for agent in state.agents.list() {
        let source = match &agent.tools {
            DelegateTools::Shared => "shared",
            DelegateTools::Isolated(_) => "isolated",
        };
        println!(
            "{} ({source}, {} tools)  {}",
            agent.id,
            agent.tool_count(shared_count),
            agent.description
        );
        if let DelegateTools::Isolated(tools) = &agent.tools {
            for tool in tools {
                println!("  {}", tool.name);
            }
        }
    }
    Ok(())
}
