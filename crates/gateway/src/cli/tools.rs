use anyhow::Context;
use serde_json::{json, Value};

use crate::state::AppState;

/// Print the primary agent's toolsets.
pub async fn list(state: &AppState, as_json: bool) -> anyhow::Result<()> {
    let toolsets = state
        .primary
        .get_toolsets()
        .await
        .context("discovering tools")?;

    if as_json {
        let out: Vec<Value> = toolsets
            .iter()
            .map(|set| {
                json!({
                    "provider": set.provider,
                    "tools": set
                        .tools
                        .iter()
                        .map(|t| json!({ "name": t.name, "description": t.description }))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if toolsets.is_empty() {
        println!("No tools available.");
        return Ok(());
    }
    for set in &toolsets {
        let approved = state.primary.auto_approve(&set.provider);
        println!("{} ({} tools)", set.provider, set.tools.len());
        for tool in &set.tools {
            let marker = if approved.contains(&tool.name) { " [auto-approve]" } else { "" };
            println!("  {}{marker}  {}", tool.name, tool.description);
        }
    }
    Ok(())
}

/// Invoke `tool` with the JSON `args` and print the raw result.
pub async fn call(state: &AppState, tool: &str, args: &str) -> anyhow::Result<()> {
    let params = parse_args(args)?;
    let result = state.primary.execute_tool_call(tool, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn parse_args(args: &str) -> anyhow::Result<Value> {
    let value: Value = serde_json::from_str(args).context("--args must be valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("--args must be a JSON object");
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_must_be_an_object() {
        assert_eq!(parse_args(r#"{"q":"rust"}"#).unwrap()["q"], "rust");
        assert!(parse_args("[1,2]").is_err());
        assert!(parse_args("{not json").is_err());
    }
}
