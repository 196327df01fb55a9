//! `handoff status` and `handoff personas`.

use std::path::Path;

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    println!("handoff status");
    println!("==============");
    println!("  Config file:  {}", config_path.display());
    println!("  API URL:      {}", config.api_url);
    println!(
        "  API key:      {}",
        if config.api_key.is_some() { "set" } else { "not set" }
    );
    println!("  Model:        {}", config.default_model);
    println!("  Temperature:  {}", config.default_temperature);
    println!("  Max tokens:   {}", config.default_max_tokens);
    println!(
        "  Limits:       {} iterations, delegation depth {}",
        config.agent.max_iterations, config.agent.max_delegation_depth
    );
    println!(
        "  Timeouts:     model {}s, tool {}s, memory {}s",
        config.agent.model_timeout_secs,
        config.agent.tool_timeout_secs,
        config.agent.memory_timeout_secs
    );
    println!("  User:         {}", config.agent.user_id);
    println!("  Persona:      {}", config.default_persona);
    println!(
        "  Memory:       {} (auto-save {})",
        config.memory.backend,
        if config.memory.auto_save { "on" } else { "off" }
    );
    if config.memory.backend == "file" {
        println!("  Memory file:  {}", config.memory_path().display());
    }
    println!(
        "  Telemetry:    {}",
        if config.telemetry.enabled { "enabled" } else { "disabled" }
    );
    println!("  Workspace:    {}", config.workspace_dir().display());

    if !config_path.exists() {
        println!("\n  No config file; run `handoff onboard` to create one");
    }

    Ok(())
}

pub fn personas(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let registry = config.persona_registry()?;

    println!("Personas");
    println!("========");
    for persona in registry.iter() {
        let marker = if persona.id == registry.default_id() { "*" } else { " " };
        println!("  {marker} {}", persona.id);
        if !persona.description.is_empty() {
            println!("      {}", persona.description);
        }
        let tools = match &persona.allowed_tools {
            Some(tools) => tools.iter().cloned().collect::<Vec<_>>().join(", "),
            None => "all".to_string(),
        };
        println!("      tools: {tools}");
        println!(
            "      model: {}",
            persona.model.as_deref().unwrap_or(&config.default_model)
        );
    }

    Ok(())
}
