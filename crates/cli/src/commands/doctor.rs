//! `handoff doctor`: diagnose configuration and provider health.

use std::path::Path;

use handoff_config::AppConfig;
use handoff_core::provider::Provider;

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("handoff doctor");
    println!("==============\n");

    let mut issues = 0;

    if !config_path.exists() {
        println!("  ⚠️  No config file at {}, using defaults", config_path.display());
        println!("      run `handoff onboard` to create one");
        issues += 1;
    }

    let config = match AppConfig::load_with_env(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 blocking issue found.");
            return Ok(());
        }
    };

    match config.persona_registry() {
        Ok(registry) => println!(
            "  ✅ {} persona(s) loaded, default '{}'",
            registry.len(),
            registry.default_id()
        ),
        Err(e) => {
            println!("  ❌ Personas: {e}");
            issues += 1;
        }
    }

    match config.memory.backend.as_str() {
        "file" => {
            let path = config.memory_path();
            match path.parent() {
                Some(dir) if dir.exists() => println!("  ✅ Memory file: {}", path.display()),
                _ => println!(
                    "  ✅ Memory file: {} (created on first save)",
                    path.display()
                ),
            }
        }
        backend => println!("  ✅ Memory backend: {backend}"),
    }

    if config.tools.tavily_api_key.is_some() {
        println!("  ✅ Tavily key set, web_search available");
    } else {
        println!("  ⚠️  No TAVILY_API_KEY, web_search will report errors");
        issues += 1;
    }

    match handoff_providers::from_config(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider reachable: {}", config.api_url),
            Ok(false) => {
                println!("  ❌ Provider rejected the health check: {}", config.api_url);
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider unreachable: {e}");
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
