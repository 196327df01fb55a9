//! `handoff onboard`: first-time setup.

use std::path::Path;

use handoff_config::AppConfig;

pub fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("handoff: first-time setup");
    println!("=========================\n");

    if let Some(config_dir) = config_path.parent()
        && !config_dir.as_os_str().is_empty()
        && !config_dir.exists()
    {
        std::fs::create_dir_all(config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(config_path, starter_config())?;
        println!("✅ Created config at: {}", config_path.display());
    }

    let config = AppConfig::load_from(config_path)?;
    let workspace_dir = config.workspace_dir();
    if !workspace_dir.exists() {
        std::fs::create_dir_all(&workspace_dir)?;
        println!("✅ Created workspace directory: {}", workspace_dir.display());
    }

    println!("\nNext steps:");
    println!("   1. Set HANDOFF_API_KEY (or add api_key to {})", config_path.display());
    println!("   2. Add [[personas]] entries to the config");
    println!("   3. Run: handoff agent\n");

    Ok(())
}

/// The default config plus a commented persona example.
fn starter_config() -> String {
    let mut toml = AppConfig::default_toml();
    toml.push_str(concat!(
        "\n",
        "# Personas. Without any, a single general-purpose `default` persona is used.\n",
        "#\n",
        "# default_persona = \"planner\"\n",
        "#\n",
        "# [[personas]]\n",
        "# id = \"planner\"\n",
        "# description = \"Breaks requests down and hands parts to specialists\"\n",
        "# system_prompt = \"You plan. Delegate writing tasks to joke_writer.\"\n",
        "# tools = [\"delegate\", \"calculator\", \"web_search\"]\n",
        "#\n",
        "# [[personas]]\n",
        "# id = \"joke_writer\"\n",
        "# description = \"Writes short jokes\"\n",
        "# prompt_file = \"personas/joke_writer.md\"\n",
    ));
    toml
}
